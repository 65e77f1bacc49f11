//! Orchestrator error taxonomy.
//!
//! Tool-level failures are not errors: they are recorded per (target, tool)
//! in the job's status map. Errors here cover the orchestrator's own
//! machinery (filesystem, join failures).

/// Errors raised by the scan orchestrator itself.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("worker task failed: {0}")]
    Join(String),

    #[error("core error: {0}")]
    Core(#[from] jmo_core::CoreError),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, ScanError>;
