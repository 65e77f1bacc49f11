//! Error taxonomy for the core crate.

/// Errors raised by core contracts (configuration, catalog, git capture).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid severity: {0}")]
    InvalidSeverity(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
