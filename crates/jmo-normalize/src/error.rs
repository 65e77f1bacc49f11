//! Pipeline error taxonomy.
//!
//! Adapter-level parse problems never surface here: adapters fail soft,
//! logging a warning and yielding zero findings. Errors below cover the
//! pipeline's own filesystem walk and document serialization.

/// Errors raised by the normalization pipeline.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("worker task failed: {0}")]
    Join(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, NormalizeError>;
