//! Trend engine error taxonomy.

/// Errors raised by the trend engine.
#[derive(Debug, thiserror::Error)]
pub enum TrendError {
    #[error("history error: {0}")]
    History(#[from] jmo_history::HistoryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for trend operations.
pub type Result<T> = std::result::Result<T, TrendError>;
