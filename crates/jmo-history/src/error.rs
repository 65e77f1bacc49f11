//! Store error taxonomy.

/// Errors raised by the history store.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("scan not found: {0}")]
    ScanNotFound(String),

    #[error("ambiguous scan id prefix: {0}")]
    AmbiguousScanId(String),

    #[error("encryption key missing: set {0} to read encrypted raw findings")]
    EncryptionKeyMissing(&'static str),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("findings document error: {0}")]
    Document(#[from] jmo_normalize::NormalizeError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, HistoryError>;
