use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("alias not found: {0}")]
    NotFound(String),
    #[error("link has been deleted: {0}")]
    Gone(String),
    #[error("url already exists: {0}")]
    AlreadyExists(String),
    #[error("alias is bound to another url: {0}")]
    AliasTaken(String),
    #[error("link has expired: {0}")]
    Expired(String),
    #[error("operation not supported: {0}")]
    Unsupported(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("snapshot operation failed: {0}")]
    Snapshot(String),
}

impl StorageError {
    /// Returns `true` for failures of the underlying medium (connectivity,
    /// transactions, serialization), as opposed to outcomes callers branch on.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            StorageError::Unavailable(_)
                | StorageError::Timeout(_)
                | StorageError::Query(_)
                | StorageError::InvalidData(_)
                | StorageError::Snapshot(_)
        )
    }
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Snapshot(value.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Snapshot(value.to_string())
    }
}
