use thiserror::Error;
use tinylink_core::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid expiration: {0}")]
    InvalidExpiration(String),
    #[error("no free alias found after {0} attempts")]
    AliasExhausted(u32),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ShortenerError {
    /// The storage error kind behind this error, if any.
    pub fn storage(&self) -> Option<&StorageError> {
        match self {
            ShortenerError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShortenerError>;
