//! Error types for cache storage

use std::fmt;

#[derive(Debug)]
pub enum StorageError {
    Io(Box<std::io::Error>),
    Serialization(serde_json::Error),
    /// The store refused to hold the given response
    Rejected(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "IO error: {}", err),
            StorageError::Serialization(err) => write!(f, "Serialization error: {}", err),
            StorageError::Rejected(msg) => write!(f, "Rejected by store: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err.as_ref()),
            StorageError::Serialization(err) => Some(err),
            StorageError::Rejected(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
