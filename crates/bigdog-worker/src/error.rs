//! Error types for the offline cache worker

use cache_storage::StorageError;
use std::fmt;

/// A network fetch rejected. HTTP error statuses are not rejections.
#[derive(Debug)]
pub enum FetchError {
    Http(Box<reqwest::Error>),
    InvalidRequest(String),
    Unreachable(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http(err) => write!(f, "HTTP error: {}", err),
            FetchError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            FetchError::Unreachable(msg) => write!(f, "Network unreachable: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(Box::new(err))
    }
}

#[derive(Debug)]
pub enum WorkerError {
    Storage(StorageError),
    Fetch(FetchError),
    /// A core asset answered with a non-2xx status
    BadStatus { url: String, status: u16 },
    InvalidUrl(url::ParseError),
    /// `respond_with` was called twice on one fetch event
    AlreadyResponded,
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Storage(err) => write!(f, "Storage error: {}", err),
            WorkerError::Fetch(err) => write!(f, "Fetch error: {}", err),
            WorkerError::BadStatus { url, status } => {
                write!(f, "Unexpected status {} for {}", status, url)
            }
            WorkerError::InvalidUrl(err) => write!(f, "Invalid URL: {}", err),
            WorkerError::AlreadyResponded => write!(f, "Fetch event already has a response"),
            WorkerError::Io(err) => write!(f, "IO error: {}", err),
            WorkerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Storage(err) => Some(err),
            WorkerError::Fetch(err) => Some(err),
            WorkerError::InvalidUrl(err) => Some(err),
            WorkerError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<StorageError> for WorkerError {
    fn from(err: StorageError) -> Self {
        WorkerError::Storage(err)
    }
}

impl From<FetchError> for WorkerError {
    fn from(err: FetchError) -> Self {
        WorkerError::Fetch(err)
    }
}

impl From<url::ParseError> for WorkerError {
    fn from(err: url::ParseError) -> Self {
        WorkerError::InvalidUrl(err)
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for WorkerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        WorkerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
