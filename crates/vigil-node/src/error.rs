//! Error types for Vigil.

use serde::Serialize;
use thiserror::Error;

/// Result type for Vigil operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Vigil operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Referenced incident, comment, report or vote is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation (duplicate vote insert, duplicate report)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Role or ownership check failed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed field or enum value
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Record store timed out or is temporarily unavailable
    #[error("Storage unavailable: {0}")]
    Transient(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable tag a client can match on instead of parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    Validation,
    Transient,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Transient(_) => ErrorKind::Transient,
            Error::Storage(_) | Error::Serialization(_) | Error::Config(_) | Error::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Only transient failures are worth retrying; the core never retries them itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    pub(crate) fn incident_not_found(id: &str) -> Self {
        Error::NotFound(format!("incident {id}"))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind as K;
        match e.kind() {
            K::Busy | K::TimedOut | K::TryAgain | K::Aborted => Error::Transient(e.to_string()),
            _ => Error::Storage(e.to_string()),
        }
    }
}

impl From<vigil_broker::Error> for Error {
    fn from(e: vigil_broker::Error) -> Self {
        Error::Validation(e.to_string())
    }
}
