//! Error types for the telemetry hub

use thiserror::Error;

/// Main error type surfaced by the service layer
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed request fields (HTTP 400)
    #[error("{0}")]
    Validation(String),

    /// No matching topic or data (HTTP 404)
    #[error("{0}")]
    NotFound(String),

    /// Durable store failure, message passed through (HTTP 500)
    #[error("{0}")]
    Upstream(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a validation failure
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Shorthand for a not-found failure
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }
}

/// Errors raised by the durable store and subscription collaborators
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Query or write rejected by the store
    #[error("Store query failed: {0}")]
    Query(String),

    /// Record addressed by id does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Unique key already taken
    #[error("Duplicate record: {0}")]
    Duplicate(String),
}

/// Cache service errors
///
/// These never reach callers of the gateway: every variant degrades to a
/// miss (reads) or a no-op (writes and deletes).
#[derive(Error, Debug)]
pub enum CacheError {
    /// Connection to the cache service failed or was dropped
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// The cache service rejected a command
    #[error("Cache command error: {0}")]
    Command(String),

    /// Cached value could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
            CacheError::Connection(e.to_string())
        } else {
            CacheError::Command(e.to_string())
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
