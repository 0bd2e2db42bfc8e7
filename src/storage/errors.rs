//! Storage error types

use thiserror::Error;

/// Errors that can occur during backing store operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend unreachable or connection could not be established
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Operation exceeded the configured operation timeout
    #[error("Storage operation timed out: {0}")]
    Timeout(String),

    /// Backend rejected the command
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Value could not be encoded for or decoded from the store
    #[error("{0}")]
    Serialization(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
