//! Error types for the queue metrics engine.
//!
//! Lookups of entities that were never observed return `Option::None` rather
//! than an error.

use crate::config::ConfigurationError;
use crate::hooks::HookError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueMetricsError {
    /// Backend unreachable or timed out
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    /// Unsupported storage driver, malformed TTL and similar
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The backend answered but rejected the command (e.g. WRONGTYPE)
    #[error("Storage backend error: {0}")]
    StorageBackend(String),
    /// Stored data could not be parsed into the expected shape
    #[error("Malformed sample in {key}: {reason}")]
    MalformedSample { key: String, reason: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Hook error: {0}")]
    Hook(String),
}

impl QueueMetricsError {
    pub fn malformed_sample(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedSample {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error came from the backing store rather than the caller
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::StorageBackend(_))
    }

    /// Whether retrying later could succeed
    pub fn is_outage(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<StorageError> for QueueMetricsError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Serialization(msg) => QueueMetricsError::Serialization(msg),
            StorageError::Backend(msg) => QueueMetricsError::StorageBackend(msg),
            other => QueueMetricsError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<ConfigurationError> for QueueMetricsError {
    fn from(error: ConfigurationError) -> Self {
        QueueMetricsError::InvalidConfiguration(error.to_string())
    }
}

impl From<serde_json::Error> for QueueMetricsError {
    fn from(error: serde_json::Error) -> Self {
        QueueMetricsError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<HookError> for QueueMetricsError {
    fn from(error: HookError) -> Self {
        QueueMetricsError::Hook(error.to_string())
    }
}

pub type QueueMetricsResult<T> = std::result::Result<T, QueueMetricsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_unavailable() {
        let err: QueueMetricsError = StorageError::Timeout("HGETALL".to_string()).into();
        assert!(err.is_storage_error());
        assert!(err.to_string().contains("HGETALL"));
    }

    #[test]
    fn test_serialization_errors_keep_their_category() {
        let err: QueueMetricsError = StorageError::Serialization("bad json".to_string()).into();
        assert_eq!(err, QueueMetricsError::Serialization("bad json".to_string()));
        assert!(!err.is_storage_error());
    }

    #[test]
    fn test_backend_rejections_are_not_outages() {
        let err: QueueMetricsError =
            StorageError::Backend("WRONGTYPE key 'h' holds a string value, expected hash".to_string()).into();
        assert!(matches!(err, QueueMetricsError::StorageBackend(ref msg) if msg.starts_with("WRONGTYPE")));
        assert!(err.is_storage_error());
        assert!(!err.is_outage());

        let down: QueueMetricsError = StorageError::Unavailable("connection refused".to_string()).into();
        assert!(down.is_outage());
    }

    #[test]
    fn test_malformed_sample_display() {
        let err = QueueMetricsError::malformed_sample("qm:jobs:redis:default:A", "field 'avg': not a number");
        assert_eq!(
            err.to_string(),
            "Malformed sample in qm:jobs:redis:default:A: field 'avg': not a number"
        );
    }
}
