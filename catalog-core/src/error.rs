//! Error types for catalog coherence operations

use std::time::Duration;
use thiserror::Error;

/// Errors raised by external stores (cache, key-value, search, primary).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("{backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("{operation} failed: {reason}")]
    OperationFailed { operation: String, reason: String },

    #[error("Wrong value type at key {key}")]
    WrongType { key: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Malformed input that cannot be turned into a document or event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all catalog coherence errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CatalogError {
    /// Transient failures are expected to heal on the next cycle or event.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CatalogError::Storage(StorageError::Timeout { .. })
                | CatalogError::Storage(StorageError::Unavailable { .. })
        )
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        StorageError::Timeout {
            operation: operation.into(),
            after,
        }
        .into()
    }

    pub fn operation_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::OperationFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
        .into()
    }
}

/// Result type alias for catalog coherence operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transient() {
        let err = CatalogError::timeout("clear_region", Duration::from_secs(5));
        assert!(err.is_transient());
        assert!(err.to_string().contains("clear_region timed out"));
    }

    #[test]
    fn test_validation_is_not_transient() {
        let err: CatalogError = ValidationError::InvalidValue {
            field: "rating".to_string(),
            reason: "out of range".to_string(),
        }
        .into();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "chunk_size".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for chunk_size: 0 - must be positive"
        );
    }
}
