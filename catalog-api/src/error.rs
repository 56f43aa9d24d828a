//! Error Types for the Catalog Admin API
//!
//! - `ErrorCode` categorizes failures and maps each one to an HTTP status
//! - `ApiError` is the structured error carried in the response envelope
//! - `ApiEnvelope` is the uniform `{success, response, error}` body
//!
//! Store failures from the coherence core are converted with
//! `From<CatalogError>` so handlers can use `?` directly.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use catalog_core::{CatalogError, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required query or path parameter is missing
    MissingField,

    // ========================================================================
    // Not Found (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    // ========================================================================
    // Server Errors (5xx)
    // ========================================================================
    /// Unexpected internal failure
    InternalError,

    /// A backing store rejected the operation
    StoreError,

    /// A backing store is unreachable
    ServiceUnavailable,

    /// A backing store did not answer in time
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed | ErrorCode::InvalidInput | ErrorCode::MissingField => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError | ErrorCode::StoreError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Default message used when no specific message is provided.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::StoreError => "Store operation failed",
            ErrorCode::ServiceUnavailable => "Service unavailable",
            ErrorCode::Timeout => "Operation timed out",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::EntityNotFound => "ENTITY_NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::StoreError => "STORE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::Timeout => "TIMEOUT",
        };
        write!(f, "{}", code)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error carried in the `error` field of the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    pub code: ErrorCode,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required parameter '{}' is missing", field),
        )
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

/// Uniform response body for every admin endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub response: Option<T>,
    pub error: Option<ApiError>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(response: T) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
        }
    }
}

impl ApiEnvelope<()> {
    pub fn failure(error: ApiError) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error),
        }
    }
}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ApiEnvelope::failure(self))).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let code = match &err {
            CatalogError::Storage(StorageError::Timeout { .. }) => ErrorCode::Timeout,
            CatalogError::Storage(StorageError::Unavailable { .. }) => {
                ErrorCode::ServiceUnavailable
            }
            CatalogError::Storage(_) => ErrorCode::StoreError,
            CatalogError::Validation(_) => ErrorCode::ValidationFailed,
            CatalogError::Config(_) => ErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
