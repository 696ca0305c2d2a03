//! # Error Handling
//!
//! This module defines the error taxonomy shared by every index component.
//! Errors are classified with an [`ErrorCode`] so the presentation layer can
//! translate them into protocol responses without matching on variants.
//!
//! ## Error Classifications
//!
//! - **Validation Errors** (400 Bad Request): malformed or inconsistent input
//! - **Conflict** (409 Conflict): duplicate uploads and filename collisions
//! - **Not Found** (404 Not Found): missing projects, versions and distributions
//! - **Unsupported** (405 Method Not Allowed): operations a remote-only index cannot perform
//! - **Upload Errors** (413 Payload Too Large): oversized uploads
//! - **Internal Errors** (500 Internal Server Error): storage and key-value failures
//!
//! Remote fetch failures are always reported as [`IndexError::NotFound`]. The
//! upstream status code travels with the error so the cache layer can tell a
//! definitive 404 from a transient failure.

use reqwest::StatusCode;

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError, // Malformed input, filename/metadata mismatch
    Conflict,        // Duplicate upload
    NotFound,        // Missing resources, upstream failures
    Unsupported,     // Operation not meaningful for this index
    UploadError,     // Oversized uploads
    InternalError,   // Storage, store and serialization failures
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::Conflict => "conflict",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Unsupported => "unsupported_operation",
            ErrorCode::UploadError => "upload_error",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Unsupported => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::UploadError => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors raised by the index engine
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    /// Missing resource. `status` is the upstream HTTP status when the
    /// failure came from a remote index that actually answered.
    #[error("{message}")]
    NotFound {
        message: String,
        status: Option<StatusCode>,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Unable to parse distribution filename: {0}")]
    Parse(String),

    #[error("Upload too large: {size} bytes (max: {max})")]
    UploadTooLarge { size: usize, max: usize },

    #[error("Key-value store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IndexError {
    /// Not-found error for a local resource.
    pub fn not_found(message: impl Into<String>) -> Self {
        IndexError::NotFound {
            message: message.into(),
            status: None,
        }
    }

    /// Not-found error carrying the status an upstream server answered with.
    pub fn upstream_status(message: impl Into<String>, status: StatusCode) -> Self {
        IndexError::NotFound {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            IndexError::BadRequest(_) | IndexError::Parse(_) => ErrorCode::ValidationError,
            IndexError::Conflict(_) => ErrorCode::Conflict,
            IndexError::NotFound { .. } => ErrorCode::NotFound,
            IndexError::Unsupported(_) => ErrorCode::Unsupported,
            IndexError::UploadTooLarge { .. } => ErrorCode::UploadError,
            IndexError::Store(_)
            | IndexError::Io(_)
            | IndexError::Json(_)
            | IndexError::Internal(_)
            | IndexError::Anyhow(_) => ErrorCode::InternalError,
        }
    }

    /// Upstream status code, when the error came from a remote answer.
    pub fn upstream_status_code(&self) -> Option<StatusCode> {
        match self {
            IndexError::NotFound { status, .. } => *status,
            _ => None,
        }
    }

    /// True only when an upstream index answered 404.
    ///
    /// Timeouts, connection failures and other statuses are transient from
    /// the cache's point of view.
    pub fn is_definitive_not_found(&self) -> bool {
        self.upstream_status_code() == Some(StatusCode::NOT_FOUND)
    }
}

/// Convenient result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_map_to_http_status() {
        assert_eq!(
            IndexError::BadRequest("x".into()).error_code().http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IndexError::Conflict("x".into()).error_code().http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            IndexError::not_found("x").error_code().http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            IndexError::Parse("x".into()).error_code(),
            ErrorCode::ValidationError
        );
        assert_eq!(
            IndexError::Unsupported("get_projects").error_code().as_str(),
            "unsupported_operation"
        );
    }

    #[test]
    fn test_definitive_not_found_requires_upstream_404() {
        assert!(IndexError::upstream_status("gone", StatusCode::NOT_FOUND).is_definitive_not_found());
        assert!(!IndexError::upstream_status("busy", StatusCode::GATEWAY_TIMEOUT)
            .is_definitive_not_found());
        assert!(!IndexError::not_found("timeout").is_definitive_not_found());
        assert!(!IndexError::Store("down".into()).is_definitive_not_found());
    }
}
