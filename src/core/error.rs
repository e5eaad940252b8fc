//! Error type system for L.E.A.F
//!
//! This module provides the crate-wide error type with:
//! - Error classification for the lending, social and gamification layers
//! - HTTP status code mapping
//! - JSON error bodies carrying trace IDs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Main error type for the L.E.A.F server
#[derive(Debug, thiserror::Error)]
pub enum LeafError {
    // System-level errors
    #[error("System initialization failed: {0}")]
    InitializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    // API-related errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // I/O errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Background work
    #[error("Task error: {0}")]
    TaskError(String),
}

impl LeafError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            LeafError::InvalidRequest(_)
            | LeafError::ValidationError(_)
            | LeafError::SerializationError(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            LeafError::AuthenticationError(_) => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            LeafError::PermissionDenied(_) => StatusCode::FORBIDDEN,

            // 404 Not Found
            LeafError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            LeafError::Conflict(_) => StatusCode::CONFLICT,

            // 500 Internal Server Error
            LeafError::InitializationError(_)
            | LeafError::ConfigError(_)
            | LeafError::DatabaseError(_)
            | LeafError::PoolError(_)
            | LeafError::IoError(_)
            | LeafError::TaskError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type name for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            LeafError::InitializationError(_) => "InitializationError",
            LeafError::ConfigError(_) => "ConfigError",
            LeafError::DatabaseError(_) => "DatabaseError",
            LeafError::PoolError(_) => "PoolError",
            LeafError::InvalidRequest(_) => "InvalidRequest",
            LeafError::ValidationError(_) => "ValidationError",
            LeafError::AuthenticationError(_) => "AuthenticationError",
            LeafError::PermissionDenied(_) => "PermissionDenied",
            LeafError::NotFound(_) => "NotFound",
            LeafError::Conflict(_) => "Conflict",
            LeafError::IoError(_) => "IoError",
            LeafError::SerializationError(_) => "SerializationError",
            LeafError::TaskError(_) => "TaskError",
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeafError::DatabaseError(_) | LeafError::PoolError(_))
    }

    /// Map a UNIQUE constraint violation to `Conflict`, leaving other errors untouched
    pub fn on_unique_violation(err: rusqlite::Error, message: impl Into<String>) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                LeafError::Conflict(message.into())
            }
            _ => LeafError::DatabaseError(err),
        }
    }
}

/// Error response structure for API endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Unique trace ID for this error
    pub trace_id: String,
}

impl ErrorResponse {
    /// Create a new error response with a generated trace ID
    pub fn new(error: String, message: String) -> Self {
        Self {
            error,
            message,
            details: None,
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a new error response with a specific trace ID
    pub fn with_trace_id(error: String, message: String, trace_id: String) -> Self {
        Self {
            error,
            message,
            details: None,
            trace_id,
        }
    }

    /// Create an error response with additional details
    pub fn with_details(error: String, message: String, details: serde_json::Value) -> Self {
        Self {
            error,
            message,
            details: Some(details),
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an error response from a LeafError
    pub fn from_error(error: &LeafError) -> Self {
        Self::new(error.error_type().to_string(), error.to_string())
    }

    /// Create an error response from a LeafError with a specific trace ID
    pub fn from_error_with_trace_id(error: &LeafError, trace_id: String) -> Self {
        Self::with_trace_id(error.error_type().to_string(), error.to_string(), trace_id)
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} (trace_id: {})",
            self.error,
            self.message,
            self.details.as_ref().map_or("", |_| "with details"),
            self.trace_id
        )
    }
}

/// Implement IntoResponse for LeafError to enable automatic error handling in Axum
impl IntoResponse for LeafError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = match crate::api::middleware::current_trace_id() {
            Some(trace_id) => ErrorResponse::from_error_with_trace_id(&self, trace_id),
            None => ErrorResponse::from_error(&self),
        };

        if status_code.is_server_error() {
            tracing::error!(
                error_type = self.error_type(),
                trace_id = %error_response.trace_id,
                status_code = %status_code,
                "Request failed: {}",
                self
            );
        } else {
            tracing::warn!(
                error_type = self.error_type(),
                trace_id = %error_response.trace_id,
                status_code = %status_code,
                "Request rejected: {}",
                self
            );
        }

        (status_code, Json(error_response)).into_response()
    }
}

/// Result type alias for operations that can fail with LeafError
pub type Result<T> = std::result::Result<T, LeafError>;
