//! HTTP error responses.
//!
//! Bridges [`CoreError`] to HTTP: every handler returns `Result<_, ApiError>`
//! and the `From<CoreError>` impl picks the status code, so a domain error
//! surfaces with one consistent JSON shape.

use crate::error::CoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt;

/// Application error type for HTTP handlers.
///
/// Wraps domain errors and converts them into HTTP responses via Axum's
/// `IntoResponse`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    code: String,
}

impl ApiError {
    /// Creates an error with an explicit status, message, and code.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
        }
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            message.into(),
            "UNAUTHORIZED".to_string(),
        )
    }

    /// 403 Forbidden.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            message.into(),
            "FORBIDDEN".to_string(),
        )
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            message.into(),
            "NOT_FOUND".to_string(),
        )
    }

    /// 409 Conflict.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT".to_string())
    }

    /// 503 Service Unavailable (retryable).
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    /// Set for errors a client should retry as-is.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = %self.code,
                message = %self.message,
                "Request failed"
            );
        }
        let body = ErrorResponse {
            retryable: self.status == StatusCode::SERVICE_UNAVAILABLE,
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) | CoreError::Signature(msg) => Self::bad_request(msg),
            CoreError::Authorization(msg) => Self::forbidden(msg),
            CoreError::Oversold => Self::conflict(err.to_string()),
            CoreError::StateConflict(msg) => Self::conflict(msg),
            CoreError::NotFound(msg) => Self::not_found(format!("{msg} not found")),
            CoreError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage failure");
                Self::unavailable("storage temporarily unavailable, retry the request")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = ApiError::bad_request("quantity must be at least 1");
        assert_eq!(err.to_string(), "[BAD_REQUEST] quantity must be at least 1");
    }

    #[test]
    fn oversell_maps_to_conflict() {
        let err = ApiError::from(CoreError::Oversold);
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn storage_maps_to_unavailable() {
        let err = ApiError::from(CoreError::Storage("timeout".to_string()));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn authorization_maps_to_forbidden() {
        let err = ApiError::from(CoreError::Authorization("nope".to_string()));
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }
}
