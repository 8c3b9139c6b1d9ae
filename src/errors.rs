// ABOUTME: Unified error handling with standard error codes and HTTP responses
// ABOUTME: Defines AppError/AppResult, the response envelope and IntoResponse mapping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Result alias used across the crate
pub type AppResult<T> = Result<T, AppError>;

/// Error classification for internal faults
///
/// Application-level validation failures (missing entity, cap exceeded,
/// duplicate name) are NOT represented here - they are reported as
/// `code=1` [`StandardResponse`] envelopes by the route handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Missing credentials on a protected route
    AuthRequired,
    /// Invalid or unresolvable credentials
    AuthInvalid,
    /// Expired credentials
    AuthExpired,
    /// Malformed or rejected input
    InvalidInput,
    /// Referenced entity does not exist
    NotFound,
    /// Database operation failed
    DatabaseError,
    /// Upstream provider (LLM/embedding) call failed
    ExternalService,
    /// Server misconfiguration
    ConfigError,
    /// Unclassified internal fault
    InternalError,
}

/// Application error carrying a classification and a human-readable message
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    /// Error classification
    pub code: ErrorCode,
    /// Human-readable description (never leaked verbatim for internal faults)
    pub message: String,
}

impl AppError {
    /// Create an error with an explicit code
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Database operation failure
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Unclassified internal fault
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Malformed or rejected input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Missing entity
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Invalid credentials
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Expired credentials
    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthExpired, message)
    }

    /// Server misconfiguration
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Upstream provider failure
    pub fn external_service(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalService, message)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::database(format!("Database operation failed: {e}"))
    }
}

/// Standard response envelope returned by every JSON endpoint
///
/// `code=0` signals success; nonzero application codes signal failure
/// classes that the caller is expected to handle without inspecting the
/// HTTP status line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardResponse {
    /// `0` on success, `1` on application error
    pub code: i32,
    /// `"success"` or `"error"`
    pub status: String,
    /// Optional human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Optional payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl StandardResponse {
    /// Successful response with a data payload
    pub fn success(data: JsonValue) -> Self {
        Self {
            code: 0,
            status: "success".to_owned(),
            message: None,
            data: Some(data),
        }
    }

    /// Successful response with a message only
    pub fn success_message(message: impl Into<String>) -> Self {
        Self {
            code: 0,
            status: "success".to_owned(),
            message: Some(message.into()),
            data: None,
        }
    }

    /// Successful response with both a message and a data payload
    pub fn success_with(message: impl Into<String>, data: JsonValue) -> Self {
        Self {
            code: 0,
            status: "success".to_owned(),
            message: Some(message.into()),
            data: Some(data),
        }
    }

    /// Application error (`code=1`) with a message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            status: "error".to_owned(),
            message: Some(message.into()),
            data: None,
        }
    }
}

impl IntoResponse for StandardResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.code {
            ErrorCode::AuthRequired | ErrorCode::AuthInvalid | ErrorCode::AuthExpired => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(StandardResponse::error(self.message)),
            )
                .into_response(),
            ErrorCode::InvalidInput | ErrorCode::NotFound => {
                (StatusCode::OK, Json(StandardResponse::error(self.message))).into_response()
            }
            ErrorCode::DatabaseError
            | ErrorCode::ExternalService
            | ErrorCode::ConfigError
            | ErrorCode::InternalError => {
                // Internal detail stays in the logs, never in the response body
                tracing::error!("Internal error: {}", self.message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(StandardResponse::error("Internal server error")),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let resp = StandardResponse::success(serde_json::json!({"uid": "u-1"}));
        assert_eq!(resp.code, 0);
        assert_eq!(resp.status, "success");
        assert!(resp.message.is_none());
    }

    #[test]
    fn test_error_envelope_shape() {
        let resp = StandardResponse::error("Session not exist");
        assert_eq!(resp.code, 1);
        assert_eq!(resp.status, "error");
        assert_eq!(resp.message.as_deref(), Some("Session not exist"));
        assert!(resp.data.is_none());
    }

    #[test]
    fn test_envelope_skips_null_fields() {
        let json = serde_json::to_string(&StandardResponse::success_message("ok")).unwrap();
        assert!(!json.contains("data"));
    }

    #[test]
    fn test_constructor_codes() {
        assert_eq!(AppError::database("x").code, ErrorCode::DatabaseError);
        assert_eq!(AppError::auth_invalid("x").code, ErrorCode::AuthInvalid);
        assert_eq!(AppError::not_found("x").code, ErrorCode::NotFound);
    }
}
