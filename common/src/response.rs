//! HTTP error envelope.
//!
//! This is the only place where [`AppError`] variants acquire transport
//! semantics: a status code and a stable machine-readable error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// Outcome marker carried by every gateway body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The request completed.
    Success,
    /// The request failed; see the `error` object.
    Error,
}

/// Body returned for every failed request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Always `error`.
    pub status: ResponseStatus,
    /// Error details.
    pub error: ApiError,
    /// Response timestamp.
    pub timestamp: DateTime<Utc>,
}

/// API error details.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code for client handling (e.g., "VALIDATION_ERROR", "NOT_FOUND").
    pub code: String,

    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    /// Creates an error body.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            error: ApiError {
                code: code.into(),
                message: message.into(),
            },
            timestamp: Utc::now(),
        }
    }
}

impl AppError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) | AppError::MissingTarget | AppError::QueryFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateName(_) => StatusCode::CONFLICT,
            AppError::DatabaseConnection(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseQuery(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable error code for clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::MissingTarget => "MISSING_TARGET",
            AppError::DuplicateName(_) => "DUPLICATE_NAME",
            AppError::ConnectionNotFound(_) => "NOT_FOUND",
            AppError::DatabaseConnection(_) => "CONNECTION_FAILED",
            AppError::QueryFailed(_) => "QUERY_FAILED",
            AppError::DatabaseQuery(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(code = self.error_code(), error = %self, "请求处理失败");
        } else {
            tracing::debug!(code = self.error_code(), error = %self, "请求被拒绝");
        }

        // Store internals stay in the log, not in the body.
        let message = match &self {
            AppError::DatabaseQuery(_) => "internal storage error".to_string(),
            other => other.to_string(),
        };

        let mut response = (status, Json(ErrorResponse::new(self.error_code(), message))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}
