//! Error taxonomy shared by every layer of the gateway.
//!
//! Components raise these typed failures; only the HTTP layer
//! (see [`crate::response`]) turns them into status codes.

use thiserror::Error;
use validator::ValidationErrors;

/// Result alias used throughout the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed, invalid or expired bearer credential.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Malformed request shape, missing required fields, unsupported db_type.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A query request named neither a stored connection nor a db_type.
    #[error("either connection_id or db_type must be provided")]
    MissingTarget,

    /// The owner already has a profile with this name.
    #[error("connection name already exists: {0}")]
    DuplicateName(String),

    /// Profile absent, or owned by someone else.
    #[error("database connection not found: {0}")]
    ConnectionNotFound(String),

    /// Backend unreachable, credentials rejected by the backend, or open timeout.
    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    /// Backend-side failure while running the caller's statement.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Failure of the gateway's own profile store.
    #[error("registry store error: {0}")]
    DatabaseQuery(String),

    /// Anything unclassified.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseQuery(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("background task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_target_message() {
        assert_eq!(
            AppError::MissingTarget.to_string(),
            "either connection_id or db_type must be provided"
        );
    }

    #[test]
    fn test_sqlx_error_is_store_failure() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::DatabaseQuery(_)));
    }
}
