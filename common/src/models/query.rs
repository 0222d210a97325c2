//! SQL query models.
//!
//! Contains models for SQL query execution.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::models::connection::DbType;
use crate::response::ResponseStatus;

/// One result row: column name to JSON value, in column order.
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

/// Request body for executing a SQL statement.
///
/// `connection_id` takes precedence over every inline field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct QueryRequest {
    /// SQL statement to execute, passed through unchanged.
    #[validate(custom(function = "not_blank"))]
    pub query: String,

    /// Stored profile to run against.
    #[serde(default)]
    pub connection_id: Option<String>,

    /// Backend type for an inline connection.
    #[serde(default)]
    pub db_type: Option<DbType>,

    /// Inline host.
    #[serde(default)]
    pub host: Option<String>,

    /// Inline port.
    #[serde(default)]
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: Option<u16>,

    /// Inline database name.
    #[serde(default)]
    pub database: Option<String>,

    /// Inline username.
    #[serde(default)]
    pub username: Option<String>,

    /// Inline password.
    #[serde(default)]
    pub password: Option<String>,
}

fn not_blank(query: &str) -> Result<(), ValidationError> {
    if query.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Query is required".into());
        return Err(err);
    }
    Ok(())
}

/// Result of a SQL statement execution.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecutionResult {
    /// Always `success`; failures use the error envelope.
    pub status: ResponseStatus,

    /// Backend the statement ran against.
    pub db_type: DbType,

    /// Materialized rows (row-returning statements only).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub rows: Option<Vec<JsonRow>>,

    /// Number of rows in `rows`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,

    /// Completion message (effectful statements only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Wall time of open, execute and close in milliseconds.
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl ExecutionResult {
    /// Result of a row-returning statement.
    pub fn with_rows(db_type: DbType, rows: Vec<JsonRow>) -> Self {
        Self {
            status: ResponseStatus::Success,
            db_type,
            row_count: Some(rows.len()),
            rows: Some(rows),
            message: None,
            elapsed_ms: 0,
        }
    }

    /// Result of a statement that returns no rows.
    ///
    /// Affected-row counts are not reported uniformly by all three drivers,
    /// so none is given.
    pub fn executed(db_type: DbType) -> Self {
        Self {
            status: ResponseStatus::Success,
            db_type,
            rows: None,
            row_count: None,
            message: Some("Query executed successfully".to_string()),
            elapsed_ms: 0,
        }
    }
}
