//! Connection profile models.
//!
//! Contains models for stored database connection profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::AppError;

/// Database type enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// Oracle database.
    Oracle,
    /// PostgreSQL database.
    Postgres,
    /// MySQL database.
    MySQL,
}

impl DbType {
    /// Returns the default port for this database type.
    pub fn default_port(&self) -> u16 {
        match self {
            DbType::Oracle => 1521,
            DbType::Postgres => 5432,
            DbType::MySQL => 3306,
        }
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Oracle => "oracle",
            DbType::Postgres => "postgres",
            DbType::MySQL => "mysql",
        }
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DbType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oracle" => Ok(DbType::Oracle),
            "postgres" => Ok(DbType::Postgres),
            "mysql" => Ok(DbType::MySQL),
            other => Err(AppError::Validation(format!(
                "unsupported db_type '{}': choose oracle, postgres or mysql",
                other
            ))),
        }
    }
}

/// Full connection profile (stored internally).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    /// Unique profile identifier.
    pub id: String,
    /// Display name, unique per owner.
    pub name: String,
    /// Database type.
    pub db_type: DbType,
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database (or Oracle service) name.
    pub database: String,
    /// Database username.
    pub username: String,
    /// Database password. Never leaves the gateway.
    pub password: String,
    /// Identity that created the profile.
    pub owner: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Request body for creating a new connection profile.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateConnectionRequest {
    /// Connection display name.
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    /// Database type.
    pub db_type: DbType,
    /// Database host.
    #[validate(length(min = 1, message = "Host is required"))]
    pub host: String,
    /// Database port.
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,
    /// Database name.
    #[validate(length(min = 1, message = "Database is required"))]
    pub database: String,
    /// Database username.
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    /// Database password.
    pub password: String,
}

impl CreateConnectionRequest {
    /// Converts the request into a profile owned by `owner`.
    pub fn into_profile(self, id: String, owner: &str, created_at: DateTime<Utc>) -> ConnectionProfile {
        ConnectionProfile {
            id,
            name: self.name,
            db_type: self.db_type,
            host: self.host,
            port: self.port,
            database: self.database,
            username: self.username,
            password: self.password,
            owner: owner.to_string(),
            created_at,
        }
    }
}

/// Partial update payload. Absent fields keep their stored value.
///
/// Keys that are not listed here (`db_type`, or `id`, `created_by` and `created_at`
/// echoed back from a read) are ignored.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateConnectionRequest {
    /// New display name.
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    /// New host.
    #[validate(length(min = 1, message = "Host must not be empty"))]
    pub host: Option<String>,
    /// New port.
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: Option<u16>,
    /// New database name.
    #[validate(length(min = 1, message = "Database must not be empty"))]
    pub database: Option<String>,
    /// New username.
    #[validate(length(min = 1, message = "Username must not be empty"))]
    pub username: Option<String>,
    /// New password.
    pub password: Option<String>,
}

/// Connection item for API responses (excludes the password).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ConnectionItem {
    /// Unique connection identifier.
    pub id: String,
    /// Connection display name.
    pub name: String,
    /// Database type.
    pub db_type: DbType,
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Database username.
    pub username: String,
    /// Owner identity.
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<ConnectionProfile> for ConnectionItem {
    fn from(profile: ConnectionProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            db_type: profile.db_type,
            host: profile.host,
            port: profile.port,
            database: profile.database,
            username: profile.username,
            created_by: profile.owner,
            created_at: profile.created_at,
        }
    }
}
