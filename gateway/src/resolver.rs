//! Connection resolver.
//!
//! Turns a query request into a concrete connection target, either from a
//! stored profile (owner-scoped) or from inline parameters.

use common::config::DefaultTargets;
use common::errors::{AppError, AppResult};
use common::models::{DbType, QueryRequest};

use crate::dispatcher::build_connection_string;
use crate::registry::ProfileStore;

/// Concrete, executable connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Backend type.
    pub db_type: DbType,
    /// Driver connection string (contains credentials, never log it raw).
    pub connection_string: String,
    /// Stored profile the target came from, if any.
    pub profile_id: Option<String>,
}

/// Resolves `req` for `owner`.
///
/// `connection_id` wins over inline fields, and a profile the caller does
/// not own is `ConnectionNotFound` even when the inline fields would have
/// worked. Without `connection_id`, `db_type` is mandatory; a complete set
/// of inline parameters builds a custom string, anything less falls back to
/// the static default for that type. No backend I/O happens here.
pub async fn resolve(
    req: &QueryRequest,
    owner: &str,
    store: &dyn ProfileStore,
    defaults: &DefaultTargets,
) -> AppResult<ResolvedTarget> {
    if let Some(id) = req.connection_id.as_deref() {
        let profile = store.get(id, owner).await?;
        return Ok(ResolvedTarget {
            db_type: profile.db_type,
            connection_string: build_connection_string(
                profile.db_type,
                &profile.host,
                profile.port,
                &profile.database,
                &profile.username,
                &profile.password,
            )?,
            profile_id: Some(profile.id),
        });
    }

    let db_type = req.db_type.ok_or(AppError::MissingTarget)?;

    let connection_string = match (
        req.host.as_deref(),
        req.port,
        req.database.as_deref(),
        req.username.as_deref(),
        req.password.as_deref(),
    ) {
        (Some(host), Some(port), Some(database), Some(username), Some(password)) => {
            build_connection_string(db_type, host, port, database, username, password)?
        }
        _ => {
            tracing::debug!(db_type = %db_type, "内联参数不完整，使用默认连接串");
            defaults.for_type(db_type).to_string()
        }
    };

    Ok(ResolvedTarget {
        db_type,
        connection_string,
        profile_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{memory_store, request};

    fn inline(db_type: DbType) -> QueryRequest {
        QueryRequest {
            query: "select 1".into(),
            db_type: Some(db_type),
            host: Some("inline-host".into()),
            port: Some(5432),
            database: Some("d".into()),
            username: Some("u".into()),
            password: Some("p".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stored_profile() {
        let store = memory_store().await;
        let profile = store.create(request("X"), "alice").await.unwrap();
        let req = QueryRequest {
            query: "select 1".into(),
            connection_id: Some(profile.id.clone()),
            ..Default::default()
        };

        let target = resolve(&req, "alice", &store, &DefaultTargets::default()).await.unwrap();
        assert_eq!(target.db_type, DbType::Postgres);
        assert_eq!(target.connection_string, "postgres://u:p@h:5432/d");
        assert_eq!(target.profile_id, Some(profile.id));
    }

    #[tokio::test]
    async fn test_connection_id_takes_precedence() {
        let store = memory_store().await;
        let profile = store.create(request("X"), "alice").await.unwrap();
        let req = QueryRequest {
            connection_id: Some(profile.id),
            ..inline(DbType::MySQL)
        };

        let target = resolve(&req, "alice", &store, &DefaultTargets::default()).await.unwrap();
        assert_eq!(target.db_type, DbType::Postgres);
        assert!(!target.connection_string.contains("inline-host"));
    }

    #[tokio::test]
    async fn test_foreign_connection_id_never_falls_back() {
        let store = memory_store().await;
        let profile = store.create(request("X"), "alice").await.unwrap();
        let req = QueryRequest {
            connection_id: Some(profile.id),
            ..inline(DbType::Postgres)
        };

        let err = resolve(&req, "bob", &store, &DefaultTargets::default()).await.unwrap_err();
        assert!(matches!(err, AppError::ConnectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_target() {
        let store = memory_store().await;
        let req = QueryRequest {
            query: "select 1".into(),
            host: Some("h".into()),
            ..Default::default()
        };
        let err = resolve(&req, "alice", &store, &DefaultTargets::default()).await.unwrap_err();
        assert!(matches!(err, AppError::MissingTarget));
    }

    #[tokio::test]
    async fn test_complete_inline_parameters() {
        let store = memory_store().await;
        let target = resolve(&inline(DbType::Postgres), "alice", &store, &DefaultTargets::default())
            .await
            .unwrap();
        assert_eq!(target.connection_string, "postgres://u:p@inline-host:5432/d");
        assert_eq!(target.profile_id, None);
    }

    #[tokio::test]
    async fn test_inline_ipv6_host() {
        let store = memory_store().await;
        let req = QueryRequest {
            host: Some("::1".into()),
            ..inline(DbType::Postgres)
        };
        let target = resolve(&req, "alice", &store, &DefaultTargets::default()).await.unwrap();
        assert_eq!(target.connection_string, "postgres://u:p@[::1]:5432/d");

        let req = QueryRequest {
            host: Some("db/evil".into()),
            ..inline(DbType::Postgres)
        };
        let err = resolve(&req, "alice", &store, &DefaultTargets::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_partial_inline_uses_default() {
        let store = memory_store().await;
        let defaults = DefaultTargets {
            mysql: "mysql://default:pw@default-host:3306/app".into(),
            ..DefaultTargets::default()
        };
        let req = QueryRequest {
            password: None,
            ..inline(DbType::MySQL)
        };

        let target = resolve(&req, "alice", &store, &defaults).await.unwrap();
        assert_eq!(target.connection_string, "mysql://default:pw@default-host:3306/app");
    }
}
