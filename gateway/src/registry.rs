//! Connection registry.
//!
//! Persists connection profiles keyed by owner identity. Every operation is
//! owner-scoped: a profile that belongs to someone else is reported exactly
//! like a missing one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use common::errors::{AppError, AppResult};
use common::models::connection::{
    ConnectionProfile, CreateConnectionRequest, UpdateConnectionRequest,
};
use common::utils::IdGenerator;

/// Owner-scoped profile storage.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Stores a new profile. Fails with `DuplicateName` if the owner already uses the name.
    async fn create(&self, req: CreateConnectionRequest, owner: &str) -> AppResult<ConnectionProfile>;

    /// Lists the owner's profiles.
    async fn list(&self, owner: &str) -> AppResult<Vec<ConnectionProfile>>;

    /// Fetches one of the owner's profiles.
    async fn get(&self, id: &str, owner: &str) -> AppResult<ConnectionProfile>;

    /// Applies the present fields of `patch` to one of the owner's profiles.
    async fn update(
        &self,
        id: &str,
        owner: &str,
        patch: UpdateConnectionRequest,
    ) -> AppResult<ConnectionProfile>;

    /// Deletes one of the owner's profiles.
    async fn delete(&self, id: &str, owner: &str) -> AppResult<()>;
}

/// Row from the `connection_profiles` table.
#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: String,
    name: String,
    db_type: String,
    host: String,
    port: i64,
    database_name: String,
    username: String,
    password: String,
    owner: String,
    created_at: DateTime<Utc>,
}

impl ProfileRow {
    fn into_profile(self) -> AppResult<ConnectionProfile> {
        let port = u16::try_from(self.port)
            .map_err(|_| AppError::DatabaseQuery(format!("stored port out of range: {}", self.port)))?;
        Ok(ConnectionProfile {
            id: self.id,
            name: self.name,
            db_type: self
                .db_type
                .parse()
                .map_err(|_| AppError::DatabaseQuery(format!("stored db_type invalid: {}", self.db_type)))?,
            host: self.host,
            port,
            database: self.database_name,
            username: self.username,
            password: self.password,
            owner: self.owner,
            created_at: self.created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, name, db_type, host, port, database_name, username, password, owner, created_at FROM connection_profiles";

/// SQLite-backed profile store.
#[derive(Clone)]
pub struct SqliteProfileStore {
    pool: SqlitePool,
}

impl SqliteProfileStore {
    /// Wraps `pool` and makes sure the schema exists.
    pub async fn new(pool: SqlitePool) -> AppResult<Self> {
        let store = Self { pool };
        store.ensure_table().await?;
        Ok(store)
    }

    /// Creates the profile table if it does not exist.
    async fn ensure_table(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS connection_profiles (
                id            TEXT    NOT NULL PRIMARY KEY,
                name          TEXT    NOT NULL,
                db_type       TEXT    NOT NULL CHECK (db_type IN ('oracle', 'postgres', 'mysql')),
                host          TEXT    NOT NULL,
                port          INTEGER NOT NULL CHECK (port BETWEEN 1 AND 65535),
                database_name TEXT    NOT NULL,
                username      TEXT    NOT NULL,
                password      TEXT    NOT NULL,
                owner         TEXT    NOT NULL,
                created_at    TEXT    NOT NULL,
                UNIQUE (name, owner)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseQuery(format!("Failed to create connection_profiles table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_profiles_owner ON connection_profiles (owner)")
            .execute(&self.pool)
            .await?;

        tracing::info!("Metadata table `connection_profiles` ensured");
        Ok(())
    }

    /// Number of stored profiles across all owners.
    pub async fn count(&self) -> AppResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM connection_profiles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

/// Maps a unique-constraint violation onto `DuplicateName`.
fn map_write_error(err: sqlx::Error, name: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::DuplicateName(name.to_string())
        }
        _ => AppError::DatabaseQuery(format!("Failed to save connection: {}", err)),
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn create(&self, req: CreateConnectionRequest, owner: &str) -> AppResult<ConnectionProfile> {
        let profile = req.into_profile(IdGenerator::profile_id(), owner, Utc::now());

        sqlx::query(
            "INSERT INTO connection_profiles
                (id, name, db_type, host, port, database_name, username, password, owner, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(profile.db_type.as_str())
        .bind(&profile.host)
        .bind(i64::from(profile.port))
        .bind(&profile.database)
        .bind(&profile.username)
        .bind(&profile.password)
        .bind(&profile.owner)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &profile.name))?;

        tracing::info!(id = %profile.id, name = %profile.name, owner = %owner, "连接配置已创建");
        Ok(profile)
    }

    async fn list(&self, owner: &str) -> AppResult<Vec<ConnectionProfile>> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "{} WHERE owner = ? ORDER BY created_at, name",
            SELECT_COLUMNS
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProfileRow::into_profile).collect()
    }

    async fn get(&self, id: &str, owner: &str) -> AppResult<ConnectionProfile> {
        sqlx::query_as::<_, ProfileRow>(&format!("{} WHERE id = ? AND owner = ?", SELECT_COLUMNS))
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::ConnectionNotFound(id.to_string()))?
            .into_profile()
    }

    async fn update(
        &self,
        id: &str,
        owner: &str,
        patch: UpdateConnectionRequest,
    ) -> AppResult<ConnectionProfile> {
        let name = patch.name.clone().unwrap_or_default();

        // One statement: absent fields keep whatever is stored at write time.
        let row = sqlx::query_as::<_, ProfileRow>(
            "UPDATE connection_profiles
                SET name          = COALESCE(?, name),
                    host          = COALESCE(?, host),
                    port          = COALESCE(?, port),
                    database_name = COALESCE(?, database_name),
                    username      = COALESCE(?, username),
                    password      = COALESCE(?, password)
              WHERE id = ? AND owner = ?
          RETURNING id, name, db_type, host, port, database_name, username, password, owner, created_at",
        )
        .bind(patch.name)
        .bind(patch.host)
        .bind(patch.port.map(i64::from))
        .bind(patch.database)
        .bind(patch.username)
        .bind(patch.password)
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &name))?
        .ok_or_else(|| AppError::ConnectionNotFound(id.to_string()))?;

        tracing::info!(id = %id, owner = %owner, "连接配置已更新");
        row.into_profile()
    }

    async fn delete(&self, id: &str, owner: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM connection_profiles WHERE id = ? AND owner = ?")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseQuery(format!("Failed to delete connection: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::ConnectionNotFound(id.to_string()));
        }
        tracing::info!(id = %id, owner = %owner, "连接配置已删除");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use common::models::DbType;
    use sqlx::sqlite::SqlitePoolOptions;

    pub(crate) async fn memory_store() -> SqliteProfileStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteProfileStore::new(pool).await.unwrap()
    }

    pub(crate) fn request(name: &str) -> CreateConnectionRequest {
        CreateConnectionRequest {
            name: name.into(),
            db_type: DbType::Postgres,
            host: "h".into(),
            port: 5432,
            database: "d".into(),
            username: "u".into(),
            password: "p".into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = memory_store().await;
        let created = store.create(request("X"), "alice").await.unwrap();
        let fetched = store.get(&created.id, "alice").await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.owner, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_name_same_owner() {
        let store = memory_store().await;
        store.create(request("X"), "alice").await.unwrap();
        let err = store.create(request("X"), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn test_same_name_different_owner() {
        let store = memory_store().await;
        store.create(request("X"), "alice").await.unwrap();
        assert!(store.create(request("X"), "bob").await.is_ok());
    }

    #[tokio::test]
    async fn test_foreign_profile_is_not_found() {
        let store = memory_store().await;
        let alice = store.create(request("X"), "alice").await.unwrap();
        let bob = store.create(request("X"), "bob").await.unwrap();

        assert!(matches!(
            store.get(&alice.id, "bob").await,
            Err(AppError::ConnectionNotFound(_))
        ));
        assert!(matches!(
            store.update(&alice.id, "bob", UpdateConnectionRequest::default()).await,
            Err(AppError::ConnectionNotFound(_))
        ));
        assert!(matches!(
            store.delete(&alice.id, "bob").await,
            Err(AppError::ConnectionNotFound(_))
        ));

        store.delete(&bob.id, "bob").await.unwrap();
        assert!(store.get(&alice.id, "alice").await.is_ok());
        assert_eq!(store.list("bob").await.unwrap().len(), 0);
        assert_eq!(store.list("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_update() {
        let store = memory_store().await;
        let created = store.create(request("X"), "alice").await.unwrap();
        let updated = store
            .update(
                &created.id,
                "alice",
                UpdateConnectionRequest {
                    host: Some("h2".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.host, "h2");
        let stored = store.get(&created.id, "alice").await.unwrap();
        assert_eq!(stored.host, "h2");
        assert_eq!(stored.name, created.name);
        assert_eq!(stored.port, created.port);
        assert_eq!(stored.database, created.database);
        assert_eq!(stored.username, created.username);
        assert_eq!(stored.password, created.password);
        assert_eq!(stored.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_concurrent_disjoint_updates_both_apply() {
        let store = memory_store().await;
        let created = store.create(request("X"), "alice").await.unwrap();
        let (a, b) = tokio::join!(
            store.update(
                &created.id,
                "alice",
                UpdateConnectionRequest {
                    host: Some("h2".into()),
                    ..Default::default()
                },
            ),
            store.update(
                &created.id,
                "alice",
                UpdateConnectionRequest {
                    port: Some(6000),
                    ..Default::default()
                },
            ),
        );
        a.unwrap();
        b.unwrap();

        let stored = store.get(&created.id, "alice").await.unwrap();
        assert_eq!((stored.host.as_str(), stored.port), ("h2", 6000));
        assert_eq!(stored.name, "X");
    }

    #[tokio::test]
    async fn test_empty_update_keeps_profile() {
        let store = memory_store().await;
        let created = store.create(request("X"), "alice").await.unwrap();
        let updated = store
            .update(&created.id, "alice", UpdateConnectionRequest::default())
            .await
            .unwrap();
        assert_eq!(updated, created);
    }

    #[tokio::test]
    async fn test_rename_onto_existing_name() {
        let store = memory_store().await;
        store.create(request("X"), "alice").await.unwrap();
        let y = store.create(request("Y"), "alice").await.unwrap();
        let err = store
            .update(
                &y.id,
                "alice",
                UpdateConnectionRequest {
                    name: Some("X".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let store = memory_store().await;
        let created = store.create(request("X"), "alice").await.unwrap();
        store.delete(&created.id, "alice").await.unwrap();
        assert!(matches!(
            store.delete(&created.id, "alice").await,
            Err(AppError::ConnectionNotFound(_))
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_create_same_name() {
        let store = memory_store().await;
        let (a, b) = tokio::join!(
            store.create(request("X"), "alice"),
            store.create(request("X"), "alice"),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(store.list("alice").await.unwrap().len(), 1);
    }
}
