//! 业务服务模块
//!
//! `ConnectionService` 管理连接配置，`QueryService` 负责
//! 解析 → 打开 → 执行 → 关闭 的完整查询流程。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use common::config::DefaultTargets;
use common::errors::AppResult;
use common::models::{
    ConnectionItem, CreateConnectionRequest, ExecutionResult, QueryRequest, UpdateConnectionRequest,
};

use crate::dispatcher::{build_connection_string, Dispatcher};
use crate::executor;
use crate::registry::ProfileStore;
use crate::resolver::{resolve, ResolvedTarget};

/// 连接服务 Trait
#[async_trait]
pub trait ConnectionServiceTrait: Send + Sync {
    /// 列出调用者的连接
    async fn list(&self, owner: &str) -> AppResult<Vec<ConnectionItem>>;

    /// 创建新连接
    async fn create(&self, req: CreateConnectionRequest, owner: &str) -> AppResult<ConnectionItem>;

    /// 根据 ID 获取连接
    async fn get(&self, id: &str, owner: &str) -> AppResult<ConnectionItem>;

    /// 部分更新连接
    async fn update(
        &self,
        id: &str,
        owner: &str,
        patch: UpdateConnectionRequest,
    ) -> AppResult<ConnectionItem>;

    /// 根据 ID 删除连接
    async fn delete(&self, id: &str, owner: &str) -> AppResult<()>;

    /// 测试连接，返回建立连接耗时（毫秒）
    async fn test(&self, id: &str, owner: &str) -> AppResult<u64>;
}

/// 数据库连接配置管理服务
pub struct ConnectionService {
    store: Arc<dyn ProfileStore>,
    dispatcher: Dispatcher,
}

impl ConnectionService {
    /// 创建新的连接服务实例
    pub fn new(store: Arc<dyn ProfileStore>, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }
}

#[async_trait]
impl ConnectionServiceTrait for ConnectionService {
    async fn list(&self, owner: &str) -> AppResult<Vec<ConnectionItem>> {
        Ok(self
            .store
            .list(owner)
            .await?
            .into_iter()
            .map(ConnectionItem::from)
            .collect())
    }

    async fn create(&self, req: CreateConnectionRequest, owner: &str) -> AppResult<ConnectionItem> {
        self.store.create(req, owner).await.map(ConnectionItem::from)
    }

    async fn get(&self, id: &str, owner: &str) -> AppResult<ConnectionItem> {
        self.store.get(id, owner).await.map(ConnectionItem::from)
    }

    async fn update(
        &self,
        id: &str,
        owner: &str,
        patch: UpdateConnectionRequest,
    ) -> AppResult<ConnectionItem> {
        self.store.update(id, owner, patch).await.map(ConnectionItem::from)
    }

    async fn delete(&self, id: &str, owner: &str) -> AppResult<()> {
        self.store.delete(id, owner).await
    }

    async fn test(&self, id: &str, owner: &str) -> AppResult<u64> {
        let profile = self.store.get(id, owner).await?;
        let target = ResolvedTarget {
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
        };

        let started = Instant::now();
        let mut live = self.dispatcher.open(&target).await?;
        let latency = started.elapsed();
        live.close().await;

        tracing::info!(id = %id, latency_ms = latency.as_millis() as u64, "连接测试成功");
        Ok(latency.as_millis() as u64)
    }
}

/// SQL 查询执行服务
pub struct QueryService {
    store: Arc<dyn ProfileStore>,
    dispatcher: Dispatcher,
    defaults: DefaultTargets,
}

impl QueryService {
    /// 创建新的查询服务实例
    pub fn new(store: Arc<dyn ProfileStore>, dispatcher: Dispatcher, defaults: DefaultTargets) -> Self {
        Self {
            store,
            dispatcher,
            defaults,
        }
    }

    /// 执行 SQL 查询
    ///
    /// Resolution failures happen before any backend I/O. Once a connection
    /// is open it is closed exactly once, whatever the executor returns.
    pub async fn execute(&self, req: &QueryRequest, owner: &str) -> AppResult<ExecutionResult> {
        let started = Instant::now();

        let target = resolve(req, owner, self.store.as_ref(), &self.defaults).await?;
        let mut live = self.dispatcher.open(&target).await?;

        let outcome = executor::execute(&mut live, &req.query).await;
        live.close().await;

        let mut result = outcome?;
        result.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            db_type = %result.db_type,
            profile_id = target.profile_id.as_deref().unwrap_or("-"),
            row_count = result.row_count.unwrap_or(0),
            elapsed_ms = result.elapsed_ms,
            "查询执行完成"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use common::errors::AppError;
    use common::models::DbType;

    use crate::registry::tests::{memory_store, request};

    async fn refused_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_missing_target_does_no_io() {
        let store: Arc<dyn ProfileStore> = Arc::new(memory_store().await);
        // Any open attempt would fail with a timeout or connection error instead.
        let service = QueryService::new(store, Dispatcher::new(Duration::from_millis(1)), DefaultTargets::default());
        let req = QueryRequest {
            query: "select 1".into(),
            ..Default::default()
        };
        assert!(matches!(
            service.execute(&req, "alice").await,
            Err(AppError::MissingTarget)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_connection_failed() {
        let store: Arc<dyn ProfileStore> = Arc::new(memory_store().await);
        let service = QueryService::new(store, Dispatcher::new(Duration::from_secs(5)), DefaultTargets::default());
        let req = QueryRequest {
            query: "select 1".into(),
            db_type: Some(DbType::Postgres),
            host: Some("127.0.0.1".into()),
            port: Some(refused_port().await),
            database: Some("d".into()),
            username: Some("u".into()),
            password: Some("p".into()),
            ..Default::default()
        };
        assert!(matches!(
            service.execute(&req, "alice").await,
            Err(AppError::DatabaseConnection(_))
        ));
    }

    #[tokio::test]
    async fn test_checking_foreign_profile_is_not_found() {
        let store = Arc::new(memory_store().await);
        let profile = store.create(request("X"), "alice").await.unwrap();
        let service = ConnectionService::new(store, Dispatcher::new(Duration::from_secs(1)));

        assert!(matches!(
            service.test(&profile.id, "bob").await,
            Err(AppError::ConnectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_checking_unreachable_profile_fails() {
        let store = Arc::new(memory_store().await);
        let mut req = request("X");
        req.host = "127.0.0.1".into();
        req.port = refused_port().await;
        let profile = store.create(req, "alice").await.unwrap();
        let service = ConnectionService::new(store, Dispatcher::new(Duration::from_secs(5)));

        assert!(matches!(
            service.test(&profile.id, "alice").await,
            Err(AppError::DatabaseConnection(_))
        ));
    }

    #[tokio::test]
    async fn test_items_omit_password() {
        let store = Arc::new(memory_store().await);
        let service = ConnectionService::new(store, Dispatcher::new(Duration::from_secs(1)));
        let item = service.create(request("X"), "alice").await.unwrap();

        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["created_by"], "alice");
        assert_eq!(service.list("alice").await.unwrap(), vec![item]);
    }
}
