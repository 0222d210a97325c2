//! SQL 查询网关服务
//!
//! 作为所有客户端请求的入口点，提供以下功能：
//! - 身份认证（HS256 bearer token）
//! - 连接配置的增删改查与连通性测试
//! - 针对 Oracle / PostgreSQL / MySQL 的事务化查询执行
//! - 请求/响应日志记录

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use common::config::{load_dotenv, AppConfig, LogFormat};
use sql_gateway::registry::SqliteProfileStore;
use sql_gateway::{create_router, AppState};

const SERVICE_NAME: &str = "sql-gateway";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME).context("配置加载失败")?;

    // 初始化日志追踪
    init_tracing(config.log_format);

    // 连接配置存储
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .context("DATABASE_URL 无效")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("无法打开连接配置存储")?;
    let store = SqliteProfileStore::new(pool).await?;
    info!(profiles = store.count().await?, "连接配置存储已就绪");

    // 创建应用状态与路由
    let state = AppState::new(config.clone(), Arc::new(store));
    let app = create_router(state);

    // 启动服务
    let addr = config.bind_addr();
    info!(
        service = SERVICE_NAME,
        address = %addr,
        connect_timeout_secs = config.connect_timeout_secs,
        "启动 SQL 网关"
    );

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务运行失败")?;

    info!("服务已停止");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    info!("收到退出信号，开始优雅关闭");
}
