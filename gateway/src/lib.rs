//! 多数据库 SQL 查询网关
//!
//! 为已认证的调用者提供：
//! - 按身份隔离的连接配置管理（Oracle / PostgreSQL / MySQL）
//! - 基于已保存配置或内联参数的事务化 SQL 执行
//! - 统一的错误响应与 OpenAPI 文档

pub mod dispatcher;
pub mod executor;
pub mod handlers;
pub mod registry;
pub mod resolver;
pub mod routes;
pub mod service;
pub mod state;

use axum::{middleware, routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use common::middleware::request_id_middleware;
use common::models::{
    ConnectionItem, CreateConnectionRequest, DbType, ExecutionResult, QueryRequest,
    UpdateConnectionRequest,
};
use common::response::{ApiError, ErrorResponse, ResponseStatus};

pub use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SQL 查询网关 API",
        version = "0.1.0",
        description = "多数据库连接管理与 SQL 执行网关"
    ),
    paths(
        handlers::list_connections,
        handlers::create_connection,
        handlers::get_connection,
        handlers::update_connection,
        handlers::delete_connection,
        handlers::test_connection,
        handlers::execute_query,
        handlers::health_check,
    ),
    components(schemas(
        DbType,
        ConnectionItem,
        CreateConnectionRequest,
        UpdateConnectionRequest,
        QueryRequest,
        ExecutionResult,
        ResponseStatus,
        ErrorResponse,
        ApiError,
        handlers::ConnectionTestResult,
        handlers::HealthResponse,
    )),
    tags(
        (name = "connections", description = "连接配置管理"),
        (name = "query", description = "SQL 执行"),
        (name = "health", description = "健康检查端点")
    )
)]
pub struct ApiDoc;

/// Builds the full application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router(&state))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
