//! Handler模块

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use common::errors::{AppError, AppResult};
use common::extract::ValidatedJson;
use common::middleware::Identity;
use common::models::{
    ConnectionItem, CreateConnectionRequest, ExecutionResult, QueryRequest, UpdateConnectionRequest,
};
use common::response::ErrorResponse;

use crate::service::ConnectionServiceTrait;
use crate::state::AppState;

/// 列出调用者保存的数据库连接
#[utoipa::path(
    get,
    path = "/db-connections",
    tag = "connections",
    responses(
        (status = 200, description = "连接列表", body = Vec<ConnectionItem>),
        (status = 401, description = "未认证", body = ErrorResponse)
    )
)]
pub async fn list_connections(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<ConnectionItem>>, AppError> {
    let data = state.connection_service().list(identity.as_str()).await?;
    Ok(Json(data))
}

/// 创建新的数据库连接
#[utoipa::path(
    post,
    path = "/db-connections",
    tag = "connections",
    request_body = CreateConnectionRequest,
    responses(
        (status = 201, description = "连接已创建", body = ConnectionItem),
        (status = 400, description = "请求参数无效", body = ErrorResponse),
        (status = 401, description = "未认证", body = ErrorResponse),
        (status = 409, description = "同名连接已存在", body = ErrorResponse)
    )
)]
pub async fn create_connection(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(req): ValidatedJson<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<ConnectionItem>), AppError> {
    let data = state.connection_service().create(req, identity.as_str()).await?;
    Ok((StatusCode::CREATED, Json(data)))
}

/// 根据 ID 获取连接
#[utoipa::path(
    get,
    path = "/db-connections/{id}",
    tag = "connections",
    params(
        ("id" = String, Path, description = "连接 ID")
    ),
    responses(
        (status = 200, description = "连接详情", body = ConnectionItem),
        (status = 401, description = "未认证", body = ErrorResponse),
        (status = 404, description = "连接未找到", body = ErrorResponse)
    )
)]
pub async fn get_connection(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<ConnectionItem>, AppError> {
    let data = state.connection_service().get(&id, identity.as_str()).await?;
    Ok(Json(data))
}

/// 部分更新连接
#[utoipa::path(
    put,
    path = "/db-connections/{id}",
    tag = "connections",
    params(
        ("id" = String, Path, description = "连接 ID")
    ),
    request_body = UpdateConnectionRequest,
    responses(
        (status = 200, description = "连接已更新", body = ConnectionItem),
        (status = 400, description = "请求参数无效", body = ErrorResponse),
        (status = 401, description = "未认证", body = ErrorResponse),
        (status = 404, description = "连接未找到", body = ErrorResponse),
        (status = 409, description = "同名连接已存在", body = ErrorResponse)
    )
)]
pub async fn update_connection(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ValidatedJson(patch): ValidatedJson<UpdateConnectionRequest>,
) -> Result<Json<ConnectionItem>, AppError> {
    let data = state
        .connection_service()
        .update(&id, identity.as_str(), patch)
        .await?;
    Ok(Json(data))
}

/// 根据 ID 删除数据库连接
#[utoipa::path(
    delete,
    path = "/db-connections/{id}",
    tag = "connections",
    params(
        ("id" = String, Path, description = "连接 ID")
    ),
    responses(
        (status = 204, description = "连接已删除"),
        (status = 401, description = "未认证", body = ErrorResponse),
        (status = 404, description = "连接未找到", body = ErrorResponse)
    )
)]
pub async fn delete_connection(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.connection_service().delete(&id, identity.as_str()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 测试数据库连接
#[utoipa::path(
    post,
    path = "/db-connections/{id}/test",
    tag = "connections",
    params(
        ("id" = String, Path, description = "连接 ID")
    ),
    responses(
        (status = 200, description = "连接测试结果", body = ConnectionTestResult),
        (status = 401, description = "未认证", body = ErrorResponse),
        (status = 404, description = "连接未找到", body = ErrorResponse),
        (status = 500, description = "内部错误", body = ErrorResponse)
    )
)]
pub async fn test_connection(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<ConnectionTestResult>, AppError> {
    let outcome = state.connection_service().test(&id, identity.as_str()).await;
    connection_test_result(id, outcome).map(Json)
}

/// 目标库不可达时写入结果体；注册表与内部错误照常返回 HTTP 错误
fn connection_test_result(
    id: String,
    outcome: AppResult<u64>,
) -> Result<ConnectionTestResult, AppError> {
    match outcome {
        Ok(latency_ms) => Ok(ConnectionTestResult {
            id,
            success: true,
            latency_ms: Some(latency_ms),
            error: None,
        }),
        Err(
            e @ (AppError::ConnectionNotFound(_)
            | AppError::DatabaseQuery(_)
            | AppError::Internal(_)
            | AppError::Unauthenticated(_)),
        ) => Err(e),
        Err(e) => {
            tracing::info!(id = %id, error = %e, "连接测试失败");
            Ok(ConnectionTestResult {
                id,
                success: false,
                latency_ms: None,
                error: Some(e.to_string()),
            })
        }
    }
}

/// 执行 SQL 查询
#[utoipa::path(
    post,
    path = "/db/query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "查询执行结果", body = ExecutionResult),
        (status = 400, description = "请求无效或 SQL 执行失败", body = ErrorResponse),
        (status = 401, description = "未认证", body = ErrorResponse),
        (status = 404, description = "连接未找到", body = ErrorResponse),
        (status = 503, description = "无法连接目标数据库", body = ErrorResponse),
        (status = 500, description = "内部错误", body = ErrorResponse)
    )
)]
pub async fn execute_query(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(req): ValidatedJson<QueryRequest>,
) -> Result<Json<ExecutionResult>, AppError> {
    let result = state.query_service().execute(&req, identity.as_str()).await?;
    Ok(Json(result))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// 连接测试结果
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionTestResult {
    /// 连接 ID
    pub id: String,
    /// 测试是否成功
    pub success: bool,
    /// 连接延迟（毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// 错误信息（如果测试失败）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 健康检查响应
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
}
