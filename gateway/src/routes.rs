//! 网关路由模块

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use common::middleware::auth_middleware;

use crate::handlers::{
    create_connection, delete_connection, execute_query, get_connection, health_check,
    list_connections, test_connection, update_connection,
};
use crate::state::AppState;

/// 创建网关路由
///
/// `/health` 无需认证，其余路由都经过 bearer 认证中间件。
pub fn router(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/db-connections", get(list_connections).post(create_connection))
        .route(
            "/db-connections/{id}",
            get(get_connection)
                .put(update_connection)
                .delete(delete_connection),
        )
        .route("/db-connections/{id}/test", post(test_connection))
        .route("/db/query", post(execute_query))
        .route_layer(middleware::from_fn_with_state(
            state.identity.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
}
