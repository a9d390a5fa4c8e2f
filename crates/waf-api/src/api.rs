use crate::{handlers, state::AppState};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use waf_middleware::session_middleware;

/// 创建 API 路由
pub fn create_router(state: AppState) -> Router {
    let rules = Router::new()
        .route(
            "/waf/rules/:domain",
            get(handlers::list_rules)
                .post(handlers::create_rule)
                .patch(handlers::reorder_rules),
        )
        .route("/waf/rules/:domain/test", post(handlers::test_rule))
        .route(
            "/waf/rules/:domain/:id",
            get(handlers::get_rule)
                .patch(handlers::update_rule)
                .delete(handlers::delete_rule),
        )
        .route(
            "/waf/domains/:domain",
            get(handlers::get_domain).patch(handlers::set_domain),
        )
        .route("/waf/faults/:domain", get(handlers::list_faults))
        .route_layer(from_fn_with_state(
            state.verifier.clone(),
            session_middleware,
        ));

    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        .merge(rules)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
