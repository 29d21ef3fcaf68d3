use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::{health, online_users, prometheus_metrics, publish_event, stats};

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Operations
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Projects
        .route(
            "/api/v1/projects/{project_id}/presence",
            get(online_users),
        )
        .route(
            "/api/v1/projects/{project_id}/events",
            post(publish_event).route_layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}
