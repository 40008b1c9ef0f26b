//! HTTP routes.

use axum::{routing::get, Json, Router};
use std::sync::Arc;

use crate::api::ConnectionManager;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<ConnectionManager>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/status", get(status))
}

async fn health() -> &'static str {
    "OK"
}

async fn status(
    axum::extract::State(connections): axum::extract::State<Arc<ConnectionManager>>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "active_connections": connections.active_count(),
    }))
}
