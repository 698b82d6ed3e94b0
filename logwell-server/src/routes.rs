use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, AppState};

/// Assemble the full API surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/logs", get(handlers::logs::list_logs))
        .route("/api/logs/tail", get(handlers::tail::tail_logs))
        .route("/api/logs/containers", get(handlers::logs::list_containers))
        .route("/api/logs/stats", get(handlers::logs::stats))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
