//! Liveness endpoints.

use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};

pub fn router() -> Router {
    Router::new()
        .route("/", get(status))
        .route("/health", get(status))
        .route("/version", get(version))
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "guildscribe",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "guildscribe"
    }))
}
