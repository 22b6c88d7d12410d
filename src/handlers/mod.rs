use axum::Json;
use serde_json::{json, Value};

pub mod metadata;
pub mod resource;

/// GET /health - liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
