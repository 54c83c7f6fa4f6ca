//! Root and health endpoints.

use axum::Json;
use serde_json::{json, Value};

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "scholarsift paper search API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
