//! Status and liveness endpoints
//!
//! GET /        - service status and the bound compute device
//! GET /health  - liveness check (process is up)

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;

use crate::state::AppState;

/// Body of `GET /`
#[derive(Debug, Serialize)]
pub struct StatusDto {
    /// `"ready"` when a model is loaded, `"unavailable"` otherwise
    pub status: &'static str,
    /// Device the model is bound to (`cuda`, `rocm`, `vulkan`, `cpu`)
    pub device: String,
}

/// GET / - service status
///
/// Always 200; an unloaded model is reported in the body, not the status code.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let handle = state.handle();
    Json(StatusDto {
        status: if handle.is_ready() { "ready" } else { "unavailable" },
        device: handle.device().to_string(),
    })
}

/// GET /health - liveness check
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Build the status router sub-tree
pub fn health_router() -> axum::Router<AppState> {
    use axum::routing::get;
    axum::Router::new()
        .route("/", get(status))
        .route("/health", get(health))
}
