//! System endpoints: health check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    hub_running: bool,
}

/// `GET /health`: Service health status.
///
/// Reports `503` once the hub has stopped.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, current timestamp, and whether the connection hub is running.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Hub stopped", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let hub_running = state.hub.is_running();
    let (status, label) = if hub_running {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hub_running,
        }),
    )
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
