//! Hub introspection: connected clients.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::error::{ErrorResponse, RelayError};
use crate::hub::ClientInfo;

/// `GET /ws/clients`: List every connection currently registered.
///
/// # Errors
///
/// Returns [`RelayError::HubUnavailable`] if the hub has stopped.
#[utoipa::path(
    get,
    path = "/api/v1/ws/clients",
    tag = "Hub",
    summary = "List connected clients",
    description = "Returns one entry per live connection, oldest first. A user with several open connections appears several times.",
    responses(
        (status = 200, description = "Connected clients", body = Vec<ClientInfo>),
        (status = 503, description = "Hub not running", body = ErrorResponse),
    )
)]
pub async fn list_clients(State(state): State<AppState>) -> Result<impl IntoResponse, RelayError> {
    let clients = state.hub.clients().await?;
    Ok(Json(clients))
}

/// Hub routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws/clients", get(list_clients))
}
