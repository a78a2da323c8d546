//! Room management and per-room client listing.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::CreateRoomRequest;
use crate::app_state::AppState;
use crate::domain::{Room, RoomId};
use crate::error::{ErrorResponse, RelayError};
use crate::hub::{ClientInfo, RoomInfo};

fn parse_room(raw: &str) -> Result<RoomId, RelayError> {
    raw.parse()
        .map_err(|e| RelayError::InvalidRequest(format!("{e}")))
}

/// `POST /ws/rooms`: Create a room clients can join at `/ws/rooms/{id}`.
///
/// # Errors
///
/// Returns [`RelayError::InvalidRequest`] for a malformed id and
/// [`RelayError::RoomExists`] if the id is taken.
#[utoipa::path(
    post,
    path = "/api/v1/ws/rooms",
    tag = "Hub",
    summary = "Create a room",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = RoomInfo),
        (status = 400, description = "Invalid room id", body = ErrorResponse),
        (status = 409, description = "Room already exists", body = ErrorResponse),
        (status = 503, description = "Hub not running", body = ErrorResponse),
    )
)]
pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let id = parse_room(&req.id)?;
    let name = req
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| id.to_string());
    let room = state.hub.create_room(Room::new(id, name)).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// `GET /ws/rooms`: List rooms with their current client counts.
///
/// # Errors
///
/// Returns [`RelayError::HubUnavailable`] if the hub has stopped.
#[utoipa::path(
    get,
    path = "/api/v1/ws/rooms",
    tag = "Hub",
    summary = "List rooms",
    responses(
        (status = 200, description = "Rooms, oldest first", body = Vec<RoomInfo>),
        (status = 503, description = "Hub not running", body = ErrorResponse),
    )
)]
pub async fn list_rooms(State(state): State<AppState>) -> Result<impl IntoResponse, RelayError> {
    Ok(Json(state.hub.rooms().await?))
}

/// `GET /ws/clients/{room}`: List the connections in one room.
///
/// # Errors
///
/// Returns [`RelayError::RoomNotFound`] for an unknown room.
#[utoipa::path(
    get,
    path = "/api/v1/ws/clients/{room}",
    tag = "Hub",
    summary = "List clients in a room",
    params(("room" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Connected clients in the room", body = Vec<ClientInfo>),
        (status = 400, description = "Invalid room id", body = ErrorResponse),
        (status = 404, description = "Room not found", body = ErrorResponse),
        (status = 503, description = "Hub not running", body = ErrorResponse),
    )
)]
pub async fn list_room_clients(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let room = parse_room(&room)?;
    Ok(Json(state.hub.room_clients(room).await?))
}

/// Room routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws/rooms", get(list_rooms).post(create_room))
        .route("/ws/clients/{room}", get(list_room_clients))
}
