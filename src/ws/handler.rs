//! Axum WebSocket upgrade handler.
//!
//! Authentication happens before the upgrade: a request without a valid
//! access token never reaches the hub and leaves no state behind. `/ws`
//! joins the lobby; `/ws/rooms/{room}` joins an existing room.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::response::Response;
use serde::Deserialize;

use super::connection::Connection;
use crate::app_state::AppState;
use crate::domain::{ConnectionId, RoomId};
use crate::error::RelayError;

/// Name of the cookie set by the login endpoint.
pub const TOKEN_COOKIE: &str = "jwt";

/// Query parameters accepted on `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsAuthQuery {
    /// Access token, for clients that cannot set headers on upgrade.
    pub token: Option<String>,
}

/// `GET /ws`: Authenticate, then upgrade to a WebSocket and register the
/// connection with the hub in the lobby.
///
/// # Errors
///
/// Returns [`RelayError::Unauthorized`] when no valid token is presented and
/// [`RelayError::Protocol`] when the request is not a WebSocket upgrade.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, RelayError> {
    connect(state, RoomId::lobby(), query, headers, upgrade).await
}

/// `GET /ws/rooms/{room}`: Same as `/ws`, joining `room` instead of the
/// lobby.
///
/// # Errors
///
/// Returns [`RelayError::InvalidRequest`] for a malformed room id and
/// [`RelayError::RoomNotFound`] for a room that does not exist, besides the
/// errors of [`ws_handler`].
pub async fn ws_room_handler(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, RelayError> {
    let room: RoomId = room
        .parse()
        .map_err(|e| RelayError::InvalidRequest(format!("{e}")))?;
    connect(state, room, query, headers, upgrade).await
}

async fn connect(
    state: AppState,
    room: RoomId,
    query: WsAuthQuery,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, RelayError> {
    let token = request_token(query.token.as_deref(), &headers)
        .ok_or_else(|| RelayError::Unauthorized("missing access token".to_string()))?;
    let user = state.users.authenticate(token).await?;
    if !room.is_lobby() {
        // Refuse before upgrading; the hub checks again on register.
        state.hub.room(room.clone()).await?;
    }
    let upgrade = upgrade.map_err(|e| RelayError::Protocol(e.body_text()))?;

    let id = ConnectionId::new(user.id);
    let username = user.username;
    let hub = state.hub.clone();
    tracing::debug!(connection_id = %id, %room, "upgrading connection");

    Ok(upgrade
        .on_failed_upgrade(move |e| {
            tracing::warn!(connection_id = %id, error = %e, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            let connection = Connection::from_socket(id, username, socket).in_room(room);
            if let Err(e) = hub.register(connection).await {
                tracing::warn!(connection_id = %id, error = %e, "registration failed");
            }
        }))
}

/// Picks the access token from, in order: the `token` query parameter, an
/// `Authorization: Bearer` header, or the login cookie.
fn request_token<'a>(query: Option<&'a str>, headers: &'a HeaderMap) -> Option<&'a str> {
    if let Some(token) = query.filter(|t| !t.is_empty()) {
        return Some(token);
    }
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
    {
        return Some(token);
    }
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookies| cookie_value(cookies, TOKEN_COOKIE))
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn cookie_value<'a>(cookies: &'a str, name: &str) -> Option<&'a str> {
    cookies.split(';').map(str::trim).find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name && !value.trim().is_empty()).then(|| value.trim())
    })
}
