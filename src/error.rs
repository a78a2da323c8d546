//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type. Each variant maps to a numeric
//! error code and an HTTP status code, and renders as a structured JSON
//! error response when returned from a handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::ConnectionId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1101,
///     "message": "unauthorized: missing token",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category              | HTTP Status                    |
/// |-----------|-----------------------|--------------------------------|
/// | 1000–1099 | Validation / protocol | 400 Bad Request                |
/// | 1100–1199 | Authentication        | 401 Unauthorized               |
/// | 2000–2999 | State / Not Found     | 404 Not Found / 409 Conflict   |
/// | 3000–3999 | Server                | 500 / 503                      |
/// | 5000–5999 | Connection-local      | never reaches HTTP clients     |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Identity lookup failed during the WebSocket upgrade.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Email/password pair did not match a user.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The peer did not complete the WebSocket upgrade.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A user with this email already exists.
    #[error("user already exists: {0}")]
    UserExists(String),

    /// No user with this email.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// No room with this id.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// A room with this id already exists.
    #[error("room already exists: {0}")]
    RoomExists(String),

    /// Read or write failure on an established connection.
    #[error("transport error on {connection_id}: {message}")]
    Transport {
        /// Connection whose transport failed.
        connection_id: ConnectionId,
        /// Underlying failure.
        message: String,
    },

    /// The outbound buffer of a connection is full.
    #[error("slow consumer: {0}")]
    SlowConsumer(ConnectionId),

    /// Register was called with an id already in the registry.
    #[error("connection {0} is already registered")]
    RegistryConflict(ConnectionId),

    /// The hub task is no longer running.
    #[error("hub is not running")]
    HubUnavailable,

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Protocol(_) => 1002,
            Self::Unauthorized(_) => 1101,
            Self::InvalidCredentials => 1102,
            Self::UserNotFound(_) => 2001,
            Self::UserExists(_) => 2002,
            Self::RoomNotFound(_) => 2003,
            Self::RoomExists(_) => 2004,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::HubUnavailable => 3002,
            Self::Transport { .. } => 5001,
            Self::SlowConsumer(_) => 5002,
            Self::RegistryConflict(_) => 5003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::UserNotFound(_) | Self::RoomNotFound(_) => StatusCode::NOT_FOUND,
            Self::UserExists(_) | Self::RoomExists(_) => StatusCode::CONFLICT,
            Self::HubUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport { .. }
            | Self::SlowConsumer(_)
            | Self::RegistryConflict(_)
            | Self::Persistence(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_401() {
        assert_eq!(
            RelayError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            RelayError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn protocol_error_is_400() {
        let err = RelayError::Protocol("not a websocket".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), 1002);
    }

    #[test]
    fn connection_local_errors_have_their_own_range() {
        let id = ConnectionId::new(1);
        for err in [
            RelayError::SlowConsumer(id),
            RelayError::RegistryConflict(id),
            RelayError::Transport {
                connection_id: id,
                message: "reset".into(),
            },
        ] {
            assert!((5000..6000).contains(&err.error_code()));
        }
    }

    #[test]
    fn room_errors_map_to_404_and_409() {
        let missing = RelayError::RoomNotFound("games".into());
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.error_code(), 2003);
        let taken = RelayError::RoomExists("games".into());
        assert_eq!(taken.status_code(), StatusCode::CONFLICT);
        assert_eq!(taken.error_code(), 2004);
    }

    #[test]
    fn response_carries_status() {
        let response = RelayError::UserExists("a@b.c".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
