//! Sign-up and login DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::User;

/// Request body for `POST /api/v1/signup`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    /// Display name.
    pub username: String,
    /// Login email; must be unique.
    pub email: String,
    /// Plain-text password; stored hashed.
    pub password: String,
}

/// Public view of a user.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    /// User id.
    pub id: i64,
    /// Display name.
    pub username: String,
    /// Login email.
    pub email: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

/// Request body for `POST /api/v1/login`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Login email.
    pub email: String,
    /// Plain-text password.
    pub password: String,
}

/// Response body for `POST /api/v1/login`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Bearer token to present on `/ws`.
    pub access_token: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
    /// User id.
    pub id: String,
    /// Display name.
    pub username: String,
}

/// Response body for `GET /api/v1/logout`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    /// Human-readable confirmation.
    pub message: String,
}
