//! Room DTOs.

use serde::Deserialize;
use utoipa::ToSchema;

/// Request body for `POST /api/v1/ws/rooms`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    /// Room id: 1 to 64 ASCII letters, digits, `-` or `_`.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
}
