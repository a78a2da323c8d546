//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use crate::api::dto::{
    CreateRoomRequest, LoginRequest, LoginResponse, LogoutResponse, SignupRequest, UserResponse,
};
use crate::api::handlers::{auth, clients, rooms, system};
use crate::error::{ErrorBody, ErrorResponse};
use crate::hub::{ClientInfo, RoomInfo};

/// Generated OpenAPI specification.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "relay-gateway", description = "Authenticated WebSocket relay"),
    paths(
        auth::signup,
        auth::login,
        auth::logout,
        clients::list_clients,
        rooms::create_room,
        rooms::list_rooms,
        rooms::list_room_clients,
        system::health_handler,
    ),
    components(schemas(
        SignupRequest,
        UserResponse,
        LoginRequest,
        LoginResponse,
        LogoutResponse,
        ClientInfo,
        CreateRoomRequest,
        RoomInfo,
        ErrorResponse,
        ErrorBody,
        system::HealthResponse,
    )),
    tags(
        (name = "Accounts", description = "Sign-up and login"),
        (name = "Hub", description = "Connection hub introspection and rooms"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;
