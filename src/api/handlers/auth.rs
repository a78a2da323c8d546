//! Account handlers: sign-up, login, logout.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::SET_COOKIE;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{LoginRequest, LoginResponse, LogoutResponse, SignupRequest, UserResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, RelayError};
use crate::ws::handler::TOKEN_COOKIE;

/// `POST /signup`: Create a user account.
///
/// # Errors
///
/// Returns [`RelayError`] on invalid input or an email already in use.
#[utoipa::path(
    post,
    path = "/api/v1/signup",
    tag = "Accounts",
    summary = "Create a user",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let user = state
        .users
        .create_user(&req.username, &req.email, &req.password)
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// `POST /login`: Exchange credentials for an access token.
///
/// The token is returned in the body and also set as the `jwt` cookie.
///
/// # Errors
///
/// Returns [`RelayError::InvalidCredentials`] on a bad email/password.
#[utoipa::path(
    post,
    path = "/api/v1/login",
    tag = "Accounts",
    summary = "Log in",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let (user, token) = state.users.login(&req.email, &req.password).await?;
    let ttl = state.users.tokens().ttl_secs();
    let cookie = format!("{TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl}");

    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginResponse {
            access_token: token,
            expires_in: ttl,
            id: user.id.to_string(),
            username: user.username,
        }),
    ))
}

/// `GET /logout`: Clear the token cookie.
#[utoipa::path(
    get,
    path = "/api/v1/logout",
    tag = "Accounts",
    summary = "Log out",
    responses(
        (status = 200, description = "Cookie cleared", body = LogoutResponse),
    )
)]
pub async fn logout() -> impl IntoResponse {
    (
        [(SET_COOKIE, format!("{TOKEN_COOKIE}=; Path=/; HttpOnly; Max-Age=0"))],
        Json(LogoutResponse {
            message: "logout successful".to_string(),
        }),
    )
}

/// Account routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
}
