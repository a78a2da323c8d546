//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::hub::HubHandle;
use crate::service::UserService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// User service for sign-up, login, and upgrade authentication.
    pub users: Arc<UserService>,
    /// Handle to the connection hub.
    pub hub: HubHandle,
}
