//! Service layer: the user-facing collaborator of the hub.
//!
//! [`UserService`] creates users, checks credentials, and resolves access
//! tokens to users for the WebSocket upgrade handler.

pub mod token;
pub mod user_service;

pub use token::{Claims, TokenAuthority};
pub use user_service::UserService;
