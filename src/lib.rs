//! # relay-gateway
//!
//! Authenticated WebSocket relay. Clients log in over REST, open a
//! WebSocket with their access token, and exchange messages through a
//! single hub that routes each one to every other client or to one
//! addressed connection.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)      signup, login, clients, health
//!     ├── Upgrade Handler (ws/)     token check, then Connection
//!     │
//!     ├── UserService (service/)    passwords, access tokens
//!     ├── Hub (hub/)                registry + routing, one task
//!     │     └── Connection tasks    reader / writer per socket
//!     │
//!     └── UserRepository            PostgreSQL or in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod persistence;
pub mod server;
pub mod service;
pub mod ws;
