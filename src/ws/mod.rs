//! WebSocket layer: upgrade handling, per-connection loops, wire format.
//!
//! The endpoints at `/ws` and `/ws/rooms/{room}` authenticate the caller, upgrade the request,
//! and hand the resulting [`connection::Connection`] to the hub.

pub mod connection;
pub mod handler;
pub mod messages;
