//! Domain layer: connection identity, rooms, routed envelopes, presence
//! events, and user records.
//!
//! These are plain value types shared by the hub, the WebSocket layer, and
//! the user service.

pub mod connection_id;
pub mod envelope;
pub mod presence;
pub mod room;
pub mod user;

pub use connection_id::{ConnectionId, ParseConnectionIdError};
pub use envelope::{Envelope, Payload};
pub use presence::{DisconnectReason, PresenceEvent};
pub use room::{ParseRoomIdError, Room, RoomId};
pub use user::{NewUser, User};
