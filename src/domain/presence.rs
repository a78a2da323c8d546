//! Presence events announced when connections join or leave the hub.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ConnectionId, RoomId};

/// Why a connection left the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The peer sent a close frame or the stream ended cleanly.
    ClientClosed,
    /// Reading from or writing to the transport failed.
    TransportError,
    /// The outbound buffer was full; the peer is not keeping up.
    SlowConsumer,
    /// Removed through an explicit unregister call.
    Requested,
    /// The hub is shutting down.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::SlowConsumer => "slow_consumer",
            Self::Requested => "requested",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Event broadcast to the other clients of a room when membership changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresenceEvent {
    /// A connection was registered.
    Joined {
        /// Connection that joined.
        connection_id: ConnectionId,
        /// Owner of the connection.
        user_id: i64,
        /// Display name of the owner.
        username: String,
        /// Room joined.
        room: RoomId,
        /// Registration time.
        timestamp: DateTime<Utc>,
    },
    /// A connection was unregistered.
    Left {
        /// Connection that left.
        connection_id: ConnectionId,
        /// Owner of the connection.
        user_id: i64,
        /// Display name of the owner.
        username: String,
        /// Room left.
        room: RoomId,
        /// Why it left.
        reason: DisconnectReason,
        /// Unregistration time.
        timestamp: DateTime<Utc>,
    },
}

impl PresenceEvent {
    /// Returns the room the event is announced in.
    #[must_use]
    pub const fn room(&self) -> &RoomId {
        match self {
            Self::Joined { room, .. } | Self::Left { room, .. } => room,
        }
    }

    /// Returns the connection this event is about.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        match self {
            Self::Joined { connection_id, .. } | Self::Left { connection_id, .. } => {
                *connection_id
            }
        }
    }
}
