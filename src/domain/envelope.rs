//! Routed message envelope.
//!
//! An [`Envelope`] is the unit the hub routes: who sent it, who it is for
//! (nobody in particular means broadcast to the sender's room), and the
//! opaque payload.

use std::sync::Arc;

use axum::body::Bytes;
use chrono::{DateTime, Utc};

use super::{ConnectionId, RoomId};

/// Payload carried by an envelope.
///
/// Text payloads came from WebSocket text frames and are relayed as text;
/// binary payloads are relayed byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text.
    Text(Arc<str>),
    /// Opaque bytes.
    Binary(Bytes),
}

impl Payload {
    /// Returns the raw payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(Arc::from(text))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(Arc::from(text))
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::Binary(bytes)
    }
}

/// A message travelling through the hub.
///
/// Immutable once built. The hub shares one envelope between all
/// recipients of a broadcast behind an [`Arc`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Connection that produced the message.
    pub sender: ConnectionId,
    /// Display name of the sending user.
    pub sender_name: String,
    /// Recipient connection, or `None` to broadcast.
    pub target: Option<ConnectionId>,
    /// Room a broadcast is confined to.
    pub room: RoomId,
    /// Message body.
    pub payload: Payload,
    /// Time the message entered the server.
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Builds a lobby broadcast envelope stamped with the current time.
    #[must_use]
    pub fn broadcast(
        sender: ConnectionId,
        sender_name: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Self {
        Self {
            sender,
            sender_name: sender_name.into(),
            target: None,
            room: RoomId::lobby(),
            payload: payload.into(),
            timestamp: Utc::now(),
        }
    }

    /// Builds an envelope addressed to a single connection.
    #[must_use]
    pub fn direct(
        sender: ConnectionId,
        sender_name: impl Into<String>,
        target: ConnectionId,
        payload: impl Into<Payload>,
    ) -> Self {
        Self {
            target: Some(target),
            ..Self::broadcast(sender, sender_name, payload)
        }
    }

    /// Moves the envelope into another room.
    #[must_use]
    pub fn in_room(self, room: RoomId) -> Self {
        Self { room, ..self }
    }

    /// Returns `true` if the envelope has no explicit target.
    #[must_use]
    pub const fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }
}
