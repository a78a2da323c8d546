//! Rooms: named broadcast domains inside the hub.
//!
//! Every connection lives in exactly one room. Broadcasts and presence
//! frames stay inside the sender's room; targeted messages are addressed by
//! [`ConnectionId`](super::ConnectionId) and ignore rooms.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted room id, in bytes.
pub const MAX_ROOM_ID_LEN: usize = 64;

/// Id of the room that always exists and that `/ws` joins.
pub const LOBBY: &str = "lobby";

/// Validated room identifier: 1 to 64 ASCII letters, digits, `-` or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RoomId(Arc<str>);

impl RoomId {
    /// Returns the id of the default room.
    #[must_use]
    pub fn lobby() -> Self {
        Self(Arc::from(LOBBY))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the default room.
    #[must_use]
    pub fn is_lobby(&self) -> bool {
        &*self.0 == LOBBY
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::lobby()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when a string is not a valid [`RoomId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid room id: {0:?}")]
pub struct ParseRoomIdError(String);

impl FromStr for RoomId {
    type Err = ParseRoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.len() <= MAX_ROOM_ID_LEN
            && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(Arc::from(s)))
        } else {
            Err(ParseRoomIdError(s.to_string()))
        }
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0.to_string()
    }
}

impl TryFrom<String> for RoomId {
    type Error = ParseRoomIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A room known to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    /// Room id, used in `/ws/rooms/{id}`.
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Creates a room stamped with the current time.
    #[must_use]
    pub fn new(id: RoomId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    /// The default room.
    #[must_use]
    pub fn lobby() -> Self {
        Self::new(RoomId::lobby(), "Lobby")
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn accepts_slug_ids() {
        for id in ["lobby", "room-1", "Team_42", "a"] {
            assert!(id.parse::<RoomId>().is_ok(), "{id} should parse");
        }
    }

    #[test]
    fn rejects_bad_ids() {
        let too_long = "x".repeat(MAX_ROOM_ID_LEN + 1);
        for id in ["", "has space", "slash/room", "ümlaut", too_long.as_str()] {
            assert!(id.parse::<RoomId>().is_err(), "{id:?} should not parse");
        }
    }

    #[test]
    fn lobby_is_default() {
        assert!(RoomId::default().is_lobby());
        assert_eq!(Room::lobby().id, RoomId::lobby());
    }

    #[test]
    fn serde_uses_plain_string() {
        let Ok(id) = "games".parse::<RoomId>() else {
            panic!("slug must parse");
        };
        assert_eq!(serde_json::to_value(&id).ok(), Some(serde_json::json!("games")));
        let bad: Result<RoomId, _> = serde_json::from_str("\"no spaces\"");
        assert!(bad.is_err());
    }
}
