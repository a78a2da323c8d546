//! Type-safe connection identifier.
//!
//! [`ConnectionId`] combines the authenticated user's id with a random
//! per-session nonce (UUID v4), so a single user may hold several live
//! connections at once while every connection stays uniquely addressable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier for one live client connection.
///
/// Generated once by the upgrade handler and immutable thereafter. Used as
/// the key of the hub registry and as the routing target of envelopes.
///
/// The textual form is `<user_id>.<uuid-simple>`, for example
/// `42.7f1c0e4a9b6d4a5f8c2e3d4b5a697887`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ConnectionId {
    user_id: i64,
    session: uuid::Uuid,
}

impl ConnectionId {
    /// Creates a fresh `ConnectionId` for the given user with a random
    /// session nonce.
    #[must_use]
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            session: uuid::Uuid::new_v4(),
        }
    }

    /// Creates a `ConnectionId` from explicit parts.
    #[must_use]
    pub const fn from_parts(user_id: i64, session: uuid::Uuid) -> Self {
        Self { user_id, session }
    }

    /// Returns the id of the user owning this connection.
    #[must_use]
    pub const fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Returns the per-session nonce.
    #[must_use]
    pub const fn session(&self) -> &uuid::Uuid {
        &self.session
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.user_id, self.session.simple())
    }
}

/// Error returned when a string is not a valid [`ConnectionId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid connection id: {0}")]
pub struct ParseConnectionIdError(String);

impl FromStr for ConnectionId {
    type Err = ParseConnectionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseConnectionIdError(s.to_string());
        let (user, session) = s.split_once('.').ok_or_else(invalid)?;
        let user_id = user.parse::<i64>().map_err(|_| invalid())?;
        let session = session.parse::<uuid::Uuid>().map_err(|_| invalid())?;
        Ok(Self { user_id, session })
    }
}

impl From<ConnectionId> for String {
    fn from(id: ConnectionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = ParseConnectionIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
