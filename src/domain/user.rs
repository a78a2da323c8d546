//! User records exchanged with the user store.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A stored user.
///
/// `password` holds the PHC-formatted password hash, never the plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Database-assigned id.
    pub id: i64,
    /// Display name.
    pub username: String,
    /// Unique login email.
    pub email: String,
    /// Password hash.
    #[serde(skip_serializing)]
    pub password: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A user about to be inserted. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Display name.
    pub username: String,
    /// Unique login email.
    pub email: String,
    /// Password hash.
    pub password: String,
}
