//! Persistence layer: user storage.
//!
//! [`UserRepository`] selects between the PostgreSQL store (`sqlx::PgPool`)
//! and an in-memory store used when persistence is disabled and in tests.
//! Only two operations exist: insert a user and look one up by email.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use crate::domain::{NewUser, User};
use crate::error::RelayError;

pub use memory::MemoryUserStore;
pub use postgres::PostgresUserStore;

/// Storage backend for users.
#[derive(Debug, Clone)]
pub enum UserRepository {
    /// Process-local map; contents are lost on restart.
    Memory(Arc<MemoryUserStore>),
    /// PostgreSQL `users` table.
    Postgres(PostgresUserStore),
}

impl UserRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(MemoryUserStore::new()))
    }

    /// Inserts a user.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UserExists`] if the email is taken and
    /// [`RelayError::Persistence`] on database failure.
    pub async fn create_user(&self, user: NewUser) -> Result<User, RelayError> {
        match self {
            Self::Memory(store) => store.create_user(user).await,
            Self::Postgres(store) => store.create_user(user).await,
        }
    }

    /// Looks a user up by email.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Persistence`] on database failure.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RelayError> {
        match self {
            Self::Memory(store) => Ok(store.get_user_by_email(email).await),
            Self::Postgres(store) => store.get_user_by_email(email).await,
        }
    }
}
