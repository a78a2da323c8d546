//! In-memory user store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::{NewUser, User};
use crate::error::RelayError;

/// Users keyed by email, with ids handed out from a counter.
#[derive(Debug)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
    next_id: AtomicI64,
}

impl MemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Inserts a user.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UserExists`] if the email is taken.
    pub async fn create_user(&self, new: NewUser) -> Result<User, RelayError> {
        let mut users = self.users.write().await;
        if users.contains_key(&new.email) {
            return Err(RelayError::UserExists(new.email));
        }
        let user = User {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            username: new.username,
            email: new.email,
            password: new.password,
            created_at: Utc::now(),
        };
        users.insert(user.email.clone(), user.clone());
        Ok(user)
    }

    /// Looks a user up by email.
    pub async fn get_user_by_email(&self, email: &str) -> Option<User> {
        self.users.read().await.get(email).cloned()
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            username: "alice".to_string(),
            email: email.to_string(),
            password: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_find() {
        let store = MemoryUserStore::new();
        let Ok(created) = store.create_user(new_user("a@example.com")).await else {
            panic!("create failed");
        };
        let found = store.get_user_by_email("a@example.com").await;
        assert_eq!(found, Some(created));
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let store = MemoryUserStore::new();
        let a = store.create_user(new_user("a@example.com")).await;
        let b = store.create_user(new_user("b@example.com")).await;
        let (Ok(a), Ok(b)) = (a, b) else {
            panic!("create failed");
        };
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryUserStore::new();
        let _ = store.create_user(new_user("a@example.com")).await;
        let again = store.create_user(new_user("a@example.com")).await;
        assert!(matches!(again, Err(RelayError::UserExists(_))));
    }

    #[tokio::test]
    async fn unknown_email_is_none() {
        let store = MemoryUserStore::new();
        assert!(store.get_user_by_email("nobody@example.com").await.is_none());
    }
}
