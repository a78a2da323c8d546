//! User service: sign-up, login, and identity resolution for upgrades.

use crate::domain::{NewUser, User};
use crate::error::RelayError;
use crate::persistence::UserRepository;

use super::token::TokenAuthority;

/// Orchestrates user storage, password hashing, and access tokens.
///
/// Password hashing and verification run on the blocking pool since they
/// are deliberately slow.
#[derive(Debug, Clone)]
pub struct UserService {
    repository: UserRepository,
    tokens: TokenAuthority,
}

impl UserService {
    /// Creates a new `UserService`.
    #[must_use]
    pub fn new(repository: UserRepository, tokens: TokenAuthority) -> Self {
        Self { repository, tokens }
    }

    /// Returns the token authority.
    #[must_use]
    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    /// Creates a user with a hashed password.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] for empty fields or a
    /// malformed email, [`RelayError::UserExists`] if the email is taken.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, RelayError> {
        let username = username.trim();
        let email = email.trim().to_lowercase();
        if username.is_empty() {
            return Err(RelayError::InvalidRequest("username is required".to_string()));
        }
        if !email.contains('@') {
            return Err(RelayError::InvalidRequest("email is malformed".to_string()));
        }
        if password.is_empty() {
            return Err(RelayError::InvalidRequest("password is required".to_string()));
        }

        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || password_auth::generate_hash(password))
            .await
            .map_err(|e| RelayError::Internal(format!("password hashing failed: {e}")))?;

        let user = self
            .repository
            .create_user(NewUser {
                username: username.to_string(),
                email,
                password: hash,
            })
            .await?;
        tracing::info!(user_id = user.id, "user created");
        Ok(user)
    }

    /// Looks a user up by email.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UserNotFound`] if no such user exists.
    pub async fn get_user_by_email(&self, email: &str) -> Result<User, RelayError> {
        let email = email.trim().to_lowercase();
        self.repository
            .get_user_by_email(&email)
            .await?
            .ok_or(RelayError::UserNotFound(email))
    }

    /// Checks credentials and issues an access token.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidCredentials`] if the email is unknown
    /// or the password does not match.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), RelayError> {
        let user = match self.get_user_by_email(email).await {
            Ok(user) => user,
            Err(RelayError::UserNotFound(_)) => return Err(RelayError::InvalidCredentials),
            Err(e) => return Err(e),
        };

        let candidate = password.to_string();
        let hash = user.password.clone();
        let verified = tokio::task::spawn_blocking(move || {
            password_auth::verify_password(candidate, &hash).is_ok()
        })
        .await
        .map_err(|e| RelayError::Internal(format!("password verification failed: {e}")))?;
        if !verified {
            tracing::debug!(user_id = user.id, "password mismatch");
            return Err(RelayError::InvalidCredentials);
        }

        let token = self.tokens.issue(&user)?;
        tracing::info!(user_id = user.id, "user logged in");
        Ok((user, token))
    }

    /// Resolves the user behind an access token. This is the identity
    /// lookup performed before a WebSocket upgrade.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Unauthorized`] if the token is invalid or its
    /// user no longer exists.
    pub async fn authenticate(&self, token: &str) -> Result<User, RelayError> {
        let claims = self.tokens.verify(token)?;
        match self.get_user_by_email(&claims.email).await {
            Ok(user) => Ok(user),
            Err(RelayError::UserNotFound(_)) => {
                Err(RelayError::Unauthorized("unknown user".to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn service() -> UserService {
        UserService::new(
            UserRepository::in_memory(),
            TokenAuthority::new("test-secret", 300),
        )
    }

    #[tokio::test]
    async fn create_hashes_password() {
        let svc = service();
        let Ok(user) = svc.create_user("alice", "Alice@Example.com", "pw").await else {
            panic!("create failed");
        };
        assert_ne!(user.password, "pw");
        assert_eq!(user.email, "alice@example.com");
    }

    #[tokio::test]
    async fn create_validates_fields() {
        let svc = service();
        for (name, email, pw) in [("", "a@b.c", "pw"), ("a", "nope", "pw"), ("a", "a@b.c", "")] {
            let result = svc.create_user(name, email, pw).await;
            assert!(matches!(result, Err(RelayError::InvalidRequest(_))));
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let svc = service();
        let _ = svc.create_user("alice", "a@example.com", "pw").await;
        let again = svc.create_user("alice2", "a@example.com", "pw2").await;
        assert!(matches!(again, Err(RelayError::UserExists(_))));
    }

    #[tokio::test]
    async fn login_and_authenticate() {
        let svc = service();
        let _ = svc.create_user("alice", "a@example.com", "pw").await;

        let Ok((user, token)) = svc.login("a@example.com", "pw").await else {
            panic!("login failed");
        };
        let Ok(resolved) = svc.authenticate(&token).await else {
            panic!("authenticate failed");
        };
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let svc = service();
        let _ = svc.create_user("alice", "a@example.com", "pw").await;
        let result = svc.login("a@example.com", "wrong").await;
        assert!(matches!(result, Err(RelayError::InvalidCredentials)));
        let unknown = svc.login("b@example.com", "pw").await;
        assert!(matches!(unknown, Err(RelayError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn token_for_missing_user_is_unauthorized() {
        let svc = service();
        let ghost = User {
            id: 99,
            username: "ghost".to_string(),
            email: "ghost@example.com".to_string(),
            password: String::new(),
            created_at: chrono::Utc::now(),
        };
        let Ok(token) = svc.tokens().issue(&ghost) else {
            panic!("issue failed");
        };
        let result = svc.authenticate(&token).await;
        assert!(matches!(result, Err(RelayError::Unauthorized(_))));
    }
}
