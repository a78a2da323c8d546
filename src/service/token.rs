//! Access tokens: HS256 JWTs naming the authenticated user.

use std::fmt;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::domain::User;
use crate::error::RelayError;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Display name at issue time.
    pub username: String,
    /// Login email; used to resolve the user on upgrade.
    pub email: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Issues and verifies access tokens with a shared secret.
#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    /// Creates an authority from an HMAC secret and a token lifetime.
    #[must_use]
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Returns the token lifetime in seconds.
    #[must_use]
    pub const fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issues a token for the user.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] if signing fails.
    pub fn issue(&self, user: &User) -> Result<String, RelayError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| RelayError::Internal(format!("token signing failed: {e}")))
    }

    /// Verifies signature and expiry, returning the claims.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Unauthorized`] for malformed, forged, or
    /// expired tokens.
    pub fn verify(&self, token: &str) -> Result<Claims, RelayError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        RelayError::Unauthorized("token expired".to_string())
                    }
                    _ => RelayError::Unauthorized("invalid token".to_string()),
                }
            })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_verifies() {
        let authority = TokenAuthority::new("secret", 60);
        let Ok(token) = authority.issue(&user()) else {
            panic!("issue failed");
        };
        let Ok(claims) = authority.verify(&token) else {
            panic!("verify failed");
        };
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.email, "alice@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn other_secret_is_rejected() {
        let Ok(token) = TokenAuthority::new("secret", 60).issue(&user()) else {
            panic!("issue failed");
        };
        let result = TokenAuthority::new("another", 60).verify(&token);
        assert!(matches!(result, Err(RelayError::Unauthorized(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let authority = TokenAuthority::new("secret", 60);
        let claims = Claims {
            sub: "7".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            iat: 0,
            exp: 1,
        };
        let Ok(token) = encode(&Header::default(), &claims, &authority.encoding) else {
            panic!("encode failed");
        };
        let Err(RelayError::Unauthorized(msg)) = authority.verify(&token) else {
            panic!("expired token accepted");
        };
        assert_eq!(msg, "token expired");
    }

    #[test]
    fn garbage_is_rejected() {
        let authority = TokenAuthority::new("secret", 60);
        assert!(authority.verify("not.a.jwt").is_err());
    }
}
