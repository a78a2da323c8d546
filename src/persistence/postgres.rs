//! PostgreSQL implementation of the user store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::RelayConfig;
use crate::domain::{NewUser, User};
use crate::error::RelayError;

/// Row shape shared by the user queries.
type UserRow = (i64, String, String, String, DateTime<Utc>);

/// PostgreSQL-backed user store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the pool settings from the configuration and runs
    /// the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError::Persistence`] if the database is unreachable
    /// or a migration fails.
    pub async fn connect(config: &RelayConfig) -> Result<Self, RelayError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RelayError::Persistence(e.to_string()))?;

        tracing::info!(
            max_connections = config.database_max_connections,
            "connected to postgres"
        );
        Ok(Self::new(pool))
    }

    /// Inserts a user and returns it with its database id.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UserExists`] on a unique violation of the
    /// email column, [`RelayError::Persistence`] on other failures.
    pub async fn create_user(&self, new: NewUser) -> Result<User, RelayError> {
        let row = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "INSERT INTO users (username, email, password) VALUES ($1, $2, $3) \
             RETURNING id, created_at",
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password)
        .fetch_one(&self.pool)
        .await;

        let (id, created_at) = match row {
            Ok(row) => row,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(RelayError::UserExists(new.email));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(User {
            id,
            username: new.username,
            email: new.email,
            password: new.password,
            created_at,
        })
    }

    /// Loads the user with the given email.
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError::Persistence`] on database failure.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RelayError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, username, email, password, created_at)| User {
            id,
            username,
            email,
            password,
            created_at,
        }))
    }
}
