//! SQLx-backed credential store.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, NewLocalUser, NewProviderUser, OAuthStateStore, StoreError};
use crate::auth::password::hash_password;
use crate::models::{Provider, User};

/// Credential store over the `users` and `oauth_states` tables.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Turn unique-constraint violations into [`StoreError::Duplicate`].
fn map_insert_error(err: sqlx::Error, what: &str) -> StoreError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => StoreError::Duplicate(what.to_string()),
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as(
            r#"
            SELECT * FROM users
            WHERE lower(email) = lower($1)
            ORDER BY (password_hash IS NULL), created_at
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE provider = $1 AND provider_id = $2")
            .bind(provider.as_str())
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_local_user(&self, new_user: NewLocalUser) -> Result<User, StoreError> {
        let password_hash = hash_password(&new_user.password)?;

        sqlx::query_as(
            r#"
            INSERT INTO users (id, email, name, provider, password_hash)
            VALUES ($1, $2, $3, 'local', $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "email"))
    }

    async fn create_provider_user(&self, new_user: NewProviderUser) -> Result<User, StoreError> {
        sqlx::query_as(
            r#"
            INSERT INTO users (id, email, name, picture, provider, provider_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&new_user.picture)
        .bind(new_user.provider.as_str())
        .bind(&new_user.external_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "provider identity"))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }
}

#[async_trait]
impl OAuthStateStore for PgStore {
    async fn save_state(
        &self,
        provider: Provider,
        state: &str,
        pkce_verifier: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO oauth_states (state, provider, pkce_verifier, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(state)
        .bind(provider.as_str())
        .bind(pkce_verifier)
        .bind(Utc::now() + ttl)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_state(
        &self,
        provider: Provider,
        state: &str,
    ) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            DELETE FROM oauth_states
            WHERE state = $1 AND provider = $2 AND expires_at > NOW()
            RETURNING pkce_verifier
            "#,
        )
        .bind(state)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(verifier,)| verifier))
    }
}
