//! # Credential store: persistence of user records
//!
//! Every handler and adapter reaches storage through the [`CredentialStore`] trait, passed
//! in explicitly through the router state. Two implementations ship with the crate:
//!
//! - [`PgStore`]: PostgreSQL via SQLx. Uniqueness of `(provider, provider_id)` and of
//!   local emails is enforced by indexes, so concurrent registrations for one email
//!   cannot both succeed.
//! - [`MemoryStore`]: process-local store with the same uniqueness rules, for tests.
//!
//! The OAuth authorization-code flow also needs somewhere to keep the CSRF state and PKCE
//! verifier between the redirect and the callback; that is [`OAuthStateStore`], implemented
//! by both stores.

mod memory;
mod pool;
mod postgres;

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::auth::password::{verify_password, PasswordError};
use crate::models::{Provider, User};

pub use memory::MemoryStore;
pub use pool::{connect, run_migrations};
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Input for a local (email + password) signup. The password is plaintext here and is
/// hashed by the store.
#[derive(Debug, Clone)]
pub struct NewLocalUser {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Normalized identity from a federated provider.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProviderUser {
    pub provider: Provider,
    pub external_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Persistence operations on user records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Look up a user by email. When several records share the address, the
    /// password-bearing (local) one wins.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Create a local user, hashing the password. Fails with [`StoreError::Duplicate`] if
    /// a local account already uses the email.
    async fn create_local_user(&self, new_user: NewLocalUser) -> Result<User, StoreError>;

    /// Create a federated user. Fails with [`StoreError::Duplicate`] if the external id is
    /// already registered for that provider.
    async fn create_provider_user(&self, new_user: NewProviderUser) -> Result<User, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Check a candidate password against the user's stored hash. Users without a
    /// password never match.
    async fn compare_password(&self, user: &User, candidate: &str) -> Result<bool, StoreError> {
        match user.password_hash.as_deref() {
            Some(hash) => Ok(verify_password(candidate, hash)?),
            None => Ok(false),
        }
    }
}

/// Short-lived storage for in-flight OAuth authorizations.
#[async_trait]
pub trait OAuthStateStore: Send + Sync {
    /// Remember the PKCE verifier for `state` for `ttl`.
    async fn save_state(
        &self,
        provider: Provider,
        state: &str,
        pkce_verifier: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Consume a pending state, returning its verifier if it exists, belongs to
    /// `provider` and has not expired. A state can be taken only once.
    async fn take_state(&self, provider: Provider, state: &str)
        -> Result<Option<String>, StoreError>;
}
