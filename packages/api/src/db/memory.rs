use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{CredentialStore, NewLocalUser, NewProviderUser, OAuthStateStore, StoreError};
use crate::auth::password::hash_password;
use crate::models::{Provider, User};

#[derive(Debug, Clone)]
struct PendingState {
    provider: Provider,
    pkce_verifier: String,
    expires_at: DateTime<Utc>,
}

/// In-memory credential store for tests and local development.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    users: Arc<Mutex<Vec<User>>>,
    states: Arc<Mutex<HashMap<String, PendingState>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub fn len(&self) -> usize {
        self.users.lock().map(|users| users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a user, as an external admin tool would.
    pub fn remove(&self, id: Uuid) -> bool {
        match self.users.lock() {
            Ok(mut users) => {
                let before = users.len();
                users.retain(|u| u.id != id);
                users.len() != before
            }
            Err(_) => false,
        }
    }

    fn users(&self) -> Result<MutexGuard<'_, Vec<User>>, StoreError> {
        self.users
            .lock()
            .map_err(|_| StoreError::Unavailable("user table lock poisoned".to_string()))
    }

    fn states(&self) -> Result<MutexGuard<'_, HashMap<String, PendingState>>, StoreError> {
        self.states
            .lock()
            .map_err(|_| StoreError::Unavailable("state table lock poisoned".to_string()))
    }
}

fn same_email(stored: Option<&str>, email: &str) -> bool {
    stored.is_some_and(|s| s.eq_ignore_ascii_case(email))
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users()?.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users()?;
        let matches: Vec<&User> = users
            .iter()
            .filter(|u| same_email(u.email.as_deref(), email))
            .collect();
        Ok(matches
            .iter()
            .find(|u| u.password_hash.is_some())
            .or(matches.first())
            .map(|u| (*u).clone()))
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .users()?
            .iter()
            .find(|u| u.provider == provider && u.provider_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn create_local_user(&self, new_user: NewLocalUser) -> Result<User, StoreError> {
        let password_hash = hash_password(&new_user.password)?;

        let mut users = self.users()?;
        if users
            .iter()
            .any(|u| u.provider == Provider::Local && same_email(u.email.as_deref(), &new_user.email))
        {
            return Err(StoreError::Duplicate("email".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: Some(new_user.email),
            name: Some(new_user.name),
            picture: None,
            provider: Provider::Local,
            provider_id: None,
            password_hash: Some(password_hash),
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn create_provider_user(&self, new_user: NewProviderUser) -> Result<User, StoreError> {
        let mut users = self.users()?;
        if users.iter().any(|u| {
            u.provider == new_user.provider
                && u.provider_id.as_deref() == Some(new_user.external_id.as_str())
        }) {
            return Err(StoreError::Duplicate("provider identity".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            name: new_user.name,
            picture: new_user.picture,
            provider: new_user.provider,
            provider_id: Some(new_user.external_id),
            password_hash: None,
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users()?.clone())
    }
}

#[async_trait]
impl OAuthStateStore for MemoryStore {
    async fn save_state(
        &self,
        provider: Provider,
        state: &str,
        pkce_verifier: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.states()?.insert(
            state.to_string(),
            PendingState {
                provider,
                pkce_verifier: pkce_verifier.to_string(),
                expires_at: Utc::now() + ttl,
            },
        );
        Ok(())
    }

    async fn take_state(
        &self,
        provider: Provider,
        state: &str,
    ) -> Result<Option<String>, StoreError> {
        let mut states = self.states()?;
        let Some(pending) = states.remove(state) else {
            return Ok(None);
        };
        if pending.provider != provider || pending.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(pending.pkce_verifier))
    }
}
