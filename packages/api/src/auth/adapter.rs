//! Resolve a provider profile to a local user and issue a session token.

use tracing::{debug, info};

use super::profile::{FieldMapping, ProviderProfile};
use super::token::{TokenError, TokenService};
use crate::db::{CredentialStore, StoreError};
use crate::models::{Provider, User};

/// A successful federated login.
#[derive(Debug, Clone)]
pub struct ResolvedLogin {
    pub user: User,
    pub token: String,
    /// Whether this login created the user record.
    pub created: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("{0} is not a federated provider")]
    NotFederated(Provider),

    #[error("profile has no external id")]
    MissingId,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Find the local user for `profile`, creating one on first login, then issue a token.
///
/// Existing records are returned untouched; profile changes at the provider are not
/// copied over on later logins. No token is issued if any step fails.
pub async fn resolve_login(
    store: &dyn CredentialStore,
    tokens: &TokenService,
    provider: Provider,
    profile: &ProviderProfile,
) -> Result<ResolvedLogin, AdapterError> {
    let mapping = FieldMapping::for_provider(provider).ok_or(AdapterError::NotFederated(provider))?;
    if profile.id.trim().is_empty() {
        return Err(AdapterError::MissingId);
    }

    let (user, created) = match store.find_by_provider_id(provider, &profile.id).await? {
        Some(user) => (user, false),
        None => match store.create_provider_user(mapping.normalize(provider, profile)).await {
            Ok(user) => {
                info!(%provider, user_id = %user.id, "created user from provider profile");
                (user, true)
            }
            // A concurrent callback for the same identity won the insert.
            Err(StoreError::Duplicate(_)) => {
                debug!(%provider, "provider identity created concurrently, reloading");
                let user = store
                    .find_by_provider_id(provider, &profile.id)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Unavailable("provider identity vanished after insert".into())
                    })?;
                (user, false)
            }
            Err(e) => return Err(e.into()),
        },
    };

    let token = tokens.issue(user.id)?;
    Ok(ResolvedLogin {
        user,
        token,
        created,
    })
}
