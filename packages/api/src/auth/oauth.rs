//! # OAuth 2.0 authorization-code flow with PKCE
//!
//! [`IdentityProvider`] is the seam between the HTTP handlers and a provider: it builds
//! the consent-screen URL and turns a callback `code` + `state` into a
//! [`ProviderProfile`]. [`OAuthClient`] implements it for Google, Discord and GitHub
//! from an [`OAuthConfig`]:
//!
//! 1. **[`authorize_url`](IdentityProvider::authorize_url)**: builds the authorization URL
//!    with the provider's scopes and a random PKCE challenge, and saves the CSRF state +
//!    verifier in the [`OAuthStateStore`] for ten minutes.
//!
//! 2. **[`exchange`](IdentityProvider::exchange)**: consumes the matching state (unknown,
//!    expired or replayed states fail), exchanges the code + verifier for an access token
//!    and fetches the user's profile from the provider API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthorizationCode, CsrfToken, EndpointNotSet, EndpointSet, PkceCodeChallenge,
    PkceCodeVerifier, TokenResponse,
};
use reqwest::Client;

use super::config::OAuthConfig;
use super::profile::ProviderProfile;
use super::{discord, github, google};
use crate::db::{OAuthStateStore, StoreError};
use crate::models::Provider;

/// How long an authorization may stay pending between redirect and callback.
pub const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("invalid or expired OAuth state")]
    InvalidState,

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("profile request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0} has no OAuth flow")]
    Unsupported(Provider),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A federated identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Start an authorization: returns the consent-screen URL to redirect to.
    async fn authorize_url(&self) -> Result<String, OAuthError>;

    /// Finish an authorization from the callback's `code` and `state`.
    async fn exchange(&self, code: &str, state: &str) -> Result<ProviderProfile, OAuthError>;
}

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// [`IdentityProvider`] backed by the `oauth2` crate.
pub struct OAuthClient {
    config: OAuthConfig,
    states: Arc<dyn OAuthStateStore>,
    /// Token exchange client; must not follow redirects.
    http: Client,
    /// Provider API client.
    api: Client,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig, states: Arc<dyn OAuthStateStore>) -> Result<Self, OAuthError> {
        if !config.provider.is_federated() {
            return Err(OAuthError::Unsupported(config.provider));
        }

        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let api = reqwest::ClientBuilder::new()
            .user_agent(concat!("gatekeeper/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            states,
            http,
            api,
        })
    }

    fn create_client(&self) -> ConfiguredClient {
        BasicClient::new(self.config.client_id.clone())
            .set_client_secret(self.config.client_secret.clone())
            .set_auth_uri(self.config.auth_url.clone())
            .set_token_uri(self.config.token_url.clone())
            .set_redirect_uri(self.config.redirect_url.clone())
    }
}

#[async_trait]
impl IdentityProvider for OAuthClient {
    fn provider(&self) -> Provider {
        self.config.provider
    }

    async fn authorize_url(&self) -> Result<String, OAuthError> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_state) = self
            .create_client()
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.config.scopes.iter().cloned())
            .set_pkce_challenge(pkce_challenge)
            .url();

        self.states
            .save_state(
                self.config.provider,
                csrf_state.secret(),
                pkce_verifier.secret(),
                Duration::minutes(STATE_TTL_MINUTES),
            )
            .await?;

        Ok(auth_url.to_string())
    }

    async fn exchange(&self, code: &str, state: &str) -> Result<ProviderProfile, OAuthError> {
        let provider = self.config.provider;
        let pkce_verifier = self
            .states
            .take_state(provider, state)
            .await?
            .ok_or(OAuthError::InvalidState)?;

        let token_result = self
            .create_client()
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
            .request_async(&self.http)
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        let access_token = token_result.access_token().secret();

        match provider {
            Provider::Google => google::fetch_profile(&self.api, access_token).await,
            Provider::Discord => discord::fetch_profile(&self.api, access_token).await,
            Provider::Github => github::fetch_profile(&self.api, access_token).await,
            Provider::Local => Err(OAuthError::Unsupported(provider)),
        }
    }
}
