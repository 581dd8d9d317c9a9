//! Router assembly and the shared application state handed to every handler.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use oauth2::url::Url;

use crate::auth::guard::require_session;
use crate::auth::{IdentityProvider, TokenService};
use crate::db::CredentialStore;
use crate::handlers::{self, CallbackParams};
use crate::models::Provider;

/// Where OAuth flows send the browser once they finish.
#[derive(Debug, Clone)]
pub struct Redirects {
    /// `<frontend>/auth/callback`; the token is appended as `?token=`.
    pub frontend_callback: Url,
    /// Failure location; the reason is appended as `?error=`.
    pub failure: String,
}

impl Redirects {
    pub fn new(frontend_callback: Url, failure: impl Into<String>) -> Self {
        Self {
            frontend_callback,
            failure: failure.into(),
        }
    }

    pub fn success(&self, token: &str) -> String {
        let mut url = self.frontend_callback.clone();
        url.query_pairs_mut().append_pair("token", token);
        url.to_string()
    }

    pub fn failure(&self, reason: &str) -> String {
        let sep = if self.failure.contains('?') { '&' } else { '?' };
        format!("{}{sep}error={reason}", self.failure)
    }
}

/// Collaborators passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub tokens: Arc<TokenService>,
    pub providers: Arc<HashMap<Provider, Arc<dyn IdentityProvider>>>,
    pub redirects: Arc<Redirects>,
}

impl AppState {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: TokenService, redirects: Redirects) -> Self {
        Self {
            store,
            tokens: Arc::new(tokens),
            providers: Arc::new(HashMap::new()),
            redirects: Arc::new(redirects),
        }
    }

    /// Enable a federated provider. Its routes are mounted by [`router`].
    pub fn with_provider(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        Arc::make_mut(&mut self.providers).insert(identity.provider(), identity);
        self
    }
}

/// Build the auth router. Callers nest it wherever they like, e.g. under `/auth`.
pub fn router(state: AppState, expose_user_listing: bool) -> Router {
    let protected = Router::new()
        .route("/profile", get(handlers::profile))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let mut router = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .merge(protected);

    if expose_user_listing {
        router = router.route("/users", get(handlers::list_users));
    }

    for provider in Provider::FEDERATED {
        if !state.providers.contains_key(&provider) {
            continue;
        }
        router = router
            .route(
                &format!("/{provider}"),
                get(move |State(state): State<AppState>| async move {
                    handlers::provider_initiate(&state, provider).await
                }),
            )
            .route(
                &format!("/{provider}/callback"),
                get(
                    move |State(state): State<AppState>,
                          query: Result<Query<CallbackParams>, QueryRejection>| async move {
                        handlers::provider_callback(&state, provider, query).await
                    },
                ),
            );
    }

    router.with_state(state)
}
