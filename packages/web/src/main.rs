use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use gatekeeper_api::auth::{OAuthClient, Settings, TokenService};
use gatekeeper_api::db::{self, CredentialStore, OAuthStateStore, PgStore};
use gatekeeper_api::routes::{self, AppState, Redirects};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("gatekeeper=info,gatekeeper_api=info,tower_http=info")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;

    let pool = db::connect(&settings.database_url)
        .await
        .context("failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    let store = Arc::new(PgStore::new(pool));
    let tokens = TokenService::new(&settings.jwt_secret, &settings.jwt_expires_in)?;
    let redirects = Redirects::new(
        settings.frontend_callback.clone(),
        settings.failure_redirect.clone(),
    );

    let credentials: Arc<dyn CredentialStore> = store.clone();
    let mut state = AppState::new(credentials, tokens, redirects);
    for config in settings.oauth.iter().cloned() {
        let provider = config.provider;
        let states: Arc<dyn OAuthStateStore> = store.clone();
        let client = OAuthClient::new(config, states)
            .with_context(|| format!("failed to configure {provider} OAuth"))?;
        state = state.with_provider(Arc::new(client));
        tracing::info!("{provider} login enabled");
    }
    for provider in settings.disabled_providers() {
        tracing::warn!("{provider} login disabled: client id or secret not set");
    }
    if settings.expose_user_listing {
        tracing::warn!("GET /auth/users is exposed without access control");
    }

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/auth", routes::router(state, settings.expose_user_listing))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&settings.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.server_addr))?;
    tracing::info!("Server listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
