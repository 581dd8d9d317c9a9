//! Settings and OAuth provider configuration from environment variables.

use oauth2::url::Url;
use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, Scope, TokenUrl};

use super::token::{parse_ttl, DEFAULT_TTL};
use crate::models::Provider;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: String, reason: String },
}

impl ConfigError {
    fn invalid(var: impl Into<String>, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            var: var.into(),
            reason: reason.to_string(),
        }
    }
}

/// OAuth provider configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub provider: Provider,
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub auth_url: AuthUrl,
    pub token_url: TokenUrl,
    pub redirect_url: RedirectUrl,
    pub scopes: Vec<Scope>,
}

struct Endpoints {
    prefix: &'static str,
    auth_url: &'static str,
    token_url: &'static str,
    scopes: &'static [&'static str],
}

fn endpoints(provider: Provider) -> Option<Endpoints> {
    match provider {
        Provider::Google => Some(Endpoints {
            prefix: "GOOGLE",
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
            token_url: "https://oauth2.googleapis.com/token",
            scopes: &["profile", "email"],
        }),
        Provider::Discord => Some(Endpoints {
            prefix: "DISCORD",
            auth_url: "https://discord.com/oauth2/authorize",
            token_url: "https://discord.com/api/oauth2/token",
            scopes: &["identify", "email"],
        }),
        Provider::Github => Some(Endpoints {
            prefix: "GITHUB",
            auth_url: "https://github.com/login/oauth/authorize",
            token_url: "https://github.com/login/oauth/access_token",
            scopes: &["user:email"],
        }),
        Provider::Local => None,
    }
}

impl OAuthConfig {
    /// Build the configuration for `provider` from `<PREFIX>_CLIENT_ID`,
    /// `<PREFIX>_CLIENT_SECRET` and `<PREFIX>_CALLBACK_URL`.
    ///
    /// Returns `Ok(None)` when the client id or secret is absent: the provider is simply
    /// not enabled.
    pub fn from_lookup<F>(provider: Provider, lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(endpoints) = endpoints(provider) else {
            return Ok(None);
        };
        let var = |suffix: &str| format!("{}_{suffix}", endpoints.prefix);

        let (Some(client_id), Some(client_secret)) =
            (lookup(&var("CLIENT_ID")), lookup(&var("CLIENT_SECRET")))
        else {
            return Ok(None);
        };

        let callback_var = var("CALLBACK_URL");
        let redirect_uri = lookup(&callback_var)
            .unwrap_or_else(|| format!("http://localhost:8080/auth/{provider}/callback"));

        Ok(Some(Self {
            provider,
            client_id: ClientId::new(client_id),
            client_secret: ClientSecret::new(client_secret),
            auth_url: AuthUrl::new(endpoints.auth_url.to_string())
                .map_err(|e| ConfigError::invalid("auth url", e))?,
            token_url: TokenUrl::new(endpoints.token_url.to_string())
                .map_err(|e| ConfigError::invalid("token url", e))?,
            redirect_url: RedirectUrl::new(redirect_uri)
                .map_err(|e| ConfigError::invalid(callback_var, e))?,
            scopes: endpoints
                .scopes
                .iter()
                .map(|s| Scope::new(s.to_string()))
                .collect(),
        }))
    }
}

/// Process-wide settings.
#[derive(Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expires_in: String,
    pub frontend_url: String,
    /// `<frontend_url>/auth/callback`, where successful OAuth logins land.
    pub frontend_callback: Url,
    pub failure_redirect: String,
    pub expose_user_listing: bool,
    pub server_addr: String,
    pub oauth: Vec<OAuthConfig>,
}

impl Settings {
    /// Load settings from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let jwt_expires_in = lookup("JWT_EXPIRES_IN").unwrap_or_else(|| DEFAULT_TTL.to_string());
        parse_ttl(&jwt_expires_in).map_err(|e| ConfigError::invalid("JWT_EXPIRES_IN", e))?;

        let frontend_url =
            lookup("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_string());
        let frontend_callback =
            Url::parse(&format!("{}/auth/callback", frontend_url.trim_end_matches('/')))
                .map_err(|e| ConfigError::invalid("FRONTEND_URL", e))?;

        let expose_user_listing = match lookup("EXPOSE_USER_LISTING").as_deref() {
            None => false,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "EXPOSE_USER_LISTING",
                    format!("expected true or false, got '{other}'"),
                ))
            }
        };

        let mut oauth = Vec::new();
        for provider in Provider::FEDERATED {
            if let Some(config) = OAuthConfig::from_lookup(provider, &lookup)? {
                oauth.push(config);
            }
        }

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expires_in,
            frontend_url,
            frontend_callback,
            failure_redirect: lookup("AUTH_FAILURE_REDIRECT").unwrap_or_else(|| "/login".to_string()),
            expose_user_listing,
            server_addr: lookup("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            oauth,
        })
    }

    /// Federated providers without credentials.
    pub fn disabled_providers(&self) -> Vec<Provider> {
        Provider::FEDERATED
            .into_iter()
            .filter(|p| !self.oauth.iter().any(|c| c.provider == *p))
            .collect()
    }
}
