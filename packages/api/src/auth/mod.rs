//! Authentication: session tokens, password hashing, OAuth providers and the session guard.

mod adapter;
pub mod config;
mod discord;
mod github;
mod google;
pub mod guard;
mod oauth;
pub mod password;
mod profile;
pub mod token;

pub use adapter::{resolve_login, AdapterError, ResolvedLogin};
pub use config::{ConfigError, OAuthConfig, Settings};
pub use oauth::{IdentityProvider, OAuthClient, OAuthError};
pub use profile::{FieldMapping, ProfileEmail, ProfilePhoto, ProviderProfile};
pub use token::{TokenError, TokenService};
