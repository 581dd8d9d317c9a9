//! Discord current-user payload (`discord.com/api/users/@me`).
//!
//! Discord reports the avatar as an asset hash, not a URL; it is carried through as
//! [`ProviderProfile::avatar`] and turned into a CDN URL by the field mapping.

use reqwest::Client;
use serde::Deserialize;

use super::oauth::OAuthError;
use super::profile::{ProfileEmail, ProviderProfile};

const USERINFO_URL: &str = "https://discord.com/api/users/@me";

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    global_name: Option<String>,
    avatar: Option<String>,
    email: Option<String>,
    verified: Option<bool>,
}

impl From<DiscordUser> for ProviderProfile {
    fn from(user: DiscordUser) -> Self {
        ProviderProfile {
            id: user.id,
            username: Some(user.username),
            display_name: user.global_name,
            emails: user
                .email
                .map(|value| ProfileEmail {
                    value,
                    verified: user.verified,
                })
                .into_iter()
                .collect(),
            photos: Vec::new(),
            avatar: user.avatar,
        }
    }
}

pub(super) async fn fetch_profile(
    api: &Client,
    access_token: &str,
) -> Result<ProviderProfile, OAuthError> {
    let user: DiscordUser = api
        .get(USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(user.into())
}
