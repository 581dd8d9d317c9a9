//! Google userinfo payload (`googleapis.com/oauth2/v2/userinfo`).

use reqwest::Client;
use serde::Deserialize;

use super::oauth::OAuthError;
use super::profile::{ProfileEmail, ProfilePhoto, ProviderProfile};

const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Google user info from API.
#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: Option<String>,
    verified_email: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

impl From<GoogleUser> for ProviderProfile {
    fn from(user: GoogleUser) -> Self {
        ProviderProfile {
            id: user.id,
            username: None,
            display_name: user.name,
            emails: user
                .email
                .map(|value| ProfileEmail {
                    value,
                    verified: user.verified_email,
                })
                .into_iter()
                .collect(),
            photos: user
                .picture
                .map(|value| ProfilePhoto { value })
                .into_iter()
                .collect(),
            avatar: None,
        }
    }
}

pub(super) async fn fetch_profile(
    api: &Client,
    access_token: &str,
) -> Result<ProviderProfile, OAuthError> {
    let user: GoogleUser = api
        .get(USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(user.into())
}
