//! GitHub user payloads (`api.github.com/user` and `/user/emails`).
//!
//! The `/user` payload only carries the public email. When that is empty the
//! `user:email` scope lets us list the account's addresses, primary first.

use reqwest::Client;
use serde::Deserialize;

use super::oauth::OAuthError;
use super::profile::{ProfileEmail, ProfilePhoto, ProviderProfile};

const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";

/// GitHub user info from API.
#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

/// GitHub email info from API.
#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

fn into_profile(user: GitHubUser, mut emails: Vec<GitHubEmail>) -> ProviderProfile {
    let emails = match user.email {
        Some(value) => vec![ProfileEmail {
            value,
            verified: None,
        }],
        None => {
            emails.sort_by_key(|e| !e.primary);
            emails
                .into_iter()
                .map(|e| ProfileEmail {
                    value: e.email,
                    verified: Some(e.verified),
                })
                .collect()
        }
    };

    ProviderProfile {
        id: user.id.to_string(),
        username: Some(user.login),
        display_name: user.name,
        emails,
        photos: user
            .avatar_url
            .map(|value| ProfilePhoto { value })
            .into_iter()
            .collect(),
        avatar: None,
    }
}

pub(super) async fn fetch_profile(
    api: &Client,
    access_token: &str,
) -> Result<ProviderProfile, OAuthError> {
    let user: GitHubUser = api
        .get(USER_URL)
        .bearer_auth(access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    // Get the address list only if the profile has no public email
    let emails: Vec<GitHubEmail> = if user.email.is_some() {
        Vec::new()
    } else {
        api.get(EMAILS_URL)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?
    };

    Ok(into_profile(user, emails))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(json: &str) -> GitHubUser {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_public_email_used_directly() {
        let profile = into_profile(
            user(r#"{"id": 583231, "login": "octocat", "name": "The Octocat",
                     "email": "octocat@github.com", "avatar_url": "https://avatars.githubusercontent.com/u/583231"}"#),
            Vec::new(),
        );

        assert_eq!(profile.id, "583231");
        assert_eq!(profile.username.as_deref(), Some("octocat"));
        assert_eq!(profile.emails.len(), 1);
        assert_eq!(profile.emails[0].value, "octocat@github.com");
        assert_eq!(
            profile.photos[0].value,
            "https://avatars.githubusercontent.com/u/583231"
        );
    }

    #[test]
    fn test_private_email_falls_back_to_list_primary_first() {
        let emails: Vec<GitHubEmail> = serde_json::from_str(
            r#"[
                {"email": "work@example.com", "primary": false, "verified": true, "visibility": null},
                {"email": "me@example.com", "primary": true, "verified": true, "visibility": "private"}
            ]"#,
        )
        .unwrap();
        let profile = into_profile(
            user(r#"{"id": 1, "login": "octocat", "name": null, "email": null, "avatar_url": null}"#),
            emails,
        );

        assert_eq!(profile.emails[0].value, "me@example.com");
        assert_eq!(profile.emails[1].value, "work@example.com");
        assert!(profile.display_name.is_none());
        assert!(profile.photos.is_empty());
    }
}
