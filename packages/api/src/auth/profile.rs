//! # Provider profiles and field mapping
//!
//! Each provider client converts its API payload into a [`ProviderProfile`] with the
//! same shape for every provider. A [`FieldMapping`] then decides, per provider, which
//! profile fields become the local user's email, name and picture:
//!
//! | Provider | name | picture |
//! |----------|------|---------|
//! | Google   | display name | first photo URL |
//! | Discord  | username | CDN URL built from the avatar hash |
//! | GitHub   | display name, else username | first photo URL |
//!
//! Every provider takes the first email entry that is not marked unverified.

use serde::{Deserialize, Serialize};

use crate::db::NewProviderUser;
use crate::models::Provider;

/// Base URL for Discord avatar images, which the API only reports as a hash.
pub const DISCORD_AVATAR_CDN: &str = "https://cdn.discordapp.com/avatars";

/// Normalized OAuth callback profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub emails: Vec<ProfileEmail>,
    #[serde(default)]
    pub photos: Vec<ProfilePhoto>,
    /// Opaque avatar asset reference, for providers that do not return a URL.
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEmail {
    pub value: String,
    /// `None` when the provider does not say.
    #[serde(default)]
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePhoto {
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    DisplayName,
    Username,
    DisplayNameOrUsername,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureSource {
    FirstPhoto,
    /// `<cdn>/<external id>/<avatar>.png`
    AvatarAsset { cdn: &'static str },
}

/// Per-provider rules for turning a profile into a new local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: NameSource,
    pub picture: PictureSource,
}

const GOOGLE: FieldMapping = FieldMapping {
    name: NameSource::DisplayName,
    picture: PictureSource::FirstPhoto,
};

const DISCORD: FieldMapping = FieldMapping {
    name: NameSource::Username,
    picture: PictureSource::AvatarAsset {
        cdn: DISCORD_AVATAR_CDN,
    },
};

const GITHUB: FieldMapping = FieldMapping {
    name: NameSource::DisplayNameOrUsername,
    picture: PictureSource::FirstPhoto,
};

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl FieldMapping {
    /// The mapping for a federated provider; `None` for local accounts.
    pub fn for_provider(provider: Provider) -> Option<FieldMapping> {
        match provider {
            Provider::Google => Some(GOOGLE),
            Provider::Discord => Some(DISCORD),
            Provider::Github => Some(GITHUB),
            Provider::Local => None,
        }
    }

    pub fn email(&self, profile: &ProviderProfile) -> Option<String> {
        profile
            .emails
            .iter()
            .find(|e| e.verified != Some(false) && !e.value.trim().is_empty())
            .map(|e| e.value.trim().to_string())
    }

    pub fn name(&self, profile: &ProviderProfile) -> Option<String> {
        let display_name = non_empty(profile.display_name.as_ref());
        let username = non_empty(profile.username.as_ref());
        match self.name {
            NameSource::DisplayName => display_name,
            NameSource::Username => username,
            NameSource::DisplayNameOrUsername => display_name.or(username),
        }
    }

    pub fn picture(&self, profile: &ProviderProfile) -> Option<String> {
        match self.picture {
            PictureSource::FirstPhoto => non_empty(profile.photos.first().map(|p| &p.value)),
            PictureSource::AvatarAsset { cdn } => non_empty(profile.avatar.as_ref())
                .map(|hash| format!("{cdn}/{}/{hash}.png", profile.id)),
        }
    }

    /// Build the record to create for a first-time login.
    pub fn normalize(&self, provider: Provider, profile: &ProviderProfile) -> NewProviderUser {
        NewProviderUser {
            provider,
            external_id: profile.id.clone(),
            email: self.email(profile),
            name: self.name(profile),
            picture: self.picture(profile),
        }
    }
}
