//! # User model
//!
//! Defines the three representations of a user:
//!
//! ## [`User`]
//!
//! The complete row from the `users` table, loadable with [`sqlx::FromRow`]:
//!
//! - `id`: primary key (`UUID v4`), used as the session token subject.
//! - `email`, `name`, `picture`: profile fields captured at creation time. `email` may be
//!   absent for federated users whose provider exposes no verified address.
//! - `provider` / `provider_id`: how the user authenticates. Local accounts have
//!   `provider = local` and no `provider_id`; federated accounts carry the provider's
//!   external id.
//! - `password_hash`: Argon2 PHC string, present only for local accounts.
//!
//! ## [`UserInfo`]
//!
//! The full record with the password hash stripped, as returned by `GET /profile` and
//! the user listing. The external id is surfaced under a provider-specific key
//! (`googleId`, `discordId` or `githubId`).
//!
//! ## [`UserSummary`]
//!
//! The short form embedded in register/login responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Provider;

/// Full user record from the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    #[sqlx(try_from = "String")]
    pub provider: Provider,
    pub provider_id: Option<String>,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Convert to UserInfo, dropping the password hash.
    pub fn to_info(&self) -> UserInfo {
        let external_id = |p: Provider| {
            if self.provider == p {
                self.provider_id.clone()
            } else {
                None
            }
        };

        UserInfo {
            id: self.id.to_string(),
            email: self.email.clone(),
            name: self.name.clone(),
            picture: self.picture.clone(),
            provider: self.provider,
            google_id: external_id(Provider::Google),
            discord_id: external_id(Provider::Discord),
            github_id: external_id(Provider::Github),
            created_at: self.created_at,
        }
    }

    /// Short form for register/login responses.
    pub fn to_summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.to_string(),
            email: self.email.clone(),
            name: self.name.clone(),
            provider: self.provider,
            picture: self.picture.clone(),
        }
    }
}

/// User record safe to send to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserInfo {
    /// Get display name, falling back to email, then to the id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Compact user view embedded in auth responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}
