//! Session token issuance and verification.
//!
//! Tokens are HS256 JWTs whose `sub` claim is the user's id. They are stateless:
//! validity is signature plus expiry, there is no revocation list.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default token lifetime label.
pub const DEFAULT_TTL: &str = "1h";

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Signature is fine but `exp` has passed.
    #[error("token has expired")]
    Expired,

    /// Malformed token, bad signature or unusable subject.
    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("invalid token lifetime '{0}'")]
    InvalidTtl(String),
}

/// Signs and verifies session tokens with a shared secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    ttl_label: String,
}

impl TokenService {
    /// Create a token service. `ttl` is parsed by [`parse_ttl`].
    pub fn new(secret: &str, ttl: &str) -> Result<Self, TokenError> {
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: parse_ttl(ttl)?,
            ttl_label: ttl.to_string(),
        })
    }

    /// The configured lifetime as written in configuration, e.g. `"1h"`.
    pub fn expires_in(&self) -> &str {
        &self.ttl_label
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `user_id` expiring one TTL from now.
    pub fn issue(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue_at(user_id, Utc::now())
    }

    pub(crate) fn issue_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<String, TokenError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| TokenError::InvalidTtl(self.ttl_label.clone()))?;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token and return the user id it was issued for.
    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;

        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| TokenError::Invalid("subject is not a user id".to_string()))
    }
}

/// Parse a lifetime such as `3600`, `45s`, `30m`, `1h`, `7d`, `2w` or `2 days`.
///
/// Units may be spelled out (`minutes`, `hrs`, `weeks`). Bare numbers are seconds. A
/// lifetime that would push expiry past the representable date range is rejected.
pub fn parse_ttl(raw: &str) -> Result<Duration, TokenError> {
    let invalid = || TokenError::InvalidTtl(raw.to_string());
    let s = raw.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let value: i64 = digits.parse().map_err(|_| invalid())?;
    if value <= 0 {
        return Err(invalid());
    }

    let duration = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Duration::try_seconds(value),
        "m" | "min" | "mins" | "minute" | "minutes" => Duration::try_minutes(value),
        "h" | "hr" | "hrs" | "hour" | "hours" => Duration::try_hours(value),
        "d" | "day" | "days" => Duration::try_days(value),
        "w" | "week" | "weeks" => Duration::try_weeks(value),
        _ => None,
    }
    .ok_or_else(invalid)?;

    if Utc::now().checked_add_signed(duration).is_none() {
        return Err(invalid());
    }
    Ok(duration)
}
