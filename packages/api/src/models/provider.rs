//! Identity provider tags stored on every user record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a user authenticates: a local password or one of the federated providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Local,
    Google,
    Discord,
    Github,
}

/// Raised when a stored provider tag is not one we know.
#[derive(Debug, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl Provider {
    /// The federated providers, in the order their routes are mounted.
    pub const FEDERATED: [Provider; 3] = [Provider::Google, Provider::Discord, Provider::Github];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::Google => "google",
            Provider::Discord => "discord",
            Provider::Github => "github",
        }
    }

    pub fn is_federated(self) -> bool {
        !matches!(self, Provider::Local)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Provider::Local),
            "google" => Ok(Provider::Google),
            "discord" => Ok(Provider::Discord),
            "github" => Ok(Provider::Github),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = UnknownProvider;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
