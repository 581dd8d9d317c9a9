//! Data models for the application.

mod provider;
mod user;

pub use provider::{Provider, UnknownProvider};
pub use user::{User, UserInfo, UserSummary};
