//! # gatekeeper-api
//!
//! Local email/password accounts plus federated login through Google, Discord and GitHub.
//! Every successful login ends with a signed session token; protected routes verify it.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`auth`] | Token service, password hashing, OAuth clients, provider adapters, session guard, settings |
//! | [`db`] | `CredentialStore` trait with PostgreSQL and in-memory implementations, migrations |
//! | [`error`] | HTTP error taxonomy (`ApiError`) rendered as `{error, message}` |
//! | [`handlers`] | Register, login, profile, user listing and the OAuth redirect handlers |
//! | [`models`] | `User` records and their password-free projections |
//! | [`routes`] | `AppState` and the axum `Router` |

pub mod auth;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;

pub use auth::{Settings, TokenService};
pub use db::{CredentialStore, MemoryStore, PgStore};
pub use error::ApiError;
pub use models::{Provider, User, UserInfo};
pub use routes::{router, AppState, Redirects};
