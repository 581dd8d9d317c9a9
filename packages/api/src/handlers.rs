//! # Request handlers
//!
//! | Route | Handler | Notes |
//! |-------|---------|-------|
//! | `POST /register` | [`register`] | local signup, 201 + token |
//! | `POST /login` | [`login`] | local login, unknown email and wrong password both give `invalid_credentials` |
//! | `GET /profile` | [`profile`] | behind the session guard |
//! | `GET /users` | [`list_users`] | debug listing, mounted only when enabled |
//! | `GET /<provider>` | [`provider_initiate`] | 302 to the consent screen |
//! | `GET /<provider>/callback` | [`provider_callback`] | 302 to the front end with `?token=`, or to the failure location |
//!
//! The OAuth routes never answer with JSON: the browser is mid-redirect, so every outcome
//! is a redirect.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::auth::password::MIN_PASSWORD_LEN;
use crate::auth::resolve_login;
use crate::db::NewLocalUser;
use crate::error::ApiError;
use crate::models::{Provider, UserInfo, UserSummary};
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Body of a successful register or login.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub message: String,
    pub user: UserSummary,
    pub token: String,
    pub expires_in: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub message: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub message: String,
    pub count: usize,
    pub users: Vec<UserInfo>,
}

/// Query string of an OAuth callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user refused consent.
    pub error: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_email(value: Option<String>) -> Option<String> {
    trimmed(value).map(|v| v.to_lowercase())
}

/// Passwords are taken verbatim; only emptiness counts as missing.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// `POST /register`
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(body) = payload?;

    let (Some(email), Some(password), Some(name)) = (
        normalize_email(body.email),
        present(body.password),
        trimmed(body.name),
    ) else {
        return Err(ApiError::InvalidInput(
            "email, password and name are required".to_string(),
        ));
    };

    if !email.contains('@') {
        return Err(ApiError::InvalidInput("invalid email address".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.store.find_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict(
            "an account already exists with this email".to_string(),
        ));
    }

    // The store's uniqueness check also covers a registration racing this one.
    let user = state
        .store
        .create_local_user(NewLocalUser {
            email,
            password,
            name,
        })
        .await?;

    let token = state.tokens.issue(user.id)?;
    info!(user_id = %user.id, "registered local user");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "Account created successfully".to_string(),
            user: user.to_summary(),
            token,
            expires_in: state.tokens.expires_in().to_string(),
        }),
    ))
}

/// `POST /login`
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(body) = payload?;

    let (Some(email), Some(password)) = (normalize_email(body.email), present(body.password))
    else {
        return Err(ApiError::InvalidInput(
            "email and password are required".to_string(),
        ));
    };

    let Some(user) = state.store.find_by_email(&email).await? else {
        warn!("login attempt for unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    if !state.store.compare_password(&user, &password).await? {
        warn!(user_id = %user.id, "login attempt with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.tokens.issue(user.id)?;
    info!(user_id = %user.id, "user logged in");

    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        user: user.to_summary(),
        token,
        expires_in: state.tokens.expires_in().to_string(),
    }))
}

/// `GET /profile`
pub async fn profile(Extension(user): Extension<UserInfo>) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        message: "User profile".to_string(),
        user,
    })
}

/// `GET /users`
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UserListResponse>, ApiError> {
    let users: Vec<UserInfo> = state
        .store
        .list_users()
        .await?
        .iter()
        .map(|u| u.to_info())
        .collect();

    Ok(Json(UserListResponse {
        message: "User list".to_string(),
        count: users.len(),
        users,
    }))
}

/// `302 Found` to `location`.
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// `GET /<provider>`
pub async fn provider_initiate(state: &AppState, provider: Provider) -> Response {
    let Some(identity) = state.providers.get(&provider) else {
        return found(state.redirects.failure("oauth_error"));
    };

    match identity.authorize_url().await {
        Ok(url) => found(url),
        Err(e) => {
            error!(%provider, error = %e, "failed to start authorization");
            found(state.redirects.failure("oauth_error"))
        }
    }
}

/// `GET /<provider>/callback`
pub async fn provider_callback(
    state: &AppState,
    provider: Provider,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            warn!(%provider, reason = %rejection.body_text(), "malformed callback query");
            return found(state.redirects.failure("oauth_error"));
        }
    };
    if let Some(reason) = params.error {
        warn!(%provider, %reason, "provider returned an error");
        return found(state.redirects.failure("provider_denied"));
    }
    let Some(code) = params.code else {
        error!(%provider, "callback missing code");
        return found(state.redirects.failure("missing_code"));
    };
    let Some(oauth_state) = params.state else {
        error!(%provider, "callback missing state");
        return found(state.redirects.failure("missing_state"));
    };
    let Some(identity) = state.providers.get(&provider) else {
        return found(state.redirects.failure("oauth_error"));
    };

    let profile = match identity.exchange(&code, &oauth_state).await {
        Ok(profile) => profile,
        Err(e) => {
            error!(%provider, error = %e, "OAuth exchange failed");
            return found(state.redirects.failure("oauth_error"));
        }
    };

    match resolve_login(state.store.as_ref(), &state.tokens, provider, &profile).await {
        Ok(login) => {
            info!(%provider, user_id = %login.user.id, created = login.created, "federated login");
            found(state.redirects.success(&login.token))
        }
        Err(e) => {
            error!(%provider, error = %e, "failed to resolve federated login");
            found(state.redirects.failure("login_error"))
        }
    }
}
