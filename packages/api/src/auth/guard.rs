//! Session guard for protected routes.
//!
//! Checks run in order: bearer token present (else 401 `unauthenticated`), token not
//! expired (else 401 `session_expired`), signature valid (else 403 `forbidden`), user still
//! exists (else 404 `not_found`). On success the user, without password hash, is placed in
//! the request extensions as a [`UserInfo`].

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use super::token::TokenService;
use crate::db::CredentialStore;
use crate::error::ApiError;
use crate::models::{User, UserInfo};
use crate::routes::AppState;

/// Extract the bearer token from the Authorization header. The scheme is matched
/// case-insensitively.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|t| !t.is_empty())
}

/// Resolve the user behind the request's bearer token.
pub async fn authenticate(
    headers: &HeaderMap,
    store: &dyn CredentialStore,
    tokens: &TokenService,
) -> Result<User, ApiError> {
    let token = extract_bearer_token(headers).ok_or(ApiError::Unauthenticated)?;
    let user_id = tokens.verify(token)?;

    store
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("this account no longer exists".to_string()))
}

/// Middleware rejecting requests without a valid session.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let outcome = authenticate(request.headers(), state.store.as_ref(), &state.tokens).await;
    match outcome {
        Ok(user) => {
            request.extensions_mut().insert(user.to_info());
            next.run(request).await
        }
        Err(err) => {
            if !matches!(err, ApiError::Internal(_)) {
                warn!(reason = err.tag(), path = %request.uri().path(), "session rejected");
            }
            err.into_response()
        }
    }
}
