//! Router-level tests: the full axum router over the in-memory store and a stub provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use gatekeeper_api::auth::{IdentityProvider, OAuthError, ProfileEmail, ProviderProfile};
use gatekeeper_api::db::{NewLocalUser, NewProviderUser, StoreError};
use gatekeeper_api::models::User;
use gatekeeper_api::{
    router, AppState, CredentialStore, MemoryStore, Provider, Redirects, TokenService,
};
use http_body_util::BodyExt;
use oauth2::url::Url;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "integration-secret";

/// Identity provider that skips the network and answers with a fixed profile.
struct StubProvider {
    provider: Provider,
    profile: Option<ProviderProfile>,
    exchanges: AtomicUsize,
}

impl StubProvider {
    fn new(provider: Provider, profile: Option<ProviderProfile>) -> Arc<Self> {
        Arc::new(Self {
            provider,
            profile,
            exchanges: AtomicUsize::new(0),
        })
    }

    fn google(profile: Option<ProviderProfile>) -> Arc<Self> {
        Self::new(Provider::Google, profile)
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn authorize_url(&self) -> Result<String, OAuthError> {
        Ok("https://accounts.example.com/o/oauth2/auth?client_id=stub&state=xyz".to_string())
    }

    async fn exchange(&self, code: &str, _state: &str) -> Result<ProviderProfile, OAuthError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        match &self.profile {
            Some(profile) if code == "good" => Ok(profile.clone()),
            _ => Err(OAuthError::Exchange("invalid_grant".to_string())),
        }
    }
}

/// Store whose every call fails, as when the database is down.
struct BrokenStore;

#[async_trait]
impl CredentialStore for BrokenStore {
    async fn find_by_id(&self, _id: Uuid) -> Result<Option<User>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn find_by_provider_id(
        &self,
        _provider: Provider,
        _external_id: &str,
    ) -> Result<Option<User>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn create_local_user(&self, _new_user: NewLocalUser) -> Result<User, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn create_provider_user(&self, _new_user: NewProviderUser) -> Result<User, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

fn tokens() -> TokenService {
    TokenService::new(SECRET, "1h").unwrap()
}

fn redirects() -> Redirects {
    Redirects::new(
        Url::parse("http://localhost:3000/auth/callback").unwrap(),
        "/login",
    )
}

fn app(store: Arc<dyn CredentialStore>, expose_user_listing: bool) -> Router {
    router(AppState::new(store, tokens(), redirects()), expose_user_listing)
}

fn app_with_stub(store: MemoryStore, stub: Arc<StubProvider>) -> Router {
    let state = AppState::new(Arc::new(store), tokens(), redirects()).with_provider(stub);
    router(state, false)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

fn token_from_redirect(location: &str) -> String {
    let url = Url::parse(location).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

fn register_body() -> Value {
    json!({"email": "a@x.com", "password": "secret1", "name": "A"})
}

fn google_profile() -> ProviderProfile {
    ProviderProfile {
        id: "g1".to_string(),
        display_name: Some("B".to_string()),
        emails: vec![ProfileEmail {
            value: "b@x.com".to_string(),
            verified: None,
        }],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_register_then_profile() {
    let store = MemoryStore::new();
    let app = app(Arc::new(store.clone()), false);

    let response = app
        .clone()
        .oneshot(post_json("/register", register_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["user"]["email"], "a@x.com");
    assert_eq!(body["user"]["provider"], "local");
    assert_eq!(body["expiresIn"], "1h");
    assert!(body["user"].get("passwordHash").is_none());

    let token = body["token"].as_str().unwrap();
    assert!(!token.is_empty());
    let user_id = tokens().verify(token).unwrap();
    assert_eq!(body["user"]["id"], user_id.to_string());

    let response = app
        .oneshot(get_with_token("/profile", token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user"]["email"], "a@x.com");
    assert_eq!(body["user"]["name"], "A");
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_register_normalizes_email() {
    let store = MemoryStore::new();
    let app = app(Arc::new(store.clone()), false);

    let response = app
        .clone()
        .oneshot(post_json(
            "/register",
            json!({"email": "  A@X.com ", "password": "secret1", "name": "A"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["user"]["email"], "a@x.com");

    let response = app
        .oneshot(post_json("/login", json!({"email": "a@x.com", "password": "secret1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let store = MemoryStore::new();
    let app = app(Arc::new(store.clone()), false);

    let first = app
        .clone()
        .oneshot(post_json("/register", register_body()))
        .await
        .unwrap();
    let first_id = json_body(first).await["user"]["id"].clone();

    let response = app
        .clone()
        .oneshot(post_json(
            "/register",
            json!({"email": "a@x.com", "password": "another1", "name": "Imposter"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"], "conflict");
    assert_eq!(store.len(), 1);

    // The first account still logs in with its own password.
    let response = app
        .oneshot(post_json("/login", json!({"email": "a@x.com", "password": "secret1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user"]["id"], first_id);
    assert_eq!(body["user"]["name"], "A");
}

#[tokio::test]
async fn test_login_success_and_failures() {
    let app = app(Arc::new(MemoryStore::new()), false);
    app.clone()
        .oneshot(post_json("/register", register_body()))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json("/login", json!({"email": "a@x.com", "password": "secret1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Login successful");
    assert!(tokens().verify(body["token"].as_str().unwrap()).is_ok());

    let wrong_password = app
        .clone()
        .oneshot(post_json("/login", json!({"email": "a@x.com", "password": "wrong"})))
        .await
        .unwrap();
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password = json_body(wrong_password).await;

    let unknown_email = app
        .oneshot(post_json("/login", json!({"email": "nobody@x.com", "password": "secret1"})))
        .await
        .unwrap();
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    let unknown_email = json_body(unknown_email).await;

    assert_eq!(wrong_password["error"], "invalid_credentials");
    assert_eq!(wrong_password, unknown_email);
}

#[tokio::test]
async fn test_invalid_register_input() {
    let store = MemoryStore::new();
    let app = app(Arc::new(store.clone()), false);

    let cases = [
        json!({"email": "a@x.com", "password": "12345", "name": "A"}),
        json!({"email": "a@x.com", "name": "A"}),
        json!({"email": "a@x.com", "password": "secret1", "name": "   "}),
        json!({"email": "not-an-email", "password": "secret1", "name": "A"}),
    ];
    for body in cases {
        let response = app
            .clone()
            .oneshot(post_json("/register", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(json_body(response).await["error"], "invalid_input");
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_invalid_input() {
    let app = app(Arc::new(MemoryStore::new()), false);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_input");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .body(Body::from("email=a@x.com"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_input");
}

#[tokio::test]
async fn test_profile_guard_outcomes() {
    let app = app(Arc::new(MemoryStore::new()), false);

    let response = app.clone().oneshot(get("/profile")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unauthenticated");

    let forged = TokenService::new("someone-else", "1h")
        .unwrap()
        .issue(Uuid::new_v4())
        .unwrap();
    let response = app
        .clone()
        .oneshot(get_with_token("/profile", &forged))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "forbidden");

    let orphan = tokens().issue(Uuid::new_v4()).unwrap();
    let response = app
        .oneshot(get_with_token("/profile", &orphan))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let app = app(Arc::new(BrokenStore), false);
    let token = tokens().issue(Uuid::new_v4()).unwrap();

    let response = app
        .clone()
        .oneshot(get_with_token("/profile", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "internal_error");
    assert!(!body["message"].as_str().unwrap().contains("connection refused"));

    let response = app
        .oneshot(post_json("/login", json!({"email": "a@x.com", "password": "secret1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_google_callback_creates_user_once() {
    let store = MemoryStore::new();
    let stub = StubProvider::google(Some(google_profile()));
    let app = app_with_stub(store.clone(), stub.clone());

    let response = app
        .clone()
        .oneshot(get("/google/callback?code=good&state=s1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let redirect = location(&response);
    assert!(redirect.starts_with("http://localhost:3000/auth/callback?token="));

    let user_id = tokens().verify(&token_from_redirect(&redirect)).unwrap();
    let user = store.find_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(user.provider, Provider::Google);
    assert_eq!(user.provider_id.as_deref(), Some("g1"));
    assert_eq!(user.email.as_deref(), Some("b@x.com"));
    assert_eq!(user.name.as_deref(), Some("B"));
    assert!(user.password_hash.is_none());

    let response = app
        .oneshot(get("/google/callback?code=good&state=s2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let again = tokens().verify(&token_from_redirect(&location(&response))).unwrap();
    assert_eq!(again, user_id);
    assert_eq!(store.len(), 1);
    assert_eq!(stub.exchanges.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_callback_failures_redirect_to_login() {
    let store = MemoryStore::new();
    let stub = StubProvider::google(Some(google_profile()));
    let app = app_with_stub(store.clone(), stub.clone());

    let cases = [
        ("/google/callback?state=s1", "/login?error=missing_code"),
        ("/google/callback?code=good", "/login?error=missing_state"),
        (
            "/google/callback?error=access_denied&state=s1",
            "/login?error=provider_denied",
        ),
        ("/google/callback?code=bad&state=s1", "/login?error=oauth_error"),
        (
            "/google/callback?code=good&code=bad&state=s1",
            "/login?error=oauth_error",
        ),
    ];
    for (uri, expected) in cases {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND, "{uri}");
        assert_eq!(location(&response), expected, "{uri}");
    }

    // Only the bad code reached the provider; the repeated code was rejected before exchange.
    assert_eq!(stub.exchanges.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_discord_callback_stores_username_and_cdn_avatar() {
    let store = MemoryStore::new();
    let profile = ProviderProfile {
        id: "80351110224678912".to_string(),
        username: Some("nelly".to_string()),
        display_name: Some("Nelly Display".to_string()),
        emails: vec![ProfileEmail {
            value: "nelly@discord.com".to_string(),
            verified: Some(true),
        }],
        avatar: Some("8342729096ea3675442027381ff50dfe".to_string()),
        ..Default::default()
    };
    let app = app_with_stub(store.clone(), StubProvider::new(Provider::Discord, Some(profile)));

    let response = app
        .clone()
        .oneshot(get("/discord/callback?code=good&state=s1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let user_id = tokens().verify(&token_from_redirect(&location(&response))).unwrap();
    let user = store.find_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(user.provider, Provider::Discord);
    assert_eq!(user.provider_id.as_deref(), Some("80351110224678912"));
    assert_eq!(user.name.as_deref(), Some("nelly"));
    assert_eq!(user.email.as_deref(), Some("nelly@discord.com"));
    assert_eq!(
        user.picture.as_deref(),
        Some("https://cdn.discordapp.com/avatars/80351110224678912/8342729096ea3675442027381ff50dfe.png")
    );

    // Google is not configured in this app.
    let response = app.oneshot(get("/google")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lowercase_bearer_scheme_is_accepted() {
    let app = app(Arc::new(MemoryStore::new()), false);
    let response = app
        .clone()
        .oneshot(post_json("/register", register_body()))
        .await
        .unwrap();
    let token = json_body(response).await["token"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri("/profile")
        .header(header::AUTHORIZATION, format!("bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_provider_profile_without_id_is_login_error() {
    let store = MemoryStore::new();
    let stub = StubProvider::google(Some(ProviderProfile::default()));
    let app = app_with_stub(store.clone(), stub);

    let response = app
        .oneshot(get("/google/callback?code=good&state=s1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login?error=login_error");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_initiate_redirects_to_provider() {
    let app = app_with_stub(MemoryStore::new(), StubProvider::google(None));

    let response = app.clone().oneshot(get("/google")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(location(&response).starts_with("https://accounts.example.com/o/oauth2/auth"));

    // Providers without credentials are not mounted.
    let response = app.oneshot(get("/discord")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_listing_is_opt_in() {
    let store = MemoryStore::new();
    let hidden = app(Arc::new(store.clone()), false);
    hidden
        .clone()
        .oneshot(post_json("/register", register_body()))
        .await
        .unwrap();

    let response = hidden.oneshot(get("/users")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let exposed = app(Arc::new(store), true);
    let response = exposed.oneshot(get("/users")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["count"], 1);
    let listed = &body["users"][0];
    assert_eq!(listed["email"], "a@x.com");
    assert!(listed.get("passwordHash").is_none());
    assert!(listed.get("password_hash").is_none());
}
