//! Shared harness for the router-level integration tests: an in-memory store,
//! cheap password hashing and a JSON request helper.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use flashcard_lms_core::domain::{NewUser, Role, User};
use lms_api::{
    adapters::InMemoryDatabase,
    auth::PasswordHasher,
    config::Config,
    web::{self, AppState},
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

pub const PASSWORD: &str = "Str0ng!Pass";

pub struct TestApp {
    pub router: Router,
    pub db: Arc<InMemoryDatabase>,
    pub state: Arc<AppState>,
}

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "memory://"),
        ("JWT_SECRET", "integration-test-secret-that-is-long-enough"),
        ("PASSWORD_HASH_MEMORY_KIB", "1024"),
        ("PASSWORD_HASH_ITERATIONS", "1"),
        ("RUST_LOG", "WARN"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).expect("test config")
}

impl TestApp {
    pub fn new() -> Self {
        let config = Arc::new(test_config());
        let db = Arc::new(InMemoryDatabase::new());
        let state = Arc::new(AppState::new(config, db.clone()).expect("app state"));
        let router = web::router(state.clone());
        Self { router, db, state }
    }

    /// Sends one request through the router and returns the status and JSON body
    /// (`Value::Null` when the body is empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        self.send(request).await
    }

    /// Posts an `application/x-www-form-urlencoded` body.
    pub async fn post_form(&self, uri: &str, form: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .expect("request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    /// Creates an account of any role directly in the store.
    pub async fn seed(&self, role: Role, name: &str) -> User {
        let hasher = PasswordHasher::new(1024, 1).expect("hasher");
        self.db
            .seed_user(NewUser {
                email: format!("{}@example.com", name),
                username: name.to_string(),
                full_name: format!("{} Example", name),
                hashed_password: hasher.hash(PASSWORD).expect("hash"),
                role,
            })
            .await
            .expect("seed user")
    }

    /// Logs in and returns `(access_token, refresh_token)`.
    pub async fn login(&self, name: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/auth/login",
                None,
                json!({ "email": format!("{}@example.com", name), "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        (
            body["access_token"].as_str().expect("access token").to_string(),
            body["refresh_token"].as_str().expect("refresh token").to_string(),
        )
    }

    /// Seeds a user and logs them in.
    pub async fn user_with_token(&self, role: Role, name: &str) -> (User, String) {
        let user = self.seed(role, name).await;
        let (access, _) = self.login(name).await;
        (user, access)
    }
}
