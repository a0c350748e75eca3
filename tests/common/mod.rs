//! Common test utilities for the gateway
//!
//! Builds gateway configuration without touching process environment
//! variables, mints tokens and wraps the router in an in-memory test server.

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use sportgate::{routes, AppState, Config, Service};

/// Test configuration constants
pub mod constants {
    /// Shared secret used to sign test tokens
    pub const TEST_JWT_SECRET: &str = "integration-test-secret";
    /// Token the gateway attaches to downstream calls
    pub const TEST_INTERNAL_TOKEN: &str = "internal-s3cret";
    /// Firebase project used with the RSA fixture key
    pub const TEST_FIREBASE_PROJECT: &str = "club-app";
    /// Key id of the RSA fixture key in `fixtures/jwks.json`
    pub const TEST_KEY_ID: &str = "test-key-1";
    pub const TEST_USER_ID: &str = "uid-42";
    pub const TEST_EMAIL: &str = "player@club.example";
}

pub const JWKS: &str = include_str!("../fixtures/jwks.json");
pub const PRIVATE_KEY: &str = include_str!("../fixtures/firebase_test_key.pem");

/// Environment variables for one gateway instance
#[derive(Debug, Clone)]
pub struct TestEnv {
    vars: Vec<(String, String)>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    /// Shared-secret verification and no downstream services
    pub fn new() -> Self {
        Self {
            vars: vec![(
                "AUTH_JWT_SECRET".to_string(),
                constants::TEST_JWT_SECRET.to_string(),
            )],
        }
    }

    /// Set a variable, replacing any earlier value
    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.retain(|(k, _)| k != key);
        self.vars.push((key.to_string(), value.into()));
        self
    }

    /// Remove a variable
    pub fn unset(mut self, key: &str) -> Self {
        self.vars.retain(|(k, _)| k != key);
        self
    }

    /// Point a service at a base URL
    pub fn service(self, service: Service, url: impl Into<String>) -> Self {
        self.set(service.env_var(), url)
    }

    pub fn config(&self) -> Config {
        let vars = self.vars.clone();
        Config::from_lookup(move |key| {
            vars.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
        .expect("test configuration should be valid")
    }
}

/// Build the gateway state and an in-memory server for it
pub fn gateway_with_state(env: &TestEnv) -> (TestServer, Arc<AppState>) {
    routes::metrics::init_metrics();

    let state = Arc::new(AppState::new(env.config()).expect("failed to build app state"));
    let server = TestServer::new(routes::create_router(state.clone()))
        .expect("failed to start test server");
    (server, state)
}

pub fn gateway(env: &TestEnv) -> TestServer {
    gateway_with_state(env).0
}

/// The bare router, for requests whose URI must reach the gateway verbatim
pub fn router(env: &TestEnv) -> axum::Router {
    routes::metrics::init_metrics();

    let state = Arc::new(AppState::new(env.config()).expect("failed to build app state"));
    routes::create_router(state)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// HS256 token signed with the test secret
pub fn sign(claims: Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(constants::TEST_JWT_SECRET.as_bytes()),
    )
    .expect("failed to sign token")
}

/// Valid token for a uid with a role claim
pub fn token_for(uid: &str, role: Value) -> String {
    sign(json!({
        "sub": uid,
        "email": constants::TEST_EMAIL,
        "name": "Test Player",
        "role": role,
        "exp": now() + 3600,
    }))
}

pub fn user_token() -> String {
    token_for(constants::TEST_USER_ID, json!("user"))
}

pub fn admin_token() -> String {
    token_for("uid-admin", json!("admin"))
}

pub fn superadmin_token() -> String {
    token_for("uid-root", json!("superadmin"))
}

pub fn expired_token() -> String {
    sign(json!({
        "sub": constants::TEST_USER_ID,
        "role": "user",
        "exp": now() - 3600,
    }))
}

/// RS256 Firebase-style token signed with the fixture key
pub fn firebase_token(uid: &str, role: Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(constants::TEST_KEY_ID.to_string());
    let issuer = format!(
        "https://securetoken.google.com/{}",
        constants::TEST_FIREBASE_PROJECT
    );
    encode(
        &header,
        &json!({
            "sub": uid,
            "aud": constants::TEST_FIREBASE_PROJECT,
            "iss": issuer,
            "role": role,
            "iat": now(),
            "exp": now() + 3600,
        }),
        &EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).expect("invalid fixture key"),
    )
    .expect("failed to sign token")
}

/// `Authorization` header for a token
pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        axum::http::header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).expect("invalid token header"),
    )
}

pub fn header(name: &'static str, value: &'static str) -> (HeaderName, HeaderValue) {
    (HeaderName::from_static(name), HeaderValue::from_static(value))
}
