//! Auth gate integration tests
//!
//! Rejected requests must never reach a downstream service, and downstream
//! services must only ever see identity headers the gateway wrote itself.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use tower::ServiceExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use sportgate::Service;

use crate::common::{
    admin_token, bearer, constants, expired_token, firebase_token, gateway, gateway_with_state,
    header, router, superadmin_token, token_for, user_token, TestEnv, JWKS,
};
use crate::mocks::MockDownstream;

#[tokio::test]
async fn test_missing_token_is_unauthorized_and_not_forwarded() {
    let buy = MockDownstream::start().await;
    buy.mock_any_json(200, json!([])).await;

    let server = gateway(&TestEnv::new().service(Service::Buy, buy.uri()));

    let response = server.get("/b/client/orders").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"], "UNAUTHORIZED");
    assert!(buy.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_bad_tokens_are_rejected() {
    let buy = MockDownstream::start().await;
    buy.mock_any_json(200, json!([])).await;

    let server = gateway(&TestEnv::new().service(Service::Buy, buy.uri()));

    let forged = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &json!({"sub": "uid-1", "role": "superadmin", "exp": 4_000_000_000u64}),
        &jsonwebtoken::EncodingKey::from_secret(b"not-the-secret"),
    )
    .unwrap();

    for token in [expired_token(), forged, "not.a.jwt".to_string()] {
        let (name, value) = bearer(&token);
        let response = server.get("/b/client/orders").add_header(name, value).await;

        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["error"], "INVALID_TOKEN");
    }

    // Not a bearer credential at all
    let (name, value) = header("authorization", "Basic dXNlcjpwYXNz");
    let response = server.get("/b/client/orders").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    assert!(buy.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_invalid_token_is_rejected_on_public_paths() {
    let products = MockDownstream::start().await;
    products.mock_any_json(200, json!([])).await;

    let server = gateway(&TestEnv::new().service(Service::Product, products.uri()));

    // Public without credentials
    assert_eq!(server.get("/p/products").await.status_code(), StatusCode::OK);

    let (name, value) = bearer(&expired_token());
    let response = server.get("/p/products").add_header(name, value).await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(products.received_requests().await.len(), 1);
}

#[tokio::test]
async fn test_role_hierarchy_is_enforced() {
    let products = MockDownstream::start().await;
    products.mock_any_json(200, json!({"ok": true})).await;
    let users = MockDownstream::start().await;
    users.mock_any_json(200, json!({"ok": true})).await;

    let server = gateway(
        &TestEnv::new()
            .service(Service::Product, products.uri())
            .service(Service::User, users.uri()),
    );

    let cases = [
        ("/p/admin/products", user_token(), StatusCode::FORBIDDEN),
        ("/p/admin/products", admin_token(), StatusCode::OK),
        ("/p/admin/products", superadmin_token(), StatusCode::OK),
        ("/u/admin/roles", admin_token(), StatusCode::FORBIDDEN),
        ("/u/admin/roles", superadmin_token(), StatusCode::OK),
        ("/u/profile", user_token(), StatusCode::OK),
    ];

    for (path, token, expected) in cases {
        let (name, value) = bearer(&token);
        let response = server.get(path).add_header(name, value).await;
        assert_eq!(response.status_code(), expected, "GET {}", path);
    }

    // Only the permitted requests went through
    assert_eq!(products.received_requests().await.len(), 2);
    assert_eq!(users.received_requests().await.len(), 2);
}

#[tokio::test]
async fn test_method_specific_rule() {
    let products = MockDownstream::start().await;
    products.mock_any_json(200, json!({"ok": true})).await;

    let server = gateway(&TestEnv::new().service(Service::Product, products.uri()));

    // Reads are public, writes fall back to the default policy
    assert_eq!(server.get("/p/products").await.status_code(), StatusCode::OK);
    assert_eq!(
        server
            .post("/p/products")
            .json(&json!({}))
            .await
            .status_code(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_numeric_role_claim() {
    let reports = MockDownstream::start().await;
    reports.mock_any_json(200, json!({"total": 0})).await;

    let server = gateway(&TestEnv::new().service(Service::Report, reports.uri()));
    let (name, value) = bearer(&token_for("uid-staff", json!(2)));

    let response = server.get("/r/sales").add_header(name, value).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(reports.single_request().await.headers.get("x-user-role").unwrap(), "2");
}

#[tokio::test]
async fn test_verified_identity_is_forwarded() {
    let buy = MockDownstream::start().await;
    buy.mock_any_json(200, json!([])).await;

    let server = gateway(
        &TestEnv::new()
            .service(Service::Buy, buy.uri())
            .set("INTERNAL_SERVICE_TOKEN", constants::TEST_INTERNAL_TOKEN),
    );
    let (name, value) = bearer(&user_token());

    server.get("/b/client/orders").add_header(name, value).await;

    let request = buy.single_request().await;
    assert_eq!(
        request.headers.get("x-user-uid").unwrap(),
        constants::TEST_USER_ID
    );
    assert_eq!(
        request.headers.get("x-user-email").unwrap(),
        constants::TEST_EMAIL
    );
    assert_eq!(request.headers.get("x-user-role").unwrap(), "3");
    assert_eq!(request.headers.get("x-user-name").unwrap(), "Test Player");
    assert_eq!(
        request.headers.get("x-internal-token").unwrap(),
        constants::TEST_INTERNAL_TOKEN
    );
}

#[tokio::test]
async fn test_spoofed_identity_headers_are_replaced() {
    let buy = MockDownstream::start().await;
    buy.mock_any_json(200, json!([])).await;
    let products = MockDownstream::start().await;
    products.mock_any_json(200, json!([])).await;

    let server = gateway(
        &TestEnv::new()
            .service(Service::Buy, buy.uri())
            .service(Service::Product, products.uri()),
    );

    // Anonymous caller on a public path claiming to be a superadmin
    let (uid_name, uid_value) = header("x-user-uid", "uid-root");
    let (role_name, role_value) = header("x-user-role", "1");
    server
        .get("/p/products")
        .add_header(uid_name.clone(), uid_value.clone())
        .add_header(role_name.clone(), role_value.clone())
        .await;

    let request = products.single_request().await;
    assert!(request.headers.get("x-user-uid").is_none());
    assert!(request.headers.get("x-user-role").is_none());

    // Authenticated caller claiming a higher role
    let (name, value) = bearer(&user_token());
    server
        .get("/b/client/orders")
        .add_header(name, value)
        .add_header(uid_name, uid_value)
        .add_header(role_name, role_value)
        .await;

    let request = buy.single_request().await;
    assert_eq!(
        request.headers.get("x-user-uid").unwrap(),
        constants::TEST_USER_ID
    );
    assert_eq!(request.headers.get("x-user-role").unwrap(), "3");
}

#[tokio::test]
async fn test_spoofed_headers_do_not_grant_access() {
    let reports = MockDownstream::start().await;
    reports.mock_any_json(200, json!({})).await;

    let server = gateway(
        &TestEnv::new()
            .service(Service::Report, reports.uri())
            .set("INTERNAL_SERVICE_TOKEN", constants::TEST_INTERNAL_TOKEN),
    );

    let (uid_name, uid_value) = header("x-user-uid", "uid-root");
    let (role_name, role_value) = header("x-user-role", "1");
    let (token_name, token_value) = header("x-internal-token", "guessed");

    let response = server
        .get("/r/sales")
        .add_header(uid_name, uid_value)
        .add_header(role_name, role_value)
        .add_header(token_name, token_value)
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert!(reports.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_trusted_forwarded_identity() {
    let reports = MockDownstream::start().await;
    reports.mock_any_json(200, json!({})).await;

    let server = gateway(
        &TestEnv::new()
            .service(Service::Report, reports.uri())
            .set("INTERNAL_SERVICE_TOKEN", constants::TEST_INTERNAL_TOKEN),
    );

    let (uid_name, uid_value) = header("x-user-uid", "uid-staff");
    let (role_name, role_value) = header("x-user-role", "2");
    let (token_name, token_value) = header("x-internal-token", "internal-s3cret");

    let response = server
        .get("/r/sales")
        .add_header(uid_name, uid_value)
        .add_header(role_name, role_value)
        .add_header(token_name, token_value)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let request = reports.single_request().await;
    assert_eq!(request.headers.get("x-user-uid").unwrap(), "uid-staff");
    assert_eq!(request.headers.get("x-user-role").unwrap(), "2");
}

#[tokio::test]
async fn test_firebase_tokens_verified_against_jwks() {
    let google = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(JWKS, "application/json"))
        .mount(&google)
        .await;

    let notifications = MockDownstream::start().await;
    notifications.mock_any_json(200, json!([])).await;

    let (server, state) = gateway_with_state(
        &TestEnv::new()
            .unset("AUTH_JWT_SECRET")
            .set("FIREBASE_PROJECT_ID", constants::TEST_FIREBASE_PROJECT)
            .set("FIREBASE_JWKS_URL", format!("{}/jwks", google.uri()))
            .service(Service::Notification, notifications.uri()),
    );
    state.warm_up().await;

    let (name, value) = bearer(&firebase_token("firebase-uid", json!("admin")));
    let response = server
        .get("/n/admin/broadcasts")
        .add_header(name, value)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let request = notifications.single_request().await;
    assert_eq!(request.headers.get("x-user-uid").unwrap(), "firebase-uid");
    assert_eq!(request.headers.get("x-user-role").unwrap(), "2");

    // Shared-secret tokens are not accepted by the Firebase verifier
    let (name, value) = bearer(&user_token());
    let response = server.get("/n/inbox").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

async fn send_raw(env: &TestEnv, method: Method, uri: &str, token: Option<&str>) -> StatusCode {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {}", token));
    }
    router(env)
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_dot_segments_cannot_skip_admin_rule() {
    let products = MockDownstream::start().await;
    products.mock_any_json(200, json!({"ok": true})).await;
    let env = TestEnv::new().service(Service::Product, products.uri());

    for uri in [
        "/p/admin/products",
        "/p/products/../admin/products",
        "/p/products/%2e%2e/admin/products",
        "/p/products/%2E%2E/admin/products",
        "/p/./admin/products",
        "/p//admin/products",
    ] {
        assert_eq!(
            send_raw(&env, Method::GET, uri, None).await,
            StatusCode::UNAUTHORIZED,
            "GET {}",
            uri
        );
        assert_eq!(
            send_raw(&env, Method::GET, uri, Some(&user_token())).await,
            StatusCode::FORBIDDEN,
            "GET {}",
            uri
        );
    }
    assert!(products.received_requests().await.is_empty());

    // The admin still gets through, to the canonical downstream path
    let status = send_raw(
        &env,
        Method::GET,
        "/p/products/%2e%2e/admin/products",
        Some(&admin_token()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(products.single_request().await.url.path(), "/admin/products");
}

#[tokio::test]
async fn test_dot_segments_cannot_escalate_method_rule() {
    let products = MockDownstream::start().await;
    products.mock_any_json(200, json!({"ok": true})).await;
    let env = TestEnv::new()
        .service(Service::Product, products.uri())
        .set(
            "ACCESS_RULES",
            "GET /p=public,/p/admin=admin,DELETE /p/admin/products=superadmin",
        );

    for uri in [
        "/p/admin/products/7",
        "/p/products/../admin/products/7",
        "/p/products/%2e%2e/admin/products/7",
    ] {
        assert_eq!(
            send_raw(&env, Method::DELETE, uri, Some(&user_token())).await,
            StatusCode::FORBIDDEN,
            "DELETE {}",
            uri
        );
        assert_eq!(
            send_raw(&env, Method::DELETE, uri, Some(&admin_token())).await,
            StatusCode::FORBIDDEN,
            "DELETE {}",
            uri
        );
    }
    assert!(products.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_dot_segments_cannot_leave_the_prefix_unchecked() {
    let users = MockDownstream::start().await;
    users.mock_any_json(200, json!({"ok": true})).await;
    let env = TestEnv::new().service(Service::User, users.uri());

    // Climbs out of the public product prefix into the user admin area
    let status = send_raw(
        &env,
        Method::GET,
        "/p/products/../../u/admin/roles",
        Some(&admin_token()),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(users.received_requests().await.is_empty());
}
