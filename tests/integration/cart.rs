//! Cart checkout through the gateway
//!
//! End-to-end scenario against an emulated buy service: the caller's
//! identity reaches the service as trust headers and the service's own
//! validation errors come back untouched.

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use sportgate::Service;

use crate::common::{bearer, constants, gateway, user_token, TestEnv};
use crate::mocks::MockDownstream;

const CHECKOUT: &str = "/b/client/orders/user/42";

#[tokio::test]
async fn test_checkout_creates_order() {
    let buy = MockDownstream::start().await;
    buy.mock_cart_checkout("42").await;

    let server = gateway(&TestEnv::new().service(Service::Buy, buy.uri()));
    let (name, value) = bearer(&user_token());

    let response = server
        .post(CHECKOUT)
        .add_header(name, value)
        .json(&json!({
            "items": [
                {"productId": 7, "price": 12.5, "quantity": 2},
                {"productId": 9, "price": 5.0, "quantity": 1},
                {"productId": 11, "price": 3.25, "quantity": 4}
            ]
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body = response.json::<Value>();
    // 12.5 * 2 + 5.0 * 1 + 3.25 * 4
    assert_eq!(body["order"]["total"], 43.0);
    assert_eq!(body["order"]["items"], 3);
    assert_eq!(body["order"]["buyer"], constants::TEST_USER_ID);

    let request = buy.single_request().await;
    assert_eq!(request.url.path(), "/client/orders/user/42");
    assert_eq!(
        request.headers.get("content-type").unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_empty_cart_error_is_relayed() {
    let buy = MockDownstream::start().await;
    buy.mock_cart_checkout("42").await;

    let server = gateway(&TestEnv::new().service(Service::Buy, buy.uri()));
    let (name, value) = bearer(&user_token());

    let response = server
        .post(CHECKOUT)
        .add_header(name, value)
        .json(&json!({"items": []}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>(),
        json!({"message": "El carrito está vacío"})
    );
}

#[tokio::test]
async fn test_checkout_requires_login() {
    let buy = MockDownstream::start().await;
    buy.mock_cart_checkout("42").await;

    let server = gateway(&TestEnv::new().service(Service::Buy, buy.uri()));

    let response = server
        .post(CHECKOUT)
        .json(&json!({"items": [{"price": 1.0, "quantity": 1}]}))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert!(buy.received_requests().await.is_empty());
}
