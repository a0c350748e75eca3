//! HTTP routes for the gateway
//!
//! This module defines all HTTP endpoints exposed by the gateway.

pub mod gateway;
pub mod health;
pub mod metrics;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{
    middleware::{
        auth::auth_middleware,
        compression::{compression_layer, compression_opt_out},
        cors::cors_layer,
    },
    AppState,
};

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Every prefixed path goes through the auth gate before the proxy
    // handler. `route_layer` keeps unmatched paths on the fallback.
    let proxied_routes = Router::new()
        .route("/:prefix", any(gateway::proxy_handler))
        .route("/:prefix/*rest", any(gateway::proxy_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Public routes (health checks, metrics) - no auth required
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    // Middleware is applied in reverse order (last applied runs first):
    // trace, then CORS, then the compression opt-out, then compression
    Router::new()
        .merge(public_routes)
        .merge(proxied_routes)
        .fallback(gateway::not_found)
        .layer(compression_layer(&state.config.compression))
        .layer(middleware::from_fn(compression_opt_out))
        .layer(cors_layer(&state.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
