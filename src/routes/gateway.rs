//! Proxy handler
//!
//! Terminal handler for every prefixed path. The auth gate has already
//! resolved the route and the caller; this forwards the request and relays
//! the downstream response.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    response::Response,
    Extension,
};
use tracing::info;

use crate::{
    error::AppError,
    middleware::auth::Caller,
    proxy::{headers::HEADER_REQUEST_ID, logging::ProxyContext, routes::RouteMatch},
    routes::metrics::record_request,
    AppState,
};

/// Forward a request to the downstream service chosen by the auth gate
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    Extension(route): Extension<RouteMatch>,
    Extension(caller): Extension<Caller>,
    request: Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();

    let request_id = parts
        .headers
        .get(HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok());

    let mut ctx = ProxyContext::new(
        route.service,
        parts.method.as_str(),
        parts.uri.path(),
        request_id,
    );
    if let Some(identity) = caller.identity() {
        ctx = ctx.with_uid(identity.uid.clone());
    }
    ctx.log_request_start();

    let result = state
        .upstream
        .forward(
            &mut ctx,
            &route,
            parts.method.clone(),
            parts.uri.query(),
            &parts.headers,
            caller.identity(),
            body,
        )
        .await;

    let status = match &result {
        Ok(response) => response.status(),
        Err(e) => e.status(),
    };
    record_request(route.service.name(), status.as_u16(), ctx.elapsed_secs());

    info!(
        request_id = %ctx.request_id,
        service = %route.service,
        method = %parts.method,
        path = %parts.uri.path(),
        status = %status,
        duration_ms = %ctx.elapsed_ms(),
        "Proxied request completed"
    );

    result
}

/// Fallback for paths outside every prefix
pub async fn not_found(request: Request) -> AppError {
    AppError::NotFound(format!("No service handles {}", request.uri().path()))
}
