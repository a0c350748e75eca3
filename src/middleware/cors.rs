//! CORS policy
//!
//! Origins, methods and headers come from static configuration. Requests from
//! an origin outside the allow-list get no `Access-Control-Allow-Origin`
//! header, so browsers block the response.

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::{config::CorsConfig, proxy::headers::HEADER_REQUEST_ID};

/// Build the CORS layer from configuration
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            if origin == "*" {
                warn!("Ignoring wildcard CORS origin; list origins explicitly");
                return None;
            }
            match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(config.allowed_methods.clone())
        .allow_headers(config.allowed_headers.clone())
        .expose_headers([HEADER_REQUEST_ID])
        .allow_credentials(config.allow_credentials)
}
