//! Downstream forwarding
//!
//! Sends one request to the downstream service selected by the route table and
//! streams its response back. There are no retries: a failed or timed-out call
//! is reported to the caller as 502 or 504.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Response, StatusCode};
use http_body_util::LengthLimitError;
use tracing::instrument;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    identity::Identity,
    proxy::{
        headers::{build_upstream_headers, filter_response_headers},
        logging::ProxyContext,
        routes::RouteMatch,
    },
    routes::metrics::record_upstream_error,
};

/// HTTP client for downstream services
pub struct UpstreamClient {
    client: reqwest::Client,
    max_body_bytes: usize,
    internal_token: Option<String>,
}

impl UpstreamClient {
    /// Create a client with the configured timeouts
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .connect_timeout(config.upstream.connect_timeout)
            .timeout(config.upstream.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            max_body_bytes: config.upstream.max_body_bytes,
            internal_token: config.auth.internal_token.clone(),
        }
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Forward a request to the matched downstream service
    #[instrument(skip_all, fields(service = %route.service, path = %route.forward_path))]
    pub async fn forward(
        &self,
        ctx: &mut ProxyContext,
        route: &RouteMatch,
        method: Method,
        query: Option<&str>,
        incoming_headers: &HeaderMap,
        identity: Option<&Identity>,
        body: Body,
    ) -> AppResult<Response<Body>> {
        let Some(url) = route.upstream_url(query) else {
            ctx.log_error("unconfigured", "no base URL configured");
            record_upstream_error(route.service.name(), "unconfigured");
            return Err(AppError::UpstreamUnavailable(format!(
                "{} service has no base URL",
                route.service
            )));
        };

        let body_bytes = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                ctx.finish();
                return Err(if is_length_limit(&e) {
                    AppError::PayloadTooLarge {
                        limit: self.max_body_bytes,
                    }
                } else {
                    AppError::Internal(anyhow::anyhow!("Failed to read request body: {}", e))
                });
            }
        };

        let headers = build_upstream_headers(
            incoming_headers,
            identity,
            self.internal_token.as_deref(),
            &ctx.request_id,
        );

        ctx.log_upstream_request(&url, body_bytes.len());

        let mut request_builder = self.client.request(method.clone(), &url).headers(headers);
        if !body_bytes.is_empty() || (method != Method::GET && method != Method::HEAD) {
            request_builder = request_builder.body(body_bytes);
        }

        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let (kind, error) = classify_send_error(&e, &url);
                ctx.log_error(kind, &e.to_string());
                record_upstream_error(route.service.name(), kind);
                return Err(error);
            }
        };

        ctx.log_upstream_response(response.status().as_u16(), response.content_length());

        convert_response(response)
    }

    /// Probe a base URL; any HTTP response counts as reachable
    pub async fn probe(&self, base_url: &str, timeout: Duration) -> Result<StatusCode, reqwest::Error> {
        let response = self
            .client
            .get(format!("{}/", base_url))
            .timeout(timeout)
            .send()
            .await?;
        Ok(response.status())
    }
}

fn classify_send_error(e: &reqwest::Error, url: &str) -> (&'static str, AppError) {
    if e.is_timeout() {
        (
            "timeout",
            AppError::UpstreamTimeout(format!("{}: {}", url, e)),
        )
    } else if e.is_connect() {
        (
            "connect",
            AppError::UpstreamUnavailable(format!("{}: {}", url, e)),
        )
    } else {
        (
            "request",
            AppError::UpstreamUnavailable(format!("{}: {}", url, e)),
        )
    }
}

fn is_length_limit(e: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(e);
    while let Some(err) = source {
        if err.is::<LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}

/// Convert a downstream response into a client response, streaming the body
fn convert_response(response: reqwest::Response) -> AppResult<Response<Body>> {
    let mut builder = Response::builder().status(response.status());

    if let Some(headers) = builder.headers_mut() {
        headers.extend(filter_response_headers(response.headers()));
    }

    builder
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}
