//! Request logging utilities for proxied calls
//!
//! Provides structured logging with correlation IDs for tracing a request
//! from the gateway to the downstream service and back.

use std::time::Instant;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::proxy::routes::Service;

/// Context for tracking a proxied request
///
/// Dropping the context before [`ProxyContext::finish`] means the handler
/// future was cancelled, which happens when the client disconnects; the
/// in-flight downstream call is aborted with it and the drop is logged.
#[derive(Debug)]
pub struct ProxyContext {
    /// Correlation id, forwarded downstream as `x-request-id`
    pub request_id: String,
    pub start_time: Instant,
    pub service: Service,
    pub method: String,
    pub path: String,
    /// Caller uid, when known
    pub uid: Option<String>,
    finished: bool,
}

impl ProxyContext {
    /// Create a new context, reusing the caller's request id when present
    pub fn new(service: Service, method: &str, path: &str, request_id: Option<&str>) -> Self {
        Self {
            request_id: request_id
                .filter(|id| !id.is_empty() && id.len() <= 128)
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            start_time: Instant::now(),
            service,
            method: method.to_string(),
            path: path.to_string(),
            uid: None,
            finished: false,
        }
    }

    /// Set the caller uid
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn log_request_start(&self) {
        info!(
            request_id = %self.request_id,
            service = %self.service,
            method = %self.method,
            path = %self.path,
            uid = ?self.uid,
            "Proxying request"
        );
    }

    pub fn log_upstream_request(&self, url: &str, body_size: usize) {
        debug!(
            request_id = %self.request_id,
            service = %self.service,
            url = %url,
            body_size = %body_size,
            "Sending request to upstream"
        );
    }

    /// Log the downstream response and mark the request as finished
    pub fn log_upstream_response(&mut self, status: u16, content_length: Option<u64>) {
        self.finished = true;
        info!(
            request_id = %self.request_id,
            service = %self.service,
            method = %self.method,
            path = %self.path,
            status = %status,
            content_length = ?content_length,
            elapsed_ms = %self.elapsed_ms(),
            "Response received from upstream"
        );
    }

    /// Log a failure and mark the request as finished
    pub fn log_error(&mut self, kind: &str, error: &str) {
        self.finished = true;
        error!(
            request_id = %self.request_id,
            service = %self.service,
            method = %self.method,
            path = %self.path,
            kind = %kind,
            elapsed_ms = %self.elapsed_ms(),
            error = %error,
            "Proxied request failed"
        );
    }

    /// Mark the request as finished without logging
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for ProxyContext {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                request_id = %self.request_id,
                service = %self.service,
                method = %self.method,
                path = %self.path,
                elapsed_ms = %self.elapsed_ms(),
                "Client went away before upstream responded; upstream call aborted"
            );
        }
    }
}
