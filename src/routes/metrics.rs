//! Prometheus metrics endpoint
//!
//! Exposes gateway metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use tracing::warn;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<Option<PrometheusHandle>> = Lazy::new(|| {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    // Force initialization of the lazy static
    let _ = &*PROMETHEUS_HANDLE;

    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!(
        "gateway_requests_total",
        "Total number of proxied requests"
    );
    metrics::describe_histogram!(
        "gateway_request_duration_seconds",
        "Proxied request duration in seconds"
    );
    metrics::describe_counter!(
        "gateway_auth_rejections_total",
        "Requests rejected by the auth gate"
    );
    metrics::describe_counter!(
        "gateway_upstream_errors_total",
        "Downstream calls that failed before a response arrived"
    );
}

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Record a proxied request
pub fn record_request(service: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "gateway_requests_total",
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "service" => service.to_string())
        .record(duration_secs);
}

/// Record an auth gate rejection
pub fn record_auth_rejection(reason: &'static str) {
    metrics::counter!("gateway_auth_rejections_total", "reason" => reason).increment(1);
}

/// Record a failed downstream call
pub fn record_upstream_error(service: &str, kind: &'static str) {
    metrics::counter!(
        "gateway_upstream_errors_total",
        "service" => service.to_string(),
        "kind" => kind
    )
    .increment(1);
}
