//! Health check endpoints
//!
//! Provides endpoints for monitoring and container orchestration:
//! - `/health` - Full health check with downstream status
//! - `/health/ready` - Readiness probe
//! - `/health/live` - Liveness probe

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::{
    proxy::{probe::ProbeResult, Service},
    AppState,
};

/// Health status enum
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Identity provider readiness
#[derive(Debug, Serialize)]
pub struct IdentityCheck {
    pub provider: &'static str,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_keys: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys_age_seconds: Option<u64>,
}

/// Dependency checks collection
#[derive(Debug, Serialize)]
pub struct DependencyChecks {
    pub identity: IdentityCheck,
    /// Latest probe per configured service; empty until the first probe
    pub upstreams: BTreeMap<Service, ProbeResult>,
    /// Services without a base URL
    pub unconfigured: Vec<Service>,
}

/// Full health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub checks: DependencyChecks,
}

/// Simple health response for liveness/readiness
#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
}

async fn check_identity(state: &AppState) -> IdentityCheck {
    let (signing_keys, keys_age_seconds) = match &state.signing_keys {
        Some(keys) => (
            Some(keys.len().await),
            keys.age().await.map(|age| age.as_secs()),
        ),
        None => (None, None),
    };

    IdentityCheck {
        provider: state.identity.name(),
        ready: state.identity.is_ready().await,
        signing_keys,
        keys_age_seconds,
    }
}

/// Full health check endpoint
///
/// Reports downstream reachability from the last probe run; it never calls
/// downstream services itself. Downstream failures degrade the status but do
/// not fail the check, since the gateway still serves other services.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let identity = check_identity(&state).await;
    let upstreams = state.upstream_health.snapshot().await;
    let unconfigured = state
        .routes
        .bindings()
        .iter()
        .filter(|b| b.base_url.is_none())
        .map(|b| b.service)
        .collect();

    let overall_status = if !identity.ready {
        HealthStatus::Unhealthy
    } else if upstreams.values().any(|probe| !probe.reachable) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status: overall_status.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks: DependencyChecks {
            identity,
            upstreams,
            unconfigured,
        },
    };

    let status_code = match overall_status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

/// Readiness probe endpoint
///
/// Returns 200 OK once tokens can be verified.
/// Used by Kubernetes readiness probes.
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SimpleHealthResponse>) {
    if !state.identity.is_ready().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SimpleHealthResponse {
                status: HealthStatus::Unhealthy,
            }),
        );
    }

    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}

/// Liveness probe endpoint
///
/// Returns 200 OK if the application is alive.
/// Used by Kubernetes liveness probes.
pub async fn liveness_check() -> (StatusCode, Json<SimpleHealthResponse>) {
    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}
