//! Sportgate - API gateway for the sports-complex platform
//!
//! This library provides the core functionality for the gateway server.
//! It routes requests by path prefix to the downstream services, verifies
//! callers and enforces role-based access, and applies the compression and
//! CORS policies.

pub mod config;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod scheduler;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{info, warn};

pub use crate::config::Config;
pub use crate::identity::{IdentityProvider, Role};
pub use crate::proxy::{RouteTable, Service, UpstreamClient, UpstreamHealth};

use crate::config::VerifierConfig;
use crate::identity::{FirebaseVerifier, SharedSecretVerifier, SigningKeys};
use crate::scheduler::{ProbeUpstreams, RefreshSigningKeys, Schedule, Scheduler};

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    pub routes: Arc<RouteTable>,
    pub upstream: Arc<UpstreamClient>,
    /// Token verifier selected by configuration
    pub identity: Arc<dyn IdentityProvider>,
    /// Signing key cache, present when verifying Firebase tokens
    pub signing_keys: Option<Arc<SigningKeys>>,
    /// Latest downstream probe results
    pub upstream_health: Arc<UpstreamHealth>,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config) -> Result<Self> {
        let routes = Arc::new(RouteTable::from_config(&config));
        let upstream = Arc::new(UpstreamClient::new(&config)?);

        let (identity, signing_keys) = match &config.auth.verifier {
            VerifierConfig::Firebase {
                project_id,
                jwks_url,
                ..
            } => {
                let keys = Arc::new(SigningKeys::new(
                    upstream.http_client().clone(),
                    jwks_url.as_str(),
                ));
                let verifier: Arc<dyn IdentityProvider> =
                    Arc::new(FirebaseVerifier::new(project_id, keys.clone()));
                (verifier, Some(keys))
            }
            VerifierConfig::SharedSecret {
                secret,
                audience,
                issuer,
            } => {
                let verifier: Arc<dyn IdentityProvider> = Arc::new(SharedSecretVerifier::new(
                    secret,
                    audience.as_deref(),
                    issuer.as_deref(),
                ));
                (verifier, None)
            }
        };

        for binding in routes.bindings() {
            if binding.base_url.is_none() {
                warn!(
                    service = %binding.service,
                    env_var = binding.service.env_var(),
                    "No base URL configured; requests for this service will fail with 502"
                );
            }
        }

        Ok(Self {
            config,
            routes,
            upstream,
            identity,
            signing_keys,
            upstream_health: Arc::new(UpstreamHealth::new()),
            start_time: Instant::now(),
        })
    }

    /// Load signing keys before accepting traffic
    ///
    /// A failure is logged rather than returned: the refresh job keeps
    /// retrying and readiness stays false until keys arrive.
    pub async fn warm_up(&self) {
        let Some(keys) = &self.signing_keys else {
            return;
        };

        match keys.refresh().await {
            Ok(count) => info!(keys = count, "Signing keys loaded"),
            Err(e) => warn!(error = %e, "Initial signing key fetch failed"),
        }
    }

    /// Register the gateway's recurring jobs
    pub fn register_jobs(&self, scheduler: &mut Scheduler) {
        if let (
            Some(keys),
            VerifierConfig::Firebase {
                key_refresh_interval,
                ..
            },
        ) = (&self.signing_keys, &self.config.auth.verifier)
        {
            scheduler.register(
                RefreshSigningKeys { keys: keys.clone() },
                Schedule::every(*key_refresh_interval),
            );
        }

        let probe = ProbeUpstreams::from_routes(
            self.upstream.clone(),
            &self.routes,
            self.upstream_health.clone(),
            self.config.upstream.connect_timeout,
        );
        if !probe.targets.is_empty() {
            scheduler.register(
                probe,
                Schedule::every(self.config.health_probe_interval).starting_now(),
            );
        }
    }
}
