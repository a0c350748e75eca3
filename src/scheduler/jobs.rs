//! Jobs registered by the gateway

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use super::Job;
use crate::{
    identity::SigningKeys,
    proxy::{
        forward::UpstreamClient,
        probe::{ProbeResult, UpstreamHealth},
        routes::{RouteTable, Service},
    },
};

/// Re-fetch the identity provider's signing keys
pub struct RefreshSigningKeys {
    pub keys: Arc<SigningKeys>,
}

#[async_trait]
impl Job for RefreshSigningKeys {
    fn name(&self) -> &'static str {
        "refresh_signing_keys"
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.keys.refresh().await.map(|_| ())
    }
}

/// Probe every configured downstream base URL
pub struct ProbeUpstreams {
    pub client: Arc<UpstreamClient>,
    pub targets: Vec<(Service, String)>,
    pub health: Arc<UpstreamHealth>,
    pub timeout: Duration,
}

impl ProbeUpstreams {
    /// Probe targets for every service with a base URL
    pub fn from_routes(
        client: Arc<UpstreamClient>,
        routes: &RouteTable,
        health: Arc<UpstreamHealth>,
        timeout: Duration,
    ) -> Self {
        let targets = routes
            .bindings()
            .iter()
            .filter_map(|b| b.base_url.clone().map(|url| (b.service, url)))
            .collect();

        Self {
            client,
            targets,
            health,
            timeout,
        }
    }

    async fn probe_one(&self, service: Service, base_url: &str) -> ProbeResult {
        let started = Instant::now();
        let outcome = self.client.probe(base_url, self.timeout).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(status) => ProbeResult {
                reachable: true,
                latency_ms,
                status: Some(status.as_u16()),
                error: None,
                checked_at: chrono::Utc::now(),
            },
            Err(e) => {
                warn!(service = %service, error = %e, "Upstream probe failed");
                ProbeResult {
                    reachable: false,
                    latency_ms,
                    status: None,
                    error: Some(if e.is_timeout() {
                        "timeout".to_string()
                    } else {
                        "unreachable".to_string()
                    }),
                    checked_at: chrono::Utc::now(),
                }
            }
        }
    }
}

#[async_trait]
impl Job for ProbeUpstreams {
    fn name(&self) -> &'static str {
        "probe_upstreams"
    }

    async fn run(&self) -> anyhow::Result<()> {
        let results = join_all(
            self.targets
                .iter()
                .map(|(service, url)| async move { (*service, self.probe_one(*service, url).await) }),
        )
        .await;

        let reachable = results.iter().filter(|(_, r)| r.reachable).count();
        for (service, result) in results {
            self.health.record(service, result).await;
        }

        debug!(
            reachable = reachable,
            total = self.targets.len(),
            "Upstream probe finished"
        );
        Ok(())
    }
}
