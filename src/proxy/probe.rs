//! Upstream reachability snapshot
//!
//! Written by the probe job, read by the health endpoint. Request handling
//! never touches it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::proxy::routes::Service;

/// Outcome of the latest probe of one service
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProbeResult {
    pub reachable: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Latest probe result per service
#[derive(Debug, Default)]
pub struct UpstreamHealth {
    results: RwLock<BTreeMap<Service, ProbeResult>>,
}

impl UpstreamHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, service: Service, result: ProbeResult) {
        self.results.write().await.insert(service, result);
    }

    pub async fn snapshot(&self) -> BTreeMap<Service, ProbeResult> {
        self.results.read().await.clone()
    }
}
