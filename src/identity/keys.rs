//! Signing key store for identity token verification
//!
//! Holds the identity provider's published JWKS keys, indexed by `kid`.
//! Keys are refreshed by the scheduler and, when a token names an unknown
//! `kid`, on demand (throttled so garbage tokens cannot hammer the provider).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use jsonwebtoken::{jwk::JwkSet, DecodingKey};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Minimum spacing between on-demand refreshes
const ON_DEMAND_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
struct KeyCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
    last_attempt: Option<Instant>,
}

/// JWKS-backed signing key store
pub struct SigningKeys {
    client: reqwest::Client,
    jwks_url: String,
    cache: RwLock<KeyCache>,
}

impl SigningKeys {
    pub fn new(client: reqwest::Client, jwks_url: impl Into<String>) -> Self {
        Self {
            client,
            jwks_url: jwks_url.into(),
            cache: RwLock::new(KeyCache::default()),
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Look up a key by id
    pub async fn get(&self, kid: &str) -> Option<DecodingKey> {
        self.cache.read().await.keys.get(kid).cloned()
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Time since the last successful fetch
    pub async fn age(&self) -> Option<Duration> {
        self.cache.read().await.fetched_at.map(|t| t.elapsed())
    }

    /// Fetch the key set and replace the cached keys.
    ///
    /// On failure the previous keys stay in place.
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    pub async fn refresh(&self) -> Result<usize> {
        self.cache.write().await.last_attempt = Some(Instant::now());

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .context("Failed to reach JWKS endpoint")?;

        let status = response.status();
        if !status.is_success() {
            bail!("JWKS endpoint returned {}", status);
        }

        let set: JwkSet = response
            .json()
            .await
            .context("Failed to parse JWKS response")?;

        let mut keys = HashMap::with_capacity(set.keys.len());
        for jwk in &set.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                debug!("Skipping JWK without kid");
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(e) => warn!(kid = %kid, error = %e, "Skipping unusable JWK"),
            }
        }

        if keys.is_empty() {
            bail!("JWKS response contained no usable keys");
        }

        let count = keys.len();
        let mut cache = self.cache.write().await;
        cache.keys = keys;
        cache.fetched_at = Some(Instant::now());

        info!(keys = count, "Signing keys refreshed");
        Ok(count)
    }

    /// Refresh unless another refresh was attempted very recently.
    ///
    /// Returns whether a refresh was performed and succeeded.
    pub async fn refresh_on_demand(&self) -> bool {
        let recently_attempted = self
            .cache
            .read()
            .await
            .last_attempt
            .is_some_and(|t| t.elapsed() < ON_DEMAND_REFRESH_INTERVAL);

        if recently_attempted {
            debug!("Skipping on-demand key refresh, attempted recently");
            return false;
        }

        match self.refresh().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "On-demand signing key refresh failed");
                false
            }
        }
    }
}
