//! Identity provider abstraction
//!
//! Defines the trait the auth gate uses to verify bearer tokens, with a
//! Firebase implementation for production and a shared-secret implementation
//! for local development.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{
    error::{AppError, AppResult},
    identity::{token_fingerprint, Identity, Role, SigningKeys},
};

/// Claims read from a verified ID token
#[derive(Debug, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<serde_json::Value>,
}

impl TokenClaims {
    fn into_identity(self) -> AppResult<Identity> {
        if self.sub.trim().is_empty() {
            return Err(AppError::InvalidToken);
        }
        Ok(Identity {
            role: Role::from_claim(self.role.as_ref()),
            uid: self.sub,
            email: self.email,
            name: self.name,
        })
    }
}

/// Trait implemented by token verifiers
///
/// Implementations check signature and expiry and map claims onto an
/// [`Identity`]. Any verification failure is reported as
/// [`AppError::InvalidToken`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Verify a bearer token
    async fn verify(&self, token: &str) -> AppResult<Identity>;

    /// Whether the provider can verify tokens right now
    async fn is_ready(&self) -> bool {
        true
    }
}

/// Verifies Firebase Authentication ID tokens (RS256, Google JWKS)
pub struct FirebaseVerifier {
    keys: Arc<SigningKeys>,
    validation: Validation,
}

impl FirebaseVerifier {
    pub fn new(project_id: &str, keys: Arc<SigningKeys>) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", project_id)]);

        Self { keys, validation }
    }

    async fn key_for(&self, kid: &str) -> Option<DecodingKey> {
        if let Some(key) = self.keys.get(kid).await {
            return Some(key);
        }
        // Key rotation: the provider may have published a new key
        if self.keys.refresh_on_demand().await {
            return self.keys.get(kid).await;
        }
        None
    }
}

#[async_trait]
impl IdentityProvider for FirebaseVerifier {
    fn name(&self) -> &'static str {
        "firebase"
    }

    #[instrument(skip_all, fields(token = %token_fingerprint(token)))]
    async fn verify(&self, token: &str) -> AppResult<Identity> {
        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Malformed token header");
            AppError::InvalidToken
        })?;

        if header.alg != Algorithm::RS256 {
            debug!(alg = ?header.alg, "Unexpected token algorithm");
            return Err(AppError::InvalidToken);
        }

        let kid = header.kid.ok_or(AppError::InvalidToken)?;
        let key = self.key_for(&kid).await.ok_or_else(|| {
            debug!(kid = %kid, "No signing key for token");
            AppError::InvalidToken
        })?;

        let data = decode::<TokenClaims>(token, &key, &self.validation).map_err(|e| {
            debug!(error = %e, "Token rejected");
            AppError::InvalidToken
        })?;

        data.claims.into_identity()
    }

    async fn is_ready(&self) -> bool {
        !self.keys.is_empty().await
    }
}

/// Verifies HS256 tokens signed with a shared secret
pub struct SharedSecretVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SharedSecretVerifier {
    pub fn new(secret: &str, audience: Option<&str>, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityProvider for SharedSecretVerifier {
    fn name(&self) -> &'static str {
        "shared-secret"
    }

    #[instrument(skip_all, fields(token = %token_fingerprint(token)))]
    async fn verify(&self, token: &str) -> AppResult<Identity> {
        let data = decode::<TokenClaims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "Token rejected");
            AppError::InvalidToken
        })?;

        data.claims.into_identity()
    }
}
