//! Configuration management for the gateway
//!
//! Configuration is loaded from environment variables once at start-up and is
//! immutable afterwards.

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::http::{HeaderName, Method};

use crate::proxy::routes::{parse_access_rules, AccessPolicy, AccessRule, Service};

/// Google's JWKS endpoint for Firebase ID token signing keys
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Access rules used when `ACCESS_RULES` is not set
pub const DEFAULT_ACCESS_RULES: &str = "GET /p=public,GET /c=public,GET /m=public,\
GET /s/plans=public,POST /u/users=public,\
/p/admin=admin,/c/admin=admin,/m/admin=admin,/n/admin=admin,/s/admin=admin,\
/r=admin,/u/admin=superadmin";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Downstream base URLs; a service without an entry is unset
    pub services: BTreeMap<Service, String>,

    pub auth: AuthConfig,
    pub access_rules: Vec<AccessRule>,
    /// Policy applied when no access rule matches
    pub default_policy: AccessPolicy,

    pub cors: CorsConfig,
    pub compression: CompressionConfig,
    pub upstream: UpstreamConfig,

    /// Interval between upstream reachability probes
    pub health_probe_interval: Duration,

    /// Emit logs as JSON
    pub log_json: bool,
}

/// How bearer tokens are verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierConfig {
    Firebase {
        project_id: String,
        jwks_url: String,
        key_refresh_interval: Duration,
    },
    SharedSecret {
        secret: String,
        audience: Option<String>,
        issuer: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub verifier: VerifierConfig,
    /// Token that marks a call as originating from the gateway; enables
    /// forwarded trust headers and is attached to every downstream call
    pub internal_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<HeaderName>,
    pub allow_credentials: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CompressionConfig {
    /// Responses smaller than this are sent uncompressed
    pub threshold_bytes: u16,
    /// Fixed compression level handed to the encoder
    pub level: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct UpstreamConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:4200".to_string(),
                "http://localhost:3000".to_string(),
            ],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allowed_headers: vec![
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
                HeaderName::from_static("x-requested-with"),
                HeaderName::from_static("x-no-compression"),
            ],
            allow_credentials: true,
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: 1024,
            level: 6,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(2_000),
            request_timeout: Duration::from_millis(30_000),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut services = BTreeMap::new();
        for service in Service::ALL {
            if let Some(url) = get(service.env_var()) {
                services.insert(service, url.trim_end_matches('/').to_string());
            }
        }

        let access_rules = parse_access_rules(
            &get("ACCESS_RULES").unwrap_or_else(|| DEFAULT_ACCESS_RULES.to_string()),
        )
        .context("Invalid ACCESS_RULES")?;

        let default_policy = get("DEFAULT_ACCESS_POLICY")
            .map(|v| v.parse::<AccessPolicy>())
            .transpose()
            .context("Invalid DEFAULT_ACCESS_POLICY")?
            .unwrap_or(AccessPolicy::MinRole(crate::identity::Role::User));

        Ok(Self {
            host: get("GATEWAY_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "GATEWAY_PORT", 8080)?,

            services,

            auth: AuthConfig {
                verifier: verifier_config(&get)?,
                internal_token: get("INTERNAL_SERVICE_TOKEN"),
            },
            access_rules,
            default_policy,

            cors: cors_config(&get)?,
            compression: CompressionConfig {
                threshold_bytes: parse_or(&get, "COMPRESSION_THRESHOLD_BYTES", 1024)?,
                level: parse_or(&get, "COMPRESSION_LEVEL", 6)?,
            },
            upstream: UpstreamConfig {
                connect_timeout: Duration::from_millis(parse_or(
                    &get,
                    "UPSTREAM_CONNECT_TIMEOUT_MS",
                    2_000,
                )?),
                request_timeout: Duration::from_millis(parse_or(
                    &get,
                    "UPSTREAM_TIMEOUT_MS",
                    30_000,
                )?),
                max_body_bytes: parse_or(&get, "MAX_BODY_BYTES", 10 * 1024 * 1024)?,
            },

            health_probe_interval: Duration::from_secs(parse_or(
                &get,
                "HEALTH_PROBE_SECONDS",
                30,
            )?),

            log_json: get("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }

    /// Base URL configured for a service
    pub fn service_url(&self, service: Service) -> Option<&str> {
        self.services.get(&service).map(String::as_str)
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}

fn verifier_config<G>(get: &G) -> Result<VerifierConfig>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(project_id) = get("FIREBASE_PROJECT_ID") {
        return Ok(VerifierConfig::Firebase {
            project_id,
            jwks_url: get("FIREBASE_JWKS_URL").unwrap_or_else(|| FIREBASE_JWKS_URL.to_string()),
            key_refresh_interval: Duration::from_secs(parse_or(get, "KEY_REFRESH_SECONDS", 3600)?),
        });
    }

    if let Some(secret) = get("AUTH_JWT_SECRET") {
        return Ok(VerifierConfig::SharedSecret {
            secret,
            audience: get("AUTH_JWT_AUDIENCE"),
            issuer: get("AUTH_JWT_ISSUER"),
        });
    }

    bail!(
        "No token verification configured. Set either:\n\
        - FIREBASE_PROJECT_ID (verify Firebase ID tokens)\n\
        - AUTH_JWT_SECRET (verify HS256 tokens, local development)"
    )
}

fn cors_config<G>(get: &G) -> Result<CorsConfig>
where
    G: Fn(&str) -> Option<String>,
{
    let defaults = CorsConfig::default();

    let allowed_origins = match get("CORS_ALLOWED_ORIGINS") {
        Some(raw) => split_list(&raw).map(str::to_string).collect(),
        None => defaults.allowed_origins,
    };

    let allowed_methods = match get("CORS_ALLOWED_METHODS") {
        Some(raw) => split_list(&raw)
            .map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid CORS_ALLOWED_METHODS")?,
        None => defaults.allowed_methods,
    };

    let allowed_headers = match get("CORS_ALLOWED_HEADERS") {
        Some(raw) => split_list(&raw)
            .map(|h| HeaderName::from_bytes(h.to_ascii_lowercase().as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid CORS_ALLOWED_HEADERS")?,
        None => defaults.allowed_headers,
    };

    Ok(CorsConfig {
        allowed_origins,
        allowed_methods,
        allowed_headers,
        allow_credentials: get("CORS_ALLOW_CREDENTIALS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.allow_credentials),
    })
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}
