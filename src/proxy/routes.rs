//! Route bindings and access rules
//!
//! The route table maps a single-letter path prefix to a downstream service
//! and decides, per request, which access policy applies. It is built once
//! from [`Config`] and never mutated afterwards.

use std::fmt;
use std::str::FromStr;

use axum::http::Method;
use serde::Serialize;
use thiserror::Error;

use crate::{config::Config, identity::Role};

/// Downstream services reachable through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Product,
    User,
    Court,
    Match,
    Buy,
    Image,
    Subscription,
    Notification,
    Report,
}

impl Service {
    pub const ALL: [Service; 9] = [
        Service::Product,
        Service::User,
        Service::Court,
        Service::Match,
        Service::Buy,
        Service::Image,
        Service::Subscription,
        Service::Notification,
        Service::Report,
    ];

    /// Inbound path prefix, including the leading slash
    pub fn prefix(self) -> &'static str {
        match self {
            Service::Product => "/p",
            Service::User => "/u",
            Service::Court => "/c",
            Service::Match => "/m",
            Service::Buy => "/b",
            Service::Image => "/i",
            Service::Subscription => "/s",
            Service::Notification => "/n",
            Service::Report => "/r",
        }
    }

    /// Environment variable holding the base URL
    pub fn env_var(self) -> &'static str {
        match self {
            Service::Product => "PRODUCT_SERVICE_URL",
            Service::User => "USER_SERVICE_URL",
            Service::Court => "COURT_SERVICE_URL",
            Service::Match => "MATCH_SERVICE_URL",
            Service::Buy => "BUY_SERVICE_URL",
            Service::Image => "IMAGE_SERVICE_URL",
            Service::Subscription => "SUBSCRIPTION_SERVICE_URL",
            Service::Notification => "NOTIFICATION_SERVICE_URL",
            Service::Report => "REPORT_SERVICE_URL",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Service::Product => "product",
            Service::User => "user",
            Service::Court => "court",
            Service::Match => "match",
            Service::Buy => "buy",
            Service::Image => "image",
            Service::Subscription => "subscription",
            Service::Notification => "notification",
            Service::Report => "report",
        }
    }

    /// Service owning a prefix such as `/p`
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.prefix() == prefix)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a caller needs to reach a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Anyone; a presented token is still verified
    Public,
    /// A verified identity whose role meets the minimum
    MinRole(Role),
}

impl FromStr for AccessPolicy {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(AccessPolicy::Public),
            "authenticated" => Ok(AccessPolicy::MinRole(Role::User)),
            other => other
                .parse::<Role>()
                .map(AccessPolicy::MinRole)
                .map_err(|_| RuleParseError::UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPolicy::Public => f.write_str("public"),
            AccessPolicy::MinRole(role) => write!(f, "{}", role),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("rule '{0}' must look like '[METHOD ]/path=policy'")]
    Malformed(String),
    #[error("unknown access policy '{0}'")]
    UnknownPolicy(String),
    #[error("invalid method '{0}'")]
    InvalidMethod(String),
    #[error("path '{0}' must start with '/'")]
    InvalidPath(String),
}

/// One access rule: requests whose path starts with `path` (on a segment
/// boundary) and whose method matches get `policy`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    pub method: Option<Method>,
    pub path: String,
    pub policy: AccessPolicy,
}

impl AccessRule {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().map_or(true, |m| m == method) && segment_prefix(path, &self.path)
    }

    /// Longer paths win; a method-specific rule beats a method-less one
    fn specificity(&self) -> (usize, bool) {
        (self.path.len(), self.method.is_some())
    }
}

impl FromStr for AccessRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, policy) = s
            .split_once('=')
            .ok_or_else(|| RuleParseError::Malformed(s.to_string()))?;

        let mut parts = target.split_whitespace();
        let (method, path) = match (parts.next(), parts.next(), parts.next()) {
            (Some(path), None, None) => (None, path),
            (Some(method), Some(path), None) => {
                let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| RuleParseError::InvalidMethod(method.to_string()))?;
                (Some(method), path)
            }
            _ => return Err(RuleParseError::Malformed(s.to_string())),
        };

        if !path.starts_with('/') {
            return Err(RuleParseError::InvalidPath(path.to_string()));
        }

        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        Ok(Self {
            method,
            path: path.to_string(),
            policy: policy.parse()?,
        })
    }
}

/// Parse a comma-separated list of access rules
pub fn parse_access_rules(raw: &str) -> Result<Vec<AccessRule>, RuleParseError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Whether `path` equals `prefix` or continues it at a `/` boundary
fn segment_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Canonical form of an inbound path.
///
/// Resolves `.` and `..` segments (including their `%2e` spellings), treats
/// `\` as a separator and collapses empty segments, the way the downstream
/// URL parser would. Access decisions and the forwarded URL must both be
/// derived from this form. `..` never climbs above the root.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let mut trailing_slash = false;

    for segment in path.split(['/', '\\']) {
        trailing_slash = false;
        match dot_segment(segment) {
            Some(DotSegment::Current) => trailing_slash = true,
            Some(DotSegment::Parent) => {
                segments.pop();
                trailing_slash = true;
            }
            None if segment.is_empty() => trailing_slash = true,
            None => segments.push(segment),
        }
    }

    let mut normalized = String::with_capacity(path.len());
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() || trailing_slash {
        normalized.push('/');
    }
    normalized
}

enum DotSegment {
    Current,
    Parent,
}

fn dot_segment(segment: &str) -> Option<DotSegment> {
    match segment.to_ascii_lowercase().replace("%2e", ".").as_str() {
        "." => Some(DotSegment::Current),
        ".." => Some(DotSegment::Parent),
        _ => None,
    }
}

/// Static binding of a prefix to a downstream service
#[derive(Debug, Clone)]
pub struct RouteBinding {
    pub service: Service,
    pub base_url: Option<String>,
}

/// Result of matching an inbound path against the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub service: Service,
    pub base_url: Option<String>,
    /// Path to request downstream: prefix stripped, always starts with `/`
    pub forward_path: String,
}

impl RouteMatch {
    /// Full downstream URL, or `None` when the service has no base URL
    pub fn upstream_url(&self, query: Option<&str>) -> Option<String> {
        let base = self.base_url.as_deref()?;
        Some(match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", base, self.forward_path, q),
            _ => format!("{}{}", base, self.forward_path),
        })
    }
}

/// Immutable routing and access table
#[derive(Debug, Clone)]
pub struct RouteTable {
    bindings: Vec<RouteBinding>,
    rules: Vec<AccessRule>,
    default_policy: AccessPolicy,
}

impl RouteTable {
    pub fn new(
        bindings: Vec<RouteBinding>,
        rules: Vec<AccessRule>,
        default_policy: AccessPolicy,
    ) -> Self {
        Self {
            bindings,
            rules,
            default_policy,
        }
    }

    /// Build the table for every known service from configuration
    pub fn from_config(config: &Config) -> Self {
        let bindings = Service::ALL
            .into_iter()
            .map(|service| RouteBinding {
                service,
                base_url: config.service_url(service).map(str::to_string),
            })
            .collect();

        Self::new(bindings, config.access_rules.clone(), config.default_policy)
    }

    pub fn bindings(&self) -> &[RouteBinding] {
        &self.bindings
    }

    /// Match an inbound path on its first segment
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        self.bindings.iter().find_map(|binding| {
            let rest = path.strip_prefix(binding.service.prefix())?;
            if !(rest.is_empty() || rest.starts_with('/')) {
                return None;
            }
            Some(RouteMatch {
                service: binding.service,
                base_url: binding.base_url.clone(),
                forward_path: if rest.is_empty() {
                    "/".to_string()
                } else {
                    rest.to_string()
                },
            })
        })
    }

    /// Access policy for a request
    pub fn policy_for(&self, method: &Method, path: &str) -> AccessPolicy {
        self.rules
            .iter()
            .filter(|rule| rule.matches(method, path))
            .max_by_key(|rule| rule.specificity())
            .map_or(self.default_policy, |rule| rule.policy)
    }
}
