//! Caller identity
//!
//! Resolves who is calling the gateway, either from a verified bearer token
//! or from trust headers set by another gateway-originated call.

pub mod keys;
pub mod provider;
pub mod role;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub use keys::SigningKeys;
pub use provider::{FirebaseVerifier, IdentityProvider, SharedSecretVerifier};
pub use role::Role;

pub const HEADER_USER_UID: HeaderName = HeaderName::from_static("x-user-uid");
pub const HEADER_USER_EMAIL: HeaderName = HeaderName::from_static("x-user-email");
pub const HEADER_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");
pub const HEADER_USER_NAME: HeaderName = HeaderName::from_static("x-user-name");
pub const HEADER_INTERNAL_TOKEN: HeaderName = HeaderName::from_static("x-internal-token");

/// Headers that carry identity toward downstream services
pub const TRUST_HEADERS: [HeaderName; 4] = [
    HEADER_USER_UID,
    HEADER_USER_EMAIL,
    HEADER_USER_ROLE,
    HEADER_USER_NAME,
];

/// Caller identity resolved for a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub role: Role,
    pub name: Option<String>,
}

impl Identity {
    /// Read identity from forwarded trust headers.
    ///
    /// Only call this once the request has been shown to originate from the
    /// gateway itself; the headers are not independently verified.
    pub fn from_trust_headers(headers: &HeaderMap) -> Option<Self> {
        let read = |name: &HeaderName| {
            headers
                .get(name)
                .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let uid = read(&HEADER_USER_UID)?;
        let role = read(&HEADER_USER_ROLE)
            .and_then(|r| r.parse().ok())
            .unwrap_or(Role::User);

        Some(Self {
            uid,
            email: read(&HEADER_USER_EMAIL),
            role,
            name: read(&HEADER_USER_NAME),
        })
    }

    /// Write this identity as trust headers, replacing any existing ones
    pub fn apply_to(&self, headers: &mut HeaderMap) {
        strip_trust_headers(headers);

        if let Ok(uid) = HeaderValue::from_str(&self.uid) {
            headers.insert(HEADER_USER_UID, uid);
        }
        if let Some(email) = self.email.as_deref().and_then(|e| HeaderValue::from_str(e).ok()) {
            headers.insert(HEADER_USER_EMAIL, email);
        }
        headers.insert(HEADER_USER_ROLE, HeaderValue::from(u16::from(self.role.level())));
        // Names are not restricted to ASCII
        if let Some(name) = self
            .name
            .as_deref()
            .and_then(|n| HeaderValue::from_bytes(n.as_bytes()).ok())
        {
            headers.insert(HEADER_USER_NAME, name);
        }
    }
}

/// Remove every identity trust header from a header map
pub fn strip_trust_headers(headers: &mut HeaderMap) {
    for name in TRUST_HEADERS.iter() {
        headers.remove(name);
    }
}

/// Pick the identity for a request.
///
/// Precedence: verified token claim, then trusted forwarded headers, then
/// anonymous.
pub fn resolve_identity(verified: Option<Identity>, forwarded: Option<Identity>) -> Option<Identity> {
    verified.or(forwarded)
}

/// Short SHA-256 fingerprint of a credential, safe to log
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

/// Constant-time secret comparison
///
/// Both sides are hashed first so the comparison does not depend on the
/// secrets' lengths either.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    bool::from(presented.as_slice().ct_eq(expected.as_slice()))
}
