//! Authentication and authorization gate
//!
//! Runs in front of the proxy handler. Resolves the route for the inbound
//! path, verifies the caller, enforces the route's minimum role and hands the
//! route match and caller identity to the handler via request extensions.
//! Rejected requests never reach a downstream service.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use crate::{
    error::AppError,
    identity::{
        resolve_identity, secrets_match, token_fingerprint, Identity, HEADER_INTERNAL_TOKEN,
    },
    proxy::routes::{normalize_path, AccessPolicy},
    routes::metrics::record_auth_rejection,
    AppState,
};

/// Identity of the caller, attached to every request that passes the gate
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Identity>);

impl Caller {
    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }
}

/// Extract the bearer token from an Authorization header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Read trust headers, but only from a caller holding the internal token
fn forwarded_identity(headers: &HeaderMap, internal_token: Option<&str>) -> Option<Identity> {
    let expected = internal_token?;
    let presented = headers
        .get(HEADER_INTERNAL_TOKEN)
        .and_then(|v| v.to_str().ok())?;

    if !secrets_match(presented, expected) {
        warn!("Internal token mismatch; ignoring forwarded identity headers");
        return None;
    }

    Identity::from_trust_headers(headers)
}

/// Decide whether an identity may pass a policy
pub fn authorize(policy: AccessPolicy, identity: Option<&Identity>) -> Result<(), AppError> {
    match (policy, identity) {
        (AccessPolicy::Public, _) => Ok(()),
        (AccessPolicy::MinRole(_), None) => Err(AppError::Unauthorized),
        (AccessPolicy::MinRole(minimum), Some(identity)) if identity.role.satisfies(minimum) => {
            Ok(())
        }
        (AccessPolicy::MinRole(_), Some(_)) => Err(AppError::Forbidden),
    }
}

/// Auth gate middleware
///
/// This middleware:
/// 1. Normalizes the path and resolves its route (404 when no prefix matches)
/// 2. Verifies a bearer token when one is presented (401 when invalid)
/// 3. Falls back to forwarded trust headers from gateway-originated calls
/// 4. Enforces the access policy for method and path (401/403)
/// 5. Adds the route match and `Caller` to request extensions
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Routing, policy and the forwarded URL all use the canonical path, so
    // dot segments cannot reach a path the policy never saw
    let path = normalize_path(request.uri().path());

    let route = state
        .routes
        .resolve(&path)
        .ok_or_else(|| AppError::NotFound(format!("No service handles {}", path)))?;

    let policy = state.routes.policy_for(request.method(), &path);

    let verified = match request.headers().get(header::AUTHORIZATION) {
        Some(value) => {
            let token = value
                .to_str()
                .ok()
                .and_then(extract_bearer_token)
                .ok_or_else(|| {
                    record_auth_rejection("malformed_header");
                    AppError::InvalidToken
                })?;

            match state.identity.verify(token).await {
                Ok(identity) => Some(identity),
                Err(e) => {
                    warn!(
                        token = %token_fingerprint(token),
                        provider = state.identity.name(),
                        "Token verification failed"
                    );
                    record_auth_rejection("invalid_token");
                    return Err(e);
                }
            }
        }
        None => None,
    };

    let forwarded = if verified.is_none() {
        forwarded_identity(request.headers(), state.config.auth.internal_token.as_deref())
    } else {
        None
    };

    let identity = resolve_identity(verified, forwarded);

    if let Err(e) = authorize(policy, identity.as_ref()) {
        let reason = match e {
            AppError::Forbidden => "insufficient_role",
            _ => "missing_credentials",
        };
        record_auth_rejection(reason);
        debug!(
            policy = %policy,
            role = ?identity.as_ref().map(|i| i.role),
            reason = reason,
            "Request rejected by auth gate"
        );
        return Err(e);
    }

    if let Some(identity) = &identity {
        debug!(
            uid = %identity.uid,
            role = %identity.role,
            service = %route.service,
            "Caller authenticated"
        );
    }

    request.extensions_mut().insert(route);
    request.extensions_mut().insert(Caller(identity));

    Ok(next.run(request).await)
}
