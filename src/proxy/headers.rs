//! Header handling for proxied calls
//!
//! Inbound headers are forwarded verbatim except for hop-by-hop headers and
//! anything that carries identity: trust headers are always rebuilt from the
//! identity the gateway resolved, never copied from the caller.

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::identity::{strip_trust_headers, Identity, HEADER_INTERNAL_TOKEN};

pub const HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Hop-by-hop headers that must never be forwarded
const HOP_BY_HOP_HEADERS: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Check if a header is a hop-by-hop header that should not be forwarded
pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(name) || name.as_str() == "keep-alive"
}

/// Build the headers sent to a downstream service.
///
/// `Host` and `Content-Length` are dropped because the HTTP client derives
/// them from the target URL and the buffered body.
pub fn build_upstream_headers(
    incoming: &HeaderMap,
    identity: Option<&Identity>,
    internal_token: Option<&str>,
    request_id: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len() + 6);

    for (name, value) in incoming {
        if is_hop_by_hop_header(name)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || name == HEADER_INTERNAL_TOKEN
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    strip_trust_headers(&mut headers);
    if let Some(identity) = identity {
        identity.apply_to(&mut headers);
    }

    if let Some(token) = internal_token.and_then(|t| HeaderValue::from_str(t).ok()) {
        headers.insert(HEADER_INTERNAL_TOKEN, token);
    }

    if let Ok(id) = HeaderValue::from_str(request_id) {
        headers.insert(HEADER_REQUEST_ID, id);
    }

    headers
}

/// Filter hop-by-hop headers from a response
///
/// Used when converting downstream responses back to client responses.
pub fn filter_response_headers(response_headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(response_headers.len());

    for (name, value) in response_headers {
        if !is_hop_by_hop_header(name) {
            filtered.append(name.clone(), value.clone());
        }
    }

    filtered
}
