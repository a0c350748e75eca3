//! Response compression
//!
//! Responses at or above the configured size are compressed with the encoding
//! negotiated from `Accept-Encoding`, at a fixed level. Callers can opt out
//! per request with the `x-no-compression` header.

use axum::{
    extract::Request,
    http::{header, HeaderName},
    middleware::Next,
    response::Response,
};
use tower_http::{
    compression::{
        predicate::{And, NotForContentType, Predicate, SizeAbove},
        CompressionLayer,
    },
    CompressionLevel,
};

use crate::config::CompressionConfig;

/// Request header that disables compression for one request
pub const HEADER_NO_COMPRESSION: HeaderName = HeaderName::from_static("x-no-compression");

/// Predicate deciding which responses get compressed
pub type CompressionPredicate =
    And<And<And<SizeAbove, NotForContentType>, NotForContentType>, NotForContentType>;

/// Which responses get compressed
///
/// The size is taken from the body's exact length or its `Content-Length`.
/// A streamed response without either (a chunked downstream reply) has no
/// known size and counts as above the threshold; proxied bodies are never
/// buffered just to measure them.
pub fn compression_predicate(config: &CompressionConfig) -> CompressionPredicate {
    SizeAbove::new(config.threshold_bytes)
        .and(NotForContentType::GRPC)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::SSE)
}

/// Build the compression layer from configuration
///
/// Already-encoded responses are always left alone by the layer itself.
pub fn compression_layer(config: &CompressionConfig) -> CompressionLayer<CompressionPredicate> {
    CompressionLayer::new()
        .quality(CompressionLevel::Precise(config.level))
        .compress_when(compression_predicate(config))
}

/// Honour the opt-out header by hiding `Accept-Encoding` from the
/// compression layer (and from the downstream service)
pub async fn compression_opt_out(mut request: Request, next: Next) -> Response {
    if request.headers().contains_key(&HEADER_NO_COMPRESSION) {
        request.headers_mut().remove(header::ACCEPT_ENCODING);
    }
    next.run(request).await
}
