//! Downstream proxying
//!
//! Route resolution, header rewriting and request forwarding for the
//! downstream services behind the gateway.

pub mod forward;
pub mod headers;
pub mod logging;
pub mod probe;
pub mod routes;

pub use forward::UpstreamClient;
pub use probe::UpstreamHealth;
pub use routes::{AccessPolicy, RouteTable, Service};
