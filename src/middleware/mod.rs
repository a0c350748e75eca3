//! Middleware module
//!
//! Request interceptors: CORS policy, compression and the auth gate.

pub mod auth;
pub mod compression;
pub mod cors;
