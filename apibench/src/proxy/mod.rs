//! Proxy service: a controller action that forwards one upstream call
//!
//! This module provides:
//! - `UpstreamClient` for the fixed upstream URL with its timeout
//! - HTTP routes for the JSON-wrapped and raw passthrough actions
//! - a simulated `/io` upstream for local runs

pub mod routes;
mod upstream;

pub use routes::{CallResponse, ProxyAppState, ProxyErrorResponse, proxy_routes};
pub use upstream::{UpstreamClient, UpstreamError};
