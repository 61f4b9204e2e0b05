//! Adapter services: transport, registry and health monitoring

pub mod client;
pub mod http;
pub mod registry;

pub use client::{AdapterClient, AdapterError};
pub use http::HttpAdapterClient;
pub use registry::{AdapterRegistry, HealthCheckerHandle};

#[cfg(test)]
pub(crate) mod fake;
