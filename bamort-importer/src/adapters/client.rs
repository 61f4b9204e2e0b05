//! Transport-neutral adapter interface

use crate::models::{AdapterMetadata, BmrtCharacter, Capability, CharacterImport, DetectResponse};
use crate::security::SecurityError;
use async_trait::async_trait;
use axum::body::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Adapter registry and transport errors
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Adapter {0} is required")]
    MissingField(&'static str),

    #[error("Adapter not found: {0}")]
    NotFound(String),

    #[error("Adapter is unhealthy: {0}")]
    Unhealthy(String),

    #[error("Adapter {adapter_id} does not support {capability:?}")]
    MissingCapability {
        adapter_id: String,
        capability: Capability,
    },

    #[error("No healthy adapter can detect formats")]
    NoneAvailable,

    #[error("No adapter reached confidence threshold {threshold:.2} (best: {best:.2})")]
    BelowThreshold { best: f64, threshold: f64 },

    #[error("Adapter request failed: {0}")]
    Transport(String),

    #[error("Adapter returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode adapter response: {0}")]
    Decode(String),

    #[error(transparent)]
    Rejected(#[from] SecurityError),
}

impl AdapterError {
    /// Failures that say the adapter itself is down rather than the request being bad
    pub fn marks_unhealthy(&self) -> bool {
        match self {
            AdapterError::Transport(_) => true,
            AdapterError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// One adapter transport
///
/// Implementations only move bytes; registry bookkeeping (health,
/// capabilities, thresholds) stays in [`super::AdapterRegistry`].
#[async_trait]
pub trait AdapterClient: Send + Sync {
    /// `GET /metadata`, decoded into the adapter's self-description
    async fn fetch_metadata(&self, base_url: &str) -> Result<AdapterMetadata, AdapterError>;

    /// `GET /metadata`, only checking for a 2xx answer
    async fn health_check(&self, base_url: &str) -> Result<(), AdapterError>;

    /// `POST /detect` bounded by `timeout`
    async fn detect(
        &self,
        base_url: &str,
        data: Bytes,
        timeout: Duration,
    ) -> Result<DetectResponse, AdapterError>;

    /// `POST /import`, returning the canonical envelope
    async fn import(&self, base_url: &str, data: Bytes) -> Result<BmrtCharacter, AdapterError>;

    /// `POST /export`, returning the adapter's raw file bytes
    async fn export(&self, base_url: &str, character: &CharacterImport) -> Result<Vec<u8>, AdapterError>;
}
