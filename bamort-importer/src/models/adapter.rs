//! Adapter service descriptions and detection results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation an adapter service declares it can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Detect,
    Import,
    Export,
    /// Capability this service does not know about
    #[serde(other)]
    Other,
}

/// Registered adapter service
///
/// `healthy`, `last_checked_at` and `last_error` are runtime state owned by
/// the registry; everything else is the adapter's self-description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterMetadata {
    /// Unique adapter id, e.g. `moam-vtt-v1`
    pub id: String,
    /// Human readable name
    #[serde(default)]
    pub name: String,
    /// Adapter semantic version
    #[serde(default)]
    pub version: String,
    /// Supported canonical (BMRT) format versions
    #[serde(default)]
    pub bmrt_versions: Vec<String>,
    /// File extensions the adapter claims, e.g. `[".json"]`
    #[serde(default)]
    pub supported_extensions: Vec<String>,
    /// Base address, e.g. `http://adapter-moam:8181`
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub healthy: bool,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl AdapterMetadata {
    /// Check whether the adapter declares `capability`
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Case-insensitive extension check, with or without leading dot
    pub fn handles_extension(&self, extension: &str) -> bool {
        let wanted = normalize_extension(extension);
        !wanted.is_empty()
            && self
                .supported_extensions
                .iter()
                .any(|ext| normalize_extension(ext) == wanted)
    }
}

/// Lowercase an extension and strip its leading dot
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

/// Extension of `filename`, normalized; `None` when there is none
pub fn file_extension(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(normalize_extension(ext))
}

/// Body of an adapter's `POST /detect` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// How a detection result was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Caller named the adapter
    Specified,
    /// Single adapter claims the file extension
    Extension,
    /// Signature cache hit
    Cache,
    /// Every healthy detector was asked
    FanOut,
}

/// Outcome of format detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub adapter_id: String,
    pub confidence: f64,
    pub method: DetectionMethod,
}
