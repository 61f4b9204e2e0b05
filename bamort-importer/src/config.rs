//! Runtime settings derived from the bootstrap TOML
//!
//! [`ImporterSettings`] converts the raw [`TomlConfig`] numbers into the
//! durations and non-zero counts the services take.

use crate::security::RateLimits;
use bamort_common::config::{TomlConfig, MAX_JSON_DEPTH};
use bamort_common::{Error, Result};
use std::num::NonZeroU32;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ImporterSettings {
    pub detect_per_window: NonZeroU32,
    pub import_per_window: NonZeroU32,
    pub export_per_window: NonZeroU32,
    pub rate_window: Duration,
    pub max_upload_bytes: usize,
    pub max_json_depth: usize,
    pub confidence_threshold: f64,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub probe_timeout: Duration,
    pub transfer_timeout: Duration,
    pub health_interval: Duration,
}

impl ImporterSettings {
    pub fn from_toml(config: &TomlConfig) -> Result<Self> {
        let limits = &config.limits;
        let detection = &config.detection;
        if !(1..=MAX_JSON_DEPTH).contains(&limits.max_json_depth) {
            return Err(Error::Config(format!(
                "max_json_depth must be within 1..={}, got {}",
                MAX_JSON_DEPTH, limits.max_json_depth
            )));
        }

        Ok(Self {
            detect_per_window: non_zero("detect_per_window", limits.detect_per_window)?,
            import_per_window: non_zero("import_per_window", limits.import_per_window)?,
            export_per_window: non_zero("export_per_window", limits.export_per_window)?,
            rate_window: Duration::from_secs(limits.window_secs),
            max_upload_bytes: limits.max_upload_bytes,
            max_json_depth: limits.max_json_depth,
            confidence_threshold: detection.confidence_threshold,
            cache_ttl: Duration::from_secs(detection.cache_ttl_secs),
            cache_capacity: detection.cache_capacity,
            probe_timeout: Duration::from_millis(detection.probe_timeout_ms),
            transfer_timeout: Duration::from_secs(detection.transfer_timeout_secs),
            health_interval: Duration::from_secs(config.health.interval_secs),
        })
    }

    pub fn rate_limits(&self) -> RateLimits {
        RateLimits::new(
            self.detect_per_window,
            self.import_per_window,
            self.export_per_window,
            self.rate_window,
        )
    }
}

fn non_zero(name: &str, value: u32) -> Result<NonZeroU32> {
    NonZeroU32::new(value).ok_or_else(|| Error::Config(format!("{} must be at least 1", name)))
}
