//! Bootstrap configuration loading
//!
//! Configuration is resolved once at startup, in priority order:
//! 1. Command-line `--config` path (passed in by the binary)
//! 2. `BAMORT_CONFIG` environment variable
//! 3. Platform config file (`<config_dir>/bamort/importer.toml`)
//! 4. Built-in defaults
//!
//! After the TOML is loaded, a small set of environment variables may
//! override individual fields (see [`apply_env_overrides`]).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BAMORT_CONFIG";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The service must restart
/// to pick up changes to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to SQLite database file
    ///
    /// If not specified, the platform data directory is used.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Request guard limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Format detection tuning
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Adapter health monitoring
    #[serde(default)]
    pub health: HealthConfig,

    /// Outbound adapter host policy
    #[serde(default)]
    pub security: SecurityConfig,

    /// Adapter services discovered at startup
    #[serde(default)]
    pub adapters: Vec<AdapterEndpoint>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_path: None,
            logging: LoggingConfig::default(),
            limits: LimitsConfig::default(),
            detection: DetectionConfig::default(),
            health: HealthConfig::default(),
            security: SecurityConfig::default(),
            adapters: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Per-user rate limits and upload guards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Detection requests per window
    #[serde(default = "default_detect_per_window")]
    pub detect_per_window: u32,
    /// Import requests per window
    #[serde(default = "default_import_per_window")]
    pub import_per_window: u32,
    /// Export requests per window
    #[serde(default = "default_export_per_window")]
    pub export_per_window: u32,
    /// Rate limit window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Maximum JSON object/array nesting depth
    #[serde(default = "default_max_json_depth")]
    pub max_json_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            detect_per_window: default_detect_per_window(),
            import_per_window: default_import_per_window(),
            export_per_window: default_export_per_window(),
            window_secs: default_window_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            max_json_depth: default_max_json_depth(),
        }
    }
}

/// Format detection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum confidence a fan-out result must reach
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Signature cache entry lifetime in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Maximum number of cached signatures
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Per-adapter detect probe timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Import/export transfer timeout in seconds
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            probe_timeout_ms: default_probe_timeout_ms(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
        }
    }
}

/// Adapter health monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Seconds between background health probes
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval_secs(),
        }
    }
}

/// Outbound adapter host policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Hosts adapters may live on. Empty rejects every adapter host.
    #[serde(default)]
    pub allowed_adapter_hosts: Vec<String>,
    /// Also resolve adapter hostnames and reject private/loopback addresses
    #[serde(default = "default_resolve_adapter_hosts")]
    pub resolve_adapter_hosts: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_adapter_hosts: Vec::new(),
            resolve_adapter_hosts: default_resolve_adapter_hosts(),
        }
    }
}

/// Adapter service to discover at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterEndpoint {
    /// Expected adapter id (checked against the adapter's self-description)
    pub id: String,
    /// Base URL, e.g. `http://adapter-moam:8181`
    pub base_url: String,
}

fn default_resolve_adapter_hosts() -> bool {
    true
}

fn default_port() -> u16 {
    8182
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_detect_per_window() -> u32 {
    10
}

fn default_import_per_window() -> u32 {
    5
}

fn default_export_per_window() -> u32 {
    20
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

/// Largest accepted `max_json_depth`
///
/// serde_json stops at its own recursion limit on the 128th level, so the
/// depth guard has to trip at 127 at the latest.
pub const MAX_JSON_DEPTH: usize = 126;

fn default_max_json_depth() -> usize {
    100
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_transfer_timeout_secs() -> u64 {
    30
}

fn default_health_interval_secs() -> u64 {
    30
}

/// Resolve the config file path following the priority order above
///
/// Returns `None` when no candidate file exists; callers fall back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config file
    dirs::config_dir()
        .map(|d| d.join("bamort").join("importer.toml"))
        .filter(|p| p.exists())
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the bootstrap configuration
///
/// A missing config file is not an error: defaults are used and a warning is
/// logged. A present but malformed file is an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)?
        }
        Some(path) => {
            warn!("Config file {} not found, using defaults", path.display());
            TomlConfig::default()
        }
        None => {
            info!("No config file found, using defaults");
            TomlConfig::default()
        }
    };

    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

/// Apply environment variable overrides
///
/// - `BAMORT_IMPORTER_PORT`: HTTP port
/// - `BAMORT_DATABASE_PATH`: SQLite file
/// - `BAMORT_IMPORT_ADAPTERS`: `id=url,id=url` (appended to TOML adapters)
pub fn apply_env_overrides(config: &mut TomlConfig) -> Result<()> {
    if let Ok(port) = std::env::var("BAMORT_IMPORTER_PORT") {
        config.port = port
            .parse()
            .map_err(|_| Error::Config(format!("Invalid BAMORT_IMPORTER_PORT: {}", port)))?;
    }

    if let Ok(path) = std::env::var("BAMORT_DATABASE_PATH") {
        config.database_path = Some(PathBuf::from(path));
    }

    if let Ok(list) = std::env::var("BAMORT_IMPORT_ADAPTERS") {
        for endpoint in parse_adapter_list(&list)? {
            if !config.adapters.iter().any(|a| a.id == endpoint.id) {
                config.adapters.push(endpoint);
            }
        }
    }

    Ok(())
}

/// Parse an `id=url,id=url` adapter list
pub fn parse_adapter_list(raw: &str) -> Result<Vec<AdapterEndpoint>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, base_url) = entry
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("Adapter entry missing '=': {}", entry)))?;
            let (id, base_url) = (id.trim(), base_url.trim());
            if id.is_empty() || base_url.is_empty() {
                return Err(Error::Config(format!("Adapter entry incomplete: {}", entry)));
            }
            Ok(AdapterEndpoint {
                id: id.to_string(),
                base_url: base_url.trim_end_matches('/').to_string(),
            })
        })
        .collect()
}

fn validate(config: &TomlConfig) -> Result<()> {
    let limits = &config.limits;
    if limits.detect_per_window == 0 || limits.import_per_window == 0 || limits.export_per_window == 0 {
        return Err(Error::Config("Rate limits must be at least 1".to_string()));
    }
    if limits.window_secs == 0 {
        return Err(Error::Config("Rate limit window must be at least 1 second".to_string()));
    }
    if !(1..=MAX_JSON_DEPTH).contains(&limits.max_json_depth) {
        return Err(Error::Config(format!(
            "Max JSON depth must be within 1..={}, got {}",
            MAX_JSON_DEPTH, limits.max_json_depth
        )));
    }
    if !(0.0..=1.0).contains(&config.detection.confidence_threshold) {
        return Err(Error::Config(format!(
            "Confidence threshold must be within 0.0..=1.0, got {}",
            config.detection.confidence_threshold
        )));
    }
    if config.health.interval_secs == 0 {
        return Err(Error::Config("Health interval must be at least 1 second".to_string()));
    }
    Ok(())
}

/// Database path: configured value or the OS-dependent default
pub fn database_path(config: &TomlConfig) -> PathBuf {
    config
        .database_path
        .clone()
        .unwrap_or_else(default_database_path)
}

/// Get OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bamort"))
        .unwrap_or_else(|| PathBuf::from("./bamort_data"))
        .join("importer.db")
}
