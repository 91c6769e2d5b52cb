//! Server configuration
//!
//! The server reads configuration from:
//! 1. `TELEMETRY_CONFIG` environment variable (path to TOML file)
//! 2. `./telemetry.toml` in current directory
//! 3. Default configuration
//!
//! `REDIS_URL` and `PORT` then override the cache URL and listen port.
//!
//! ```toml
//! listen_addr = "0.0.0.0:5000"
//!
//! [cache]
//! backend = "redis"
//! redis_url = "redis://localhost:6379"
//! key_prefix = "mqtt"
//!
//! [reporting]
//! reference_utc_offset_minutes = 330
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::cache::MonitorConfig;
use crate::error::{Error, Result};
use crate::report::ReportLimits;
use crate::service::ServiceOptions;
use crate::types::ReferenceZone;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "TELEMETRY_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "telemetry.toml";

// =============================================================================
// Server Configuration
// =============================================================================

/// Server configuration loaded from TOML or environment
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub reporting: ReportingSection,

    #[serde(default)]
    pub prediction: PredictionSection,
}

/// Which cache backend to run with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Redis,
    Memory,
    Disabled,
}

/// `[cache]` section
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default)]
    pub backend: CacheBackendKind,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Namespace prefix of every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Seconds between connection probes
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,
}

/// `[reporting]` section
#[derive(Debug, Clone, Deserialize)]
pub struct ReportingSection {
    /// Offset of the zone calendar days and clock times are read in
    #[serde(default = "default_utc_offset")]
    pub reference_utc_offset_minutes: i32,

    #[serde(default = "default_max_topics")]
    pub max_topics: usize,

    #[serde(default = "default_max_range_days")]
    pub max_range_days: i64,

    #[serde(default = "default_report_limit")]
    pub default_limit: usize,
}

/// `[prediction]` section
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionSection {
    #[serde(default = "default_registry_capacity")]
    pub model_registry_capacity: usize,
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "mqtt".to_string()
}

fn default_monitor_interval() -> u64 {
    5
}

fn default_utc_offset() -> i32 {
    330 // UTC+05:30
}

fn default_max_topics() -> usize {
    5
}

fn default_max_range_days() -> i64 {
    365
}

fn default_report_limit() -> usize {
    1000
}

fn default_registry_capacity() -> usize {
    1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cache: CacheSection::default(),
            reporting: ReportingSection::default(),
            prediction: PredictionSection::default(),
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::default(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            monitor_interval_secs: default_monitor_interval(),
        }
    }
}

impl Default for ReportingSection {
    fn default() -> Self {
        Self {
            reference_utc_offset_minutes: default_utc_offset(),
            max_topics: default_max_topics(),
            max_range_days: default_max_range_days(),
            default_limit: default_report_limit(),
        }
    }
}

impl Default for PredictionSection {
    fn default() -> Self {
        Self {
            model_registry_capacity: default_registry_capacity(),
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply `REDIS_URL` / `PORT` style overrides
    pub fn apply_overrides(&mut self, redis_url: Option<String>, port: Option<String>) {
        if let Some(url) = redis_url.filter(|u| !u.trim().is_empty()) {
            self.cache.redis_url = url;
        }
        if let Some(port) = port.and_then(|p| p.trim().parse::<u16>().ok()) {
            let host = self
                .listen_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.listen_addr = format!("{}:{}", host, port);
        }
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        self.reference_zone()?;
        if self.reporting.max_topics == 0 || self.reporting.default_limit == 0 {
            return Err(Error::Configuration(
                "reporting.max_topics and reporting.default_limit must be positive".to_string(),
            ));
        }
        if self.reporting.max_range_days <= 0 {
            return Err(Error::Configuration(
                "reporting.max_range_days must be positive".to_string(),
            ));
        }
        if self.cache.monitor_interval_secs == 0 {
            return Err(Error::Configuration(
                "cache.monitor_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Reference zone for calendar days and clock times
    pub fn reference_zone(&self) -> Result<ReferenceZone> {
        ReferenceZone::from_offset_minutes(self.reporting.reference_utc_offset_minutes).ok_or_else(
            || {
                Error::Configuration(format!(
                    "invalid reference_utc_offset_minutes: {}",
                    self.reporting.reference_utc_offset_minutes
                ))
            },
        )
    }

    /// Options the service is built with
    pub fn service_options(&self) -> Result<ServiceOptions> {
        Ok(ServiceOptions {
            zone: self.reference_zone()?,
            report_limits: ReportLimits {
                max_topics: self.reporting.max_topics,
                max_range_days: self.reporting.max_range_days,
                default_limit: self.reporting.default_limit,
            },
            model_registry_capacity: self.prediction.model_registry_capacity,
        })
    }

    /// Connection monitor settings
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            probe_interval: Duration::from_secs(self.cache.monitor_interval_secs),
            ..Default::default()
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Load configuration from file or environment
pub fn load_config() -> ServerConfig {
    let mut config = load_file_config();
    config.apply_overrides(std::env::var("REDIS_URL").ok(), std::env::var("PORT").ok());
    config
}

fn load_file_config() -> ServerConfig {
    // Check environment variable first
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        match ServerConfig::from_file(&path) {
            Ok(config) => {
                info!(path = %path, "Loaded configuration from file");
                return config;
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to load config file, using defaults");
            }
        }
    }

    // Check default config file
    if Path::new(DEFAULT_CONFIG_FILE).exists() {
        match ServerConfig::from_file(DEFAULT_CONFIG_FILE) {
            Ok(config) => {
                info!("Loaded configuration from {}", DEFAULT_CONFIG_FILE);
                return config;
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse {}, using defaults", DEFAULT_CONFIG_FILE);
            }
        }
    }

    info!("Using default configuration");
    ServerConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:5000");
        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        assert_eq!(config.cache.key_prefix, "mqtt");
        assert_eq!(config.reporting.reference_utc_offset_minutes, 330);
        assert_eq!(config.prediction.model_registry_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = ServerConfig::from_toml(
            r#"
            listen_addr = "127.0.0.1:8080"

            [cache]
            backend = "memory"

            [reporting]
            max_topics = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.cache.backend, CacheBackendKind::Memory);
        assert_eq!(config.cache.redis_url, "redis://localhost:6379");
        assert_eq!(config.reporting.max_topics, 3);
        assert_eq!(config.reporting.max_range_days, 365);
        assert_eq!(config.service_options().unwrap().report_limits.max_topics, 3);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\nbackend = \"disabled\"\nmonitor_interval_secs = 2").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cache.backend, CacheBackendKind::Disabled);
        assert_eq!(config.monitor_config().probe_interval, Duration::from_secs(2));

        assert!(ServerConfig::from_file("/nonexistent/telemetry.toml").is_err());
    }

    #[test]
    fn test_invalid_values() {
        assert!(ServerConfig::from_toml("[cache]\nbackend = \"memcached\"").is_err());

        let config =
            ServerConfig::from_toml("[reporting]\nreference_utc_offset_minutes = 5000").unwrap();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config.apply_overrides(Some("redis://cache:6380".to_string()), Some("7000".to_string()));
        assert_eq!(config.cache.redis_url, "redis://cache:6380");
        assert_eq!(config.listen_addr, "0.0.0.0:7000");

        config.apply_overrides(Some(" ".to_string()), Some("not-a-port".to_string()));
        assert_eq!(config.cache.redis_url, "redis://cache:6380");
        assert_eq!(config.listen_addr, "0.0.0.0:7000");
    }
}
