//! Configuration loading and validation

use anyhow::{bail, Result};
use fusiond_core::{
    ValidatorConfig, DEFAULT_HISTORY_WINDOW, DEFAULT_SKEW_TOLERANCE_MS, ORIENTATION_EPSILON,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the HTTP server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// How often the idle eviction sweep runs, in milliseconds
    #[serde(default = "default_eviction_interval", alias = "evictionIntervalMs")]
    pub eviction_interval_ms: u64,
    /// TLS configuration (optional - enables HTTPS when present)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            eviction_interval_ms: default_eviction_interval(),
            tls: None,
        }
    }
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format)
    pub cert: String,
    /// Path to private key file (PEM format)
    pub key: String,
}

/// Ingestion behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Frames kept per device
    #[serde(default = "default_history_window", alias = "historyWindow")]
    pub history_window: usize,
    /// Allowed producer clock skew in milliseconds
    #[serde(default = "default_skew_tolerance", alias = "skewToleranceMs")]
    pub skew_tolerance_ms: u64,
    /// Devices silent for longer than this are evicted
    #[serde(default = "default_idle_ttl", alias = "idleTtlMs")]
    pub idle_ttl_ms: u64,
    /// Allowed deviation from unit norm for a normalized orientation
    #[serde(default = "default_orientation_epsilon", alias = "orientationEpsilon")]
    pub orientation_epsilon: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            skew_tolerance_ms: default_skew_tolerance(),
            idle_ttl_ms: default_idle_ttl(),
            orientation_epsilon: default_orientation_epsilon(),
        }
    }
}

impl IngestConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_millis(self.idle_ttl_ms)
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            skew_tolerance_ms: self.skew_tolerance_ms,
            orientation_epsilon: self.orientation_epsilon,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_eviction_interval() -> u64 {
    5_000
}

fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}

fn default_skew_tolerance() -> u64 {
    DEFAULT_SKEW_TOLERANCE_MS
}

fn default_idle_ttl() -> u64 {
    60_000
}

fn default_orientation_epsilon() -> f64 {
    ORIENTATION_EPSILON
}

impl Config {
    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ingest.history_window == 0 {
            bail!("ingest.history_window must be at least 1");
        }
        if self.ingest.idle_ttl_ms == 0 {
            bail!("ingest.idle_ttl_ms must be at least 1");
        }
        if !(self.ingest.orientation_epsilon.is_finite() && self.ingest.orientation_epsilon > 0.0) {
            bail!("ingest.orientation_epsilon must be a positive number");
        }
        if self.daemon.eviction_interval_ms == 0 {
            bail!("daemon.eviction_interval_ms must be at least 1");
        }
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.ingest.history_window, DEFAULT_HISTORY_WINDOW);
        assert_eq!(config.daemon.bind, "0.0.0.0:3000");
        assert!(config.daemon.tls.is_none());
    }

    #[test]
    fn test_load_with_camel_case_aliases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fusiond.toml");
        std::fs::write(
            &path,
            r#"
[daemon]
bind = "127.0.0.1:9000"

[ingest]
historyWindow = 8
skewToleranceMs = 500
idle_ttl_ms = 1000
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.daemon.bind, "127.0.0.1:9000");
        assert_eq!(config.ingest.history_window, 8);
        assert_eq!(config.ingest.validator_config().skew_tolerance_ms, 500);
        assert_eq!(config.ingest.idle_ttl(), Duration::from_secs(1));
        assert_eq!(config.daemon.eviction_interval_ms, 5_000);
        assert_eq!(config.ingest.orientation_epsilon, ORIENTATION_EPSILON);
    }

    #[test]
    fn test_orientation_epsilon_reaches_validator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fusiond.toml");
        std::fs::write(&path, "[ingest]
orientationEpsilon = 0.001
").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.ingest.validator_config().orientation_epsilon, 0.001);

        std::fs::write(&path, "[ingest]
orientation_epsilon = -1.0
").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("orientation_epsilon"));
    }

    #[test]
    fn test_zero_history_window_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fusiond.toml");
        std::fs::write(&path, "[ingest]\nhistory_window = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("history_window"));
    }

    #[test]
    fn test_default_config_round_trips_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fusiond.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.ingest.idle_ttl_ms, 60_000);
        assert_eq!(config.ingest.skew_tolerance_ms, DEFAULT_SKEW_TOLERANCE_MS);
    }
}
