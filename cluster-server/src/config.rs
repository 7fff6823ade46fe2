//! Configuration loading for cluster tests.
//!
//! Configuration is loaded from a TOML file; every section and key is
//! optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use cluster_disrupt::DisruptionConfig;
use cluster_ports::PortConfig;

use crate::handle::PollSettings;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Port reservation.
    #[serde(default)]
    pub ports: PortConfig,
    /// Disruption relays.
    #[serde(default)]
    pub disruption: DisruptionConfig,
    /// State polling.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// State polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LifecycleConfig {
    /// Interval between state checks (default: 100ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up waiting for a state after this long (default: wait forever).
    #[serde(default)]
    pub state_timeout_secs: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            state_timeout_secs: None,
        }
    }
}

impl LifecycleConfig {
    /// Polling parameters for `wait_for_state`.
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            timeout: self.state_timeout_secs.map(Duration::from_secs),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
