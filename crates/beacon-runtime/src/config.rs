//! Runtime configuration
//!
//! Loaded from a TOML file, then overridden by `BEACON_*` environment
//! variables, then validated:
//!
//! ```toml
//! stop_grace_ms = 1000
//! change_interval_ms = 1000
//! log_filter = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use beacon_core::BeaconError;
use serde::{Deserialize, Serialize};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "BEACON_";

const KEYS: [&str; 3] = ["stop_grace_ms", "change_interval_ms", "log_filter"];

/// Configuration for task supervision, control loops and logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// How long `TaskRegistry::stop_and_wait` lets tasks finish before
    /// aborting them (default: 1000ms)
    pub stop_grace_ms: u64,
    /// Tick period used by `watch::do_when_changed_or_configured_interval`
    /// (default: 1000ms)
    pub change_interval_ms: u64,
    /// `tracing` filter directive used when `RUST_LOG` is unset
    /// (default: "info")
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: 1000,
            change_interval_ms: 1000,
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, BeaconError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BeaconError::invalid(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, BeaconError> {
        toml::from_str(content).map_err(|e| BeaconError::invalid(format!("Invalid TOML: {e}")))
    }

    /// Apply `BEACON_STOP_GRACE_MS`, `BEACON_CHANGE_INTERVAL_MS` and
    /// `BEACON_LOG_FILTER` from the process environment, when set.
    pub fn merge_with_env(&mut self) -> Result<(), BeaconError> {
        for key in KEYS {
            if let Ok(value) = std::env::var(format!("{ENV_PREFIX}{}", key.to_uppercase())) {
                self.set_from_string(key, &value)?;
            }
        }
        Ok(())
    }

    /// Set a single value by key (as used for env and CLI overrides).
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<(), BeaconError> {
        match key {
            "stop_grace_ms" => self.stop_grace_ms = parse_millis(key, value)?,
            "change_interval_ms" => self.change_interval_ms = parse_millis(key, value)?,
            "log_filter" => self.log_filter = value.to_string(),
            _ => {
                return Err(BeaconError::invalid(format!(
                    "Unknown configuration key '{key}'"
                )))
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), BeaconError> {
        if self.stop_grace_ms == 0 {
            return Err(BeaconError::invalid("stop_grace_ms must be greater than 0"));
        }
        if self.change_interval_ms == 0 {
            return Err(BeaconError::invalid(
                "change_interval_ms must be greater than 0",
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(BeaconError::invalid("log_filter cannot be empty"));
        }
        Ok(())
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn change_interval(&self) -> Duration {
        Duration::from_millis(self.change_interval_ms)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64, BeaconError> {
    value.trim().parse().map_err(|e| {
        BeaconError::invalid(format!("Field '{key}' must be milliseconds, got '{value}': {e}"))
    })
}
