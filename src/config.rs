//! Bridge configuration
//!
//! Handles parsing and validation of rtbridge.toml configuration files.
//! All knobs have working defaults; hosts embedding the bridge usually
//! construct [`BridgeConfig::default`] and override individual fields.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

fn default_executors() -> usize {
    1
}

/// Root configuration structure matching rtbridge.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Number of executors in the pool. One is enough for most hosts:
    /// it serializes every foreign call onto a single thread.
    #[serde(default = "default_executors")]
    pub executors: usize,

    /// Bound on each executor's queue; `None` means unbounded.
    #[serde(default)]
    pub queue_bound: Option<usize>,

    /// Permits for the bounded-call gate; `None` sizes the gate to the
    /// machine's available parallelism (floor of 4).
    #[serde(default)]
    pub gate_permits: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            executors: default_executors(),
            queue_bound: None,
            gate_permits: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the knobs for values that cannot work.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.executors == 0 {
            return Err(ConfigError::Invalid(
                "executors must be at least 1".to_string(),
            ));
        }
        if self.queue_bound == Some(0) {
            return Err(ConfigError::Invalid(
                "queue_bound must be at least 1 when set".to_string(),
            ));
        }
        if self.gate_permits == Some(0) {
            return Err(ConfigError::Invalid(
                "gate_permits must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}
