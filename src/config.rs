//! Configuration management for callgate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{GateError, Result};
use crate::gate::TimeWindow;

/// Prefix for environment overrides, e.g. `CALLGATE_GATE__LIMIT=5`.
const ENV_PREFIX: &str = "CALLGATE";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallgateConfig {
    /// Gate configuration
    #[serde(default)]
    pub gate: GateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rate gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Window after which the admission counter resets
    #[serde(default)]
    pub window: TimeWindow,

    /// Maximum admissions per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// How long a caller waits for the counter lock, in milliseconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            window: TimeWindow::default(),
            limit: default_limit(),
            acquire_timeout_ms: default_acquire_timeout(),
        }
    }
}

fn default_limit() -> u64 {
    10
}

fn default_acquire_timeout() -> u64 {
    1000
}

impl GateConfig {
    /// Reject values a gate cannot be built from.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(GateError::Config(
                "gate.limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the caller wait budget as a duration.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CallgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CallgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.gate.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply `CALLGATE_*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(::config::File::from(path));
        }

        let config: CallgateConfig = builder
            .add_source(
                ::config::Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.gate.validate()?;
        Ok(config)
    }
}
