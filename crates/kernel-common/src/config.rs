//! Configuration structures for the cycle kernel.
//!
//! Supports TOML deserialization with sensible defaults for
//! development and explicit values for production deployment.

use crate::error::{KernelError, KernelResult};
use crate::movavg::{normalize_windows, DEFAULT_WINDOWS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Target cycles per second.
    pub block_frequency: f64,

    /// Moving average window sizes, in samples.
    pub sma_windows: Vec<usize>,

    /// Emit a status line every N cycles (0 disables).
    pub report_every: u64,

    /// Simulated work used by the daemon.
    pub simulation: SimulationConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            block_frequency: 1.0,
            sma_windows: DEFAULT_WINDOWS.to_vec(),
            report_every: 100,
            simulation: SimulationConfig::default(),
        }
    }
}

/// Simulated cycle work parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Time spent in the maintenance phase each cycle.
    #[serde(with = "humantime_serde")]
    pub maintenance_time: Duration,

    /// Fraction of the scheduled budget consumed by production (0.0 to 1.0).
    pub production_fill: f64,

    /// Inbound protocols reporting receive-queue depths.
    pub protocols: Vec<String>,

    /// Upper bound for simulated queue depths.
    pub max_queue_depth: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            maintenance_time: Duration::from_millis(50),
            production_fill: 0.8,
            protocols: vec!["block".into(), "transaction".into()],
            max_queue_depth: 64,
        }
    }
}

impl KernelConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check values that would otherwise fail deep inside the cycle loop.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Config`] describing the first invalid value.
    pub fn validate(&self) -> KernelResult<()> {
        validate_frequency(self.block_frequency)?;
        normalize_windows(&self.sma_windows)?;

        let fill = self.simulation.production_fill;
        if !(0.0..=1.0).contains(&fill) {
            return Err(KernelError::Config(format!(
                "simulation.production_fill must be within 0.0..=1.0, got {fill}"
            )));
        }
        Ok(())
    }
}

/// Reject frequencies that cannot produce a usable block interval.
///
/// # Errors
///
/// Returns [`KernelError::Config`] for non-finite or non-positive values.
pub fn validate_frequency(frequency: f64) -> KernelResult<()> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return Err(KernelError::Config(format!(
            "block frequency must be positive and finite, got {frequency}"
        )));
    }
    Ok(())
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
