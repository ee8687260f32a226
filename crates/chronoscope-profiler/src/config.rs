//! Profiler configuration.

use std::str::FromStr;

use chronoscope_core::constants::DEFAULT_HISTORY_CAPACITY;
use chronoscope_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`ProfilerConfig::enabled`].
pub const ENV_ENABLED: &str = "CHRONOSCOPE_ENABLED";
/// Environment variable overriding [`ProfilerConfig::history_capacity`].
pub const ENV_HISTORY_CAPACITY: &str = "CHRONOSCOPE_HISTORY_CAPACITY";
/// Environment variable overriding [`ProfilerConfig::track_percentiles`].
pub const ENV_PERCENTILES: &str = "CHRONOSCOPE_PERCENTILES";

/// Configuration for a [`Profiler`](crate::Profiler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Whether profiling starts enabled.
    pub enabled: bool,
    /// Recent durations retained per tag.
    pub history_capacity: usize,
    /// Whether snapshots carry p95/p99 computed from history.
    pub track_percentiles: bool,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            track_percentiles: true,
        }
    }
}

impl ProfilerConfig {
    /// Defaults overlaid with any `CHRONOSCOPE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values returned by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_ENABLED) {
            config.enabled = parse_flag(ENV_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_HISTORY_CAPACITY) {
            let capacity: usize = parse(ENV_HISTORY_CAPACITY, &value)?;
            if capacity == 0 {
                let message = format!("{ENV_HISTORY_CAPACITY} must be at least 1");
                return Err(Error::Config(message));
            }
            config.history_capacity = capacity;
        }
        if let Some(value) = lookup(ENV_PERCENTILES) {
            config.track_percentiles = parse_flag(ENV_PERCENTILES, &value)?;
        }
        Ok(config)
    }

    /// Set whether profiling starts enabled.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the per-tag history capacity (at least one).
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    /// Enable or disable percentile tracking.
    #[must_use]
    pub const fn with_percentiles(mut self, track: bool) -> Self {
        self.track_percentiles = track;
        self
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: cannot parse '{value}'")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => {
            let message = format!("{key}: expected a boolean, got '{value}'");
            Err(Error::Config(message))
        }
    }
}
