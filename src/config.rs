//! Runtime configuration, loaded from YAML with per-field defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    pub scheduler: SchedulerConfig,
    /// Default retention for completed-instance cleanup.
    pub keep_last_instances: usize,
}

/// Periodic driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between template scans.
    pub scan_interval_secs: u64,
    /// Attempts per template per tick before it is skipped.
    pub generation_attempts: u32,
    /// Initial backoff between attempts; doubles per retry.
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("taskwheel.db"),
            scheduler: SchedulerConfig::default(),
            keep_last_instances: 10,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 300,
            generation_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file. A missing file yields defaults;
    /// a present but malformed file is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the config path from an explicit flag, the `TASKWHEEL_CONFIG`
    /// environment variable, or the default location, in that order.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var("TASKWHEEL_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("taskwheel.yaml"))
    }
}
