//! Configuration Module
//!
//! Provides TOML-based configuration for flowsketch.
//! Configuration is optional - CLI arguments can override file settings.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::classifier::Thresholds;
use crate::counters::DEFAULT_FLUSH_INTERVAL;
use crate::error::ConfigError;
use crate::sketch::{DEFAULT_COLS, DEFAULT_ROWS};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sketch: SketchConfig,
    pub worker: WorkerConfig,
    pub detection: Thresholds,
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Loads configuration from the given file, or returns defaults when no
    /// path was supplied. An explicitly named file that cannot be read or
    /// parsed is a startup error, never a silent fallback.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Generates a default configuration file content
    pub fn generate_default() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| "# Failed to generate config".to_string())
    }

    /// Validates the configuration. Invalid settings prevent startup; nothing
    /// here is retried or degraded.
    pub fn validate(&self) -> Result<()> {
        if self.sketch.rows == 0 || self.sketch.cols == 0 {
            return Err(ConfigError::InvalidSketchDimensions {
                rows: self.sketch.rows,
                cols: self.sketch.cols,
            }
            .into());
        }
        if self.worker.flush_interval == 0 {
            return Err(ConfigError::InvalidFlushInterval.into());
        }
        if self.worker.burst == 0 {
            return Err(ConfigError::InvalidBurstSize.into());
        }
        if self.telemetry.interval_secs == 0 {
            return Err(ConfigError::InvalidTelemetryInterval.into());
        }
        Ok(())
    }
}

/// Sketch dimensions. Fixed for the process lifetime; never resized.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SketchConfig {
    /// Number of independently-hashed rows.
    pub rows: usize,
    /// Columns per row.
    pub cols: usize,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker thread count (0 = available parallelism minus one for the
    /// orchestration thread).
    pub workers: usize,
    /// Maximum descriptors taken per poll.
    pub burst: usize,
    /// Packets accumulated locally before flushing totals to the shared bank.
    pub flush_interval: u64,
    /// Per-worker descriptor queue capacity.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            burst: 128,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_capacity: 65536,
        }
    }
}

impl WorkerConfig {
    /// Resolves the effective worker count.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1).max(1))
            .unwrap_or(1)
    }
}

/// Telemetry snapshotter configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Snapshot interval in seconds.
    pub interval_secs: u64,
    /// Packet-rate alert threshold (packets/sec).
    pub alert_pps: u64,
    /// Bit-rate alert threshold (Gbps).
    pub alert_gbps: f64,
    /// Optional CSV detection log path (None = no file log).
    pub log_file: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            alert_pps: 100_000_000,
            alert_gbps: 50.0,
            log_file: None,
        }
    }
}
