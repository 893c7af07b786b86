//! Domain-specific error types for flowsketch.
//!
//! Uses `thiserror` for ergonomic error definitions that integrate
//! with the broader `anyhow` error handling strategy.

use thiserror::Error;

/// Startup configuration errors. These are the only failures the core can
/// produce: once the sketch and counters are allocated, every operation on
/// them is total.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid sketch dimensions: {rows} rows x {cols} columns (both must be non-zero)")]
    InvalidSketchDimensions { rows: usize, cols: usize },

    #[error("counter flush interval must be non-zero")]
    InvalidFlushInterval,

    #[error("poll burst size must be non-zero")]
    InvalidBurstSize,

    #[error("worker count must be non-zero")]
    InvalidWorkerCount,

    #[error("telemetry interval must be non-zero")]
    InvalidTelemetryInterval,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
