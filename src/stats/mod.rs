//! Statistics collection and reporting module
//!
//! This module tracks per-device mining statistics, including:
//! - Scan and effective hashrate
//! - Share acceptance/rejection tracking
//! - Fan speed and temperature telemetry
//!
//! Counters live in [`DeviceStats`]; [`StatsReporter`] periodically logs
//! them and [`TelemetrySampler`] keeps the sensor readings fresh.

/// Atomic per-device counters
pub mod device;

/// Submodule containing the reporter and telemetry sampler
///
/// Both run on their own background thread and stop with the miner's
/// shutdown signal.
pub mod reporter;

// Re-export main components
pub use device::{DeviceSnapshot, DeviceStats};
pub use reporter::{MiningSummary, StatsReporter, TelemetrySampler, format_hashrate};
