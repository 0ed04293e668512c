//! GPU Miner - multi-device proof-of-work search controller in Rust
//!
//! This crate drives any number of compute devices against a shared stream
//! of work templates:
//! - Disjoint extraNonce shards per device, so no two devices repeat work
//! - Work refresh without interrupting running scans
//! - Timestamp rolling for solo work
//! - Final difficulty validation of every candidate a kernel reports
//! - Per-device statistics and fan/temperature telemetry

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core: kernels, device controllers, registry and collector
pub mod miner;

/// Work templates, extraNonce sharding and work distribution
pub mod work;

/// Header hashing and target comparison
pub mod pow;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use miner::{Backend, Candidate, Collector, CpuBackend, DeviceController, Miner, Registry, SolvedWork};
pub use stats::{DeviceStats, StatsReporter, TelemetrySampler};
pub use types::{Network, Telemetry, WorkMode};
pub use utils::{MinerError, Shutdown, ShutdownSignal, init_logging};
pub use work::{ExtraNonce, FileWorkSource, WorkDispatcher, WorkTemplate};
