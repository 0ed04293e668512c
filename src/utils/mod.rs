// src/utils/mod.rs
//! Utilities module for common functionality
//!
//! Error handling, logging setup, cancellation and the wall clock shared by
//! the mining components.

/// Error types and handling utilities
///
/// Contains the [`MinerError`] enum which defines all possible error conditions
/// for the mining application, along with conversion implementations.
pub mod error;

/// Logging configuration and utilities
pub mod logging;

/// Closed-once cancellation signal shared by all device workers
pub mod shutdown;

/// Wall-clock abstraction used for timestamp rolling
pub mod clock;

// Re-export for easier access
pub use clock::{Clock, SystemClock};
pub use error::MinerError;
pub use logging::init_logging;
pub use shutdown::{Shutdown, ShutdownSignal};
