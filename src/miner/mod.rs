// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to the mining process:
//! - The compute kernel boundary and the CPU reference backend
//! - Per-device controllers driving the scan loop
//! - Device enumeration and worker management
//! - Final validation of candidates

/// Compute backends and kernels
///
/// Defines the [`kernel::Backend`] and [`kernel::ComputeKernel`] traits the
/// controllers are written against, and the CPU implementation.
pub mod kernel;

/// Per-device mining loop
///
/// Work adoption, extraNonce advancement, timestamp rolling, kernel
/// invocation and candidate harvesting for a single device.
pub mod device;

/// Device selection and worker threads
pub mod registry;

/// Final validation of candidates
pub mod collector;

// Re-export main components for cleaner imports
pub use self::collector::{Candidate, Collector, SolvedWork, Verdict};
pub use self::device::{ControllerLinks, DeviceController};
pub use self::kernel::{Backend, ComputeKernel, DeviceInfo, LaunchConfig, cpu::CpuBackend};
pub use self::registry::{AdmittedDevice, JoinReport, Miner, Registry, admit_devices};
