// src/miner/kernel/mod.rs
//! Compute kernel boundary
//!
//! The device controller never touches a device directly. It talks to a
//! [`ComputeKernel`] obtained from a [`Backend`], which keeps the controller
//! independent of whether the search runs on a GPU, on the CPU or in a test
//! double.

/// Reference kernel running on the host CPU
pub mod cpu;

use crate::types::Telemetry;
use crate::utils::error::MinerError;
use crate::work::WORK_DATA_LEN;
use std::ops::Range;

/// Words in the result buffer: slot 0 is the count, the rest are nonces
pub const RESULT_BUFFER_WORDS: usize = 21;
/// Candidate slots following the count
pub const MAX_CANDIDATES: usize = RESULT_BUFFER_WORDS - 1;

/// Kernel launch geometry and batch size
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Grid size
    pub grid: u32,
    /// Block size
    pub block: u32,
    /// Nonces scanned per invocation
    pub throughput: u32,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        LaunchConfig {
            grid: 52428,
            block: 640,
            throughput: 0x2000_0000,
        }
    }
}

/// Arguments of one kernel invocation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScanParams {
    /// Grid size
    pub grid: u32,
    /// Block size
    pub block: u32,
    /// Number of nonces to scan
    pub threads: u32,
    /// First nonce of the batch
    pub start_nonce: u32,
    /// Coarse pre-filter threshold
    pub target_high: u32,
}

/// Host- or device-side copy of the result buffer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultBuffer {
    slots: [u32; RESULT_BUFFER_WORDS],
}

impl ResultBuffer {
    /// Zeroed buffer
    pub fn new() -> Self {
        ResultBuffer {
            slots: [0; RESULT_BUFFER_WORDS],
        }
    }

    /// Raw value of the count slot
    pub fn count(&self) -> u32 {
        self.slots[0]
    }

    /// Overwrites the count slot
    pub fn set_count(&mut self, count: u32) {
        self.slots[0] = count;
    }

    /// First `n` candidate nonces, never more than the buffer holds
    pub fn candidates(&self, n: usize) -> &[u32] {
        &self.slots[1..1 + n.min(MAX_CANDIDATES)]
    }

    /// All slots
    pub fn slots(&self) -> &[u32; RESULT_BUFFER_WORDS] {
        &self.slots
    }

    /// All slots, mutable
    pub fn slots_mut(&mut self) -> &mut [u32; RESULT_BUFFER_WORDS] {
        &mut self.slots
    }

    /// Copies `slots` from `src` into `self`, like a partial memcpy
    pub fn copy_slots_from(&mut self, src: &ResultBuffer, slots: Range<usize>) -> Result<(), MinerError> {
        if slots.start > slots.end || slots.end > RESULT_BUFFER_WORDS {
            return Err(MinerError::KernelError(format!(
                "result slots {:?} out of bounds (capacity {})",
                slots, RESULT_BUFFER_WORDS
            )));
        }
        self.slots[slots.clone()].copy_from_slice(&src.slots[slots]);
        Ok(())
    }
}

impl Default for ResultBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// One device's search primitive
///
/// Every call is synchronous. Implementations own the device copy of the
/// result buffer; the controller moves slots between it and its host copy.
/// A kernel is created on, and never leaves, its device worker thread.
pub trait ComputeKernel {
    /// Loads the 192-byte precomputation block for the next scans
    fn precompute(&mut self, block: &[u8; WORK_DATA_LEN]) -> Result<(), MinerError>;

    /// Host to device copy of the given result slots
    fn copy_to_device(&mut self, host: &ResultBuffer, slots: Range<usize>) -> Result<(), MinerError>;

    /// Scans `params.threads` nonces from `params.start_nonce`
    ///
    /// Each nonce passing the pre-filter increments the device count slot
    /// and, while room remains, is stored in the next free candidate slot.
    fn scan(&mut self, params: &ScanParams) -> Result<(), MinerError>;

    /// Device to host copy of the given result slots
    fn copy_from_device(&mut self, host: &mut ResultBuffer, slots: Range<usize>) -> Result<(), MinerError>;

    /// Releases the device context
    fn release(&mut self) {}
}

/// Device as reported by enumeration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Position in enumeration order
    pub index: usize,
    /// Human readable device name
    pub name: String,
}

/// Family of compute devices
///
/// Enumeration and telemetry may run on any thread. `open` is always called
/// on the worker thread that will drive the returned kernel.
pub trait Backend: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Lists the devices present, in a stable order
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, MinerError>;

    /// Launch geometry used for every scan
    fn launch_config(&self) -> LaunchConfig {
        LaunchConfig::default()
    }

    /// Acquires the device and returns its kernel
    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn ComputeKernel>, MinerError>;

    /// Best-effort fan/temperature reading, `None` when no sensor exists
    fn sample_telemetry(&self, _device: &DeviceInfo) -> Option<Telemetry> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_are_clamped() {
        let mut buf = ResultBuffer::new();
        for (i, slot) in buf.slots_mut().iter_mut().enumerate() {
            *slot = i as u32;
        }
        assert_eq!(buf.candidates(0), &[] as &[u32]);
        assert_eq!(buf.candidates(2), &[1, 2]);
        assert_eq!(buf.candidates(1000).len(), MAX_CANDIDATES);
    }

    #[test]
    fn partial_copy() {
        let mut src = ResultBuffer::new();
        src.slots_mut()[0] = 3;
        src.slots_mut()[1] = 10;
        let mut dst = ResultBuffer::new();

        dst.copy_slots_from(&src, 0..1).unwrap();
        assert_eq!(dst.count(), 3);
        assert_eq!(dst.slots()[1], 0);

        dst.copy_slots_from(&src, 1..4).unwrap();
        assert_eq!(dst.candidates(3), &[10, 0, 0]);

        assert!(dst.copy_slots_from(&src, 0..22).is_err());
    }

    #[test]
    fn default_launch_matches_reference_geometry() {
        let launch = LaunchConfig::default();
        assert_eq!(launch.grid, 52428);
        assert_eq!(launch.block, 640);
        assert_eq!(launch.throughput, 0x2000_0000);
    }
}
