// src/miner/kernel/cpu.rs
//! CPU reference kernel
//!
//! Performs the same batched search a GPU kernel does, spread over a rayon
//! pool. Each emulated device gets its own pool so devices do not steal
//! each other's threads.

use crate::miner::kernel::{
    Backend, ComputeKernel, DeviceInfo, LaunchConfig, MAX_CANDIDATES, ResultBuffer, ScanParams,
};
use crate::pow;
use crate::types::Telemetry;
use crate::utils::error::MinerError;
use crate::work::{HEADER_LEN, NONCE0_WORD, WORK_DATA_LEN, word_offset};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::ops::Range;
use std::sync::Mutex;
use sysinfo::Components;

/// Backend exposing `devices` CPU search devices
pub struct CpuBackend {
    devices: usize,
    threads: usize,
    throughput: u32,
    sensors: Mutex<Components>,
}

impl CpuBackend {
    /// Creates the backend
    ///
    /// # Arguments
    /// * `devices` - Number of emulated devices
    /// * `threads` - Worker threads per device (0 = share all cores evenly)
    /// * `throughput` - Nonces per scan
    pub fn new(devices: usize, threads: usize, throughput: u32) -> Self {
        let threads = if threads == 0 {
            (num_cpus::get() / devices.max(1)).max(1)
        } else {
            threads
        };

        CpuBackend {
            devices,
            threads,
            throughput: throughput.max(1),
            sensors: Mutex::new(Components::new_with_refreshed_list()),
        }
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, MinerError> {
        Ok((0..self.devices)
            .map(|index| DeviceInfo {
                index,
                name: format!("CPU search device ({} threads)", self.threads),
            })
            .collect())
    }

    fn launch_config(&self) -> LaunchConfig {
        LaunchConfig {
            grid: 1,
            block: self.threads as u32,
            throughput: self.throughput,
        }
    }

    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn ComputeKernel>, MinerError> {
        let index = device.index;
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(move |i| format!("cpu{}-lane{}", index, i))
            .build()
            .map_err(|e| MinerError::DeviceError(format!("CPU device #{}: {}", index, e)))?;

        Ok(Box::new(CpuKernel::new(pool)))
    }

    fn sample_telemetry(&self, _device: &DeviceInfo) -> Option<Telemetry> {
        let mut sensors = self.sensors.lock().ok()?;
        sensors.refresh(true);

        let temperature = sensors
            .iter()
            .filter(|c| {
                let label = c.label().to_lowercase();
                label.contains("cpu") || label.contains("package") || label.contains("core")
            })
            .filter_map(|c| c.temperature())
            .fold(None, |max: Option<f32>, t| Some(max.map_or(t, |m| m.max(t))))?;

        // CPUs expose no fan reading through the component list.
        Some(Telemetry {
            fan_percent: 0,
            temperature: temperature.max(0.0).round() as u32,
        })
    }
}

/// Kernel state for one CPU device
pub struct CpuKernel {
    pool: ThreadPool,
    block: [u8; WORK_DATA_LEN],
    results: ResultBuffer,
}

impl CpuKernel {
    /// Wraps a dedicated thread pool
    pub fn new(pool: ThreadPool) -> Self {
        CpuKernel {
            pool,
            block: [0; WORK_DATA_LEN],
            results: ResultBuffer::new(),
        }
    }
}

impl ComputeKernel for CpuKernel {
    fn precompute(&mut self, block: &[u8; WORK_DATA_LEN]) -> Result<(), MinerError> {
        self.block = *block;
        Ok(())
    }

    fn copy_to_device(&mut self, host: &ResultBuffer, slots: Range<usize>) -> Result<(), MinerError> {
        self.results.copy_slots_from(host, slots)
    }

    fn scan(&mut self, params: &ScanParams) -> Result<(), MinerError> {
        let block = self.block;
        let start = params.start_nonce;
        let target_high = params.target_high;
        let nonce_at = word_offset(NONCE0_WORD);

        let found: Vec<u32> = self.pool.install(|| {
            (0..params.threads)
                .into_par_iter()
                .filter_map(|i| {
                    let nonce = start.wrapping_add(i);
                    let mut header = block;
                    header[nonce_at..nonce_at + 4].copy_from_slice(&nonce.to_le_bytes());
                    let hash = pow::header_hash(&header[..HEADER_LEN]);
                    pow::passes_prefilter(&hash, target_high).then_some(nonce)
                })
                .collect()
        });

        let mut count = self.results.count();
        for nonce in found {
            let slot = count as usize;
            if slot < MAX_CANDIDATES {
                self.results.slots_mut()[1 + slot] = nonce;
            }
            count = count.saturating_add(1);
        }
        self.results.set_count(count);
        Ok(())
    }

    fn copy_from_device(&mut self, host: &mut ResultBuffer, slots: Range<usize>) -> Result<(), MinerError> {
        host.copy_slots_from(&self.results, slots)
    }
}
