// src/miner/registry.rs
//! Device registry
//!
//! Enumerates the backend's devices, applies the allow-list, hands out
//! ordinals and starts one named worker thread per admitted device.

use crate::miner::collector::Candidate;
use crate::miner::device::{ControllerLinks, DeviceController};
use crate::miner::kernel::{Backend, DeviceInfo};
use crate::stats::DeviceStats;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::error::MinerError;
use crate::utils::shutdown::ShutdownSignal;
use crate::work::{MAX_DEVICES, WorkDispatcher};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A device that passed the allow-list, with its ordinal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedDevice {
    /// Position among admitted devices, used as extraNonce prefix
    pub ordinal: u8,
    /// Enumeration data
    pub info: DeviceInfo,
}

/// Applies the allow-list to the enumerated devices
///
/// An empty allow-list admits everything. Ordinals are assigned in
/// enumeration order, so they never depend on the allow-list order.
///
/// # Errors
/// * `InvalidDevice` - The allow-list names an index nobody enumerated
/// * `NoDevices` - Nothing was admitted
/// * `ConfigError` - More devices than the extraNonce prefix can address
pub fn admit_devices(
    found: Vec<DeviceInfo>,
    allow: &[usize],
) -> Result<Vec<AdmittedDevice>, MinerError> {
    if let Some(&index) = allow.iter().find(|&&i| i >= found.len()) {
        return Err(MinerError::InvalidDevice {
            index,
            found: found.len(),
        });
    }

    let admitted: Vec<DeviceInfo> = found
        .into_iter()
        .enumerate()
        .filter(|(i, _)| allow.is_empty() || allow.contains(i))
        .map(|(_, info)| info)
        .collect();

    if admitted.is_empty() {
        return Err(MinerError::NoDevices);
    }
    if admitted.len() > MAX_DEVICES {
        return Err(MinerError::ConfigError(format!(
            "{} devices admitted, at most {} are supported",
            admitted.len(),
            MAX_DEVICES
        )));
    }

    Ok(admitted
        .into_iter()
        .enumerate()
        .map(|(ordinal, info)| AdmittedDevice {
            ordinal: ordinal as u8,
            info,
        })
        .collect())
}

/// Owns the backend and the device selection
pub struct Registry {
    backend: Arc<dyn Backend>,
    allow: Vec<usize>,
    clock: Arc<dyn Clock>,
}

impl Registry {
    /// Creates a registry over `backend`
    ///
    /// # Arguments
    /// * `backend` - Device enumeration and kernel factory
    /// * `allow` - Enumeration indices to use, empty for all
    pub fn new(backend: Arc<dyn Backend>, allow: Vec<usize>) -> Self {
        Registry {
            backend,
            allow,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the wall clock used for timestamp rolling
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The backend in use
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Devices that would be started, with their ordinals
    pub fn admitted(&self) -> Result<Vec<AdmittedDevice>, MinerError> {
        admit_devices(self.backend.enumerate()?, &self.allow)
    }

    /// Starts a worker thread per admitted device
    ///
    /// Each worker subscribes to `dispatcher` before its thread starts, so
    /// no template issued after this call is missed. The kernel is opened on
    /// the worker thread itself.
    ///
    /// # Arguments
    /// * `dispatcher` - Source of work templates
    /// * `candidates` - Channel to the collector; dropped here once cloned
    /// * `shutdown` - Cancellation shared by every worker
    pub fn launch(
        &self,
        dispatcher: &WorkDispatcher,
        candidates: Sender<Candidate>,
        shutdown: ShutdownSignal,
    ) -> Result<Miner, MinerError> {
        let devices = self.admitted()?;
        let launch = self.backend.launch_config();
        log::info!(
            "Starting {} {} device(s), throughput {:#x}",
            devices.len(),
            self.backend.name(),
            launch.throughput
        );

        let mut stats = Vec::with_capacity(devices.len());
        let mut workers = Vec::with_capacity(devices.len());
        // Workers wait on the gate until every thread exists.
        let (start, gate) = crossbeam_channel::unbounded::<()>();

        for device in devices {
            let device_stats = Arc::new(DeviceStats::new(device.ordinal, device.info.clone()));
            let links = ControllerLinks {
                work: dispatcher.subscribe(),
                candidates: candidates.clone(),
                shutdown: shutdown.clone(),
                stats: device_stats.clone(),
                clock: self.clock.clone(),
            };
            let ordinal = device.ordinal;

            match self.spawn_worker(device, links, gate.clone()) {
                Ok(handle) => {
                    stats.push(device_stats);
                    workers.push((ordinal, handle));
                }
                Err(e) => {
                    unwind(start, workers);
                    return Err(MinerError::TaskError(format!(
                        "failed to start device worker {}: {}",
                        ordinal, e
                    )));
                }
            }
        }

        for _ in &workers {
            start
                .send(())
                .map_err(|e| MinerError::ChannelError(format!("Worker start failed: {}", e)))?;
        }
        Ok(Miner { stats, workers })
    }

    fn spawn_worker(
        &self,
        device: AdmittedDevice,
        links: ControllerLinks,
        gate: Receiver<()>,
    ) -> std::io::Result<WorkerHandle> {
        let backend = self.backend.clone();
        let launch = self.backend.launch_config();
        let ordinal = device.ordinal;

        std::thread::Builder::new()
            .name(format!("device-{}", ordinal))
            .spawn(move || {
                if gate.recv().is_err() {
                    return Ok(());
                }

                let stats = links.stats.clone();
                let result = backend.open(&device.info).and_then(|mut kernel| {
                    DeviceController::new(ordinal, device.info.clone(), launch, links)
                        .run(kernel.as_mut())
                });

                if let Err(e) = &result {
                    stats.mark_lost();
                    log::error!("Device #{}: lost: {}", device.info.index, e);
                }
                result
            })
    }
}

type WorkerHandle = JoinHandle<Result<(), MinerError>>;

/// Releases workers that never got the start signal and waits for them
fn unwind(start: Sender<()>, workers: Vec<(u8, WorkerHandle)>) {
    drop(start);
    for (ordinal, handle) in workers {
        if handle.join().is_err() {
            log::warn!("Device ordinal {}: worker panicked while unwinding", ordinal);
        }
    }
}

/// Outcome of joining every device worker
#[derive(Debug, Default)]
pub struct JoinReport {
    /// Workers that stopped cleanly
    pub finished: usize,
    /// Workers that terminated with an error, by ordinal
    pub lost: Vec<(u8, MinerError)>,
}

impl JoinReport {
    /// Fails only if no worker stopped cleanly
    ///
    /// # Returns
    /// The number of cleanly stopped workers
    pub fn into_result(self) -> Result<usize, MinerError> {
        if self.finished == 0 && !self.lost.is_empty() {
            return Err(MinerError::AllDevicesLost(self.lost.len()));
        }
        Ok(self.finished)
    }
}

/// Handle on the running device workers
pub struct Miner {
    stats: Vec<Arc<DeviceStats>>,
    workers: Vec<(u8, WorkerHandle)>,
}

impl Miner {
    /// Per-device counters, indexed by ordinal
    pub fn stats(&self) -> Vec<Arc<DeviceStats>> {
        self.stats.clone()
    }

    /// Number of running workers
    pub fn devices(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every worker to stop
    ///
    /// Errors were already logged by the workers; a panic is logged here.
    pub fn join(self) -> JoinReport {
        let mut report = JoinReport::default();
        for (ordinal, handle) in self.workers {
            match handle.join() {
                Ok(Ok(())) => report.finished += 1,
                Ok(Err(e)) => report.lost.push((ordinal, e)),
                Err(_) => {
                    if let Some(stats) = self.stats.get(ordinal as usize) {
                        stats.mark_lost();
                    }
                    log::error!("Device ordinal {}: worker panicked", ordinal);
                    report
                        .lost
                        .push((ordinal, MinerError::TaskError("device worker panicked".into())));
                }
            }
        }
        report
    }
}
