// src/stats/device.rs
//! Per-device counters and telemetry
//!
//! Every field is atomic. The device worker, the collector and the
//! telemetry sampler each write their own fields; readers accept slightly
//! stale values.

use crate::miner::kernel::DeviceInfo;
use crate::types::Telemetry;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared statistics of one device
#[derive(Debug)]
pub struct DeviceStats {
    ordinal: u8,
    info: DeviceInfo,
    fan_percent: AtomicU32,
    temperature: AtomicU32,
    telemetry_active: AtomicBool,
    accepted: AtomicU64,
    rejected: AtomicU64,
    diff_one: AtomicU64,
    hashes: AtomicU64,
    scans: AtomicU64,
    work_id: AtomicU32,
    lost: AtomicBool,
    started: Instant,
}

/// Point-in-time copy of [`DeviceStats`]
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    /// Device ordinal
    pub ordinal: u8,
    /// Enumeration index
    pub index: usize,
    /// Device name
    pub name: String,
    /// Latest telemetry, if the device has working sensors
    pub telemetry: Option<Telemetry>,
    /// Shares meeting the work target
    pub accepted: u64,
    /// Candidates failing final validation
    pub rejected: u64,
    /// Candidates meeting difficulty one
    pub diff_one: u64,
    /// Nonces scanned
    pub hashes: u64,
    /// Kernel invocations completed
    pub scans: u64,
    /// Current work ID
    pub work_id: u32,
    /// Whether the worker terminated with an error
    pub lost: bool,
    /// Time since the device was registered
    pub elapsed: Duration,
}

impl DeviceStats {
    /// Fresh counters for an admitted device
    pub fn new(ordinal: u8, info: DeviceInfo) -> Self {
        DeviceStats {
            ordinal,
            info,
            fan_percent: AtomicU32::new(0),
            temperature: AtomicU32::new(0),
            telemetry_active: AtomicBool::new(false),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            diff_one: AtomicU64::new(0),
            hashes: AtomicU64::new(0),
            scans: AtomicU64::new(0),
            work_id: AtomicU32::new(0),
            lost: AtomicBool::new(false),
            started: Instant::now(),
        }
    }

    /// Device ordinal
    pub fn ordinal(&self) -> u8 {
        self.ordinal
    }

    /// Enumeration data
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Stores a telemetry reading
    ///
    /// Newer cards idle with the fan off, so only a non-zero temperature
    /// marks the sensors as active. A missing reading keeps the previous
    /// values but clears the flag.
    pub fn store_telemetry(&self, reading: Option<Telemetry>) {
        match reading {
            Some(t) if t.temperature != 0 => {
                self.fan_percent.store(t.fan_percent, Ordering::Relaxed);
                self.temperature.store(t.temperature, Ordering::Relaxed);
                self.telemetry_active.store(true, Ordering::Release);
            }
            _ => self.telemetry_active.store(false, Ordering::Release),
        }
    }

    /// Latest telemetry, `None` while inactive
    pub fn telemetry(&self) -> Option<Telemetry> {
        if !self.telemetry_active.load(Ordering::Acquire) {
            return None;
        }
        Some(Telemetry {
            fan_percent: self.fan_percent.load(Ordering::Relaxed),
            temperature: self.temperature.load(Ordering::Relaxed),
        })
    }

    /// Records a completed kernel invocation
    pub fn record_scan(&self, nonces: u32) {
        self.hashes.fetch_add(nonces as u64, Ordering::Relaxed);
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the work ID the device switched to
    pub fn record_work(&self, work_id: u32) {
        self.work_id.store(work_id, Ordering::Relaxed);
    }

    /// Share accepted by final validation
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Candidate rejected by final validation
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Candidate meeting difficulty one
    pub fn record_diff_one(&self) {
        self.diff_one.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks the worker as terminated by an error
    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::Release);
    }

    /// Whether the worker terminated by an error
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Copies every counter
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            ordinal: self.ordinal,
            index: self.info.index,
            name: self.info.name.clone(),
            telemetry: self.telemetry(),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            diff_one: self.diff_one.load(Ordering::Relaxed),
            hashes: self.hashes.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            work_id: self.work_id.load(Ordering::Relaxed),
            lost: self.is_lost(),
            elapsed: self.started.elapsed(),
        }
    }
}

impl DeviceSnapshot {
    /// Nonces scanned per second
    pub fn scan_hashrate(&self) -> f64 {
        self.hashes as f64 / self.elapsed.as_secs_f64().max(1e-3)
    }

    /// Hashrate implied by the difficulty-one shares found
    ///
    /// Each difficulty-one share stands for 2^32 hashes on average.
    pub fn effective_hashrate(&self) -> f64 {
        self.diff_one as f64 * 4_294_967_296.0 / self.elapsed.as_secs_f64().max(1e-3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> DeviceStats {
        DeviceStats::new(
            1,
            DeviceInfo {
                index: 4,
                name: "test".into(),
            },
        )
    }

    #[test]
    fn telemetry_requires_temperature() {
        let s = stats();
        assert_eq!(s.telemetry(), None);

        s.store_telemetry(Some(Telemetry {
            fan_percent: 40,
            temperature: 0,
        }));
        assert_eq!(s.telemetry(), None);

        let reading = Telemetry {
            fan_percent: 0,
            temperature: 65,
        };
        s.store_telemetry(Some(reading));
        assert_eq!(s.telemetry(), Some(reading));

        s.store_telemetry(None);
        assert_eq!(s.telemetry(), None);
    }

    #[test]
    fn counters_accumulate() {
        let s = stats();
        s.record_scan(100);
        s.record_scan(100);
        s.record_accepted();
        s.record_rejected();
        s.record_rejected();
        s.record_diff_one();
        s.record_work(3);

        let snap = s.snapshot();
        assert_eq!(snap.hashes, 200);
        assert_eq!(snap.scans, 2);
        assert_eq!(snap.accepted, 1);
        assert_eq!(snap.rejected, 2);
        assert_eq!(snap.diff_one, 1);
        assert_eq!(snap.work_id, 3);
        assert_eq!(snap.index, 4);
        assert!(!snap.lost);
        assert!(snap.scan_hashrate() > 0.0);
    }
}
