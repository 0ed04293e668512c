// src/stats/reporter.rs
use crate::miner::kernel::Backend;
use crate::stats::device::{DeviceSnapshot, DeviceStats};
use crate::utils::error::MinerError;
use crate::utils::shutdown::ShutdownSignal;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Totals over every device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MiningSummary {
    /// Devices reporting
    pub devices: usize,
    /// Devices whose worker terminated with an error
    pub lost: usize,
    /// Nonces scanned
    pub hashes: u64,
    /// Shares meeting the work target
    pub accepted: u64,
    /// Candidates failing final validation
    pub rejected: u64,
    /// Difficulty-one shares
    pub diff_one: u64,
    /// Sum of per-device scan hashrates (hashes per second)
    pub scan_hashrate: f64,
    /// Sum of per-device effective hashrates (hashes per second)
    pub effective_hashrate: f64,
}

impl MiningSummary {
    /// Adds up device snapshots
    pub fn from_snapshots(snapshots: &[DeviceSnapshot]) -> Self {
        snapshots
            .iter()
            .fold(MiningSummary::default(), |mut sum, snap| {
                sum.devices += 1;
                sum.lost += snap.lost as usize;
                sum.hashes += snap.hashes;
                sum.accepted += snap.accepted;
                sum.rejected += snap.rejected;
                sum.diff_one += snap.diff_one;
                sum.scan_hashrate += snap.scan_hashrate();
                sum.effective_hashrate += snap.effective_hashrate();
                sum
            })
    }
}

/// Formats a hashrate with a metric prefix
pub fn format_hashrate(rate: f64) -> String {
    const UNITS: [&str; 6] = ["H/s", "kH/s", "MH/s", "GH/s", "TH/s", "PH/s"];
    let mut rate = rate;
    let mut unit = 0;
    while rate >= 1000.0 && unit < UNITS.len() - 1 {
        rate /= 1000.0;
        unit += 1;
    }
    format!("{:.2} {}", rate, UNITS[unit])
}

/// Periodically stores backend telemetry into the device counters
pub struct TelemetrySampler {
    backend: Arc<dyn Backend>,
    stats: Vec<Arc<DeviceStats>>,
    interval: Duration,
}

impl TelemetrySampler {
    /// Creates a sampler
    ///
    /// # Arguments
    /// * `backend` - Source of readings
    /// * `stats` - Devices to sample
    /// * `interval` - Time between samples
    pub fn new(backend: Arc<dyn Backend>, stats: Vec<Arc<DeviceStats>>, interval: Duration) -> Self {
        TelemetrySampler {
            backend,
            stats,
            interval,
        }
    }

    /// Takes one reading per device
    pub fn sample(&self) {
        for stats in &self.stats {
            let reading = self.backend.sample_telemetry(stats.info());
            if reading.is_none() {
                log::trace!("Device #{}: no telemetry", stats.info().index);
            }
            stats.store_telemetry(reading);
        }
    }

    /// Samples until `shutdown` fires
    pub fn spawn(self, shutdown: ShutdownSignal) -> Result<JoinHandle<()>, MinerError> {
        let handle = std::thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || {
                loop {
                    self.sample();
                    if shutdown.wait_timeout(self.interval) {
                        break;
                    }
                }
            })?;
        Ok(handle)
    }
}

/// Collects and reports per-device mining statistics
pub struct StatsReporter {
    stats: Vec<Arc<DeviceStats>>,
    report_interval: Duration,
}

impl StatsReporter {
    /// Creates a new StatsReporter with the specified reporting interval
    ///
    /// # Arguments
    /// * `stats` - Devices to report on
    /// * `report_interval` - How often to log statistics
    pub fn new(stats: Vec<Arc<DeviceStats>>, report_interval: Duration) -> Self {
        StatsReporter {
            stats,
            report_interval,
        }
    }

    /// Current snapshot of every device
    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        self.stats.iter().map(|s| s.snapshot()).collect()
    }

    /// Totals over every device
    pub fn summary(&self) -> MiningSummary {
        MiningSummary::from_snapshots(&self.snapshots())
    }

    /// Logs one line per device
    pub fn report(&self) {
        for snap in self.snapshots() {
            log::info!("{}", device_line(&snap));
        }
    }

    /// Logs the totals, used once on exit
    pub fn report_summary(&self) {
        let sum = self.summary();
        log::info!(
            "Summary: {} device(s), {} lost | Hashes: {} | Scan: {} | Effective: {} | Accepted/Rejected: {}/{} | Diff-one: {}",
            sum.devices,
            sum.lost,
            sum.hashes,
            format_hashrate(sum.scan_hashrate),
            format_hashrate(sum.effective_hashrate),
            sum.accepted,
            sum.rejected,
            sum.diff_one
        );
    }

    /// Starts the periodic reporting of statistics
    ///
    /// This spawns a background thread that logs stats at the configured
    /// interval until `shutdown` fires.
    pub fn start_reporting(self, shutdown: ShutdownSignal) -> Result<JoinHandle<()>, MinerError> {
        let handle = std::thread::Builder::new()
            .name("stats".into())
            .spawn(move || {
                while !shutdown.wait_timeout(self.report_interval) {
                    self.report();
                }
            })?;
        Ok(handle)
    }
}

fn device_line(snap: &DeviceSnapshot) -> String {
    let mut line = format!(
        "Device #{} ({}): Scan: {} | Effective: {} | Accepted/Rejected: {}/{}",
        snap.index,
        snap.name,
        format_hashrate(snap.scan_hashrate()),
        format_hashrate(snap.effective_hashrate()),
        snap.accepted,
        snap.rejected
    );
    if let Some(t) = snap.telemetry {
        line.push_str(&format!(" | Temp: {}°C | Fan: {}%", t.temperature, t.fan_percent));
    }
    if snap.lost {
        line.push_str(" | LOST");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::kernel::{ComputeKernel, DeviceInfo};
    use crate::types::Telemetry;
    use crate::utils::shutdown::Shutdown;

    fn stats(n: usize) -> Vec<Arc<DeviceStats>> {
        (0..n)
            .map(|i| {
                Arc::new(DeviceStats::new(
                    i as u8,
                    DeviceInfo {
                        index: i,
                        name: format!("dev{}", i),
                    },
                ))
            })
            .collect()
    }

    struct FixedSensors;

    impl Backend for FixedSensors {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn enumerate(&self) -> Result<Vec<DeviceInfo>, MinerError> {
            Ok(Vec::new())
        }

        fn open(&self, _device: &DeviceInfo) -> Result<Box<dyn ComputeKernel>, MinerError> {
            Err(MinerError::NoDevices)
        }

        fn sample_telemetry(&self, device: &DeviceInfo) -> Option<Telemetry> {
            // Device 1 has no sensors.
            (device.index != 1).then_some(Telemetry {
                fan_percent: 30,
                temperature: 60 + device.index as u32,
            })
        }
    }

    #[test]
    fn sampler_stores_readings() {
        let stats = stats(2);
        let sampler = TelemetrySampler::new(Arc::new(FixedSensors), stats.clone(), Duration::from_secs(1));
        sampler.sample();

        assert_eq!(
            stats[0].telemetry(),
            Some(Telemetry {
                fan_percent: 30,
                temperature: 60
            })
        );
        assert_eq!(stats[1].telemetry(), None);
    }

    #[test]
    fn sampler_thread_stops_on_shutdown() {
        let stats = stats(1);
        let shutdown = Shutdown::new();
        let handle = TelemetrySampler::new(Arc::new(FixedSensors), stats.clone(), Duration::from_secs(60))
            .spawn(shutdown.signal())
            .unwrap();
        shutdown.trigger();
        handle.join().unwrap();
        assert!(stats[0].telemetry().is_some());
    }

    #[test]
    fn summary_adds_devices() {
        let stats = stats(2);
        stats[0].record_scan(1000);
        stats[1].record_scan(500);
        stats[0].record_accepted();
        stats[1].record_rejected();
        stats[1].record_diff_one();
        stats[1].mark_lost();

        let sum = StatsReporter::new(stats, Duration::from_secs(1)).summary();
        assert_eq!(sum.devices, 2);
        assert_eq!(sum.lost, 1);
        assert_eq!(sum.hashes, 1500);
        assert_eq!(sum.accepted, 1);
        assert_eq!(sum.rejected, 1);
        assert_eq!(sum.diff_one, 1);
        assert!(sum.effective_hashrate > 0.0);
    }

    #[test]
    fn hashrate_units() {
        assert_eq!(format_hashrate(12.0), "12.00 H/s");
        assert_eq!(format_hashrate(1_500_000.0), "1.50 MH/s");
        assert_eq!(format_hashrate(2.5e12), "2.50 TH/s");
    }

    #[test]
    fn device_line_mentions_telemetry_only_when_active() {
        let stats = stats(1);
        assert!(!device_line(&stats[0].snapshot()).contains("Temp"));
        stats[0].store_telemetry(Some(Telemetry {
            fan_percent: 0,
            temperature: 55,
        }));
        assert!(device_line(&stats[0].snapshot()).contains("Temp: 55°C"));
    }
}
