// src/config/config.rs
use crate::types::{Network, WorkMode};
use crate::utils::error::MinerError;
use crate::work::MAX_DEVICES;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the mining application
///
/// Contains all settings needed to configure mining operations:
/// device selection, where work comes from, statistics intervals and the
/// CPU backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Enumeration indices of the devices to use (empty = all)
    #[serde(default)]
    pub devices: Vec<usize>,

    /// Network whose proof-of-work limit bounds difficulty-one shares
    #[serde(default)]
    pub network: Network,

    /// Work source settings
    #[serde(default)]
    pub work: WorkConfig,

    /// Statistics and telemetry settings
    #[serde(default)]
    pub stats: StatsConfig,

    /// CPU backend settings
    #[serde(default)]
    pub cpu: CpuConfig,
}

/// Where work templates come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkConfig {
    /// Getwork JSON reply kept up to date by an external fetcher
    #[serde(default = "default_work_file")]
    pub file: PathBuf,

    /// Whether the timestamp may be rolled
    #[serde(default = "default_work_mode")]
    pub mode: WorkMode,

    /// Seconds between reads of `file`
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

/// Reporting intervals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Seconds between per-device report lines
    #[serde(default = "default_stats_interval")]
    pub interval_secs: u64,

    /// Seconds between telemetry samples
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval_secs: u64,
}

/// CPU reference backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuConfig {
    /// Number of emulated devices
    #[serde(default = "default_cpu_devices")]
    pub devices: usize,

    /// Threads per device (0 = share all cores evenly)
    #[serde(default)]
    pub threads: usize,

    /// Nonces per scan
    #[serde(default = "default_cpu_throughput")]
    pub throughput: u32,
}

fn default_work_file() -> PathBuf {
    "work.json".into()
}

fn default_work_mode() -> WorkMode {
    WorkMode::Solo
}

fn default_poll_interval() -> u64 {
    5
}

fn default_stats_interval() -> u64 {
    60
}

fn default_telemetry_interval() -> u64 {
    10
}

fn default_cpu_devices() -> usize {
    1
}

fn default_cpu_throughput() -> u32 {
    1 << 20
}

impl Default for WorkConfig {
    fn default() -> Self {
        WorkConfig {
            file: default_work_file(),
            mode: default_work_mode(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            interval_secs: default_stats_interval(),
            telemetry_interval_secs: default_telemetry_interval(),
        }
    }
}

impl Default for CpuConfig {
    fn default() -> Self {
        CpuConfig {
            devices: default_cpu_devices(),
            threads: 0,
            throughput: default_cpu_throughput(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            devices: Vec::new(),
            network: Network::default(),
            work: WorkConfig::default(),
            stats: StatsConfig::default(),
            cpu: CpuConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(MinerError)` - If file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.work.poll_interval_secs == 0 {
            return Err(MinerError::ConfigError(
                "work.poll_interval_secs must be positive".into(),
            ));
        }
        if self.stats.interval_secs == 0 || self.stats.telemetry_interval_secs == 0 {
            return Err(MinerError::ConfigError(
                "stats intervals must be positive".into(),
            ));
        }
        if self.cpu.devices == 0 {
            return Err(MinerError::ConfigError("cpu.devices must be positive".into()));
        }
        if self.cpu.throughput == 0 {
            return Err(MinerError::ConfigError("cpu.throughput must be positive".into()));
        }

        let mut requested = self.devices.clone();
        requested.sort_unstable();
        requested.dedup();
        let admitted = if requested.is_empty() {
            self.cpu.devices
        } else {
            requested.len()
        };
        if admitted > MAX_DEVICES {
            return Err(MinerError::ConfigError(format!(
                "{} devices requested, at most {} are supported",
                admitted, MAX_DEVICES
            )));
        }
        Ok(())
    }

    /// Work poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.work.poll_interval_secs)
    }

    /// Report interval
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats.interval_secs)
    }

    /// Telemetry sample interval
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.stats.telemetry_interval_secs)
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# GPU Miner Configuration\n\n");
        template.push_str("# Device indices to mine on, as printed by `list` (empty = all)\n");
        template.push_str("devices = []\n");
        template.push_str("# Network: mainnet, simnet\n");
        template.push_str("network = \"mainnet\"\n\n");

        template.push_str("[work]\n");
        template.push_str("# Getwork JSON reply refreshed by an external fetcher\n");
        template.push_str("file = \"work.json\"\n");
        template.push_str("# Work mode: solo (timestamp rolls) or pool (timestamp fixed)\n");
        template.push_str("mode = \"solo\"\n");
        template.push_str("poll_interval_secs = 5\n\n");

        template.push_str("[stats]\n");
        template.push_str("interval_secs = 60\n");
        template.push_str("telemetry_interval_secs = 10\n\n");

        template.push_str("[cpu]\n");
        template.push_str("# Number of emulated search devices\n");
        template.push_str("devices = 1\n");
        template.push_str("# Threads per device (0 = auto-detect)\n");
        template.push_str("threads = 0\n");
        template.push_str("# Nonces per scan\n");
        template.push_str("throughput = 1048576\n");

        template
    }
}
