// src/types.rs
use crate::pow;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a work template may be advanced while it is being scanned
///
/// The distinction matters for the header timestamp: solo work was fetched
/// from our own node, so the miner is free to roll the timestamp forward.
/// Pool work is validated by the pool against the timestamp it handed out.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkMode {
    /// Getwork from a local node, timestamp rolls with wall-clock time
    #[clap(name = "solo")]
    Solo,

    /// Pool-issued work, timestamp is fixed
    #[clap(name = "pool")]
    Pool,
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkMode::Solo => write!(f, "solo"),
            WorkMode::Pool => write!(f, "pool"),
        }
    }
}

impl FromStr for WorkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "solo" | "getwork" => Ok(WorkMode::Solo),
            "pool" | "stratum" => Ok(WorkMode::Pool),
            _ => Err(format!("Unknown work mode: {}", s)),
        }
    }
}

/// Chain whose proof-of-work limit bounds difficulty-one shares
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Main network, limit 2^224 - 1
    #[default]
    #[clap(name = "mainnet")]
    Mainnet,

    /// Simulation network, limit 2^255 - 1
    #[clap(name = "simnet")]
    Simnet,
}

impl Network {
    /// Proof-of-work limit as a big-endian 256-bit number
    pub fn pow_limit(self) -> [u8; 32] {
        match self {
            Network::Mainnet => pow::DIFF_ONE_TARGET,
            Network::Simnet => {
                let mut limit = [0xffu8; 32];
                limit[0] = 0x7f;
                limit
            }
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Simnet => write!(f, "simnet"),
        }
    }
}

/// One fan/temperature reading for a device
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Telemetry {
    /// Fan speed in percent (0 when the sensor is missing or the fan idles)
    pub fan_percent: u32,
    /// Temperature in degrees Celsius
    pub temperature: u32,
}
