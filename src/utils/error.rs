// src/utils/error.rs
use crate::miner::collector::Candidate;
use std::io;
use thiserror::Error;

/// Main error type for the mining application
///
/// Per-device failures (`KernelError`, `DeviceError`) terminate only the
/// worker that raised them. Everything raised before the workers start
/// aborts startup.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Compute kernel invocation or device memory transfer failure
    #[error("Kernel error: {0}")]
    KernelError(String),

    /// Device resource acquisition failure
    #[error("Device error: {0}")]
    DeviceError(String),

    /// No device survived enumeration and the allow-list
    #[error("No compute devices available")]
    NoDevices,

    /// Allow-list names a device that does not exist
    #[error("Invalid device index {index}: {found} device(s) found")]
    InvalidDevice {
        /// Index requested in the allow-list
        index: usize,
        /// Number of enumerated devices
        found: usize,
    },

    /// Every launched device worker terminated with an error
    #[error("All {0} device(s) lost")]
    AllDevicesLost(usize),

    /// Malformed or unusable work template
    #[error("Work error: {0}")]
    WorkError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Worker thread or async task execution errors
    #[error("Task execution error: {0}")]
    TaskError(String),
}

impl From<crossbeam_channel::SendError<Candidate>> for MinerError {
    fn from(e: crossbeam_channel::SendError<Candidate>) -> Self {
        MinerError::ChannelError(format!("Candidate send failed: {}", e))
    }
}

/// Converts hex decoding errors into MinerError
///
/// Raised while decoding getwork `data` and `target` fields.
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::InputError(format!("Hex conversion failed: {}", e))
    }
}

impl From<toml::de::Error> for MinerError {
    fn from(e: toml::de::Error) -> Self {
        MinerError::ConfigError(format!("Invalid config format: {}", e))
    }
}

/// Converts async task join errors into MinerError
///
/// Used when the blocking join of device workers fails inside the runtime.
impl From<tokio::task::JoinError> for MinerError {
    fn from(e: tokio::task::JoinError) -> Self {
        MinerError::TaskError(format!("Async task failed: {}", e))
    }
}
