// src/utils/clock.rs
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of unix time in whole seconds
pub trait Clock: Send + Sync {
    /// Current unix time, truncated to 32 bits like header timestamps
    fn unix_now(&self) -> u32;
}

/// The operating system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_now(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }
}
