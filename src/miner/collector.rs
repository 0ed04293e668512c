// src/miner/collector.rs
//! Candidate collector
//!
//! Receives raw candidates from every device controller, performs the
//! authoritative difficulty check and feeds the verdict back into the
//! originating device's counters. Solved headers are handed on to whoever
//! submits work; that part is not done here.

use crate::pow;
use crate::stats::DeviceStats;
use crate::types::Network;
use crate::utils::error::MinerError;
use crate::work::{WORK_DATA_LEN, WorkTemplate};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A nonce that passed a kernel's pre-filter
///
/// All words are host order. `template` is the work the scan ran against.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Ordinal of the reporting device
    pub ordinal: u8,
    /// Nonce found by the kernel
    pub nonce: u32,
    /// ExtraNonce programmed for the scan
    pub extra_nonce: u32,
    /// Work ID programmed for the scan
    pub work_id: u32,
    /// Timestamp programmed for the scan
    pub timestamp: u32,
    /// Template scanned
    pub template: Arc<WorkTemplate>,
}

impl Candidate {
    /// Header with every scan variable in place
    pub fn header(&self) -> [u8; WORK_DATA_LEN] {
        self.template
            .header_with(self.timestamp, self.nonce, self.extra_nonce, self.work_id)
    }
}

/// Header meeting the work target, ready for submission
#[derive(Debug, Clone)]
pub struct SolvedWork {
    /// Device that found it
    pub ordinal: u8,
    /// Complete 192-byte work data
    pub data: [u8; WORK_DATA_LEN],
    /// Header digest
    pub hash: [u8; 32],
}

/// Outcome of final validation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Meets the work target
    Accepted,
    /// Meets difficulty one only
    DiffOne,
    /// Above the difficulty-one limit
    Rejected,
}

/// Single consumer of the candidate channel
pub struct Collector {
    stats: Vec<Arc<DeviceStats>>,
    solved: Option<Sender<SolvedWork>>,
    share_limit: [u8; 32],
    benchmark: bool,
}

impl Collector {
    /// Creates a collector
    ///
    /// # Arguments
    /// * `stats` - Per-device counters, indexed by ordinal
    /// * `solved` - Destination of accepted work, if anyone submits it
    pub fn new(stats: Vec<Arc<DeviceStats>>, solved: Option<Sender<SolvedWork>>) -> Self {
        Collector {
            stats,
            solved,
            share_limit: Network::Mainnet.pow_limit(),
            benchmark: false,
        }
    }

    /// Uses the proof-of-work limit of `network` as the difficulty-one bound
    pub fn for_network(mut self, network: Network) -> Self {
        self.share_limit = network.pow_limit();
        self
    }

    /// Counts difficulty-one shares only; nothing is ever accepted
    pub fn benchmark(mut self) -> Self {
        self.benchmark = true;
        self
    }

    /// Validates one candidate and updates the device counters
    pub fn assess(&self, candidate: &Candidate) -> Verdict {
        let stats = self.stats.get(candidate.ordinal as usize);
        if stats.is_none() {
            log::warn!("Candidate from unknown device ordinal {}", candidate.ordinal);
        }

        let data = candidate.header();
        let hash = pow::header_hash(&data);

        if !pow::hash_meets_target(&hash, &self.share_limit) {
            log::debug!(
                "Device #{}: found hash {} above minimum target",
                candidate.ordinal,
                pow::display_hash(&hash)
            );
            if let Some(stats) = stats {
                stats.record_rejected();
            }
            return Verdict::Rejected;
        }

        if let Some(stats) = stats {
            stats.record_diff_one();
        }

        if self.benchmark || !pow::hash_meets_target(&hash, &candidate.template.target) {
            log::debug!(
                "Device #{}: found hash {} below minimum target but above work target",
                candidate.ordinal,
                pow::display_hash(&hash)
            );
            return Verdict::DiffOne;
        }

        log::info!(
            "Device #{}: found hash with work below target! {}",
            candidate.ordinal,
            pow::display_hash(&hash)
        );
        if let Some(stats) = stats {
            stats.record_accepted();
        }
        if let Some(solved) = &self.solved {
            let work = SolvedWork {
                ordinal: candidate.ordinal,
                data,
                hash,
            };
            if solved.send(work).is_err() {
                log::warn!("Solved work dropped: no submitter listening");
            }
        }
        Verdict::Accepted
    }

    /// Consumes candidates until every sender is gone
    pub fn run(self, candidates: Receiver<Candidate>) {
        for candidate in candidates {
            self.assess(&candidate);
        }
        log::debug!("Candidate channel closed, collector exiting");
    }

    /// Runs the collector on its own thread
    pub fn spawn(self, candidates: Receiver<Candidate>) -> Result<JoinHandle<()>, MinerError> {
        let handle = std::thread::Builder::new()
            .name("collector".into())
            .spawn(move || self.run(candidates))?;
        Ok(handle)
    }
}
