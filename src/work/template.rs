// src/work/template.rs
//! Work templates and the header word layout
//!
//! A template carries a 180-byte block header padded to 192 bytes. The
//! first 128 bytes never change while a template is scanned. The remaining
//! 64 bytes are handled as 16 big-endian words, a few of which are rewritten
//! every scan iteration.

use crate::types::WorkMode;
use crate::utils::error::MinerError;
use serde::Deserialize;

/// Size of the template data and of the kernel precomputation buffer
pub const WORK_DATA_LEN: usize = 192;
/// Bytes of the data that form the hashed header
pub const HEADER_LEN: usize = 180;
/// Fixed header prefix copied verbatim into the precomputation buffer
pub const HEADER_PREFIX_LEN: usize = 128;
/// Number of 32-bit words following the prefix
pub const BLOCK_WORDS: usize = (WORK_DATA_LEN - HEADER_PREFIX_LEN) / 4;
/// Words of the block that belong to the hashed header
pub const HEADER_TAIL_WORDS: usize = (HEADER_LEN - HEADER_PREFIX_LEN) / 4;

/// Word slot holding the header timestamp
pub const TIMESTAMP_WORD: usize = 2;
/// Word slot scanned by the kernel
pub const NONCE0_WORD: usize = 3;
/// Word slot holding the device extraNonce
pub const NONCE1_WORD: usize = 4;
/// Word slot holding the per-device work ID
pub const NONCE2_WORD: usize = 5;

/// Byte offset of a block word inside the header
pub const fn word_offset(word: usize) -> usize {
    HEADER_PREFIX_LEN + 4 * word
}

/// Swaps a word between host order and the kernel's native byte order
pub fn swap_endianness(v: u32) -> u32 {
    v.swap_bytes()
}

/// Immutable unit of work handed to the device controllers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkTemplate {
    /// Header bytes, zero padded to 192
    pub data: [u8; WORK_DATA_LEN],
    /// Share target as a big-endian 256-bit number
    pub target: [u8; 32],
    /// Header timestamp at the time the template was issued
    pub job_time: u32,
    /// Whether the timestamp may be rolled
    pub mode: WorkMode,
    /// Unix time the template was received
    pub time_received: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GetworkReply {
    Bare(GetworkResult),
    Rpc { result: Option<GetworkResult> },
}

#[derive(Deserialize)]
struct GetworkResult {
    data: String,
    target: String,
}

impl WorkTemplate {
    /// Builds a template from raw header bytes
    ///
    /// The job time is taken from the little-endian header timestamp.
    ///
    /// # Errors
    /// `WorkError` if `header` is shorter than 180 or longer than 192 bytes.
    pub fn new(
        header: &[u8],
        target: [u8; 32],
        mode: WorkMode,
        time_received: u32,
    ) -> Result<Self, MinerError> {
        if header.len() < HEADER_LEN || header.len() > WORK_DATA_LEN {
            return Err(MinerError::WorkError(format!(
                "header must be {}..={} bytes, got {}",
                HEADER_LEN,
                WORK_DATA_LEN,
                header.len()
            )));
        }

        let mut data = [0u8; WORK_DATA_LEN];
        data[..header.len()].copy_from_slice(header);
        let ts_at = word_offset(TIMESTAMP_WORD);
        let job_time = u32::from_le_bytes([
            data[ts_at],
            data[ts_at + 1],
            data[ts_at + 2],
            data[ts_at + 3],
        ]);

        Ok(WorkTemplate {
            data,
            target,
            job_time,
            mode,
            time_received,
        })
    }

    /// Solo (getwork) template
    pub fn solo(header: &[u8], target: [u8; 32], time_received: u32) -> Result<Self, MinerError> {
        Self::new(header, target, WorkMode::Solo, time_received)
    }

    /// Pool template with a fixed timestamp
    pub fn pool(header: &[u8], target: [u8; 32], time_received: u32) -> Result<Self, MinerError> {
        Self::new(header, target, WorkMode::Pool, time_received)
    }

    /// Parses a getwork reply
    ///
    /// Accepts either the full JSON-RPC reply or its bare `result` object.
    /// The target is transmitted little-endian and stored big-endian.
    pub fn from_getwork(json: &str, mode: WorkMode, time_received: u32) -> Result<Self, MinerError> {
        let reply: GetworkReply = serde_json::from_str(json)?;
        let result = match reply {
            GetworkReply::Bare(result) => result,
            GetworkReply::Rpc { result } => result
                .ok_or_else(|| MinerError::WorkError("getwork reply has no result".into()))?,
        };

        let data = hex::decode(result.data.trim())?;
        let mut target_le = hex::decode(result.target.trim())?;
        if target_le.len() > 32 {
            return Err(MinerError::WorkError(format!(
                "getwork target is {} bytes, expected at most 32",
                target_le.len()
            )));
        }

        target_le.reverse();
        let mut target = [0u8; 32];
        target[32 - target_le.len()..].copy_from_slice(&target_le);

        Self::new(&data, target, mode, time_received)
    }

    /// Benchmark template: all-zero header, every share accepted
    pub fn synthetic(now: u32) -> Self {
        let mut data = [0u8; WORK_DATA_LEN];
        data[word_offset(TIMESTAMP_WORD)..word_offset(TIMESTAMP_WORD) + 4]
            .copy_from_slice(&now.to_le_bytes());
        WorkTemplate {
            data,
            target: [0xff; 32],
            job_time: now,
            mode: WorkMode::Solo,
            time_received: now,
        }
    }

    /// Timestamp to program for a scan performed at `now`
    ///
    /// Solo work rolls forward by the seconds elapsed since receipt; a clock
    /// that went backwards counts as zero elapsed. Pool work never rolls.
    pub fn scan_timestamp(&self, now: u32) -> u32 {
        match self.mode {
            WorkMode::Solo => self
                .job_time
                .wrapping_add(now.saturating_sub(self.time_received)),
            WorkMode::Pool => self.job_time,
        }
    }

    /// The 16 trailing words, read big-endian
    pub fn block_words(&self) -> [u32; BLOCK_WORDS] {
        let mut words = [0u32; BLOCK_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            let at = word_offset(i);
            *word = u32::from_be_bytes([
                self.data[at],
                self.data[at + 1],
                self.data[at + 2],
                self.data[at + 3],
            ]);
        }
        words
    }

    /// Full header with the scan variables written in place (little-endian)
    pub fn header_with(
        &self,
        timestamp: u32,
        nonce: u32,
        extra_nonce: u32,
        work_id: u32,
    ) -> [u8; WORK_DATA_LEN] {
        let mut data = self.data;
        for (word, value) in [
            (TIMESTAMP_WORD, timestamp),
            (NONCE0_WORD, nonce),
            (NONCE1_WORD, extra_nonce),
            (NONCE2_WORD, work_id),
        ] {
            let at = word_offset(word);
            data[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        data
    }
}
