// src/pow.rs
//! Header digest and target comparisons
//!
//! Digests are read as little-endian 256-bit numbers; targets are stored
//! big-endian, so comparisons reverse the digest first.

use crate::work::HEADER_LEN;
use blake2::{Blake2s256, Digest};

/// Largest hash accepted as a difficulty-one share (2^224 - 1), big-endian
pub const DIFF_ONE_TARGET: [u8; 32] = {
    let mut t = [0xffu8; 32];
    t[0] = 0;
    t[1] = 0;
    t[2] = 0;
    t[3] = 0;
    t
};

/// Digest of the first 180 bytes of a header
pub fn header_hash(header: &[u8]) -> [u8; 32] {
    let len = header.len().min(HEADER_LEN);
    let digest = Blake2s256::digest(&header[..len]);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

/// True when `hash`, read little-endian, is not above the big-endian `target`
pub fn hash_meets_target(hash: &[u8; 32], target: &[u8; 32]) -> bool {
    let mut be = *hash;
    be.reverse();
    be <= *target
}

/// Kernel-side pre-filter
///
/// The most significant word must be zero and the next one must not exceed
/// `target_high`. With `target_high == u32::MAX` this is exactly the
/// difficulty-one test.
pub fn passes_prefilter(hash: &[u8; 32], target_high: u32) -> bool {
    let top = u32::from_le_bytes([hash[28], hash[29], hash[30], hash[31]]);
    let next = u32::from_le_bytes([hash[24], hash[25], hash[26], hash[27]]);
    top == 0 && next <= target_high
}

/// Hex of the hash in the usual display order (most significant byte first)
pub fn display_hash(hash: &[u8; 32]) -> String {
    let mut be = *hash;
    be.reverse();
    hex::encode(be)
}
