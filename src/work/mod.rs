// src/work/mod.rs
//! Work templates and their distribution
//!
//! - Template layout, getwork parsing and timestamp policy
//! - The per-device extraNonce shard
//! - Fan-out of new templates to the device controllers

/// Work template and header word layout
pub mod template;

/// ExtraNonce sharding and rollover
pub mod nonce;

/// Template dispatch and the file-backed work source
pub mod source;

pub use nonce::{ExtraNonce, MAX_DEVICES};
pub use source::{FileWorkSource, WorkDispatcher, WorkSubscription};
pub use template::{
    BLOCK_WORDS, HEADER_LEN, HEADER_PREFIX_LEN, HEADER_TAIL_WORDS, NONCE0_WORD, NONCE1_WORD,
    NONCE2_WORD, TIMESTAMP_WORD, WORK_DATA_LEN, WorkTemplate, swap_endianness, word_offset,
};
