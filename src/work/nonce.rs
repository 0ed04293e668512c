// src/work/nonce.rs
//! Per-device extraNonce
//!
//! The high byte is the device ordinal and never changes after assignment,
//! which splits the 32-bit extraNonce space into 256 disjoint shards. The low
//! 24 bits are the device's search cursor. Once the cursor has gone through
//! every `0x??FFFFFF` value it restarts at `0x??000000`.

use std::fmt;

const CURSOR_MASK: u32 = 0x00FF_FFFF;
const ORDINAL_MASK: u32 = 0xFF00_0000;

/// Highest number of devices that can be given a distinct shard
pub const MAX_DEVICES: usize = 255;

/// 32-bit extraNonce: ordinal in the high byte, cursor in the low 24 bits
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct ExtraNonce(u32);

impl ExtraNonce {
    /// Start of the shard owned by `ordinal`
    pub fn for_ordinal(ordinal: u8) -> Self {
        ExtraNonce((ordinal as u32) << 24)
    }

    /// Wraps a raw value
    pub fn from_raw(raw: u32) -> Self {
        ExtraNonce(raw)
    }

    /// Raw 32-bit value in host order
    pub fn value(self) -> u32 {
        self.0
    }

    /// Shard identifier
    pub fn ordinal(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Low 24-bit search cursor
    pub fn cursor(self) -> u32 {
        self.0 & CURSOR_MASK
    }

    /// Advances the cursor, wrapping inside the shard
    pub fn rollover(&mut self) {
        if self.0 & CURSOR_MASK == CURSOR_MASK {
            self.0 &= ORDINAL_MASK;
        } else {
            self.0 += 1;
        }
    }
}

impl fmt::Display for ExtraNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollover_law() {
        let mut n = ExtraNonce::from_raw(0x00FF_FFFE);
        n.rollover();
        assert_eq!(n.value(), 0x00FF_FFFF);
        n.rollover();
        assert_eq!(n.value(), 0x0000_0000);
    }

    #[test]
    fn rollover_keeps_ordinal() {
        for ordinal in [0u8, 1, 2, 127, 254, 255] {
            let mut n = ExtraNonce::from_raw(((ordinal as u32) << 24) | CURSOR_MASK);
            n.rollover();
            assert_eq!(n.ordinal(), ordinal);
            assert_eq!(n.cursor(), 0);
            n.rollover();
            assert_eq!(n.ordinal(), ordinal);
            assert_eq!(n.cursor(), 1);
        }
    }

    #[test]
    fn shards_are_disjoint() {
        // Any value a device can produce carries its ordinal in the high byte,
        // so two ordinals can never produce the same value.
        let mut a = ExtraNonce::for_ordinal(3);
        let mut b = ExtraNonce::for_ordinal(4);
        for _ in 0..1000 {
            a.rollover();
            b.rollover();
            assert_ne!(a, b);
            assert_eq!(a.ordinal(), 3);
            assert_eq!(b.ordinal(), 4);
        }

        for o1 in 0..=255u8 {
            for o2 in (o1 as u16 + 1)..=255 {
                let lo1 = ExtraNonce::for_ordinal(o1).value();
                let hi1 = lo1 | CURSOR_MASK;
                let lo2 = ExtraNonce::for_ordinal(o2 as u8).value();
                assert!(lo2 > hi1);
            }
        }
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(ExtraNonce::for_ordinal(2).to_string(), "02000000");
    }
}
