//! Named chance slots for the near-zero integer codec.
//!
//! See: §4.2 Near-Zero Integer Codec, §4.3 Chance Tables.

use crate::constants::NZ_INT_CHANCES;
use crate::rangecoder::tables::NZ_INT_INITIAL_CHANCES;

/// Slot for the "value is exactly zero" bit.
pub const ZERO: usize = 0;
/// Slot for the sign bit (only consulted when both signs are possible).
pub const SIGN: usize = 1;

/// Slot for the exponent-length bit at position `e`, split by sign so that
/// positive and negative magnitudes adapt independently.
pub fn exp(e: i32, sign_positive: bool) -> usize {
    2 + ((e as usize) << 1) + (sign_positive as usize)
}

/// Slot for the mantissa bit at bit-position `pos`.
pub fn mant(pos: i32) -> usize {
    36 + pos as usize
}

/// A bank of 54 adaptive 12-bit chances, one per NZ-int slot.
///
/// Every coder, MANIAC tree (property/count/split-value bank), and MANIAC
/// leaf owns its own `ChanceContext`; see §3's ownership note.
#[derive(Clone)]
pub struct ChanceContext {
    pub(crate) data: [u16; NZ_INT_CHANCES],
}

impl Default for ChanceContext {
    fn default() -> Self {
        ChanceContext {
            data: NZ_INT_INITIAL_CHANCES,
        }
    }
}

impl ChanceContext {
    pub fn new() -> Self {
        Self::default()
    }
}
