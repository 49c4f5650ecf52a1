//! Chance table and log4k table construction.
//!
//! See: §4.3. Chance Tables

use crate::constants::{CHANCETABLE_DEFAULT_ALPHA, CHANCETABLE_DEFAULT_CUT};

/// A pair of 4096-entry state-transition tables, generated once from
/// `(alpha, cut)`. `one_state[p]` is the 12-bit probability a chance advances to
/// after observing a "1" bit; `zero_state[p]` is the same after a "0".
#[derive(Clone)]
pub struct ChanceTable {
    pub zero_state: [u16; 4096],
    pub one_state: [u16; 4096],
}

impl Default for ChanceTable {
    fn default() -> Self {
        Self::new(CHANCETABLE_DEFAULT_ALPHA, CHANCETABLE_DEFAULT_CUT)
    }
}

impl ChanceTable {
    /// Builds the table from `(alpha, cut)`.
    ///
    /// Ported from the same probability-walk construction FFV1 uses for its
    /// 256-entry state transition table (`build_table` in
    /// `rangecoder/range.rs`), generalised to FLIF16's 4096-entry, 12-bit
    /// chance space.
    pub fn new(alpha: u32, cut: u16) -> Self {
        const SIZE: i64 = 4096;
        let max_p: i64 = SIZE - cut as i64;
        let mut one_state = [0u16; 4096];
        let mut zero_state = [0u16; 4096];

        let one: i64 = 1i64 << 32;
        let mut p: i64 = one / 2;
        let mut last_p8: i64 = 0;

        for _ in 0..(SIZE / 2) {
            let mut p8 = (SIZE * p + one / 2) >> 32;
            if p8 <= last_p8 {
                p8 = last_p8 + 1;
            }
            if last_p8 != 0 && last_p8 < SIZE && p8 <= max_p {
                one_state[last_p8 as usize] = p8 as u16;
            }
            p += ((one - p) * alpha as i64 + one / 2) >> 32;
            last_p8 = p8;
        }

        for i in (SIZE - max_p)..=max_p {
            if one_state[i as usize] != 0 {
                continue;
            }
            let mut pp = (i * one + SIZE / 2) / SIZE;
            pp += ((one - pp) * alpha as i64 + one / 2) >> 32;
            let mut p8 = (SIZE * pp + one / 2) >> 32;
            if p8 <= i {
                p8 = i + 1;
            }
            if p8 > max_p {
                p8 = max_p;
            }
            one_state[i as usize] = p8 as u16;
        }

        for i in 1..SIZE {
            zero_state[i as usize] =
                (SIZE - one_state[(SIZE - i) as usize] as i64) as u16;
        }

        ChanceTable {
            zero_state,
            one_state,
        }
    }
}

/// 4097-entry fixed-point log2 table, used by the optional multiscale chance
/// model. Multiscale adaptation is disabled by default and not implemented
/// by this decoder; this table is kept because it is a standing entity of
/// the range coder's data model, not because anything here currently reads
/// from it.
pub struct Log4kTable {
    pub table: [u16; 4097],
    pub scale: u32,
}

impl Default for Log4kTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Log4kTable {
    pub fn new() -> Self {
        let base: u64 = (65535u64 << 16) / 12;
        let mut table = [0u16; 4097];
        for (i, slot) in table.iter_mut().enumerate().skip(1) {
            *slot = (((log4k_compute(i as u32, base) + (1 << 15)) >> 16) as u16)
                .min(u16::MAX);
        }
        Log4kTable {
            table,
            scale: 65535 / 12,
        }
    }
}

fn log4k_compute(x: u32, base: u64) -> u64 {
    let bits = 32 - x.leading_zeros();
    let mut y: u64 = (x as u64) << (32 - bits);
    let mut res: i64 = base as i64 * (13 - bits as i64);
    let mut add: i64 = base as i64;
    while add > 1 && (y & 0x7FFF_FFFF) != 0 {
        if (y >> 32) != 0 {
            res -= add;
            y >>= 1;
        }
        y = ((y * y) + 0x4000_0000) >> 31;
        add >>= 1;
    }
    res.max(0) as u64
}

/// Initial chances (parts-per-4096) for the 54 named NZ-int slots.
///
/// See: §4.2. Near-Zero Integer Codec
pub const NZ_INT_INITIAL_CHANCES: [u16; 54] = [
    1000, // ZERO
    2048, // SIGN
    1000, 1000, // EXP 0,1
    1200, 1200, // EXP 2,3
    1500, 1500, // EXP 4,5
    1750, 1750, // EXP 6,7
    2000, 2000, // EXP 8,9
    2300, 2300, // EXP 10,11
    2800, 2800, // EXP 12,13
    2400, 2400, // EXP 14,15
    2300, 2300, // EXP 16,17
    2048, 2048, // EXP 18,19
    2048, 2048, // EXP 20,21
    2048, 2048, // EXP 22,23
    2048, 2048, // EXP 24,25
    2048, 2048, // EXP 26,27
    2048, 2048, // EXP 28,29
    2048, 2048, // EXP 30,31
    2048, 2048, // EXP 32,33
    1900, // MANT 0
    1850, // MANT 1
    1800, // MANT 2
    1750, // MANT 3
    1650, // MANT 4
    1600, // MANT 5
    1600, // MANT 6
    2048, // MANT 7
    2048, 2048, 2048, 2048, 2048, 2048, 2048, 2048, 2048, 2048, // MANT 8..17
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chance_table_is_complementary_and_monotone() {
        let ct = ChanceTable::default();
        for i in 1..4096usize {
            assert_eq!(
                ct.zero_state[i] as u32 + ct.one_state[4096 - i] as u32,
                4096
            );
        }
        for i in 1..4095usize {
            assert!(ct.one_state[i] <= ct.one_state[i + 1]);
            assert!(ct.zero_state[i] <= ct.zero_state[i + 1]);
        }
    }

    #[test]
    fn chance_table_stays_in_cut_bounds() {
        let ct = ChanceTable::new(CHANCETABLE_DEFAULT_ALPHA, CHANCETABLE_DEFAULT_CUT);
        for i in 1..4095usize {
            assert!(ct.one_state[i] as u16 >= CHANCETABLE_DEFAULT_CUT);
            assert!(ct.one_state[i] as u16 <= 4096 - CHANCETABLE_DEFAULT_CUT);
        }
    }

    #[test]
    fn log4k_table_is_non_increasing() {
        let log4k = Log4kTable::new();
        for i in 1..4096usize {
            assert!(log4k.table[i] >= log4k.table[i + 1]);
        }
    }
}
