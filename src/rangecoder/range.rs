//! The binary range decoder: primitive bit/integer readers driven by a
//! [`ByteSource`](crate::rangecoder::bytesource::ByteSource).
//!
//! Cross-references are to §4.1 Range Coder, §4.2 Near-Zero Integer Codec.
//!
//! Every public reader returns `Option<T>`: `None` means the byte source ran
//! dry mid-read and the call must be repeated, with the exact same arguments,
//! once more bytes are available. Resume state lives in `self` (and, for
//! NZ-int reads, in the caller-supplied `ChanceContext`), so no state is lost
//! across a suspension — ground truth kept in `low`/`range`/`renorm_needed`
//! plus the small per-reader state structs below.

use crate::chance::{self, ChanceContext};
use crate::rangecoder::bytesource::ByteSource;
use crate::rangecoder::tables::ChanceTable;

const RAC_MAX_RANGE: u32 = 1 << 24;
const RAC_MIN_RANGE: u32 = 1 << 16;

#[derive(Default)]
struct UniformState {
    min: u32,
    len: u32,
}

#[derive(Default)]
struct NzState {
    segment: u8,
    sign: bool,
    amin: i32,
    amax: i32,
    emax: i32,
    e: i32,
    have: i32,
    left: i32,
    minabs1: i32,
    maxabs0: i32,
    pos: i32,
}

/// A FLIF16 range decoder: 24-bit range/low state plus resumable readers for
/// equiprobable bits, chance-weighted bits, uniform integers and near-zero
/// integers.
///
/// Generalised from FFV1's 16-bit-range, 256-state range coder to FLIF16's
/// 24-bit range and 4096-entry chance space.
pub struct RangeCoder {
    low: u32,
    range: u32,
    initialized: bool,
    renorm_needed: bool,
    table: ChanceTable,
    uniform: Option<UniformState>,
    nz: Option<NzState>,
}

impl Default for RangeCoder {
    fn default() -> Self {
        RangeCoder {
            low: 0,
            range: RAC_MAX_RANGE,
            initialized: false,
            renorm_needed: false,
            table: ChanceTable::default(),
            uniform: None,
            nz: None,
        }
    }
}

impl RangeCoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the chance table from bitstream-declared `(cut, alphadiv)`
    /// values, replacing the default table built from
    /// `CHANCETABLE_DEFAULT_ALPHA`/`CHANCETABLE_DEFAULT_CUT`. Must run
    /// before any symbol is read under the new table, since every named
    /// chance slot already adapted against whichever table was active at
    /// the time.
    pub fn set_chance_table(&mut self, alpha: u32, cut: u16) {
        self.table = ChanceTable::new(alpha, cut);
    }

    /// Drains the first bytes of the stream into `low`. Idempotent and
    /// resumable: safe to call on every decoder invocation before any other
    /// reader runs, it becomes a no-op once initialization has completed.
    pub fn init(&mut self, src: &mut ByteSource) -> Option<()> {
        if self.initialized {
            return Some(());
        }
        while self.range > 1 {
            let b = src.get_byte()?;
            self.low = (self.low << 8) | b as u32;
            self.range >>= 8;
        }
        self.range = RAC_MAX_RANGE;
        self.initialized = true;
        Some(())
    }

    fn renorm(&mut self, src: &mut ByteSource) -> Option<()> {
        while self.range <= RAC_MIN_RANGE {
            let b = src.get_byte()?;
            self.low = (self.low << 8) | b as u32;
            self.range <<= 8;
        }
        self.renorm_needed = false;
        Some(())
    }

    /// Decodes one bit with an explicit chance `c` out of the current range.
    pub fn read_with_chance(&mut self, src: &mut ByteSource, c: u32) -> Option<bool> {
        if self.renorm_needed {
            self.renorm(src)?;
        }
        let bit = if self.low >= self.range - c {
            self.low -= self.range - c;
            self.range = c;
            true
        } else {
            self.range -= c;
            false
        };
        self.renorm_needed = true;
        Some(bit)
    }

    /// Decodes one equiprobable bit.
    pub fn read_bit_equi(&mut self, src: &mut ByteSource) -> Option<bool> {
        let c = self.range >> 1;
        self.read_with_chance(src, c)
    }

    /// Decodes one bit weighted by a 12-bit chance `b12` (the probability,
    /// in parts-per-4096, that the bit is 1).
    pub fn read_with_chance12(&mut self, src: &mut ByteSource, b12: u16) -> Option<bool> {
        let range = self.range as u64;
        let b12 = b12 as u64;
        let c = (((range & 0xFFF) * b12 + 0x800) >> 12) + ((range >> 12) * b12);
        self.read_with_chance(src, c as u32)
    }

    /// Decodes one bit at `ctx[slot]`, adapting that chance afterwards.
    fn read_symbol(
        &mut self,
        src: &mut ByteSource,
        ctx: &mut ChanceContext,
        slot: usize,
    ) -> Option<bool> {
        let p12 = ctx.data[slot];
        let bit = self.read_with_chance12(src, p12)?;
        ctx.data[slot] = if bit {
            self.table.one_state[p12 as usize]
        } else {
            self.table.zero_state[p12 as usize]
        };
        Some(bit)
    }

    /// Decodes a uniformly-distributed integer in `[min, min+len]` via
    /// equiprobable binary search.
    pub fn read_uniform(&mut self, src: &mut ByteSource, min: u32, len: u32) -> Option<u32> {
        if self.uniform.is_none() {
            self.uniform = Some(UniformState { min, len });
        }
        loop {
            if self.uniform.as_ref().unwrap().len == 0 {
                return Some(self.uniform.take().unwrap().min);
            }
            let bit = self.read_bit_equi(src)?;
            let state = self.uniform.as_mut().unwrap();
            let med = state.len / 2;
            if bit {
                state.min += med + 1;
                state.len -= med + 1;
            } else {
                state.len = med;
            }
        }
    }

    /// Decodes a near-zero integer in `[min, max]` (`min <= 0 <= max`, or a
    /// degenerate range where `min == max`), per §4.2.
    pub fn read_nz_int(
        &mut self,
        src: &mut ByteSource,
        ctx: &mut ChanceContext,
        min: i32,
        max: i32,
    ) -> Option<i32> {
        if min == max {
            return Some(min);
        }
        if self.nz.is_none() {
            self.nz = Some(NzState {
                amin: 1,
                ..Default::default()
            });
        }
        loop {
            let segment = self.nz.as_ref().unwrap().segment;
            match segment {
                0 => {
                    if self.read_symbol(src, ctx, chance::ZERO)? {
                        self.nz = None;
                        return Some(0);
                    }
                    self.nz.as_mut().unwrap().segment = 1;
                }
                1 => {
                    let sign = if min >= 0 {
                        true
                    } else if max <= 0 {
                        false
                    } else {
                        self.read_symbol(src, ctx, chance::SIGN)?
                    };
                    let amax = if sign { max } else { -min };
                    let st = self.nz.as_mut().unwrap();
                    st.sign = sign;
                    st.amax = amax;
                    st.emax = ilog2(amax);
                    st.e = ilog2(st.amin);
                    st.segment = 2;
                }
                2 => {
                    let (e, emax, sign) = {
                        let st = self.nz.as_ref().unwrap();
                        (st.e, st.emax, st.sign)
                    };
                    if e < emax {
                        if self.read_symbol(src, ctx, chance::exp(e, sign))? {
                            self.nz.as_mut().unwrap().segment = 3;
                        } else {
                            self.nz.as_mut().unwrap().e += 1;
                        }
                    } else {
                        self.nz.as_mut().unwrap().segment = 3;
                    }
                }
                3 => {
                    let st = self.nz.as_mut().unwrap();
                    st.have = 1 << st.e;
                    st.left = st.have - 1;
                    st.pos = st.e;
                    st.segment = 4;
                }
                4 => {
                    let pos = self.nz.as_ref().unwrap().pos;
                    if pos <= 0 {
                        let st = self.nz.take().unwrap();
                        return Some(if st.sign { st.have } else { -st.have });
                    }
                    let (pos, amax, amin) = {
                        let st = self.nz.as_mut().unwrap();
                        st.pos -= 1;
                        st.left >>= 1;
                        st.minabs1 = st.have | (1 << st.pos);
                        st.maxabs0 = st.have | st.left;
                        (st.pos, st.amax, st.amin)
                    };
                    let minabs1 = self.nz.as_ref().unwrap().minabs1;
                    let maxabs0 = self.nz.as_ref().unwrap().maxabs0;
                    if minabs1 > amax {
                        // Forced 0 bit: this magnitude bit cannot be set.
                    } else if maxabs0 >= amin {
                        if self.read_symbol(src, ctx, chance::mant(pos))? {
                            self.nz.as_mut().unwrap().have = minabs1;
                        }
                    } else {
                        self.nz.as_mut().unwrap().have = minabs1;
                    }
                }
                _ => unreachable!("invalid NZ-int resume segment"),
            }
        }
    }

    /// Decodes a near-zero integer in `[min, max]` where the range need not
    /// straddle zero, by recentring on whichever bound is closest to zero.
    pub fn read_gnz_int(
        &mut self,
        src: &mut ByteSource,
        ctx: &mut ChanceContext,
        min: i32,
        max: i32,
    ) -> Option<i32> {
        if min > 0 {
            let v = self.read_nz_int(src, ctx, 0, max - min)?;
            Some(v + min)
        } else if max < 0 {
            let v = self.read_nz_int(src, ctx, min - max, 0)?;
            Some(v + max)
        } else {
            self.read_nz_int(src, ctx, min, max)
        }
    }
}

fn ilog2(x: i32) -> i32 {
    debug_assert!(x >= 1);
    31 - (x as u32).leading_zeros() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_int_resumes_across_suspension() {
        let mut rc = RangeCoder::new();
        let mut src = ByteSource::new();
        // Not enough bytes yet: init suspends.
        assert_eq!(rc.init(&mut src), None);
        src.extend(&[0x80, 0x00, 0x00]);
        assert_eq!(rc.init(&mut src), Some(()));

        // A single uniform read over an empty range (len=0) never touches
        // the byte source and must return immediately.
        assert_eq!(rc.read_uniform(&mut src, 7, 0), Some(7));
    }

    #[test]
    fn nz_int_degenerate_range_short_circuits() {
        let mut rc = RangeCoder::new();
        let mut ctx = ChanceContext::new();
        let mut src = ByteSource::new();
        assert_eq!(rc.read_nz_int(&mut src, &mut ctx, 5, 5), Some(5));
    }

    #[test]
    fn ilog2_matches_floor_log2() {
        assert_eq!(ilog2(1), 0);
        assert_eq!(ilog2(2), 1);
        assert_eq!(ilog2(3), 1);
        assert_eq!(ilog2(4), 2);
        assert_eq!(ilog2(1023), 9);
        assert_eq!(ilog2(1024), 10);
    }
}
