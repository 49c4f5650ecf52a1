//! The invertible transform pipeline: declaration, parameter decoding, and
//! per-pixel inverse application.
//!
//! See: §4.5 Transforms.

use crate::chance::ChanceContext;
use crate::colorrange::{ycocg_reverse, RangeChain};
use crate::constants::transform_id;
use crate::error::{Error, Result};
use crate::rangecoder::{ByteSource, RangeCoder};

/// What a completed transform contributes to per-pixel inverse
/// reconstruction. `YCoCg` and `Bounds` carry no extra state beyond what's
/// already folded into the [`RangeChain`]; `ChannelCompact` and
/// `PermutePlanes` need their decoded parameters back at inverse time.
pub enum AppliedTransform {
    ChannelCompact { palettes: Vec<Vec<i32>> },
    YCoCg,
    PermutePlanes { subtract: bool, perm: Vec<usize> },
    Bounds,
}

impl AppliedTransform {
    /// Applies this transform's inverse to one pixel's already-decoded
    /// channel values (in transformed space), in place.
    pub fn inverse(&self, chain: &RangeChain, pixel: &mut [i32]) {
        match self {
            AppliedTransform::ChannelCompact { palettes } => {
                for (p, palette) in palettes.iter().enumerate() {
                    let idx = pixel[p];
                    pixel[p] = if idx >= 0 && (idx as usize) < palette.len() {
                        palette[idx as usize]
                    } else {
                        palette.first().copied().unwrap_or(0)
                    };
                }
            }
            AppliedTransform::YCoCg => {
                if pixel.len() >= 3 {
                    let (r, g, b) = ycocg_reverse(
                        pixel[0],
                        pixel[1],
                        pixel[2],
                        chain.max(0),
                        chain.max(1),
                        chain.max(2),
                    );
                    pixel[0] = r;
                    pixel[1] = g;
                    pixel[2] = b;
                }
            }
            AppliedTransform::PermutePlanes { subtract, perm } => {
                let mut out = pixel.to_vec();
                for (p, &src) in perm.iter().enumerate() {
                    out[src] = pixel[p];
                }
                if *subtract {
                    for &ch in &[1usize, 2] {
                        if ch < out.len() {
                            out[ch] = (out[ch] + out[0]).clamp(chain.min(ch), chain.max(ch));
                        }
                    }
                }
                pixel.copy_from_slice(&out);
            }
            AppliedTransform::Bounds => {}
        }
    }
}

#[derive(Default)]
struct ChannelCompactState {
    palettes: Vec<Vec<i32>>,
    channel: usize,
    nb: Option<i32>,
    entries_read: usize,
    ctx_nb: ChanceContext,
    ctx_val: ChanceContext,
}

#[derive(Default)]
struct PermutePlanesState {
    subtract: Option<bool>,
    perm: Vec<usize>,
    channel: usize,
    ctx_subtract: ChanceContext,
    ctx_perm: ChanceContext,
}

#[derive(Default)]
struct BoundsState {
    bounds: Vec<(i32, i32)>,
    channel: usize,
    lo: Option<i32>,
    ctx: ChanceContext,
}

enum TransformReader {
    ChannelCompact(ChannelCompactState),
    YCoCg,
    PermutePlanes(PermutePlanesState),
    Bounds(BoundsState),
}

enum Stage {
    ContinueBit,
    TransformId,
    Reading(u32, TransformReader),
    AlphazeroPredictor,
}

/// Resumable reader for the whole transform section: "read one or more
/// transforms until a zero continue-bit, then (conditionally) the
/// invisible-pixel predictor".
pub struct TransformSectionReader {
    chain: RangeChain,
    applied: Vec<AppliedTransform>,
    channels: usize,
    alphazero: bool,
    stage: Stage,
    invisible_predictor: Option<u32>,
}

impl TransformSectionReader {
    pub fn new(chain: RangeChain, channels: usize, alphazero: bool) -> Self {
        TransformSectionReader {
            chain,
            applied: Vec::new(),
            channels,
            alphazero,
            stage: Stage::ContinueBit,
            invisible_predictor: None,
        }
    }

    pub fn advance(&mut self, rc: &mut RangeCoder, src: &mut ByteSource) -> Result<Option<()>> {
        loop {
            match &mut self.stage {
                Stage::ContinueBit => {
                    let more = match rc.read_bit_equi(src) {
                        Some(b) => b,
                        None => return Ok(None),
                    };
                    self.stage = if more {
                        Stage::TransformId
                    } else {
                        Stage::AlphazeroPredictor
                    };
                }
                Stage::TransformId => {
                    let id = match rc.read_uniform(src, 0, 13) {
                        Some(v) => v,
                        None => return Ok(None),
                    };
                    let reader = match id {
                        transform_id::CHANNELCOMPACT => {
                            TransformReader::ChannelCompact(ChannelCompactState::default())
                        }
                        transform_id::YCOCG => TransformReader::YCoCg,
                        transform_id::PERMUTEPLANES => {
                            TransformReader::PermutePlanes(PermutePlanesState::default())
                        }
                        transform_id::BOUNDS => TransformReader::Bounds(BoundsState::default()),
                        other => {
                            return Err(Error::Unsupported(format!(
                                "transform id {other} is declared but not implemented"
                            )));
                        }
                    };
                    self.stage = Stage::Reading(id, reader);
                }
                Stage::Reading(..) => {
                    let (id, mut reader) = match std::mem::replace(&mut self.stage, Stage::ContinueBit) {
                        Stage::Reading(id, reader) => (id, reader),
                        _ => unreachable!(),
                    };
                    let done = match &mut reader {
                        TransformReader::ChannelCompact(st) => {
                            advance_channel_compact(st, rc, src, self.channels, &self.chain)?
                        }
                        TransformReader::YCoCg => true,
                        TransformReader::PermutePlanes(st) => {
                            advance_permute_planes(st, rc, src, self.channels)?
                        }
                        TransformReader::Bounds(st) => {
                            advance_bounds(st, rc, src, self.channels, &self.chain)?
                        }
                    };
                    if !done {
                        self.stage = Stage::Reading(id, reader);
                        return Ok(None);
                    }
                    match reader {
                        TransformReader::ChannelCompact(st) => {
                            let sizes: Vec<i32> = st.palettes.iter().map(|p| p.len() as i32).collect();
                            self.chain.push_channel_compact(sizes);
                            self.applied.push(AppliedTransform::ChannelCompact {
                                palettes: st.palettes,
                            });
                        }
                        TransformReader::YCoCg => {
                            let origmax4 =
                                (self.chain.max(0).max(self.chain.max(1)).max(self.chain.max(2))) / 4
                                    - 1;
                            self.chain.push_ycocg(origmax4);
                            self.applied.push(AppliedTransform::YCoCg);
                        }
                        TransformReader::PermutePlanes(st) => {
                            let subtract = st.subtract.unwrap_or(false);
                            self.chain
                                .push_permute_planes(subtract, st.perm.clone());
                            self.applied.push(AppliedTransform::PermutePlanes {
                                subtract,
                                perm: st.perm,
                            });
                        }
                        TransformReader::Bounds(st) => {
                            self.chain.push_bounds(st.bounds);
                            self.applied.push(AppliedTransform::Bounds);
                        }
                    }
                }
                Stage::AlphazeroPredictor => {
                    let need_predictor =
                        self.alphazero && self.channels > 3 && self.chain.min(3) <= 0;
                    if need_predictor && self.invisible_predictor.is_none() {
                        let v = match rc.read_uniform(src, 0, 2) {
                            Some(v) => v,
                            None => return Ok(None),
                        };
                        self.invisible_predictor = Some(v);
                    }
                    return Ok(Some(()));
                }
            }
        }
    }

    fn finish_transform(&mut self, id: u32) -> Result<()> {
        // The reader matching `id` has already mutated `self.chain` is not
        // possible here (we need the concrete state); instead each
        // `advance_*` helper pushes directly onto `self.chain` and
        // `self.applied` once it completes. See those functions.
        let _ = id;
        Ok(())
    }

    pub fn into_parts(self) -> (RangeChain, Vec<AppliedTransform>, Option<u32>) {
        (self.chain, self.applied, self.invisible_predictor)
    }
}

fn advance_channel_compact(
    st: &mut ChannelCompactState,
    rc: &mut RangeCoder,
    src: &mut ByteSource,
    channels: usize,
    chain: &RangeChain,
) -> Result<bool> {
    loop {
        if st.channel >= channels {
            return Ok(true);
        }
        let (min, max) = (chain.min(st.channel), chain.max(st.channel));
        if st.nb.is_none() {
            let v = match rc.read_nz_int(src, &mut st.ctx_nb, 0, (max - min).max(0)) {
                Some(v) => v,
                None => return Ok(false),
            };
            st.nb = Some(v + 1);
            st.entries_read = 0;
            st.palettes.push(Vec::with_capacity((v + 1) as usize));
        }
        let nb = st.nb.unwrap();
        if st.entries_read as i32 >= nb {
            st.channel += 1;
            st.nb = None;
            continue;
        }
        let prev = if st.entries_read == 0 {
            min
        } else {
            st.palettes[st.channel][st.entries_read - 1] + 1
        };
        let remaining = nb - st.entries_read as i32 - 1;
        let upper = max - remaining;
        // Always an unsigned nz_int(0, upper-prev) plus prev, never the
        // signed/shifted gnz_int path: prev can be negative (a channel
        // compacted after YCoCg), and gnz_int would pick a different,
        // wrong code path for a negative base.
        let v = match rc.read_nz_int(src, &mut st.ctx_val, 0, upper - prev) {
            Some(v) => v,
            None => return Ok(false),
        };
        st.palettes[st.channel].push(v + prev);
        st.entries_read += 1;
    }
}

fn advance_permute_planes(
    st: &mut PermutePlanesState,
    rc: &mut RangeCoder,
    src: &mut ByteSource,
    channels: usize,
) -> Result<bool> {
    if st.subtract.is_none() {
        let bit = match rc.read_gnz_int(src, &mut st.ctx_subtract, 0, 1) {
            Some(v) => v,
            None => return Ok(false),
        };
        st.subtract = Some(bit != 0);
    }
    loop {
        if st.channel >= channels {
            let mut seen = vec![false; channels];
            for &to in &st.perm {
                if to >= channels || seen[to] {
                    return Err(Error::InvalidData(
                        "PermutePlanes permutation is not total".into(),
                    ));
                }
                seen[to] = true;
            }
            return Ok(true);
        }
        let v = match rc.read_gnz_int(src, &mut st.ctx_perm, 0, channels as i32 - 1) {
            Some(v) => v,
            None => return Ok(false),
        };
        st.perm.push(v as usize);
        st.channel += 1;
    }
}

fn advance_bounds(
    st: &mut BoundsState,
    rc: &mut RangeCoder,
    src: &mut ByteSource,
    channels: usize,
    chain: &RangeChain,
) -> Result<bool> {
    loop {
        if st.channel >= channels {
            return Ok(true);
        }
        let (pmin, pmax) = (chain.min(st.channel), chain.max(st.channel));
        if st.lo.is_none() {
            let v = match rc.read_gnz_int(src, &mut st.ctx, pmin, pmax) {
                Some(v) => v,
                None => return Ok(false),
            };
            st.lo = Some(v);
        }
        let lo = st.lo.unwrap();
        let hi = match rc.read_gnz_int(src, &mut st.ctx, lo, pmax) {
            Some(v) => v,
            None => return Ok(false),
        };
        if lo > hi || lo < pmin || hi > pmax {
            return Err(Error::InvalidData(
                "Bounds transform channel range is out of the predecessor range".into(),
            ));
        }
        st.bounds.push((lo, hi));
        st.lo = None;
        st.channel += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_section_stops_on_zero_continue_bit() {
        let chain = RangeChain::root(vec![(0, 255)]);
        let mut reader = TransformSectionReader::new(chain, 1, false);
        let mut rc = RangeCoder::new();
        let mut src = ByteSource::new();
        // No bytes available: even the first equiprobable bit suspends.
        assert!(matches!(reader.advance(&mut rc, &mut src), Ok(None)));
    }
}
