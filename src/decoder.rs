//! Top-level state machine: header → second header → transforms → MANIAC →
//! pixel data.
//!
//! See: §4.9 Top-Level State Machine, §6 External Interfaces.

use std::collections::HashMap;

use log::debug;

use crate::chance::ChanceContext;
use crate::colorrange::RangeChain;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::header::{FrontMatter, FrontMatterReader, SecondHeaderReader};
use crate::maniac::{ManiacChances, ManiacReader, ManiacTree, PixelRead};
use crate::pred::{neighbors, property_vector, scanline_guess};
use crate::rangecoder::{ByteSource, RangeCoder};
use crate::transform::{AppliedTransform, TransformSectionReader};

/// Plane decode order from §4.8: alpha decodes before the color planes its
/// zero-test conditions, then Y, Co, Cg. Lookback (plane index 4) never
/// appears in this crate because `FrameLookback` is a declared-but-
/// unimplemented transform id (see `transform.rs`).
const PLANE_ORDER: [usize; 4] = [3, 0, 1, 2];

/// The result of one `Decoder::decode` call.
pub enum Decoded {
    /// The byte window ran dry mid-state; feed more bytes and call again.
    Suspended,
    /// The whole image, all frames, fully reconstructed in output color
    /// space (every transform's inverse already applied).
    Frames(Vec<Frame>),
}

/// Per-plane MANIAC tree under construction.
struct TreeJob {
    plane: usize,
    reader: ManiacReader,
    chances: ManiacChances,
}

enum Phase {
    FrontMatter(FrontMatterReader),
    RacInit(FrontMatter),
    SecondHeader(SecondHeaderReader),
    Transforms {
        front: FrontMatter,
        alphazero: bool,
        reader: TransformSectionReader,
    },
    /// One bit per frame after the first: whether it is a verbatim repeat of
    /// the frame immediately before it (§4.8's `seen_before`).
    FrameDup {
        front: FrontMatter,
        alphazero: bool,
        chain: RangeChain,
        applied: Vec<AppliedTransform>,
        seen_before: Vec<Option<usize>>,
        idx: usize,
        ctx: ChanceContext,
    },
    ManiacTrees {
        front: FrontMatter,
        alphazero: bool,
        chain: RangeChain,
        applied: Vec<AppliedTransform>,
        active_planes: Vec<usize>,
        seen_before: Vec<Option<usize>>,
        trees: HashMap<usize, ManiacTree>,
        pos: usize,
        job: Option<TreeJob>,
    },
    PixelData {
        front: FrontMatter,
        alphazero: bool,
        chain: RangeChain,
        applied: Vec<AppliedTransform>,
        active_planes: Vec<usize>,
        trees: HashMap<usize, ManiacTree>,
        frames: Vec<Frame>,
        plane_pos: usize,
        frame_idx: usize,
        row: usize,
        col: usize,
        pixel_read: PixelRead,
    },
    Finishing {
        front: FrontMatter,
        chain: RangeChain,
        applied: Vec<AppliedTransform>,
        frames: Vec<Frame>,
        frame_idx: usize,
        row: usize,
    },
    Done,
}

/// A FLIF16 decoder instance, driving the whole bitstream through to
/// finished pixel frames.
pub struct Decoder {
    src: ByteSource,
    rc: RangeCoder,
    phase: Phase,
}

impl Decoder {
    pub fn new() -> Self {
        Decoder {
            src: ByteSource::new(),
            rc: RangeCoder::new(),
            phase: Phase::FrontMatter(FrontMatterReader::new()),
        }
    }

    /// Appends more input bytes to the decoder's window.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.src.extend(bytes);
    }

    /// Advances the state machine as far as the current byte window allows.
    pub fn decode(&mut self) -> Result<Decoded> {
        loop {
            match &mut self.phase {
                Phase::FrontMatter(reader) => match reader.advance(&mut self.src)? {
                    None => return Ok(Decoded::Suspended),
                    Some(front) => self.phase = Phase::RacInit(front),
                },
                Phase::RacInit(_) => {
                    if self.rc.init(&mut self.src).is_none() {
                        return Ok(Decoded::Suspended);
                    }
                    let front = match std::mem::replace(&mut self.phase, Phase::Done) {
                        Phase::RacInit(front) => front,
                        _ => unreachable!(),
                    };
                    self.phase = Phase::SecondHeader(SecondHeaderReader::new(front));
                }
                Phase::SecondHeader(reader) => match reader.advance(&mut self.rc, &mut self.src)? {
                    None => return Ok(Decoded::Suspended),
                    Some(second) => {
                        if let (Some(cut), Some(alpha)) = (second.custom_cut, second.custom_alpha) {
                            self.rc.set_chance_table(alpha, cut);
                        }
                        let front = reader.front().clone();
                        let bounds: Vec<(i32, i32)> =
                            second.bpc.iter().map(|&b| (0, b as i32)).collect();
                        let chain = RangeChain::root(bounds);
                        let channels = front.channels;
                        let alphazero = second.alphazero;
                        self.phase = Phase::Transforms {
                            front,
                            alphazero,
                            reader: TransformSectionReader::new(chain, channels, alphazero),
                        };
                    }
                },
                Phase::Transforms { reader, .. } => match reader.advance(&mut self.rc, &mut self.src)? {
                    None => return Ok(Decoded::Suspended),
                    Some(()) => {
                        let (front, alphazero, reader) =
                            match std::mem::replace(&mut self.phase, Phase::Done) {
                                Phase::Transforms {
                                    front,
                                    alphazero,
                                    reader,
                                } => (front, alphazero, reader),
                                _ => unreachable!(),
                            };
                        let (chain, applied, _invisible_predictor) = reader.into_parts();
                        debug!("transform pipeline: {} transform(s) applied", applied.len());
                        self.phase = Phase::FrameDup {
                            front,
                            alphazero,
                            chain,
                            applied,
                            seen_before: Vec::new(),
                            idx: 0,
                            ctx: ChanceContext::default(),
                        };
                    }
                },
                Phase::FrameDup {
                    front,
                    seen_before,
                    idx,
                    ctx,
                    ..
                } => {
                    if *idx >= front.frames as usize {
                        let (front, alphazero, chain, applied, seen_before) =
                            match std::mem::replace(&mut self.phase, Phase::Done) {
                                Phase::FrameDup {
                                    front,
                                    alphazero,
                                    chain,
                                    applied,
                                    seen_before,
                                    ..
                                } => (front, alphazero, chain, applied, seen_before),
                                _ => unreachable!(),
                            };
                        let active_planes: Vec<usize> = PLANE_ORDER
                            .iter()
                            .copied()
                            .filter(|&p| p < front.channels && chain.min(p) < chain.max(p))
                            .collect();
                        self.phase = Phase::ManiacTrees {
                            front,
                            alphazero,
                            chain,
                            applied,
                            active_planes,
                            seen_before,
                            trees: HashMap::new(),
                            pos: 0,
                            job: None,
                        };
                        continue;
                    }
                    if *idx == 0 {
                        seen_before.push(None);
                        *idx += 1;
                        continue;
                    }
                    let dup = match self.rc.read_gnz_int(&mut self.src, ctx, 0, 1) {
                        Some(v) => v,
                        None => return Ok(Decoded::Suspended),
                    };
                    seen_before.push(if dup != 0 { Some(*idx - 1) } else { None });
                    *idx += 1;
                }
                Phase::ManiacTrees {
                    front,
                    chain,
                    active_planes,
                    seen_before,
                    trees,
                    pos,
                    job,
                    ..
                } => {
                    if *pos >= active_planes.len() {
                        let (front, alphazero, chain, applied, active_planes, seen_before, trees) =
                            match std::mem::replace(&mut self.phase, Phase::Done) {
                                Phase::ManiacTrees {
                                    front,
                                    alphazero,
                                    chain,
                                    applied,
                                    active_planes,
                                    seen_before,
                                    trees,
                                    ..
                                } => (front, alphazero, chain, applied, active_planes, seen_before, trees),
                                _ => unreachable!(),
                            };
                        debug!("MANIAC trees built for planes {:?}", active_planes);
                        let width = front.width as usize;
                        let height = front.height as usize;
                        let channels = front.channels;
                        let frames = seen_before
                            .iter()
                            .map(|&dup| {
                                let mut f = Frame::new_transformed(&chain, channels, width, height);
                                f.seen_before = dup;
                                f
                            })
                            .collect();
                        self.phase = Phase::PixelData {
                            front,
                            alphazero,
                            chain,
                            applied,
                            active_planes,
                            trees,
                            frames,
                            plane_pos: 0,
                            frame_idx: 0,
                            row: 0,
                            col: 0,
                            pixel_read: PixelRead::default(),
                        };
                        continue;
                    }
                    let plane = active_planes[*pos];
                    if job.is_none() {
                        let ranges = property_ranges(chain, front.channels, plane);
                        *job = Some(TreeJob {
                            plane,
                            reader: ManiacReader::new(ranges),
                            chances: ManiacChances::default(),
                        });
                    }
                    let j = job.as_mut().unwrap();
                    match j.reader.advance(&mut self.rc, &mut self.src, &mut j.chances)? {
                        None => return Ok(Decoded::Suspended),
                        Some(()) => {
                            let j = job.take().unwrap();
                            trees.insert(j.plane, j.reader.into_tree());
                            *pos += 1;
                        }
                    }
                }
                Phase::PixelData {
                    front,
                    alphazero,
                    chain,
                    active_planes,
                    trees,
                    frames,
                    plane_pos,
                    frame_idx,
                    row,
                    col,
                    pixel_read,
                    ..
                } => {
                    let width = front.width as usize;
                    let height = front.height as usize;
                    if *plane_pos >= active_planes.len() {
                        let (front, chain, applied, frames) =
                            match std::mem::replace(&mut self.phase, Phase::Done) {
                                Phase::PixelData {
                                    front,
                                    chain,
                                    applied,
                                    frames,
                                    ..
                                } => (front, chain, applied, frames),
                                _ => unreachable!(),
                            };
                        self.phase = Phase::Finishing {
                            front,
                            chain,
                            applied,
                            frames,
                            frame_idx: 0,
                            row: 0,
                        };
                        continue;
                    }
                    let plane = active_planes[*plane_pos];
                    if *frame_idx >= front.frames as usize {
                        *plane_pos += 1;
                        *frame_idx = 0;
                        *row = 0;
                        *col = 0;
                        continue;
                    }
                    if *row == 0 && *col == 0 {
                        if let Some(src_idx) = frames[*frame_idx].seen_before {
                            let (before, after) = frames.split_at_mut(*frame_idx);
                            let dst = &mut after[0];
                            let src = &before[src_idx];
                            for r in 0..height {
                                dst.planes[plane].copy_row_from(&src.planes[plane], r);
                            }
                            *frame_idx += 1;
                            continue;
                        }
                    }
                    if *row >= height {
                        *frame_idx += 1;
                        *row = 0;
                        *col = 0;
                        continue;
                    }
                    if *col >= width {
                        *row += 1;
                        *col = 0;
                        continue;
                    }
                    let r = *row as isize;
                    let c = *col as isize;

                    let alpha_zero_skip = *alphazero
                        && front.channels > 3
                        && plane < 3
                        && frames[*frame_idx].planes[3].get(*row, *col) == 0;

                    if alpha_zero_skip {
                        let guess = {
                            let fr = &frames[*frame_idx];
                            let get = |rr: isize, cc: isize| {
                                if rr < 0 || cc < 0 {
                                    0
                                } else {
                                    fr.planes[plane].get(rr as usize, cc as usize)
                                }
                            };
                            let n = neighbors(get, r, c, width as isize);
                            scanline_guess(&n).0
                        };
                        frames[*frame_idx].planes[plane].set(*row, *col, guess);
                        *col += 1;
                        continue;
                    }

                    let (lo_delta, hi_delta, guess, prop) = {
                        let fr = &frames[*frame_idx];
                        let get = |rr: isize, cc: isize| {
                            if rr < 0 || cc < 0 {
                                0
                            } else {
                                fr.planes[plane].get(rr as usize, cc as usize)
                            }
                        };
                        let n = neighbors(get, r, c, width as isize);
                        let (raw_guess, which) = scanline_guess(&n);
                        let prev: Vec<i32> = if plane < 3 {
                            (0..plane).map(|p| fr.planes[p].get(*row, *col)).collect()
                        } else {
                            Vec::new()
                        };
                        let alpha_val = if front.channels > 3 && plane < 3 {
                            Some(fr.planes[3].get(*row, *col))
                        } else {
                            None
                        };
                        let (lo, hi, guess) = chain.snap(plane, &prev, raw_guess);
                        let prop = property_vector(&prev, alpha_val, guess, which, &n);
                        (lo - guess, hi - guess, guess, prop)
                    };

                    let tree = trees.get_mut(&plane).unwrap();
                    match pixel_read.read(&mut self.rc, &mut self.src, tree, &prop, lo_delta, hi_delta) {
                        None => return Ok(Decoded::Suspended),
                        Some(delta) => {
                            frames[*frame_idx].planes[plane].set(*row, *col, guess + delta);
                            *col += 1;
                        }
                    }
                }
                Phase::Finishing {
                    front,
                    chain,
                    applied,
                    frames,
                    frame_idx,
                    row,
                } => {
                    let height = front.height as usize;
                    let width = front.width as usize;
                    if *frame_idx >= frames.len() {
                        let frames = match std::mem::replace(&mut self.phase, Phase::Done) {
                            Phase::Finishing { frames, .. } => frames,
                            _ => unreachable!(),
                        };
                        return Ok(Decoded::Frames(frames));
                    }
                    if *row >= height {
                        *frame_idx += 1;
                        *row = 0;
                        continue;
                    }
                    let f = &mut frames[*frame_idx];
                    for col in 0..width {
                        let mut pixel: Vec<i32> =
                            (0..front.channels).map(|p| f.planes[p].get(*row, col)).collect();
                        for t in applied.iter().rev() {
                            t.inverse(chain, &mut pixel);
                        }
                        for (p, v) in pixel.into_iter().enumerate() {
                            f.planes[p].set(*row, col, v);
                        }
                    }
                    *row += 1;
                }
                Phase::Done => return Err(Error::InvalidData("decode already completed".into())),
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the property-range vector for `plane`, per §4.6's per-source
/// sizing table `{7,8,9,7,7}` (no alpha) / `{8,9,10,7,7}` (with alpha):
/// one range per already-decoded color plane, one for alpha when it
/// conditions this plane, then guess/which/four neighbor-delta ranges.
fn property_ranges(chain: &RangeChain, channels: usize, plane: usize) -> Vec<(i32, i32)> {
    let has_alpha = channels > 3;
    let mut ranges = Vec::new();
    if plane < 3 {
        for prior in 0..plane {
            ranges.push((chain.min(prior), chain.max(prior)));
        }
        if has_alpha {
            ranges.push((chain.min(3), chain.max(3)));
        }
    }
    let (lo, hi) = (chain.min(plane), chain.max(plane));
    let span = hi - lo;
    ranges.push((lo, hi)); // guess
    ranges.push((0, 2)); // which
    ranges.push((-span, span)); // left - topleft
    ranges.push((-span, span)); // topleft - top
    ranges.push((-span, span)); // top - topright
    ranges.push((-span, span)); // toptop - top
    ranges.push((-span, span)); // leftleft - left
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_suspends_with_no_bytes() {
        let mut d = Decoder::new();
        assert!(matches!(d.decode(), Ok(Decoded::Suspended)));
    }

    #[test]
    fn decoder_suspends_on_truncated_front_matter() {
        let mut d = Decoder::new();
        d.feed(b"FLIF");
        d.feed(&[0x11, b'1', 0x00, 0x00, 0x00]);
        // A full front matter parse succeeds, but RAC init and the
        // RAC-coded second header still need bytes we haven't fed.
        assert!(matches!(d.decode(), Ok(Decoded::Suspended)));
    }
}
