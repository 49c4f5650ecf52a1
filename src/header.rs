//! Container front matter and the RAC-coded second header.
//!
//! See: §4.0 Container Front Matter (supplement), §6 External Interfaces.

use log::debug;

use crate::error::{Error, Result};
use crate::rangecoder::{ByteSource, RangeCoder};

const MAGIC: &[u8; 4] = b"FLIF";
const VARINT_MAX_BYTES: u8 = 5;

#[derive(Default)]
struct Varint {
    value: u32,
    bytes_read: u8,
}

impl Varint {
    /// Reads one base-128 big-endian varint byte at a time; returns
    /// `Some(value)` once the continuation bit is clear.
    fn advance(&mut self, src: &mut ByteSource) -> Result<Option<u32>> {
        loop {
            if self.bytes_read >= VARINT_MAX_BYTES {
                return Err(Error::InvalidData("varint exceeds 5 bytes".into()));
            }
            let b = match src.get_byte() {
                Some(b) => b,
                None => return Ok(None),
            };
            self.bytes_read += 1;
            self.value = (self.value << 7) | (b & 0x7F) as u32;
            if b & 0x80 == 0 {
                return Ok(Some(self.value));
            }
        }
    }
}

enum Phase {
    Magic(usize),
    ChannelByte,
    BpcMarker,
    Width(Varint),
    Height(Varint),
    Frames(Varint),
    MetaSentinelOrTag(Option<u8>),
    MetaTagRest(Vec<u8>),
    MetaSize(Varint),
    MetaSkip(u32),
}

/// The fixed-layout part of the stream: magic, channel/bpc markers,
/// dimension varints, and the metadata-chunk loop up to its zero-byte
/// sentinel.
#[derive(Clone)]
pub struct FrontMatter {
    pub animated: bool,
    pub channels: usize,
    pub bpc_marker: u8,
    pub width: u32,
    pub height: u32,
    pub frames: u32,
}

/// Resumable reader for the container front matter (§4.0 / §6).
pub struct FrontMatterReader {
    phase: Phase,
    animated: bool,
    channels: usize,
    bpc_marker: u8,
    width: u32,
    height: u32,
    frames: u32,
}

impl FrontMatterReader {
    pub fn new() -> Self {
        FrontMatterReader {
            phase: Phase::Magic(0),
            animated: false,
            channels: 0,
            bpc_marker: 0,
            width: 0,
            height: 0,
            frames: 1,
        }
    }

    pub fn advance(&mut self, src: &mut ByteSource) -> Result<Option<FrontMatter>> {
        loop {
            match &mut self.phase {
                Phase::Magic(i) => {
                    while *i < MAGIC.len() {
                        let b = match src.get_byte() {
                            Some(b) => b,
                            None => return Ok(None),
                        };
                        if b != MAGIC[*i] {
                            return Err(Error::InvalidData("bad FLIF magic".into()));
                        }
                        *i += 1;
                    }
                    self.phase = Phase::ChannelByte;
                }
                Phase::ChannelByte => {
                    let b = match src.get_byte() {
                        Some(b) => b,
                        None => return Ok(None),
                    };
                    self.animated = (b >> 4) >= 5;
                    let channels = b & 0x0F;
                    if ![1u8, 3, 4].contains(&channels) {
                        return Err(Error::InvalidData(format!(
                            "unsupported channel count {channels}"
                        )));
                    }
                    self.channels = channels as usize;
                    self.phase = Phase::BpcMarker;
                }
                Phase::BpcMarker => {
                    let b = match src.get_byte() {
                        Some(b) => b,
                        None => return Ok(None),
                    };
                    if !matches!(b, b'0' | b'1' | b'2') {
                        return Err(Error::InvalidData("unrecognised bpc marker".into()));
                    }
                    self.bpc_marker = b;
                    self.phase = Phase::Width(Varint::default());
                }
                Phase::Width(v) => match v.advance(src)? {
                    None => return Ok(None),
                    Some(w) => {
                        self.width = w + 1;
                        self.phase = Phase::Height(Varint::default());
                    }
                },
                Phase::Height(v) => match v.advance(src)? {
                    None => return Ok(None),
                    Some(h) => {
                        self.height = h + 1;
                        self.phase = if self.animated {
                            Phase::Frames(Varint::default())
                        } else {
                            Phase::MetaSentinelOrTag(None)
                        };
                    }
                },
                Phase::Frames(v) => match v.advance(src)? {
                    None => return Ok(None),
                    Some(f) => {
                        self.frames = f + 2;
                        self.phase = Phase::MetaSentinelOrTag(None);
                    }
                },
                Phase::MetaSentinelOrTag(first) => {
                    let b = match first.take() {
                        Some(b) => b,
                        None => match src.get_byte() {
                            Some(b) => b,
                            None => return Ok(None),
                        },
                    };
                    if b == 0 {
                        debug!(
                            "front matter: {}x{}, {} channel(s), {} frame(s)",
                            self.width, self.height, self.channels, self.frames
                        );
                        return Ok(Some(FrontMatter {
                            animated: self.animated,
                            channels: self.channels,
                            bpc_marker: self.bpc_marker,
                            width: self.width,
                            height: self.height,
                            frames: self.frames,
                        }));
                    }
                    self.phase = Phase::MetaTagRest(vec![b]);
                }
                Phase::MetaTagRest(tag) => {
                    while tag.len() < 4 {
                        let b = match src.get_byte() {
                            Some(b) => b,
                            None => return Ok(None),
                        };
                        tag.push(b);
                    }
                    self.phase = Phase::MetaSize(Varint::default());
                }
                Phase::MetaSize(v) => match v.advance(src)? {
                    None => return Ok(None),
                    Some(size) => {
                        self.phase = Phase::MetaSkip(size);
                    }
                },
                Phase::MetaSkip(remaining) => {
                    while *remaining > 0 {
                        if src.get_byte().is_none() {
                            return Ok(None);
                        }
                        *remaining -= 1;
                    }
                    self.phase = Phase::MetaSentinelOrTag(None);
                }
            }
        }
    }
}

impl Default for FrontMatterReader {
    fn default() -> Self {
        Self::new()
    }
}

/// The RAC-coded second header: per-channel bit depth, animation timing,
/// and the custom-chance-table parameters.
///
/// See: §6 External Interfaces, §4.11.
pub struct SecondHeader {
    pub bpc: Vec<u32>,
    pub alphazero: bool,
    pub loops: u32,
    pub frame_delays: Vec<u32>,
    pub custom_cut: Option<u16>,
    pub custom_alpha: Option<u32>,
}

enum SecondPhase {
    Bpc(usize),
    Alphazero,
    Loops,
    FrameDelays(usize),
    CustomAlphaBit,
    CustomCut,
    CustomAlphaDiv,
    CustomBc,
}

pub struct SecondHeaderReader {
    phase: SecondPhase,
    front: FrontMatter,
    /// Running max across all per-channel bpc reads; every channel's range
    /// ends up bounded by this single shared value, not its own reading,
    /// matching the reference decoder's (admittedly bogus) collapse of
    /// per-channel bpc into one shared max.
    bpc_max: u32,
    bpc: Vec<u32>,
    alphazero: bool,
    loops: u32,
    frame_delays: Vec<u32>,
    custom_cut: Option<u16>,
    custom_alpha: Option<u32>,
}

impl SecondHeaderReader {
    pub fn new(front: FrontMatter) -> Self {
        let start = if front.bpc_marker == b'0' {
            SecondPhase::Bpc(0)
        } else {
            SecondPhase::Alphazero
        };
        let bpc_max = if front.bpc_marker == b'2' { 0xFFFF } else { 0xFF };
        let bpc = if front.bpc_marker == b'0' {
            Vec::new()
        } else {
            vec![bpc_max; front.channels]
        };
        SecondHeaderReader {
            phase: start,
            front,
            bpc_max: 0,
            bpc,
            alphazero: false,
            loops: 0,
            frame_delays: Vec::new(),
            custom_cut: None,
            custom_alpha: None,
        }
    }

    pub fn front(&self) -> &FrontMatter {
        &self.front
    }

    pub fn advance(&mut self, rc: &mut RangeCoder, src: &mut ByteSource) -> Result<Option<SecondHeader>> {
        loop {
            match &mut self.phase {
                SecondPhase::Bpc(i) => {
                    if *i >= self.front.channels {
                        self.bpc = vec![self.bpc_max; self.front.channels];
                        self.phase = SecondPhase::Alphazero;
                        continue;
                    }
                    let log2 = match rc.read_uniform(src, 1, 14) {
                        Some(v) => v,
                        None => return Ok(None),
                    };
                    self.bpc_max = self.bpc_max.max((1u32 << log2) - 1);
                    *i += 1;
                }
                SecondPhase::Alphazero => {
                    if self.front.channels > 3 {
                        let v = match rc.read_uniform(src, 0, 1) {
                            Some(v) => v,
                            None => return Ok(None),
                        };
                        self.alphazero = v != 0;
                    }
                    self.phase = SecondPhase::Loops;
                }
                SecondPhase::Loops => {
                    if self.front.frames > 1 {
                        let v = match rc.read_uniform(src, 0, 100) {
                            Some(v) => v,
                            None => return Ok(None),
                        };
                        self.loops = v;
                        self.frame_delays.reserve(self.front.frames as usize);
                        self.phase = SecondPhase::FrameDelays(0);
                    } else {
                        self.phase = SecondPhase::CustomAlphaBit;
                    }
                }
                SecondPhase::FrameDelays(i) => {
                    if *i >= self.front.frames as usize {
                        self.phase = SecondPhase::CustomAlphaBit;
                        continue;
                    }
                    let v = match rc.read_uniform(src, 0, 60000) {
                        Some(v) => v,
                        None => return Ok(None),
                    };
                    self.frame_delays.push(v);
                    *i += 1;
                }
                SecondPhase::CustomAlphaBit => {
                    let v = match rc.read_uniform(src, 0, 1) {
                        Some(v) => v,
                        None => return Ok(None),
                    };
                    if v != 0 {
                        self.phase = SecondPhase::CustomCut;
                    } else {
                        return Ok(Some(SecondHeader {
                            bpc: std::mem::take(&mut self.bpc),
                            alphazero: self.alphazero,
                            loops: self.loops,
                            frame_delays: std::mem::take(&mut self.frame_delays),
                            custom_cut: None,
                            custom_alpha: None,
                        }));
                    }
                }
                SecondPhase::CustomCut => {
                    let v = match rc.read_uniform(src, 1, 127) {
                        Some(v) => v,
                        None => return Ok(None),
                    };
                    self.custom_cut = Some(v as u16);
                    self.phase = SecondPhase::CustomAlphaDiv;
                }
                SecondPhase::CustomAlphaDiv => {
                    let v = match rc.read_uniform(src, 2, 126) {
                        Some(v) => v,
                        None => return Ok(None),
                    };
                    self.custom_alpha = Some(0xFFFF_FFFFu32 / v);
                    self.phase = SecondPhase::CustomBc;
                }
                SecondPhase::CustomBc => {
                    let v = match rc.read_uniform(src, 0, 1) {
                        Some(v) => v,
                        None => return Ok(None),
                    };
                    if v != 0 {
                        return Err(Error::Unsupported("custom bit chances".into()));
                    }
                    return Ok(Some(SecondHeader {
                        bpc: std::mem::take(&mut self.bpc),
                        alphazero: self.alphazero,
                        loops: self.loops,
                        frame_delays: std::mem::take(&mut self.frame_delays),
                        custom_cut: self.custom_cut,
                        custom_alpha: self.custom_alpha,
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_matter_rejects_bad_magic() {
        let mut reader = FrontMatterReader::new();
        let mut src = ByteSource::new();
        src.extend(b"FLIX");
        assert!(reader.advance(&mut src).is_err());
    }

    #[test]
    fn front_matter_parses_minimal_still_image() {
        let mut reader = FrontMatterReader::new();
        let mut src = ByteSource::new();
        // "FLIF" + 0x11 (still, 1 channel) + '1' (8 bpc) + width-1=0 + height-1=0 + zero sentinel.
        src.extend(b"FLIF");
        src.extend(&[0x11, b'1', 0x00, 0x00, 0x00]);
        let front = reader.advance(&mut src).unwrap().unwrap();
        assert_eq!(front.channels, 1);
        assert_eq!(front.width, 1);
        assert_eq!(front.height, 1);
        assert!(!front.animated);
    }
}
