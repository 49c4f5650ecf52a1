//! Pixel buffer and frame entities.
//!
//! See: §3 Data Model (Pixel plane, Frame), §9 Design Notes
//! "Constant-plane optimization".

/// A plane's backing storage: either a single repeated value (the common
/// case for fully-flat channels, e.g. a solid alpha plane) or a dense
/// row-major buffer.
enum PlaneData {
    Constant(i32),
    Buffer(Vec<i32>),
}

/// One channel of one frame. `min == max` planes never allocate a buffer;
/// see §9's constant-plane optimization.
pub struct Plane {
    pub width: usize,
    pub height: usize,
    data: PlaneData,
}

impl Plane {
    pub fn constant(width: usize, height: usize, value: i32) -> Self {
        Plane {
            width,
            height,
            data: PlaneData::Constant(value),
        }
    }

    pub fn buffer(width: usize, height: usize) -> Self {
        Plane {
            width,
            height,
            data: PlaneData::Buffer(vec![0; width * height]),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.data, PlaneData::Constant(_))
    }

    pub fn get(&self, row: usize, col: usize) -> i32 {
        match &self.data {
            PlaneData::Constant(v) => *v,
            PlaneData::Buffer(buf) => buf[row * self.width + col],
        }
    }

    /// Writes `value` at `(row, col)`. A constant plane upgrades to a full
    /// buffer the first time a write would change its value (§9: "writes
    /// must upgrade to a full buffer").
    pub fn set(&mut self, row: usize, col: usize, value: i32) {
        match &mut self.data {
            PlaneData::Constant(v) if *v == value => {}
            PlaneData::Constant(v) => {
                let mut buf = vec![*v; self.width * self.height];
                buf[row * self.width + col] = value;
                self.data = PlaneData::Buffer(buf);
            }
            PlaneData::Buffer(buf) => buf[row * self.width + col] = value,
        }
    }

    /// Copies row `row` from `other` into `self`, used for frame-lookback
    /// row copies (§4.8).
    pub fn copy_row_from(&mut self, other: &Plane, row: usize) {
        for col in 0..self.width {
            self.set(row, col, other.get(row, col));
        }
    }
}

/// One decoded (or about-to-be-decoded) animation frame.
pub struct Frame {
    pub planes: Vec<Plane>,
    /// `Some(i)` when this frame is a verbatim copy of an earlier frame
    /// (frame-dup); row copies replace per-pixel decoding entirely.
    pub seen_before: Option<usize>,
    /// `[col_begin, col_end)` per row, for the frame-shape optimization.
    /// `None` means every row spans the full plane width — the only case
    /// this crate's transform pipeline can currently produce, since
    /// `FrameShape` is a declared-but-unimplemented transform id.
    pub row_extents: Option<Vec<(usize, usize)>>,
}

impl Frame {
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Frame {
            planes: (0..channels).map(|_| Plane::buffer(width, height)).collect(),
            seen_before: None,
            row_extents: None,
        }
    }

    /// Allocates a frame whose planes already reflect the post-transform
    /// range chain: a plane with `min == max` starts (and stays) constant,
    /// since §4.8 never schedules pixel reads for it.
    pub fn new_transformed(chain: &crate::colorrange::RangeChain, channels: usize, width: usize, height: usize) -> Self {
        let planes = (0..channels)
            .map(|p| {
                let (lo, hi) = (chain.min(p), chain.max(p));
                if lo >= hi {
                    Plane::constant(width, height, lo)
                } else {
                    Plane::buffer(width, height)
                }
            })
            .collect();
        Frame {
            planes,
            seen_before: None,
            row_extents: None,
        }
    }

    pub fn extent(&self, row: usize, width: usize) -> (usize, usize) {
        match &self.row_extents {
            Some(rows) => rows[row],
            None => (0, width),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_plane_upgrades_on_differing_write() {
        let mut p = Plane::constant(4, 4, 7);
        assert!(p.is_constant());
        p.set(1, 1, 7);
        assert!(p.is_constant());
        p.set(2, 2, 9);
        assert!(!p.is_constant());
        assert_eq!(p.get(2, 2), 9);
        assert_eq!(p.get(0, 0), 7);
    }
}
