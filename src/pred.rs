//! Causal neighbor lookup, the scanline median predictor, and MANIAC
//! property-vector assembly for non-interlaced pixel decoding.
//!
//! See: §4.8 Non-Interlaced Scanline Pixel Decoder.
//!
//! Generalised from FFV1's `derive_borders`/`get_context`/`get_median`
//! (same six-neighbor layout, T/L/t/l/tr/tl), renamed to FLIF16's
//! neighbor/property vocabulary and re-targeted at its own border-fallback
//! rules rather than FFV1's context quantization.

/// The six causal neighbors of a pixel at `(r, c)`, with border fallbacks.
pub struct Neighbors {
    pub left: i32,
    pub top: i32,
    pub topleft: i32,
    pub topright: i32,
    pub toptop: i32,
    pub leftleft: i32,
}

/// Reads the six causal neighbors of `(r, c)` via `get(row, col)`, applying
/// FLIF16's border rules: `left` falls back to `top` at the left edge (there
/// is no causal pixel to the left of column 0 except the row above); `top`
/// falls back to `left` above the first row, so the first row's deltas read
/// zero instead of spuriously large; `topright` falls back to `top` past the
/// last column so its delta property reads zero; `toptop`/`leftleft` fall
/// back to `top`/`left` within the first two rows/columns.
pub fn neighbors(get: impl Fn(isize, isize) -> i32, r: isize, c: isize, width: isize) -> Neighbors {
    let left = if c > 0 {
        get(r, c - 1)
    } else if r > 0 {
        get(r - 1, c)
    } else {
        0
    };
    let top = if r > 0 { get(r - 1, c) } else { left };
    let topleft = if r > 0 && c > 0 {
        get(r - 1, c - 1)
    } else {
        top
    };
    let topright = if r > 0 && c + 1 < width {
        get(r - 1, c + 1)
    } else {
        top
    };
    let toptop = if r > 1 { get(r - 2, c) } else { top };
    let leftleft = if c > 1 { get(r, c - 2) } else { left };

    Neighbors {
        left,
        top,
        topleft,
        topright,
        toptop,
        leftleft,
    }
}

/// Median of three values.
///
/// See: §9 Glossary, "Scanline predictor".
pub fn get_median(a: i32, b: i32, c: i32) -> i32 {
    a + b + c - a.min(b).min(c) - a.max(b).max(c)
}

/// The scanline predictor's guess and which candidate it matched (property
/// item 4): 0 = gradient, 1 = left, 2 = top.
pub fn scanline_guess(n: &Neighbors) -> (i32, u8) {
    let gradient = n.left + n.top - n.topleft;
    let guess = get_median(gradient, n.left, n.top);
    let which = if guess == gradient {
        0
    } else if guess == n.left {
        1
    } else {
        2
    };
    (guess, which)
}

/// Assembles the MANIAC property vector for plane `p`, per §4.8's
/// nine-item (or ten, with alpha) layout.
pub fn property_vector(prev_planes: &[i32], alpha: Option<i32>, guess: i32, which: u8, n: &Neighbors) -> Vec<i32> {
    let mut v = Vec::with_capacity(prev_planes.len() + 6);
    v.extend_from_slice(prev_planes);
    if let Some(a) = alpha {
        v.push(a);
    }
    v.push(guess);
    v.push(which as i32);
    v.push(n.left - n.topleft);
    v.push(n.topleft - n.top);
    v.push(n.top - n.topright);
    v.push(n.toptop - n.top);
    v.push(n.leftleft - n.left);
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_picks_middle_value() {
        assert_eq!(get_median(1, 5, 3), 3);
        assert_eq!(get_median(5, 5, 5), 5);
    }

    #[test]
    fn top_left_corner_neighbors_are_all_zero() {
        let get = |_r: isize, _c: isize| 42;
        let n = neighbors(get, 0, 0, 10);
        assert_eq!(n.left, 0);
        assert_eq!(n.top, 0);
        assert_eq!(n.topleft, 0);
        assert_eq!(n.topright, 0);
    }

    #[test]
    fn interior_pixel_reads_real_neighbors() {
        let plane = [[1, 2, 3], [4, 5, 6], [7, 8, 9]];
        let get = |r: isize, c: isize| plane[r as usize][c as usize];
        let n = neighbors(get, 1, 1, 3);
        assert_eq!(n.left, 4);
        assert_eq!(n.top, 2);
        assert_eq!(n.topleft, 1);
        assert_eq!(n.topright, 3);
    }
}
