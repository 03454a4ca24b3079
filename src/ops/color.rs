// ============================================================================
// COLOUR SPACE HELPERS — 8-bit HLS and luma
// ============================================================================
//
// HLS follows the common 8-bit convention: H in [0, 180) (degrees / 2),
// L and S in [0, 255].
// ============================================================================

/// Fixed-point BT.601 luma weights, scaled by 2^14 (they sum to 16384 so a
/// neutral pixel maps to itself exactly).
const GRAY_R: u32 = 4899;
const GRAY_G: u32 = 9617;
const GRAY_B: u32 = 1868;

/// Sector -> (b, g, r) indices into the HLS interpolation table.
const SECTOR_DATA: [[usize; 3]; 6] = [[1, 3, 0], [1, 0, 2], [3, 0, 1], [0, 2, 1], [0, 1, 3], [2, 1, 0]];

/// BT.601 luma of an RGB pixel.
#[inline]
pub fn gray(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * GRAY_R + g as u32 * GRAY_G + b as u32 * GRAY_B + (1 << 13)) >> 14) as u8
}

/// RGB -> (H, L, S).
pub fn rgb_to_hls(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let vmax = r.max(g).max(b);
    let vmin = r.min(g).min(b);
    let diff = vmax - vmin;
    let l = (vmax + vmin) * 0.5;

    let (mut h, s) = if diff <= f32::EPSILON {
        (0.0, 0.0)
    } else {
        let s = if l < 0.5 {
            diff / (vmax + vmin)
        } else {
            diff / (2.0 - vmax - vmin)
        };
        let h = if vmax == r {
            (g - b) * 60.0 / diff
        } else if vmax == g {
            (b - r) * 60.0 / diff + 120.0
        } else {
            (r - g) * 60.0 / diff + 240.0
        };
        (h, s)
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h8 = ((h * 0.5).round() as u32 % 180) as u8;
    let l8 = (l * 255.0).round().clamp(0.0, 255.0) as u8;
    let s8 = (s * 255.0).round().clamp(0.0, 255.0) as u8;
    (h8, l8, s8)
}

/// (H, L, S) -> RGB.
pub fn hls_to_rgb(h: u8, l: u8, s: u8) -> (u8, u8, u8) {
    let l = l as f32 / 255.0;
    let s = s as f32 / 255.0;

    if s <= 0.0 {
        let v = (l * 255.0).round() as u8;
        return (v, v, v);
    }

    let p2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p1 = 2.0 * l - p2;

    // 180 hue steps cover 6 sectors of 30 steps each.
    let hh = h as f32 / 30.0;
    let sector_f = hh.floor();
    let frac = hh - sector_f;
    let sector = (sector_f as i32).rem_euclid(6) as usize;

    let tab = [p2, p1, p1 + (p2 - p1) * (1.0 - frac), p1 + (p2 - p1) * frac];
    let idx = SECTOR_DATA[sector];
    let to8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
    (to8(tab[idx[2]]), to8(tab[idx[1]]), to8(tab[idx[0]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (u8, u8, u8), b: (u8, u8, u8), tol: i32) -> bool {
        (a.0 as i32 - b.0 as i32).abs() <= tol
            && (a.1 as i32 - b.1 as i32).abs() <= tol
            && (a.2 as i32 - b.2 as i32).abs() <= tol
    }

    #[test]
    fn gray_is_exact_on_neutral_pixels() {
        for v in 0..=255u8 {
            assert_eq!(gray(v, v, v), v);
        }
    }

    #[test]
    fn primaries_have_expected_hue() {
        assert_eq!(rgb_to_hls(255, 0, 0).0, 0);
        assert_eq!(rgb_to_hls(0, 255, 0).0, 60);
        assert_eq!(rgb_to_hls(0, 0, 255).0, 120);
        assert_eq!(rgb_to_hls(255, 255, 0).0, 30);
    }

    #[test]
    fn neutral_has_zero_saturation() {
        let (h, l, s) = rgb_to_hls(90, 90, 90);
        assert_eq!((h, s), (0, 0));
        assert_eq!(l, 90);
        assert_eq!(hls_to_rgb(h, l, s), (90, 90, 90));
    }

    #[test]
    fn hls_round_trip_is_close() {
        let samples = [
            (255, 0, 0),
            (0, 255, 0),
            (0, 0, 255),
            (200, 120, 40),
            (12, 60, 230),
            (128, 128, 0),
            (250, 250, 250),
            (3, 2, 1),
        ];
        for (r, g, b) in samples {
            let (h, l, s) = rgb_to_hls(r, g, b);
            let back = hls_to_rgb(h, l, s);
            assert!(close(back, (r, g, b), 4), "{:?} -> {:?}", (r, g, b), back);
        }
    }
}
