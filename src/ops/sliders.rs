// ============================================================================
// SLIDER MAPPINGS — raw UI slider values -> engine parameters
// ============================================================================

use crate::ops::filters::EdgeKind;

/// Contrast slider (10..=190) -> multiplicative factor.
///
/// Values above 100 are compressed with `v * log10(v / 10)` so the top of the
/// slider lands near 2.4 while 100 stays at exactly 1.0.
pub fn contrast_from_slider(v: i32) -> f32 {
    let v = v.clamp(10, 190) as f32;
    let v = if v > 100.0 { v * (v / 10.0).log10() } else { v };
    v / 100.0
}

/// Depth slider (0..=255) -> posterization depth `v^(v/255)`.
/// 255 means no posterization; the result is never below 1.
pub fn depth_from_slider(v: i32) -> f32 {
    let v = v.clamp(0, 255) as f32;
    v.powf(v / 255.0).clamp(1.0, 255.0)
}

/// Gamma slider (-100..=100) -> gamma. Negative half maps onto (0.33, 1],
/// positive half onto [1, 3].
pub fn gamma_from_slider(v: i32) -> f32 {
    let v = v.clamp(-100, 100) as f32;
    if v < 0.0 { v / 150.0 + 1.0 } else { v / 50.0 + 1.0 }
}

/// Odd kernel size from a 0..=100 weight, relative to the smaller image side.
pub fn kernel_size(width: u32, height: u32, weight: u32) -> u32 {
    let weight = weight.clamp(1, 100) as f32;
    let raw = 0.015 * width.min(height) as f32 * weight / 100.0;
    nearest_odd(raw)
}

/// Nearest odd integer >= 1 (ties round up).
pub fn nearest_odd(v: f32) -> u32 {
    if !v.is_finite() || v < 1.0 {
        return 1;
    }
    (v / 2.0).floor() as u32 * 2 + 1
}

/// Edge-detector aperture from its 0..=3 slider: `2v + 1`. Canny needs at
/// least 3.
pub fn edge_aperture(kind: EdgeKind, v: u32) -> u32 {
    let v = v.min(3);
    let v = if kind == EdgeKind::Canny { v.max(1) } else { v };
    2 * v + 1
}
