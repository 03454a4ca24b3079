// ============================================================================
// TONE / COLOUR ADJUSTMENTS — posterize, HLS shifts, gamma curve, grayscale,
// brightness / contrast
// ============================================================================
//
// `adjust` re-derives the whole preview from master on every call; it is not
// incremental. Steps run in a fixed order and each is skipped when its
// parameters are at their identity value. Every per-channel step is a table
// lookup (256 entries, 180 for hue) applied row-parallel via rayon.
// ============================================================================

use crate::canvas::SharedCanvas;
use crate::ops::color::{gray, hls_to_rgb, rgb_to_hls};
use crate::ops::{EngineError, EngineStatus};
use crate::raster::Raster;
use crate::worker::{ToolEngine, ToolKind};

/// Number of 8-bit hue steps (degrees / 2).
pub const HUE_STEPS: usize = 180;

/// Colour vs. grayscale output. Encoded as +1 / -1 in the parameter vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorMode {
    #[default]
    Color,
    Grayscale,
}

impl ColorMode {
    pub fn from_sign(v: f32) -> Self {
        if v < 0.0 { ColorMode::Grayscale } else { ColorMode::Color }
    }

    pub fn sign(&self) -> f32 {
        match self {
            ColorMode::Color => 1.0,
            ColorMode::Grayscale => -1.0,
        }
    }
}

/// The full adjustment parameter set, published wholesale on every change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdjustParams {
    /// Additive offset, applied after contrast.
    pub brightness: f32,
    /// Multiplicative factor, roughly 0.1..=2.4.
    pub contrast: f32,
    /// Posterization depth; 255 disables it.
    pub depth: f32,
    /// Hue rotation in 8-bit hue steps (one step = 2 degrees).
    pub hue: f32,
    /// Additive offset on the S channel.
    pub saturation: f32,
    /// Additive offset on the L channel.
    pub intensity: f32,
    pub gamma: f32,
    pub highlight: f32,
    pub shadow: f32,
    pub color_mode: ColorMode,
}

impl Default for AdjustParams {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            depth: 255.0,
            hue: 0.0,
            saturation: 0.0,
            intensity: 0.0,
            gamma: 1.0,
            highlight: 0.0,
            shadow: 0.0,
            color_mode: ColorMode::Color,
        }
    }
}

impl AdjustParams {
    /// Build from the 10-element vector
    /// `[brightness, contrast, depth, hue, saturation, intensity, gamma,
    /// highlight, shadow, colorMode]`.
    pub fn from_vector(v: [f32; 10]) -> Self {
        Self {
            brightness: v[0],
            contrast: v[1],
            depth: v[2],
            hue: v[3],
            saturation: v[4],
            intensity: v[5],
            gamma: v[6],
            highlight: v[7],
            shadow: v[8],
            color_mode: ColorMode::from_sign(v[9]),
        }
    }

    pub fn to_vector(&self) -> [f32; 10] {
        [
            self.brightness,
            self.contrast,
            self.depth,
            self.hue,
            self.saturation,
            self.intensity,
            self.gamma,
            self.highlight,
            self.shadow,
            self.color_mode.sign(),
        ]
    }

    fn posterizes(&self) -> bool {
        self.depth < 255.0
    }

    fn touches_hls(&self) -> bool {
        self.hue_steps() != 0
            || self.intensity != 0.0
            || self.saturation != 0.0
            || self.gamma != 1.0
            || self.highlight != 0.0
            || self.shadow != 0.0
    }

    fn touches_linear(&self) -> bool {
        self.brightness != 0.0 || self.contrast != 1.0
    }

    fn hue_steps(&self) -> i32 {
        self.hue.round() as i32
    }
}

// ============================================================================
// LOOKUP TABLES
// ============================================================================

fn identity_lut() -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = i as u8;
    }
    lut
}

/// Round-trip posterization table: `lut[i] = round(round(i*s) / s)` with
/// `s = depth / 255`. Idempotent for every depth.
pub fn posterize_lut(depth: f32) -> [u8; 256] {
    let depth = depth.clamp(1.0, 255.0) as f64;
    if depth >= 255.0 {
        return identity_lut();
    }
    let s = depth / 255.0;
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        let level = (i as f64 * s).round();
        *v = (level / s).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Hue rotation by `delta` steps, wrapping in both directions.
pub fn hue_shift_lut(delta: i32) -> [u8; HUE_STEPS] {
    let mut lut = [0u8; HUE_STEPS];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = (i as i32 + delta).rem_euclid(HUE_STEPS as i32) as u8;
    }
    lut
}

/// Clamped additive offset.
pub fn offset_lut(offset: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = (i as f32 + offset).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Gamma curve with quartic shadow / highlight shaping.
///
/// Base value is `255 * (i/255)^(1/gamma)`. Below 149 a shadow bump of
/// `|shadow| - (i/50)^4` is added (with the sign of `shadow`) while it is
/// positive; above 106 a highlight bump of `|highlight| - (i/50 - 5.1)^4`
/// likewise. A bump never crosses zero.
pub fn gamma_curve_lut(gamma: f32, highlight: f32, shadow: f32) -> [u8; 256] {
    let gamma = gamma.max(0.01) as f64;
    let highlight = highlight as f64;
    let shadow = shadow as f64;
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        let x = i as f64;
        let mut value = 255.0 * (x / 255.0).powf(1.0 / gamma);
        if i < 149 && shadow != 0.0 {
            let bump = shadow.abs() - (x / 50.0).powi(4);
            if bump > 0.0 {
                value += shadow.signum() * bump;
            }
        }
        if i > 106 && highlight != 0.0 {
            let bump = highlight.abs() - (x / 50.0 - 5.1).powi(4);
            if bump > 0.0 {
                value += highlight.signum() * bump;
            }
        }
        *v = value.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Brightness offset compensated for the contrast factor so midtones keep
/// their exposure as contrast moves.
pub fn corrected_brightness(contrast: f32, brightness: f32) -> f32 {
    let alpha = contrast.max(0.01);
    if alpha >= 1.0 {
        brightness - 72.8 * alpha.log2()
    } else {
        brightness + 127.0 * (-alpha.log2()) / (1.0 / alpha).sqrt()
    }
}

/// `clamp(alpha * i + beta)`.
pub fn linear_lut(alpha: f32, beta: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = (alpha * i as f32 + beta).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

pub fn brightness_contrast_lut(brightness: f32, contrast: f32) -> [u8; 256] {
    linear_lut(contrast, corrected_brightness(contrast, brightness))
}

// ============================================================================
// PASSES
// ============================================================================

/// Apply one table to every channel of every pixel.
pub fn apply_lut(raster: &mut Raster, lut: &[u8; 256]) {
    raster.par_rows_mut(|_, row| {
        for v in row.iter_mut() {
            *v = lut[*v as usize];
        }
    });
}

/// Round-trip through HLS applying per-channel tables. Pixels whose H, L and
/// S come out unchanged keep their original RGB bytes, so identity tables
/// never introduce conversion error. Single-channel rasters only get the
/// lightness table.
fn hls_pass(raster: &mut Raster, hue: &[u8; HUE_STEPS], light: &[u8; 256], sat: &[u8; 256]) {
    if raster.channels() != 3 {
        apply_lut(raster, light);
        return;
    }
    raster.par_rows_mut(|_, row| {
        for px in row.chunks_exact_mut(3) {
            let (h, l, s) = rgb_to_hls(px[0], px[1], px[2]);
            let nh = hue[h as usize % HUE_STEPS];
            let nl = light[l as usize];
            let ns = sat[s as usize];
            if (nh, nl, ns) == (h, l, s) {
                continue;
            }
            let (r, g, b) = hls_to_rgb(nh, nl, ns);
            px[0] = r;
            px[1] = g;
            px[2] = b;
        }
    });
}

/// Desaturate while keeping the channel count.
pub fn desaturate(raster: &mut Raster) {
    if raster.channels() != 3 {
        return;
    }
    raster.par_rows_mut(|_, row| {
        for px in row.chunks_exact_mut(3) {
            let v = gray(px[0], px[1], px[2]);
            px[0] = v;
            px[1] = v;
            px[2] = v;
        }
    });
}

// ============================================================================
// ENGINE
// ============================================================================

/// Derive a preview from `master`.
pub fn adjust(master: &Raster, params: &AdjustParams) -> Raster {
    let mut out = master.clone();

    if params.posterizes() {
        apply_lut(&mut out, &posterize_lut(params.depth));
    }

    if params.touches_hls() {
        let hue = hue_shift_lut(params.hue_steps());
        let intensity = offset_lut(params.intensity);
        let curve = gamma_curve_lut(params.gamma, params.highlight, params.shadow);
        let mut light = [0u8; 256];
        for (i, v) in light.iter_mut().enumerate() {
            *v = curve[intensity[i] as usize];
        }
        let sat = offset_lut(params.saturation);
        hls_pass(&mut out, &hue, &light, &sat);
    }

    if params.color_mode == ColorMode::Grayscale {
        desaturate(&mut out);
    }

    if params.touches_linear() {
        apply_lut(&mut out, &brightness_contrast_lut(params.brightness, params.contrast));
    }

    out
}

/// Lock the canvas, derive preview from master.
pub fn adjust_canvas(canvas: &SharedCanvas, params: &AdjustParams) -> Result<EngineStatus, EngineError> {
    canvas.render_preview(true, |master| Ok(adjust(master, params)))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AdjustEngine;

impl ToolEngine for AdjustEngine {
    type Params = AdjustParams;
    const KIND: ToolKind = ToolKind::Adjust;

    fn process(&self, master: &Raster, params: &AdjustParams) -> Result<Raster, EngineError> {
        Ok(adjust(master, params))
    }
}
