// ============================================================================
// GEOMETRIC TRANSFORMS — crop, rotate, scale
// ============================================================================
//
// Transforms change the raster shape, so the preview is resized to the
// result and the canvas skips its shape check for this tool.
// ============================================================================

use image::imageops;
use thiserror::Error;

use crate::canvas::SharedCanvas;
use crate::ops::{EngineError, EngineStatus};
use crate::raster::Raster;
use crate::worker::{ToolEngine, ToolKind};

/// Interpolation method for resampling operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn label(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "nearest",
            Interpolation::Bilinear => "bilinear",
            Interpolation::Bicubic => "bicubic",
            Interpolation::Lanczos3 => "lanczos3",
        }
    }

    pub fn all() -> &'static [Interpolation] {
        &[
            Interpolation::Nearest,
            Interpolation::Bilinear,
            Interpolation::Bicubic,
            Interpolation::Lanczos3,
        ]
    }

    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        Self::all().iter().copied().find(|i| i.label() == text)
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

// ---------------------------------------------------------------------------
//  Regions of interest
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoiError {
    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("Invalid: region {0:?} lies outside the {1}x{2} image")]
    OutOfBounds(Roi, u32, u32),

    #[error("Invalid: region is empty")]
    Empty,
}

/// Axis-aligned rectangle in image pixels. `(x0, y0)` is inclusive,
/// `(x1, y1)` exclusive, so the full image is `0, 0, width, height`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Roi {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Roi {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// Swap corners so that `x0 <= x1` and `y0 <= y1`.
    pub fn normalized(self) -> Self {
        Self {
            x0: self.x0.min(self.x1),
            y0: self.y0.min(self.y1),
            x1: self.x0.max(self.x1),
            y1: self.y0.max(self.y1),
        }
    }

    /// Normalise, then intersect with `[0, width) x [0, height)`.
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        let r = self.normalized();
        let (w, h) = (width as i32, height as i32);
        Self {
            x0: r.x0.clamp(0, w),
            y0: r.y0.clamp(0, h),
            x1: r.x1.clamp(0, w),
            y1: r.y1.clamp(0, h),
        }
    }

    pub fn width(&self) -> u32 {
        (self.x1 - self.x0).unsigned_abs()
    }

    pub fn height(&self) -> u32 {
        (self.y1 - self.y0).unsigned_abs()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Parse `x0,y0,x1,y1` (whitespace tolerated).
    pub fn parse(text: &str) -> Result<Self, RoiError> {
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(RoiError::Invalid(format!("expected x0,y0,x1,y1, got '{}'", text)));
        }
        let mut v = [0i32; 4];
        for (slot, part) in v.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| RoiError::Invalid(format!("'{}' is not an integer", part)))?;
        }
        Ok(Self::new(v[0], v[1], v[2], v[3]))
    }

    /// Boundary check for user-entered regions: the normalised rectangle must
    /// be non-empty and lie inside the image.
    pub fn validate(self, width: u32, height: u32) -> Result<Self, RoiError> {
        let r = self.normalized();
        if r.is_empty() {
            return Err(RoiError::Empty);
        }
        if r.x0 < 0 || r.y0 < 0 || r.x1 > width as i32 || r.y1 > height as i32 {
            return Err(RoiError::OutOfBounds(r, width, height));
        }
        Ok(r)
    }
}

/// Interactive crop drag. Lives on the UI side and never touches the shared
/// canvas until `finish` hands back a request.
#[derive(Clone, Debug)]
pub struct CropSelection {
    width: u32,
    height: u32,
    anchor: Option<(i32, i32)>,
    current: Option<(i32, i32)>,
}

impl CropSelection {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, anchor: None, current: None }
    }

    pub fn begin(&mut self, x: i32, y: i32) {
        self.anchor = Some((x, y));
        self.current = Some((x, y));
    }

    pub fn drag(&mut self, x: i32, y: i32) {
        if self.anchor.is_some() {
            self.current = Some((x, y));
        }
    }

    pub fn is_active(&self) -> bool {
        self.anchor.is_some()
    }

    /// Clamped rectangle for display, if a drag is in progress.
    pub fn rect(&self) -> Option<Roi> {
        let (a, c) = (self.anchor?, self.current?);
        Some(Roi::new(a.0, a.1, c.0, c.1).clamp_to(self.width, self.height))
    }

    pub fn cancel(&mut self) {
        self.anchor = None;
        self.current = None;
    }

    /// End the drag. Returns a crop request unless the selection is empty.
    pub fn finish(&mut self) -> Option<TransformRequest> {
        let rect = self.rect();
        self.cancel();
        rect.filter(|r| !r.is_empty()).map(TransformRequest::Crop)
    }
}

// ---------------------------------------------------------------------------
//  Requests
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum TransformRequest {
    #[default]
    None,
    Crop(Roi),
    Rotate { degrees: f64, auto_crop: bool },
    Scale { width: u32, height: u32 },
}

// ---------------------------------------------------------------------------
//  Crop
// ---------------------------------------------------------------------------

/// Copy out `roi` clamped to the raster bounds.
pub fn crop(src: &Raster, roi: Roi) -> Result<Raster, EngineError> {
    let r = roi.clamp_to(src.width(), src.height());
    if r.is_empty() {
        return Err(EngineError::InvalidRegion(format!(
            "{:?} does not intersect the {}x{} image",
            roi,
            src.width(),
            src.height()
        )));
    }
    src.view(r.x0 as u32, r.y0 as u32, r.width(), r.height())
        .map(|v| v.to_raster())
        .ok_or_else(|| EngineError::InvalidRegion(format!("{:?}", r)))
}

// ---------------------------------------------------------------------------
//  Rotate
// ---------------------------------------------------------------------------

/// Inverse affine map `dst pixel -> src pixel`, row-major 2x3.
pub type Affine = [f64; 6];

const RIGHT_ANGLE_EPS: f64 = 1e-9;

/// Bounding box of a `width x height` raster rotated by `degrees`.
pub fn rotated_bounds(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let (s, c) = degrees.to_radians().sin_cos();
    let (s, c) = (s.abs(), c.abs());
    let (w, h) = (width as f64, height as f64);
    let bw = (w * c + h * s - 1e-6).ceil().max(1.0);
    let bh = (w * s + h * c - 1e-6).ceil().max(1.0);
    (bw as u32, bh as u32)
}

/// Rotation about the image centre, translated so the result is centred in
/// its bounding box. Positive degrees turn the image counter-clockwise.
/// Returns the box size and the inverse map used for sampling.
pub fn rotation_matrix(width: u32, height: u32, degrees: f64) -> (u32, u32, Affine) {
    let (bw, bh) = rotated_bounds(width, height, degrees);
    let (s, c) = degrees.to_radians().sin_cos();
    let (scx, scy) = (width as f64 * 0.5, height as f64 * 0.5);
    let (dcx, dcy) = (bw as f64 * 0.5, bh as f64 * 0.5);
    // Sample at pixel centres: u = dst + 0.5 - dst_centre,
    // src = R^-1 u + src_centre - 0.5.
    let tx = c * (0.5 - dcx) - s * (0.5 - dcy) + scx - 0.5;
    let ty = s * (0.5 - dcx) + c * (0.5 - dcy) + scy - 0.5;
    (bw, bh, [c, -s, tx, s, c, ty])
}

/// Resample `src` into an `out_w x out_h` raster through the inverse map
/// `inv`. Samples outside the source are black.
pub fn warp_affine(src: &Raster, out_w: u32, out_h: u32, inv: &Affine, interpolation: Interpolation) -> Raster {
    let mut dst = Raster::new(out_w, out_h, src.channels());
    if src.is_empty() || dst.is_empty() {
        return dst;
    }
    let c = src.channels() as usize;
    let src_w = src.width() as i64;
    let src_h = src.height() as i64;
    let src_stride = src.stride();
    let src_raw = src.as_raw();
    let [a, b, tx, d, e, ty] = *inv;

    let sample = |sx: i64, sy: i64, ch: usize| -> f64 {
        if sx < 0 || sy < 0 || sx >= src_w || sy >= src_h {
            0.0
        } else {
            src_raw[sy as usize * src_stride + sx as usize * c + ch] as f64
        }
    };

    dst.par_rows_mut(|dy, row| {
        let y = dy as f64;
        for dx in 0..out_w as usize {
            let x = dx as f64;
            let src_x = a * x + b * y + tx;
            let src_y = d * x + e * y + ty;

            if interpolation == Interpolation::Nearest {
                let (sx, sy) = (src_x.round() as i64, src_y.round() as i64);
                for ch in 0..c {
                    row[dx * c + ch] = sample(sx, sy, ch) as u8;
                }
                continue;
            }

            let x0 = src_x.floor() as i64;
            let y0 = src_y.floor() as i64;
            if x0 < -1 || y0 < -1 || x0 >= src_w || y0 >= src_h {
                continue;
            }
            let fx = src_x - x0 as f64;
            let fy = src_y - y0 as f64;
            for ch in 0..c {
                let top = sample(x0, y0, ch) * (1.0 - fx) + sample(x0 + 1, y0, ch) * fx;
                let bot = sample(x0, y0 + 1, ch) * (1.0 - fx) + sample(x0 + 1, y0 + 1, ch) * fx;
                let v = top * (1.0 - fy) + bot * fy;
                row[dx * c + ch] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    dst
}

/// Exact quarter-turn rotation. `quarters` counts counter-clockwise turns.
fn rotate_quarters(src: &Raster, quarters: u32) -> Raster {
    let (w, h) = src.dimensions();
    let c = src.channels() as usize;
    let quarters = quarters % 4;
    if quarters == 0 {
        return src.clone();
    }
    let (ow, oh) = if quarters == 2 { (w, h) } else { (h, w) };
    let mut dst = Raster::new(ow, oh, src.channels());
    dst.par_rows_mut(|y, row| {
        let y = y as u32;
        for x in 0..ow {
            let (sx, sy) = match quarters {
                1 => (w - 1 - y, x),
                2 => (w - 1 - x, h - 1 - y),
                _ => (y, h - 1 - x),
            };
            let o = x as usize * c;
            row[o..o + c].copy_from_slice(src.pixel(sx, sy));
        }
    });
    dst
}

/// Largest axis-aligned rectangle inside a `width x height` rectangle rotated
/// by `degrees`, centred in the rotated bounding box of size `bounds`.
pub fn auto_crop_rect(width: u32, height: u32, degrees: f64, bounds: (u32, u32)) -> Roi {
    let (w, h) = (width as f64, height as f64);
    let (s, c) = degrees.to_radians().sin_cos();
    let (s, c) = (s.abs(), c.abs());

    let (cw, ch) = if w <= 0.0 || h <= 0.0 {
        (0.0, 0.0)
    } else {
        let width_longer = w >= h;
        let (long, short) = if width_longer { (w, h) } else { (h, w) };
        if short <= 2.0 * s * c * long || (s - c).abs() < 1e-10 {
            // Half-constrained: two crop corners touch the longer side.
            let x = 0.5 * short;
            if width_longer { (x / s, x / c) } else { (x / c, x / s) }
        } else {
            // Fully constrained: the crop touches all four sides.
            let cos_2a = c * c - s * s;
            ((w * c - h * s) / cos_2a, (h * c - w * s) / cos_2a)
        }
    };

    let (bw, bh) = (bounds.0 as f64, bounds.1 as f64);
    let x0 = ((bw - cw) * 0.5).ceil().max(0.0);
    let y0 = ((bh - ch) * 0.5).ceil().max(0.0);
    let x1 = ((bw + cw) * 0.5).floor().min(bw);
    let y1 = ((bh + ch) * 0.5).floor().min(bh);
    Roi::new(x0 as i32, y0 as i32, (x1 as i32).max(x0 as i32), (y1 as i32).max(y0 as i32))
}

/// Rotate by `degrees` (counter-clockwise positive). Quarter turns are exact
/// pixel permutations; other angles grow the canvas to the bounding box and
/// fill exposed corners with black unless `auto_crop` trims them away.
pub fn rotate(src: &Raster, degrees: f64, auto_crop: bool, interpolation: Interpolation) -> Result<Raster, EngineError> {
    if !degrees.is_finite() {
        return Err(EngineError::InvalidRegion(format!("rotation angle {}", degrees)));
    }
    let norm = degrees.rem_euclid(360.0);
    let quarters = (norm / 90.0).round();
    if (norm - quarters * 90.0).abs() < RIGHT_ANGLE_EPS {
        return Ok(rotate_quarters(src, quarters as u32));
    }
    if src.is_empty() {
        return Ok(src.clone());
    }

    let (bw, bh, inv) = rotation_matrix(src.width(), src.height(), norm);
    let rotated = warp_affine(src, bw, bh, &inv, interpolation);
    if !auto_crop {
        return Ok(rotated);
    }
    let rect = auto_crop_rect(src.width(), src.height(), norm, (bw, bh));
    if rect.is_empty() {
        log::warn!("auto-crop left no area at {} degrees, keeping full rotation", degrees);
        return Ok(rotated);
    }
    crop(&rotated, rect)
}

// ---------------------------------------------------------------------------
//  Scale
// ---------------------------------------------------------------------------

/// Resample to exactly `width x height`.
pub fn scale(src: &Raster, width: u32, height: u32, interpolation: Interpolation) -> Result<Raster, EngineError> {
    if width == 0 || height == 0 {
        return Err(EngineError::InvalidRegion(format!("scale target {}x{}", width, height)));
    }
    if src.dimensions() == (width, height) {
        return Ok(src.clone());
    }
    if src.is_empty() {
        return Ok(Raster::new(width, height, src.channels()));
    }
    let filter = interpolation.to_filter();
    Ok(if src.channels() == 1 {
        Raster::from_gray_image(&imageops::resize(&src.to_gray_image(), width, height, filter))
    } else {
        Raster::from_rgb_image(&imageops::resize(&src.to_rgb_image(), width, height, filter))
    })
}

// ---------------------------------------------------------------------------
//  Engine
// ---------------------------------------------------------------------------

pub fn transform(src: &Raster, request: &TransformRequest, interpolation: Interpolation) -> Result<Raster, EngineError> {
    match *request {
        TransformRequest::None => Ok(src.clone()),
        TransformRequest::Crop(roi) => crop(src, roi),
        TransformRequest::Rotate { degrees, auto_crop } => rotate(src, degrees, auto_crop, interpolation),
        TransformRequest::Scale { width, height } => scale(src, width, height, interpolation),
    }
}

/// Lock the canvas, write the transformed master into the preview.
pub fn transform_canvas(
    canvas: &SharedCanvas,
    request: &TransformRequest,
    interpolation: Interpolation,
) -> Result<EngineStatus, EngineError> {
    canvas.render_preview(false, |master| transform(master, request, interpolation))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TransformEngine {
    pub interpolation: Interpolation,
}

impl ToolEngine for TransformEngine {
    type Params = TransformRequest;
    const KIND: ToolKind = ToolKind::Transform;

    fn process(&self, master: &Raster, request: &TransformRequest) -> Result<Raster, EngineError> {
        transform(master, request, self.interpolation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> Raster {
        let mut r = Raster::new(w, h, 3);
        r.par_rows_mut(|y, row| {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                px.copy_from_slice(&[(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8]);
            }
        });
        r
    }

    #[test]
    fn full_roi_crop_is_identical() {
        let src = gradient(13, 9);
        assert_eq!(crop(&src, Roi::full(13, 9)).unwrap(), src);
    }

    #[test]
    fn inverted_roi_is_normalised_and_clamped() {
        let src = gradient(10, 10);
        let a = crop(&src, Roi::new(8, 7, 2, 3)).unwrap();
        let b = crop(&src, Roi::new(2, 3, 8, 7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimensions(), (6, 4));
        assert_eq!(a.pixel(0, 0), src.pixel(2, 3));

        let clamped = crop(&src, Roi::new(-5, -5, 4, 20)).unwrap();
        assert_eq!(clamped.dimensions(), (4, 10));
        assert!(crop(&src, Roi::new(20, 20, 30, 30)).is_err());
    }

    #[test]
    fn roi_parse_and_validate() {
        assert_eq!(Roi::parse(" 1, 2,30 ,40").unwrap(), Roi::new(1, 2, 30, 40));
        assert!(matches!(Roi::parse("1,2,3"), Err(RoiError::Invalid(_))));
        assert!(matches!(Roi::parse("a,b,c,d"), Err(RoiError::Invalid(_))));
        assert_eq!(Roi::new(9, 9, 1, 1).validate(10, 10).unwrap(), Roi::new(1, 1, 9, 9));
        assert_eq!(Roi::new(1, 1, 1, 5).validate(10, 10), Err(RoiError::Empty));
        assert!(matches!(Roi::new(0, 0, 11, 5).validate(10, 10), Err(RoiError::OutOfBounds(..))));
    }

    #[test]
    fn zero_and_full_turn_are_identity() {
        let src = gradient(17, 11);
        for deg in [0.0, 360.0, -360.0, 720.0] {
            let out = rotate(&src, deg, false, Interpolation::Bilinear).unwrap();
            assert_eq!(out, src, "{} degrees", deg);
        }
    }

    #[test]
    fn quarter_turns_are_exact() {
        let src = gradient(5, 3);
        let r90 = rotate(&src, 90.0, false, Interpolation::Bilinear).unwrap();
        assert_eq!(r90.dimensions(), (3, 5));
        // Counter-clockwise: the top-right source pixel lands top-left.
        assert_eq!(r90.pixel(0, 0), src.pixel(4, 0));
        assert_eq!(r90.pixel(2, 4), src.pixel(0, 2));

        let r180 = rotate(&src, 180.0, false, Interpolation::Bilinear).unwrap();
        assert_eq!(r180.dimensions(), (5, 3));
        assert_eq!(r180.pixel(0, 0), src.pixel(4, 2));

        let r270 = rotate(&src, -90.0, true, Interpolation::Bilinear).unwrap();
        assert_eq!(r270.dimensions(), (3, 5));
        assert_eq!(r270.pixel(0, 0), src.pixel(0, 2));

        let back = rotate(&r90, 270.0, false, Interpolation::Bilinear).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn general_rotation_matches_quarter_turn_mapping() {
        // The sampling map at exactly 90 degrees reproduces the permutation.
        let src = gradient(6, 4);
        let (bw, bh, inv) = rotation_matrix(6, 4, 90.0);
        assert_eq!((bw, bh), (4, 6));
        let warped = warp_affine(&src, bw, bh, &inv, Interpolation::Nearest);
        assert_eq!(warped, rotate_quarters(&src, 1));
    }

    #[test]
    fn arbitrary_rotation_grows_canvas_with_black_corners() {
        let src = Raster::filled(40, 20, [200, 200, 200]);
        let out = rotate(&src, 30.0, false, Interpolation::Bilinear).unwrap();
        assert_eq!(out.dimensions(), rotated_bounds(40, 20, 30.0));
        assert!(out.width() > 40 && out.height() > 20);
        assert_eq!(out.pixel(0, 0), &[0, 0, 0]);
        let (cx, cy) = (out.width() / 2, out.height() / 2);
        assert_eq!(out.pixel(cx, cy), &[200, 200, 200]);
    }

    #[test]
    fn auto_crop_removes_black_corners() {
        let src = Raster::filled(60, 40, [180, 90, 30]);
        let out = rotate(&src, 15.0, true, Interpolation::Bilinear).unwrap();
        assert!(out.width() < 60 && out.height() < 40);
        assert!(out.width() > 30 && out.height() > 20);
        // Interior pixels are untouched colour; allow blending on the outer ring.
        for y in 1..out.height() - 1 {
            for x in 1..out.width() - 1 {
                assert_eq!(out.pixel(x, y), &[180, 90, 30], "({}, {})", x, y);
            }
        }
    }

    #[test]
    fn auto_crop_keeps_no_black_across_angles_and_aspects() {
        let colour = [180, 90, 30];
        for &(w, h) in &[(60u32, 40u32), (40, 60), (100, 100), (200, 30)] {
            let src = Raster::filled(w, h, colour);
            for &deg in &[1.0, 5.0, 15.0, 30.0, 45.0, 60.0, 89.0, -20.0, 135.0, 200.0] {
                let out = rotate(&src, deg, true, Interpolation::Bilinear).unwrap();
                assert!(!out.is_empty(), "{}x{} at {}", w, h, deg);
                for y in 1..out.height().saturating_sub(1) {
                    for x in 1..out.width().saturating_sub(1) {
                        assert_eq!(out.pixel(x, y), &colour, "{}x{} at {} ({}, {})", w, h, deg, x, y);
                    }
                }
            }
        }
    }

    #[test]
    fn auto_crop_rect_square_at_45() {
        let rect = auto_crop_rect(100, 100, 45.0, rotated_bounds(100, 100, 45.0));
        // Inscribed square of a 100px square turned 45 degrees has side ~70.7.
        assert!((69..=71).contains(&rect.width()), "{:?}", rect);
        assert_eq!(rect.width(), rect.height());
    }

    #[test]
    fn scale_hits_exact_target() {
        let src = gradient(20, 10);
        let out = scale(&src, 7, 33, Interpolation::Bilinear).unwrap();
        assert_eq!(out.dimensions(), (7, 33));
        assert_eq!(scale(&src, 20, 10, Interpolation::Bicubic).unwrap(), src);
        assert!(scale(&src, 0, 10, Interpolation::Bilinear).is_err());
    }

    #[test]
    fn crop_selection_only_emits_on_finish() {
        let mut sel = CropSelection::new(50, 40);
        assert!(sel.rect().is_none());
        sel.begin(45, 35);
        sel.drag(-10, 60);
        assert_eq!(sel.rect(), Some(Roi::new(0, 35, 45, 40)));
        assert_eq!(sel.finish(), Some(TransformRequest::Crop(Roi::new(0, 35, 45, 40))));
        assert!(!sel.is_active());

        sel.begin(5, 5);
        assert_eq!(sel.finish(), None);
    }

    #[test]
    fn interpolation_labels_parse() {
        for interp in Interpolation::all() {
            assert_eq!(Interpolation::parse(interp.label()), Some(*interp));
        }
        assert_eq!(Interpolation::parse("cubic"), None);
    }
}
