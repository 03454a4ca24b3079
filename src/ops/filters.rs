// ============================================================================
// CONVOLUTION FILTERS — smoothing, sharpening, edge detection
// ============================================================================
//
// Kernel size comes from the filter weight relative to the smaller image side
// (see `sliders::kernel_size`). Convolutions run in f32 row-parallel passes
// with reflect-101 borders, then round and saturate back to u8.
// ============================================================================

use rayon::prelude::*;

use crate::canvas::SharedCanvas;
use crate::ops::color::gray;
use crate::ops::sliders::{edge_aperture, kernel_size};
use crate::ops::{EngineError, EngineStatus};
use crate::raster::Raster;
use crate::settings::PipelineSettings;
use crate::worker::{ToolEngine, ToolKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SmoothKind {
    #[default]
    Average,
    Gaussian,
    Median,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SharpenKind {
    Unsharp,
    Laplacian,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Canny,
    Sobel,
    Laplacian,
}

/// Operation category plus the kernel type within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Smooth(SmoothKind),
    Sharpen(SharpenKind),
    Edge(EdgeKind),
}

impl Default for FilterKind {
    fn default() -> Self {
        FilterKind::Smooth(SmoothKind::default())
    }
}

impl FilterKind {
    /// Parse `op:kind`, e.g. `smooth:gaussian` or `edge:canny`.
    pub fn parse(text: &str) -> Option<Self> {
        let (op, kind) = text.split_once(':')?;
        let op = op.trim().to_lowercase();
        let kind = kind.trim().to_lowercase();
        Some(match (op.as_str(), kind.as_str()) {
            ("smooth", "average" | "box") => FilterKind::Smooth(SmoothKind::Average),
            ("smooth", "gaussian") => FilterKind::Smooth(SmoothKind::Gaussian),
            ("smooth", "median") => FilterKind::Smooth(SmoothKind::Median),
            ("sharpen", "unsharp" | "unsharpen") => FilterKind::Sharpen(SharpenKind::Unsharp),
            ("sharpen", "laplacian") => FilterKind::Sharpen(SharpenKind::Laplacian),
            ("edge", "canny") => FilterKind::Edge(EdgeKind::Canny),
            ("edge", "sobel") => FilterKind::Edge(EdgeKind::Sobel),
            ("edge", "laplacian") => FilterKind::Edge(EdgeKind::Laplacian),
            _ => return None,
        })
    }
}

/// `{kernelType, kernelWeight, kernelOperation}`.
///
/// For smoothing and sharpening `weight` is on the 0..=100 scale; for edge
/// detection it is the 0..=3 aperture slider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterParams {
    pub kind: FilterKind,
    pub weight: u32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self { kind: FilterKind::default(), weight: 1 }
    }
}

impl FilterParams {
    /// Decode the integer triple published by the UI. Operation: 0 smooth,
    /// 1 sharpen, 2 edge; kernel type indexes the kinds in declaration order.
    pub fn from_triple(kernel_type: i32, weight: i32, operation: i32) -> Option<Self> {
        let kind = match (operation, kernel_type) {
            (0, 0) => FilterKind::Smooth(SmoothKind::Average),
            (0, 1) => FilterKind::Smooth(SmoothKind::Gaussian),
            (0, 2) => FilterKind::Smooth(SmoothKind::Median),
            (1, 0) => FilterKind::Sharpen(SharpenKind::Unsharp),
            (1, 1) => FilterKind::Sharpen(SharpenKind::Laplacian),
            (2, 0) => FilterKind::Edge(EdgeKind::Canny),
            (2, 1) => FilterKind::Edge(EdgeKind::Sobel),
            (2, 2) => FilterKind::Edge(EdgeKind::Laplacian),
            _ => return None,
        };
        Some(Self { kind, weight: weight.max(0) as u32 })
    }
}

// ============================================================================
// KERNELS
// ============================================================================

/// Square correlation kernel, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    pub size: usize,
    pub weights: Vec<f32>,
}

impl Kernel {
    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.weights[row * self.size + col]
    }

    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }
}

/// 1-D Gaussian of length `n`. A non-positive sigma is derived from the size
/// as `0.3 * ((n - 1) * 0.5 - 1) + 0.8`.
pub fn gaussian_kernel(n: usize, sigma: f32) -> Vec<f32> {
    let n = n.max(1);
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((n as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (n as f32 - 1.0) * 0.5;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..n)
        .map(|i| {
            let x = i as f32 - center;
            (-x * x / s2).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Full 1-D convolution of two short kernels.
fn convolve_1d(a: &[f32], b: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0f32; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        for (j, &y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// 1-D derivative kernel of the given order: binomial smoothing convolved
/// with `order` first differences. Size 3 order 1 is `[-1, 0, 1]`.
pub fn derivative_kernel(order: u32, size: u32) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0];
    }
    let mut k = vec![1.0f32];
    for _ in 0..size.saturating_sub(order + 1) {
        k = convolve_1d(&k, &[1.0, 1.0]);
    }
    for _ in 0..order {
        k = convolve_1d(&k, &[-1.0, 1.0]);
    }
    k
}

/// Sobel-style separable pair `(horizontal, vertical)` for derivative orders
/// `(dx, dy)` at `aperture`. An aperture of 1 differentiates without
/// smoothing.
pub fn sobel_kernels(dx: u32, dy: u32, aperture: u32) -> (Vec<f32>, Vec<f32>) {
    let kx_size = if aperture == 1 && dx > 0 { 3 } else { aperture };
    let ky_size = if aperture == 1 && dy > 0 { 3 } else { aperture };
    (derivative_kernel(dx, kx_size), derivative_kernel(dy, ky_size))
}

/// Zero-sum high-pass kernel of odd size `n`.
///
/// With `c = n / 2`, every cell of the top-left quadrant (mirrored into the
/// other three) is `-max(0, 1 + i + j - c)`; the centre is then set to the
/// negated sum of all other cells. `n = 3` gives the 4-neighbour Laplacian.
pub fn laplacian_kernel(n: usize) -> Kernel {
    let n = if n % 2 == 0 { n + 1 } else { n.max(1) };
    let c = n / 2;
    let mut weights = vec![0.0f32; n * n];
    for i in 0..=c {
        for j in 0..=c {
            let v = -((1 + i + j) as f32 - c as f32).max(0.0);
            for (r, col) in [(i, j), (i, n - 1 - j), (n - 1 - i, j), (n - 1 - i, n - 1 - j)] {
                weights[r * n + col] = v;
            }
        }
    }
    weights[c * n + c] = 0.0;
    let others: f32 = weights.iter().sum();
    weights[c * n + c] = -others;
    Kernel { size: n, weights }
}

// ============================================================================
// CONVOLUTION CORE
// ============================================================================

/// Reflect-101 border index (`gfedcb|abcdefgh|gfedcba`).
#[inline]
fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Per-channel float plane buffer with the raster's interleaved layout.
struct Plane {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_raster(src: &Raster) -> Self {
        Self {
            width: src.width() as usize,
            height: src.height() as usize,
            channels: src.channels() as usize,
            data: src.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    /// Round and saturate into a raster of the same shape.
    fn to_raster(&self) -> Raster {
        let bytes = self.data.iter().map(|&v| saturate(v)).collect();
        Raster::from_raw(self.width as u32, self.height as u32, self.channels as u8, bytes)
            .unwrap_or_else(|| Raster::new(self.width as u32, self.height as u32, self.channels as u8))
    }

    /// `saturate(|v|)` per sample.
    fn to_raster_abs(&self) -> Raster {
        let bytes = self.data.iter().map(|&v| saturate(v.abs())).collect();
        Raster::from_raw(self.width as u32, self.height as u32, self.channels as u8, bytes)
            .unwrap_or_else(|| Raster::new(self.width as u32, self.height as u32, self.channels as u8))
    }
}

#[inline]
fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Separable correlation: `kx` along rows, then `ky` along columns.
fn correlate_separable(src: &Plane, kx: &[f32], ky: &[f32]) -> Plane {
    let (w, h, c) = (src.width, src.height, src.channels);
    let stride = w * c;
    let rx = (kx.len() / 2) as isize;
    let ry = (ky.len() / 2) as isize;

    let mut horiz = vec![0.0f32; src.data.len()];
    horiz.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src.data[y * stride..(y + 1) * stride];
        for x in 0..w {
            for ch in 0..c {
                let mut acc = 0.0f32;
                for (k, &kv) in kx.iter().enumerate() {
                    let sx = reflect_101(x as isize + k as isize - rx, w);
                    acc += row_in[sx * c + ch] * kv;
                }
                row_out[x * c + ch] = acc;
            }
        }
    });

    let mut data = vec![0.0f32; src.data.len()];
    data.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for (k, &kv) in ky.iter().enumerate() {
            let sy = reflect_101(y as isize + k as isize - ry, h);
            let row_in = &horiz[sy * stride..(sy + 1) * stride];
            for (o, &v) in row_out.iter_mut().zip(row_in) {
                *o += v * kv;
            }
        }
    });

    Plane { width: w, height: h, channels: c, data }
}

/// Dense 2-D correlation.
fn correlate_2d(src: &Plane, kernel: &Kernel) -> Plane {
    let (w, h, c) = (src.width, src.height, src.channels);
    let stride = w * c;
    let r = (kernel.size / 2) as isize;

    let mut data = vec![0.0f32; src.data.len()];
    data.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for ky in 0..kernel.size {
            let sy = reflect_101(y as isize + ky as isize - r, h);
            let row_in = &src.data[sy * stride..(sy + 1) * stride];
            for kx in 0..kernel.size {
                let kv = kernel.at(ky, kx);
                if kv == 0.0 {
                    continue;
                }
                for x in 0..w {
                    let sx = reflect_101(x as isize + kx as isize - r, w);
                    for ch in 0..c {
                        row_out[x * c + ch] += row_in[sx * c + ch] * kv;
                    }
                }
            }
        }
    });

    Plane { width: w, height: h, channels: c, data }
}

// ============================================================================
// SMOOTHING
// ============================================================================

/// Normalised `n x n` box blur.
pub fn box_blur(src: &Raster, n: u32) -> Raster {
    if n <= 1 || src.is_empty() {
        return src.clone();
    }
    let k = vec![1.0 / n as f32; n as usize];
    correlate_separable(&Plane::from_raster(src), &k, &k).to_raster()
}

/// `n x n` Gaussian blur.
pub fn gaussian_blur(src: &Raster, n: u32, sigma: f32) -> Raster {
    if n <= 1 || src.is_empty() {
        return src.clone();
    }
    let k = gaussian_kernel(n as usize, sigma);
    correlate_separable(&Plane::from_raster(src), &k, &k).to_raster()
}

/// `n x n` median, per channel, replicate borders.
pub fn median_blur(src: &Raster, n: u32) -> Raster {
    if n <= 1 || src.is_empty() {
        return src.clone();
    }
    let (w, h) = (src.width() as usize, src.height() as usize);
    let c = src.channels() as usize;
    let r = (n / 2) as i32;
    let stride = src.stride();
    let src_raw = src.as_raw();

    let mut out = Raster::new(src.width(), src.height(), src.channels());
    out.par_rows_mut(|y, row_out| {
        let mut window: Vec<u8> = Vec::with_capacity((n * n) as usize);
        for x in 0..w {
            for ch in 0..c {
                window.clear();
                for dy in -r..=r {
                    let sy = (y as i32 + dy).clamp(0, h as i32 - 1) as usize;
                    for dx in -r..=r {
                        let sx = (x as i32 + dx).clamp(0, w as i32 - 1) as usize;
                        window.push(src_raw[sy * stride + sx * c + ch]);
                    }
                }
                window.sort_unstable();
                row_out[x * c + ch] = window[window.len() / 2];
            }
        }
    });
    out
}

// ============================================================================
// SHARPENING
// ============================================================================

/// `1.5 * original - 0.5 * gaussian(original, n, 0.25 n)`.
pub fn unsharp_mask(src: &Raster, n: u32) -> Raster {
    if n <= 1 || src.is_empty() {
        return src.clone();
    }
    let blurred = gaussian_blur(src, n, 0.25 * n as f32);
    let mut out = src.clone();
    let blur_raw = blurred.as_raw();
    let stride = src.stride();
    out.par_rows_mut(|y, row| {
        let b = &blur_raw[y * stride..(y + 1) * stride];
        for (v, &bv) in row.iter_mut().zip(b) {
            *v = saturate(1.5 * *v as f32 - 0.5 * bv as f32);
        }
    });
    out
}

/// Laplacian boost: 3x3 pre-blur, high-pass with the size-`n` Laplacian
/// kernel (saturated to u8), then `0.9 * original + 0.1 * highpass + 25.5`.
pub fn laplacian_sharpen(src: &Raster, n: u32) -> Raster {
    if src.is_empty() {
        return src.clone();
    }
    let smoothed = gaussian_blur(src, 3, 0.0);
    let highpass = correlate_2d(&Plane::from_raster(&smoothed), &laplacian_kernel(n as usize)).to_raster();
    let hp_raw = highpass.as_raw();
    let stride = src.stride();
    let mut out = src.clone();
    out.par_rows_mut(|y, row| {
        let hp = &hp_raw[y * stride..(y + 1) * stride];
        for (v, &hv) in row.iter_mut().zip(hp) {
            *v = saturate(0.9 * *v as f32 + 0.1 * hv as f32 + 25.5);
        }
    });
    out
}

// ============================================================================
// EDGE DETECTION
// ============================================================================

/// Average of `|d/dx|` and `|d/dy|`, each saturated to u8 first.
pub fn sobel_edges(src: &Raster, aperture: u32) -> Raster {
    if src.is_empty() {
        return src.clone();
    }
    let plane = Plane::from_raster(src);
    let (kx, ky) = sobel_kernels(1, 0, aperture);
    let gx = correlate_separable(&plane, &kx, &ky).to_raster_abs();
    let (kx, ky) = sobel_kernels(0, 1, aperture);
    let gy = correlate_separable(&plane, &kx, &ky).to_raster_abs();

    let gy_raw = gy.as_raw();
    let stride = src.stride();
    let mut out = gx;
    out.par_rows_mut(|y, row| {
        let b = &gy_raw[y * stride..(y + 1) * stride];
        for (v, &bv) in row.iter_mut().zip(b) {
            *v = saturate(0.5 * *v as f32 + 0.5 * bv as f32);
        }
    });
    out
}

/// `saturate(|laplacian|)`. Aperture 1 uses the 4-neighbour kernel; larger
/// apertures sum the separable second derivatives.
pub fn laplacian_edges(src: &Raster, aperture: u32) -> Raster {
    if src.is_empty() {
        return src.clone();
    }
    let plane = Plane::from_raster(src);
    if aperture <= 1 {
        return correlate_2d(&plane, &laplacian_kernel(3)).to_raster_abs();
    }
    // The 4-neighbour kernel above is positive at the centre; the separable
    // form is negative there. Only the magnitude is kept, so the sign is moot.
    let d2 = derivative_kernel(2, aperture);
    let d0 = derivative_kernel(0, aperture);
    let mut xx = correlate_separable(&plane, &d2, &d0);
    let yy = correlate_separable(&plane, &d0, &d2);
    for (a, b) in xx.data.iter_mut().zip(yy.data) {
        *a += b;
    }
    xx.to_raster_abs()
}

/// Canny edges on the luma channel, replicated to the input channel count.
/// Output is 0 / 255.
pub fn canny(src: &Raster, aperture: u32, low: f32, high: f32) -> Raster {
    if src.is_empty() {
        return src.clone();
    }
    let (w, h) = (src.width() as usize, src.height() as usize);
    let luma: Vec<f32> = if src.channels() == 3 {
        src.as_raw().chunks_exact(3).map(|p| gray(p[0], p[1], p[2]) as f32).collect()
    } else {
        src.as_raw().iter().map(|&v| v as f32).collect()
    };
    let plane = Plane { width: w, height: h, channels: 1, data: luma };

    let (kx, ky) = sobel_kernels(1, 0, aperture);
    let dx = correlate_separable(&plane, &kx, &ky).data;
    let (kx, ky) = sobel_kernels(0, 1, aperture);
    let dy = correlate_separable(&plane, &kx, &ky).data;
    let mag: Vec<f32> = dx.iter().zip(&dy).map(|(a, b)| a.abs() + b.abs()).collect();

    let (low, high) = if low > high { (high, low) } else { (low, high) };

    // Non-maximum suppression: 0 = suppressed, 1 = weak, 2 = strong.
    const TAN_22_5: f32 = 0.414_213_57;
    let mut class = vec![0u8; w * h];
    class.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let at = |x: isize, y: isize| -> f32 {
            if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
                0.0
            } else {
                mag[y as usize * w + x as usize]
            }
        };
        for x in 0..w {
            let i = y * w + x;
            let m = mag[i];
            if m <= low {
                continue;
            }
            let (gx, gy) = (dx[i], dy[i]);
            let (ax, ay) = (gx.abs(), gy.abs());
            let (xi, yi) = (x as isize, y as isize);
            let (n1, n2) = if ay <= ax * TAN_22_5 {
                (at(xi - 1, yi), at(xi + 1, yi))
            } else if ax <= ay * TAN_22_5 {
                (at(xi, yi - 1), at(xi, yi + 1))
            } else if (gx > 0.0) == (gy > 0.0) {
                (at(xi - 1, yi - 1), at(xi + 1, yi + 1))
            } else {
                (at(xi + 1, yi - 1), at(xi - 1, yi + 1))
            };
            if m > n1 && m >= n2 {
                row[x] = if m > high { 2 } else { 1 };
            }
        }
    });

    // Hysteresis: grow strong edges through 8-connected weak pixels.
    let mut edges = vec![0u8; w * h];
    let mut stack: Vec<usize> = Vec::new();
    for (i, &c) in class.iter().enumerate() {
        if c == 2 {
            edges[i] = 255;
            stack.push(i);
        }
    }
    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if class[j] == 1 && edges[j] == 0 {
                    edges[j] = 255;
                    stack.push(j);
                }
            }
        }
    }

    let mono = Raster::from_raw(w as u32, h as u32, 1, edges)
        .unwrap_or_else(|| Raster::new(w as u32, h as u32, 1));
    if src.channels() == 3 { mono.to_rgb() } else { mono }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Derive a preview from `master`.
pub fn filter(master: &Raster, params: &FilterParams, settings: &PipelineSettings) -> Raster {
    let n = kernel_size(master.width(), master.height(), params.weight);
    match params.kind {
        FilterKind::Smooth(SmoothKind::Average) => box_blur(master, n),
        FilterKind::Smooth(SmoothKind::Gaussian) => gaussian_blur(master, n, 0.25 * n as f32),
        FilterKind::Smooth(SmoothKind::Median) => median_blur(master, n),
        FilterKind::Sharpen(SharpenKind::Unsharp) => unsharp_mask(master, n),
        FilterKind::Sharpen(SharpenKind::Laplacian) => laplacian_sharpen(master, n),
        FilterKind::Edge(kind) => {
            let aperture = edge_aperture(kind, params.weight);
            match kind {
                EdgeKind::Canny => canny(master, aperture, settings.canny_low, settings.canny_high),
                EdgeKind::Sobel => sobel_edges(master, aperture),
                EdgeKind::Laplacian => laplacian_edges(master, aperture),
            }
        }
    }
}

/// Lock the canvas, derive preview from master.
pub fn filter_canvas(
    canvas: &SharedCanvas,
    params: &FilterParams,
    settings: &PipelineSettings,
) -> Result<EngineStatus, EngineError> {
    canvas.render_preview(true, |master| Ok(filter(master, params, settings)))
}

#[derive(Clone, Debug, Default)]
pub struct FilterEngine {
    pub settings: PipelineSettings,
}

impl ToolEngine for FilterEngine {
    type Params = FilterParams;
    const KIND: ToolKind = ToolKind::Filter;

    fn process(&self, master: &Raster, params: &FilterParams) -> Result<Raster, EngineError> {
        Ok(filter(master, params, &self.settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(w: u32, h: u32) -> Raster {
        Raster::filled(w, h, [90, 140, 200])
    }

    fn step_edge(w: u32, h: u32) -> Raster {
        let mut r = Raster::new(w, h, 3);
        r.par_rows_mut(|_, row| {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let v = if x < (w / 2) as usize { 20 } else { 220 };
                px.copy_from_slice(&[v, v, v]);
            }
        });
        r
    }

    #[test]
    fn laplacian_kernel_shapes() {
        let k3 = laplacian_kernel(3);
        assert_eq!(k3.weights, vec![0.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 0.0]);

        let k5 = laplacian_kernel(5);
        assert_eq!(k5.sum(), 0.0);
        assert_eq!(k5.at(0, 0), 0.0);
        assert_eq!(k5.at(1, 1), -1.0);
        assert_eq!(k5.at(1, 2), -2.0);
        assert_eq!(k5.at(1, 3), -1.0);
        assert!(k5.at(2, 2) > 0.0);

        assert_eq!(laplacian_kernel(1).weights, vec![0.0]);
    }

    #[test]
    fn derivative_kernels_match_sobel() {
        assert_eq!(derivative_kernel(1, 3), vec![-1.0, 0.0, 1.0]);
        assert_eq!(derivative_kernel(0, 3), vec![1.0, 2.0, 1.0]);
        assert_eq!(derivative_kernel(2, 3), vec![1.0, -2.0, 1.0]);
        assert_eq!(derivative_kernel(1, 5), vec![-1.0, -2.0, 0.0, 2.0, 1.0]);
        let (kx, ky) = sobel_kernels(1, 0, 1);
        assert_eq!(kx, vec![-1.0, 0.0, 1.0]);
        assert_eq!(ky, vec![1.0]);
    }

    #[test]
    fn gaussian_kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel(7, 1.75);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        for i in 0..3 {
            assert!((k[i] - k[6 - i]).abs() < 1e-6);
        }
    }

    #[test]
    fn reflect_101_borders() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 1), 0);
    }

    #[test]
    fn min_weight_smoothing_keeps_flat_field() {
        let src = flat(40, 30);
        let settings = PipelineSettings::default();
        for kind in [SmoothKind::Average, SmoothKind::Gaussian, SmoothKind::Median] {
            let params = FilterParams { kind: FilterKind::Smooth(kind), weight: 1 };
            assert_eq!(filter(&src, &params, &settings), src, "{:?}", kind);
        }
    }

    #[test]
    fn large_kernels_keep_flat_field() {
        let src = flat(400, 400);
        assert_eq!(box_blur(&src, 7), src);
        assert_eq!(gaussian_blur(&src, 9, 2.25), src);
        assert_eq!(median_blur(&src, 5), src);
        assert_eq!(unsharp_mask(&src, 5), src);
    }

    #[test]
    fn canny_on_flat_field_is_black() {
        let src = flat(64, 48);
        let settings = PipelineSettings::default();
        for weight in 0..=3 {
            let params = FilterParams { kind: FilterKind::Edge(EdgeKind::Canny), weight };
            let out = filter(&src, &params, &settings);
            assert_eq!(out.dimensions(), (64, 48));
            assert!(out.as_raw().iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn canny_finds_step_edge() {
        let src = step_edge(32, 16);
        let out = canny(&src, 3, 50.0, 150.0);
        let row = out.row(8);
        let lit: Vec<usize> = row.chunks_exact(3).enumerate().filter(|(_, p)| p[0] == 255).map(|(x, _)| x).collect();
        assert!(!lit.is_empty());
        assert!(lit.iter().all(|&x| (14..=17).contains(&x)), "{:?}", lit);
    }

    #[test]
    fn sobel_and_laplacian_edges_flat_and_step() {
        let src = flat(20, 20);
        for aperture in [1, 3, 5, 7] {
            assert!(sobel_edges(&src, aperture).as_raw().iter().all(|&v| v == 0));
            assert!(laplacian_edges(&src, aperture).as_raw().iter().all(|&v| v == 0));
        }
        let step = step_edge(20, 10);
        let out = sobel_edges(&step, 3);
        assert!(out.pixel(10, 5)[0] > 0);
        assert_eq!(out.pixel(2, 5)[0], 0);
    }

    #[test]
    fn median_removes_salt_noise() {
        let mut src = flat(9, 9);
        let stride = src.stride();
        src.as_raw_mut()[4 * stride + 4 * 3..4 * stride + 4 * 3 + 3].copy_from_slice(&[255, 255, 255]);
        let out = median_blur(&src, 3);
        assert_eq!(out, flat(9, 9));
    }

    #[test]
    fn unsharp_increases_step_contrast() {
        let src = step_edge(40, 10);
        let out = unsharp_mask(&src, 5);
        assert!(out.pixel(19, 5)[0] < 20);
        assert!(out.pixel(20, 5)[0] > 220);
    }

    #[test]
    fn laplacian_sharpen_on_flat_field() {
        let src = Raster::filled(12, 12, [105, 105, 105]);
        let out = laplacian_sharpen(&src, 5);
        // 0.9 * 105 + 0.1 * 0 + 25.5 = 120
        assert!(out.as_raw().iter().all(|&v| v == 120));
    }

    #[test]
    fn triple_decoding() {
        assert_eq!(
            FilterParams::from_triple(1, 40, 0),
            Some(FilterParams { kind: FilterKind::Smooth(SmoothKind::Gaussian), weight: 40 })
        );
        assert_eq!(FilterParams::from_triple(2, 1, 1), None);
        assert_eq!(FilterKind::parse("edge:sobel"), Some(FilterKind::Edge(EdgeKind::Sobel)));
        assert_eq!(FilterKind::parse("blur"), None);
    }
}
