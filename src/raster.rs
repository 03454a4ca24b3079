// ============================================================================
// RASTER — owned 8-bit pixel buffers and borrowed region views
// ============================================================================
//
// A `Raster` always owns its bytes exclusively. Sub-regions are exposed as a
// `RasterView<'a>` that borrows the source immutably; a view never outlives or
// aliases a buffer that is being mutated. Materialising a view copies.
// ============================================================================

use image::{GrayImage, RgbImage};
use rayon::prelude::*;

/// Contiguous 8-bit raster with 1 (gray) or 3 (RGB) interleaved channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    channels: u8,
    stride: usize,
    data: Vec<u8>,
}

impl Raster {
    /// Zero-filled raster. `channels` must be 1 or 3.
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        assert!(channels == 1 || channels == 3, "unsupported channel count {}", channels);
        let stride = width as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            stride,
            data: vec![0u8; stride * height as usize],
        }
    }

    /// Wrap an existing byte buffer. Returns `None` when the length does not
    /// match `width * height * channels` or the channel count is unsupported.
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Option<Self> {
        if channels != 1 && channels != 3 {
            return None;
        }
        let stride = width as usize * channels as usize;
        if data.len() != stride * height as usize {
            return None;
        }
        Some(Self { width, height, channels, stride, data })
    }

    /// Solid-colour RGB raster.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut out = Self::new(width, height, 3);
        for px in out.data.chunks_exact_mut(3) {
            px.copy_from_slice(&rgb);
        }
        out
    }

    pub fn from_rgb_image(img: &RgbImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            channels: 3,
            stride: img.width() as usize * 3,
            data: img.as_raw().clone(),
        }
    }

    pub fn from_gray_image(img: &GrayImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            channels: 1,
            stride: img.width() as usize,
            data: img.as_raw().clone(),
        }
    }

    /// Convert to an `RgbImage`, replicating the gray channel when needed.
    pub fn to_rgb_image(&self) -> RgbImage {
        let rgb = if self.channels == 3 {
            self.data.clone()
        } else {
            self.data.iter().flat_map(|&v| [v, v, v]).collect()
        };
        // Length is width * height * 3 by construction.
        RgbImage::from_raw(self.width, self.height, rgb)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Convert to a `GrayImage`. RGB input is reduced with BT.601 weights.
    pub fn to_gray_image(&self) -> GrayImage {
        let gray = if self.channels == 1 {
            self.data.clone()
        } else {
            self.data
                .chunks_exact(3)
                .map(|px| crate::ops::color::gray(px[0], px[1], px[2]))
                .collect()
        };
        GrayImage::from_raw(self.width, self.height, gray)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when `other` has the same width, height and channel count.
    pub fn same_shape(&self, other: &Raster) -> bool {
        self.width == other.width && self.height == other.height && self.channels == other.channels
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.stride]
    }

    /// Channel values of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels as usize;
        let start = y as usize * self.stride + x as usize * c;
        &self.data[start..start + c]
    }

    /// Row-parallel in-place mutation. The closure receives `(y, row)`.
    pub fn par_rows_mut<F>(&mut self, f: F)
    where
        F: Fn(usize, &mut [u8]) + Sync + Send,
    {
        if self.stride == 0 {
            return;
        }
        self.data
            .par_chunks_mut(self.stride)
            .enumerate()
            .for_each(|(y, row)| f(y, row));
    }

    /// Borrow a rectangular region. Returns `None` if the region is empty or
    /// leaves the raster.
    pub fn view(&self, x: u32, y: u32, width: u32, height: u32) -> Option<RasterView<'_>> {
        if width == 0 || height == 0 {
            return None;
        }
        let x_end = x.checked_add(width)?;
        let y_end = y.checked_add(height)?;
        if x_end > self.width || y_end > self.height {
            return None;
        }
        Some(RasterView { source: self, x, y, width, height })
    }

    /// Same-shape raster with 3 channels (gray input is replicated).
    pub fn to_rgb(&self) -> Raster {
        if self.channels == 3 {
            return self.clone();
        }
        Raster::from_rgb_image(&self.to_rgb_image())
    }
}

/// Immutable window into a `Raster`. Lives no longer than its source.
#[derive(Clone, Copy, Debug)]
pub struct RasterView<'a> {
    source: &'a Raster,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl<'a> RasterView<'a> {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn origin(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// Bytes of row `y` within the view.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let c = self.source.channels as usize;
        let full = self.source.row(self.y + y);
        let start = self.x as usize * c;
        &full[start..start + self.width as usize * c]
    }

    /// Copy the viewed pixels into a new owned raster.
    pub fn to_raster(&self) -> Raster {
        let c = self.source.channels;
        let mut out = Raster::new(self.width, self.height, c);
        let view = *self;
        out.par_rows_mut(|y, row| row.copy_from_slice(view.row(y as u32)));
        out
    }
}
