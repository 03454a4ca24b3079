// ============================================================================
// IMAGE I/O — decode into the canvas, encode master with per-format options
// ============================================================================

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::canvas::SharedCanvas;
use crate::ops::color::gray;
use crate::raster::Raster;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode {format}: {message}")]
    Encode { format: &'static str, message: String },

    #[error("unsupported output format '{0}'")]
    Unsupported(String),

    #[error("invalid save option: {0}")]
    InvalidOption(String),

    #[error("no image loaded")]
    NotAttached,
}

// ============================================================================
// SAVE OPTIONS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Jpeg,
    Png,
    Webp,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Png => "png",
            SaveFormat::Webp => "webp",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SaveFormat::Jpeg => "JPEG",
            SaveFormat::Png => "PNG",
            SaveFormat::Webp => "WebP",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" => Some(SaveFormat::Jpeg),
            "png" => Some(SaveFormat::Png),
            "webp" => Some(SaveFormat::Webp),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        Self::from_extension(ext).ok_or_else(|| IoError::Unsupported(path.display().to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JpegOptions {
    /// 0..=100
    pub quality: u8,
    /// MCU rows between restart markers, 0..=65535 (0 = none).
    pub restart_interval: u32,
    pub progressive: bool,
    pub optimize: bool,
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self { quality: 95, restart_interval: 0, progressive: false, optimize: false }
    }
}

/// Deflate strategy as exposed in the save dialog. The `png` encoder has no
/// strategy knob, so each maps onto a row-filter choice instead:
///
/// | strategy | filter                    |
/// |----------|---------------------------|
/// | Default  | adaptive (per row)        |
/// | Filtered | Paeth                     |
/// | Huffman  | none, fast compression    |
/// | Rle      | Sub                       |
/// | Fixed    | none                      |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PngStrategy {
    #[default]
    Default,
    Filtered,
    Huffman,
    Rle,
    Fixed,
}

impl PngStrategy {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text.trim().to_lowercase().as_str() {
            "default" => PngStrategy::Default,
            "filtered" => PngStrategy::Filtered,
            "huffman" | "huffman-only" => PngStrategy::Huffman,
            "rle" => PngStrategy::Rle,
            "fixed" => PngStrategy::Fixed,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PngOptions {
    /// 0..=9
    pub compression: u8,
    pub strategy: PngStrategy,
    /// Write 1-bit grayscale (luma threshold at 128).
    pub bilevel: bool,
}

impl Default for PngOptions {
    fn default() -> Self {
        Self { compression: 3, strategy: PngStrategy::Default, bilevel: false }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WebpOptions {
    /// 1..=100
    pub quality: u8,
}

impl Default for WebpOptions {
    fn default() -> Self {
        Self { quality: 100 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOptions {
    Jpeg(JpegOptions),
    Png(PngOptions),
    Webp(WebpOptions),
}

impl SaveOptions {
    pub fn defaults_for(format: SaveFormat) -> Self {
        match format {
            SaveFormat::Jpeg => SaveOptions::Jpeg(JpegOptions::default()),
            SaveFormat::Png => SaveOptions::Png(PngOptions::default()),
            SaveFormat::Webp => SaveOptions::Webp(WebpOptions::default()),
        }
    }

    pub fn format(&self) -> SaveFormat {
        match self {
            SaveOptions::Jpeg(_) => SaveFormat::Jpeg,
            SaveOptions::Png(_) => SaveFormat::Png,
            SaveOptions::Webp(_) => SaveFormat::Webp,
        }
    }

    pub fn validate(&self) -> Result<(), IoError> {
        match self {
            SaveOptions::Jpeg(o) => {
                if o.quality > 100 {
                    return Err(IoError::InvalidOption(format!("JPEG quality {} exceeds 100", o.quality)));
                }
                if o.restart_interval > u16::MAX as u32 {
                    return Err(IoError::InvalidOption(format!(
                        "JPEG restart interval {} exceeds 65535",
                        o.restart_interval
                    )));
                }
            }
            SaveOptions::Png(o) => {
                if o.compression > 9 {
                    return Err(IoError::InvalidOption(format!("PNG compression {} exceeds 9", o.compression)));
                }
            }
            SaveOptions::Webp(o) => {
                if !(1..=100).contains(&o.quality) {
                    return Err(IoError::InvalidOption(format!("WebP quality {} outside 1..=100", o.quality)));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// LOAD
// ============================================================================

/// Decode any supported file into a 3-channel raster.
pub fn decode_image(path: &Path) -> Result<Raster, IoError> {
    let img = image::open(path).map_err(|source| match source {
        image::ImageError::IoError(e) => IoError::Io { path: path.to_path_buf(), source: e },
        other => IoError::Decode { path: path.to_path_buf(), source: other },
    })?;
    Ok(Raster::from_rgb_image(&img.to_rgb8()))
}

/// Decode `path` and install it as master and preview. On failure both
/// buffers are cleared so no stale image survives a failed load.
pub fn load_into(canvas: &SharedCanvas, path: &Path, poll: Duration, pump: impl FnMut()) -> Result<(u32, u32), IoError> {
    let decoded = decode_image(path);
    let mut buffers = canvas.lock_polling(poll, pump);
    match decoded {
        Ok(raster) => {
            let dims = raster.dimensions();
            buffers.attach(raster);
            log::info!("Loaded {} ({}x{})", path.display(), dims.0, dims.1);
            Ok(dims)
        }
        Err(e) => {
            buffers.clear();
            log::warn!("Load failed: {}", e);
            Err(e)
        }
    }
}

// ============================================================================
// SAVE
// ============================================================================

fn encode_err(format: SaveFormat) -> impl Fn(String) -> IoError {
    move |message| IoError::Encode { format: format.label(), message }
}

/// Encode `raster` and write it to `path`.
pub fn encode_and_write(raster: &Raster, path: &Path, options: &SaveOptions) -> Result<(), IoError> {
    options.validate()?;
    let io_err = |source| IoError::Io { path: path.to_path_buf(), source };
    let color = if raster.channels() == 1 { ColorType::L8 } else { ColorType::Rgb8 };

    match options {
        SaveOptions::Jpeg(o) => {
            if o.restart_interval != 0 {
                log::warn!("JPEG restart interval {} not supported by the encoder; ignored", o.restart_interval);
            }
            if o.progressive {
                log::warn!("Progressive JPEG not supported by the encoder; writing baseline");
            }
            if o.optimize {
                log::warn!("JPEG Huffman optimisation not supported by the encoder; ignored");
            }
            let file = File::create(path).map_err(io_err)?;
            let mut writer = BufWriter::new(file);
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, o.quality.max(1));
            encoder
                .encode(raster.as_raw(), raster.width(), raster.height(), color)
                .map_err(|e| encode_err(SaveFormat::Jpeg)(e.to_string()))?;
        }
        SaveOptions::Png(o) => {
            let file = File::create(path).map_err(io_err)?;
            write_png(raster, BufWriter::new(file), o).map_err(encode_err(SaveFormat::Png))?;
        }
        SaveOptions::Webp(o) => {
            if o.quality < 100 {
                log::warn!("WebP quality {} requested; the encoder writes lossless only", o.quality);
            }
            let img = if raster.channels() == 1 {
                DynamicImage::ImageLuma8(raster.to_gray_image())
            } else {
                DynamicImage::ImageRgb8(raster.to_rgb_image())
            };
            img.save_with_format(path, ImageFormat::WebP).map_err(|e| match e {
                image::ImageError::IoError(source) => io_err(source),
                other => encode_err(SaveFormat::Webp)(other.to_string()),
            })?;
        }
    }
    Ok(())
}

fn png_compression(level: u8) -> png::Compression {
    match level {
        0..=3 => png::Compression::Fast,
        4..=6 => png::Compression::Default,
        _ => png::Compression::Best,
    }
}

/// Pack luma >= 128 as 1 bits, MSB first, each row padded to a byte.
fn pack_bilevel(raster: &Raster) -> Vec<u8> {
    let (w, h) = (raster.width() as usize, raster.height() as usize);
    let row_bytes = w.div_ceil(8);
    let c = raster.channels() as usize;
    let mut packed = vec![0u8; row_bytes * h];
    for y in 0..h {
        let row = raster.row(y as u32);
        let out = &mut packed[y * row_bytes..(y + 1) * row_bytes];
        for x in 0..w {
            let px = &row[x * c..x * c + c];
            let luma = if c == 3 { gray(px[0], px[1], px[2]) } else { px[0] };
            if luma >= 128 {
                out[x / 8] |= 0x80 >> (x % 8);
            }
        }
    }
    packed
}

fn write_png<W: std::io::Write>(raster: &Raster, writer: W, options: &PngOptions) -> Result<(), String> {
    let mut encoder = png::Encoder::new(writer, raster.width(), raster.height());
    let data = if options.bilevel {
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::One);
        pack_bilevel(raster)
    } else {
        encoder.set_color(if raster.channels() == 1 { png::ColorType::Grayscale } else { png::ColorType::Rgb });
        encoder.set_depth(png::BitDepth::Eight);
        raster.as_raw().to_vec()
    };

    let mut compression = png_compression(options.compression);
    let (filter, adaptive) = match options.strategy {
        PngStrategy::Default => (png::FilterType::Sub, png::AdaptiveFilterType::Adaptive),
        PngStrategy::Filtered => (png::FilterType::Paeth, png::AdaptiveFilterType::NonAdaptive),
        PngStrategy::Huffman => {
            compression = png::Compression::Fast;
            (png::FilterType::NoFilter, png::AdaptiveFilterType::NonAdaptive)
        }
        PngStrategy::Rle => (png::FilterType::Sub, png::AdaptiveFilterType::NonAdaptive),
        PngStrategy::Fixed => (png::FilterType::NoFilter, png::AdaptiveFilterType::NonAdaptive),
    };
    encoder.set_compression(compression);
    encoder.set_filter(filter);
    encoder.set_adaptive_filter(adaptive);

    let mut writer = encoder.write_header().map_err(|e| format!("PNG header write error: {}", e))?;
    writer.write_image_data(&data).map_err(|e| format!("PNG data write error: {}", e))?;
    writer.finish().map_err(|e| format!("PNG finish error: {}", e))?;
    Ok(())
}

/// Encode the canvas master. The master is copied out under a polled lock
/// (calling `pump` between attempts) and encoded with the lock released.
/// Codec failures come back as errors; nothing here panics on bad input.
pub fn save_master(
    canvas: &SharedCanvas,
    path: &Path,
    options: &SaveOptions,
    poll: Duration,
    pump: impl FnMut(),
) -> Result<(), IoError> {
    let master = canvas.lock_polling(poll, pump).master().cloned().ok_or(IoError::NotAttached)?;
    encode_and_write(&master, path, options)?;
    log::info!("Saved {} as {}", path.display(), options.format().label());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Raster {
        let mut r = Raster::new(17, 9, 3);
        r.par_rows_mut(|y, row| {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                px.copy_from_slice(&[(x * 15) as u8, (y * 28) as u8, 99]);
            }
        });
        r
    }

    #[test]
    fn png_round_trip_is_lossless_for_every_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let src = sample();
        for (i, strategy) in [
            PngStrategy::Default,
            PngStrategy::Filtered,
            PngStrategy::Huffman,
            PngStrategy::Rle,
            PngStrategy::Fixed,
        ]
        .into_iter()
        .enumerate()
        {
            let path = dir.path().join(format!("out{}.png", i));
            let opts = SaveOptions::Png(PngOptions { compression: (i * 2) as u8, strategy, bilevel: false });
            encode_and_write(&src, &path, &opts).unwrap();
            assert_eq!(decode_image(&path).unwrap(), src, "{:?}", strategy);
        }
    }

    #[test]
    fn png_bilevel_is_black_and_white() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bw.png");
        let opts = SaveOptions::Png(PngOptions { bilevel: true, ..PngOptions::default() });
        encode_and_write(&sample(), &path, &opts).unwrap();
        let back = decode_image(&path).unwrap();
        assert_eq!(back.dimensions(), (17, 9));
        assert!(back.as_raw().iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn jpeg_writes_decodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        let opts = SaveOptions::Jpeg(JpegOptions { quality: 80, restart_interval: 4, progressive: true, optimize: true });
        encode_and_write(&Raster::filled(32, 16, [200, 40, 40]), &path, &opts).unwrap();
        let back = decode_image(&path).unwrap();
        assert_eq!(back.dimensions(), (32, 16));
        let px = back.pixel(10, 8);
        assert!((px[0] as i32 - 200).abs() < 12 && (px[1] as i32 - 40).abs() < 12);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.jpg");
        let bad = [
            SaveOptions::Jpeg(JpegOptions { quality: 101, ..JpegOptions::default() }),
            SaveOptions::Jpeg(JpegOptions { restart_interval: 70_000, ..JpegOptions::default() }),
            SaveOptions::Png(PngOptions { compression: 10, ..PngOptions::default() }),
            SaveOptions::Webp(WebpOptions { quality: 0 }),
        ];
        for opts in bad {
            assert!(matches!(encode_and_write(&sample(), &path, &opts), Err(IoError::InvalidOption(_))));
        }
        assert!(!path.exists());
    }

    #[test]
    fn failed_load_clears_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let canvas = SharedCanvas::new();
        canvas.lock().attach(sample());

        let missing = dir.path().join("missing.png");
        assert!(matches!(load_into(&canvas, &missing, Duration::from_millis(1), || {}), Err(IoError::Io { .. })));
        assert!(!canvas.lock().is_attached());

        let garbage = dir.path().join("garbage.png");
        std::fs::write(&garbage, b"definitely not a png").unwrap();
        assert!(load_into(&canvas, &garbage, Duration::from_millis(1), || {}).is_err());
        assert!(!canvas.lock().is_attached());
    }

    #[test]
    fn load_then_save_master() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        encode_and_write(&sample(), &input, &SaveOptions::defaults_for(SaveFormat::Png)).unwrap();

        let canvas = SharedCanvas::new();
        assert!(matches!(
            save_master(
                &canvas,
                &dir.path().join("none.png"),
                &SaveOptions::defaults_for(SaveFormat::Png),
                Duration::from_millis(1),
                || {}
            ),
            Err(IoError::NotAttached)
        ));
        assert_eq!(load_into(&canvas, &input, Duration::from_millis(1), || {}).unwrap(), (17, 9));
        assert_eq!(canvas.preview_snapshot().unwrap(), sample());

        let output = dir.path().join("out.png");
        save_master(&canvas, &output, &SaveOptions::defaults_for(SaveFormat::Png), Duration::from_millis(1), || {})
            .unwrap();
        assert_eq!(decode_image(&output).unwrap(), sample());
    }

    #[test]
    fn save_master_pumps_while_canvas_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("held.png");
        let canvas = SharedCanvas::new();
        canvas.lock().attach(sample());

        let guard = canvas.lock();
        let saver = {
            let canvas = canvas.clone();
            let output = output.clone();
            std::thread::spawn(move || {
                let mut pumps = 0u32;
                let result = save_master(
                    &canvas,
                    &output,
                    &SaveOptions::defaults_for(SaveFormat::Png),
                    Duration::from_millis(1),
                    || pumps += 1,
                );
                (result.is_ok(), pumps)
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        drop(guard);

        let (saved, pumps) = saver.join().unwrap();
        assert!(saved);
        assert!(pumps > 0);
        assert_eq!(decode_image(&output).unwrap(), sample());
    }

    #[test]
    fn format_from_path() {
        assert_eq!(SaveFormat::from_path(Path::new("a/b.JPEG")).unwrap(), SaveFormat::Jpeg);
        assert_eq!(SaveFormat::from_path(Path::new("x.webp")).unwrap(), SaveFormat::Webp);
        assert!(matches!(SaveFormat::from_path(Path::new("x.gif")), Err(IoError::Unsupported(_))));
        assert!(SaveFormat::from_path(Path::new("noext")).is_err());
    }
}
