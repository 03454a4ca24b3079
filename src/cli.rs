// ============================================================================
// PhotoFE CLI — headless batch editing through the tool worker pipeline
// ============================================================================
//
// Usage examples:
//   photofe -i photo.jpg --brightness 20 --contrast 120 -o out.jpg
//   photofe -i photo.png --filter smooth:gaussian:40 -o blurred.png
//   photofe -i scan.png --rotate 12.5 --auto-crop --png-compression 9 -o straight.png
//   photofe -i *.jpg --grayscale --scale 800x600 --output-dir small/ --format webp
//
// Each edit runs exactly as it would from a tool menu: the tool is shown, its
// parameters are published to the worker, the preview is awaited, then
// applied into master. The image is saved once every step has been applied.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use clap::Parser;

use crate::canvas::SharedCanvas;
use crate::io::{
    JpegOptions, PngOptions, PngStrategy, SaveFormat, SaveOptions, WebpOptions, load_into, save_master,
};
use crate::ops::EngineStatus;
use crate::ops::adjustments::{AdjustParams, ColorMode};
use crate::ops::filters::{FilterKind, FilterParams};
use crate::ops::sliders::{contrast_from_slider, depth_from_slider, gamma_from_slider};
use crate::ops::transform::{Interpolation, Roi, TransformRequest};
use crate::settings::PipelineSettings;
use crate::worker::{ToolKind, ToolRequest, ToolSupervisor, WorkerEvent};

/// Longest a single tool step may take before the file is abandoned.
const STEP_TIMEOUT: Duration = Duration::from_secs(600);

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// PhotoFE headless photo editor.
#[derive(Parser, Debug)]
#[command(
    name = "photofe",
    about = "PhotoFE headless batch photo editor",
    long_about = "Apply tone, filter and geometric edits to image files without a GUI.\n\
                  Reads anything the image library decodes; writes JPEG, PNG and WebP.\n\n\
                  Example:\n  \
                  photofe -i photo.jpg --brightness 20 --contrast 120 -o out.jpg\n  \
                  photofe -i *.png --filter edge:canny:1 --output-dir edges/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: jpeg, png, webp. Inferred from --output when omitted,
    /// defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    // -- Adjustments (raw slider values) ------------------------------------
    /// Brightness offset.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true, value_name = "-255..255")]
    pub brightness: i32,

    /// Contrast slider; 100 is neutral.
    #[arg(long, default_value_t = 100, value_name = "10..190")]
    pub contrast: i32,

    /// Posterization depth slider; 255 disables posterization.
    #[arg(long, default_value_t = 255, value_name = "0..255")]
    pub depth: i32,

    /// Hue rotation in hue steps (2 degrees each).
    #[arg(long, default_value_t = 0, allow_hyphen_values = true, value_name = "-180..180")]
    pub hue: i32,

    /// Saturation offset.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true, value_name = "-255..255")]
    pub saturation: i32,

    /// Intensity (lightness) offset.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true, value_name = "-255..255")]
    pub intensity: i32,

    /// Gamma slider; 0 is neutral.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true, value_name = "-100..100")]
    pub gamma: i32,

    /// Highlight lift (positive) or pull-down (negative).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub highlight: f32,

    /// Shadow lift (positive) or crush (negative).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub shadow: f32,

    /// Convert to grayscale.
    #[arg(long)]
    pub grayscale: bool,

    // -- Filter -------------------------------------------------------------
    /// Convolution filter as op:kind[:weight], e.g. smooth:median:30,
    /// sharpen:unsharp:50, edge:sobel:1.
    #[arg(long, value_name = "OP:KIND[:WEIGHT]")]
    pub filter: Option<String>,

    // -- Geometry -----------------------------------------------------------
    /// Crop rectangle x0,y0,x1,y1 (end exclusive).
    #[arg(long, value_name = "X0,Y0,X1,Y1")]
    pub crop: Option<String>,

    /// Rotate counter-clockwise by this many degrees.
    #[arg(long, allow_hyphen_values = true, value_name = "DEGREES")]
    pub rotate: Option<f64>,

    /// After rotating, trim the black corners.
    #[arg(long)]
    pub auto_crop: bool,

    /// Resample to WIDTHxHEIGHT.
    #[arg(long, value_name = "WxH")]
    pub scale: Option<String>,

    /// Resampling: nearest, bilinear, bicubic, lanczos3.
    #[arg(long, default_value = "bilinear", value_name = "METHOD")]
    pub interpolation: String,

    // -- Codec options ------------------------------------------------------
    /// JPEG quality (0–100).
    #[arg(short, long, default_value_t = 95, value_name = "0-100")]
    pub quality: u8,

    /// JPEG restart interval (0–65535).
    #[arg(long, default_value_t = 0)]
    pub restart_interval: u32,

    /// Request progressive JPEG.
    #[arg(long)]
    pub progressive: bool,

    /// Request optimised JPEG Huffman tables.
    #[arg(long)]
    pub optimize: bool,

    /// PNG compression level (0–9).
    #[arg(long, default_value_t = 3, value_name = "0-9")]
    pub png_compression: u8,

    /// PNG strategy: default, filtered, huffman, rle, fixed.
    #[arg(long, default_value = "default", value_name = "STRATEGY")]
    pub png_strategy: String,

    /// Write PNG as 1-bit black and white.
    #[arg(long)]
    pub bilevel: bool,

    /// WebP quality (1–100).
    #[arg(long, default_value_t = 100, value_name = "1-100")]
    pub webp_quality: u8,

    // -- Diagnostics --------------------------------------------------------
    /// Print per-file timing and mirror warnings to stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Session log level: off, error, warn, info, debug, trace.
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    pub log_level: String,
}

impl CliArgs {
    /// `--log-level` as a filter; unknown names fall back to `info`.
    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

// ============================================================================
// Edit plan
// ============================================================================

/// The ordered tool steps for one file: adjust, then filter, then the
/// geometric transforms (crop, rotate, scale).
#[derive(Clone, Debug, Default)]
pub struct EditPlan {
    pub adjust: Option<AdjustParams>,
    pub filter: Option<FilterParams>,
    pub transforms: Vec<TransformRequest>,
}

impl EditPlan {
    pub fn from_args(args: &CliArgs) -> Result<Self, String> {
        let params = AdjustParams {
            brightness: args.brightness.clamp(-255, 255) as f32,
            contrast: contrast_from_slider(args.contrast),
            depth: depth_from_slider(args.depth),
            hue: args.hue as f32,
            saturation: args.saturation.clamp(-255, 255) as f32,
            intensity: args.intensity.clamp(-255, 255) as f32,
            gamma: gamma_from_slider(args.gamma),
            highlight: args.highlight,
            shadow: args.shadow,
            color_mode: if args.grayscale { ColorMode::Grayscale } else { ColorMode::Color },
        };
        let adjust = (params != AdjustParams::default()).then_some(params);

        let filter = args.filter.as_deref().map(parse_filter).transpose()?;

        let mut transforms = Vec::new();
        if let Some(text) = &args.crop {
            let roi = Roi::parse(text).map_err(|e| format!("--crop: {}", e))?;
            transforms.push(TransformRequest::Crop(roi));
        }
        if let Some(degrees) = args.rotate {
            if !degrees.is_finite() {
                return Err(format!("--rotate: invalid angle {}", degrees));
            }
            transforms.push(TransformRequest::Rotate { degrees, auto_crop: args.auto_crop });
        }
        if let Some(text) = &args.scale {
            let (width, height) = parse_scale(text)?;
            transforms.push(TransformRequest::Scale { width, height });
        }

        Ok(Self { adjust, filter, transforms })
    }

    pub fn is_empty(&self) -> bool {
        self.adjust.is_none() && self.filter.is_none() && self.transforms.is_empty()
    }

    fn requests(&self) -> Vec<ToolRequest> {
        let mut out = Vec::new();
        if let Some(p) = self.adjust {
            out.push(ToolRequest::Adjust(p));
        }
        if let Some(p) = self.filter {
            out.push(ToolRequest::Filter(p));
        }
        out.extend(self.transforms.iter().copied().map(ToolRequest::Transform));
        out
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Entry point for the binary. Exits with failure if any single file failed;
/// the remaining files are still processed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: none of the inputs exist or match a file");
        return ExitCode::FAILURE;
    }
    if args.output.is_some() && args.output_dir.is_none() && inputs.len() > 1 {
        eprintln!(
            "error: --output names one file but {} inputs were given; use --output-dir for batches",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let prepared = parse_format(args.format.as_deref(), args.output.as_deref())
        .and_then(|format| Ok((format, save_options(&args, format)?)))
        .and_then(|(format, options)| Ok((format, options, EditPlan::from_args(&args)?)))
        .and_then(|(format, options, plan)| {
            let interpolation = Interpolation::parse(&args.interpolation)
                .ok_or_else(|| format!("unknown interpolation '{}'", args.interpolation))?;
            Ok((format, options, plan, interpolation))
        });
    let (save_format, options, plan, interpolation) = match prepared {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let settings = PipelineSettings { interpolation, ..PipelineSettings::default() };

    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("error: cannot create {}: {}", dir.display(), e);
            return ExitCode::FAILURE;
        }
    }

    let total = inputs.len();
    let report = args.verbose || total > 1;
    let mut failures = 0usize;

    for (n, input) in inputs.iter().enumerate() {
        if report {
            println!("({}/{}) {}", n + 1, total, input.display());
        }
        let started = Instant::now();

        let result = build_output_path(input, args.output.as_deref(), args.output_dir.as_deref(), save_format)
            .ok_or_else(|| "input has no file name".to_string())
            .and_then(|output| {
                process_file(input, &output, &plan, &options, &settings).map(|()| output)
            });

        match result {
            Ok(output) if report => {
                println!("  saved {} in {} ms", output.display(), started.elapsed().as_millis());
            }
            Ok(_) => {}
            Err(e) => {
                log::error!("{}: {}", input.display(), e);
                eprintln!("  {}: {}", input.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        log::warn!("{} of {} files failed", failures, total);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

/// Load `input`, run every step of `plan` through the tool workers, and save
/// master to `output`.
pub fn process_file(
    input: &Path,
    output: &Path,
    plan: &EditPlan,
    options: &SaveOptions,
    settings: &PipelineSettings,
) -> Result<(), String> {
    let canvas = SharedCanvas::new();
    let (mut supervisor, events) = ToolSupervisor::new(canvas.clone(), settings.clone());

    // Load.
    let (width, height) =
        load_into(&canvas, input, settings.lock_poll, || {}).map_err(|e| format!("load failed: {}", e))?;
    supervisor.notify_buffers_changed();

    // Edit: every step goes through its tool worker and is applied.
    let mut dims = (width, height);
    for request in plan.requests() {
        if let ToolRequest::Transform(TransformRequest::Crop(roi)) = &request {
            roi.validate(dims.0, dims.1).map_err(|e| format!("--crop: {}", e))?;
        }
        run_step(&mut supervisor, &events, request)?;
        if let Some(master) = canvas.master_snapshot() {
            dims = master.dimensions();
        }
    }
    for kind in ToolKind::all() {
        supervisor.hide(*kind, || {});
    }

    // Save.
    save_master(&canvas, output, options, settings.lock_poll, || {}).map_err(|e| format!("save failed: {}", e))
}

/// Show the tool, publish `request`, wait for its preview, then apply.
pub fn run_step(
    supervisor: &mut ToolSupervisor,
    events: &Receiver<WorkerEvent>,
    request: ToolRequest,
) -> Result<(), String> {
    let kind = request.kind();
    supervisor.show(kind, || {}).map_err(|e| format!("could not start {} worker: {}", kind.label(), e))?;
    if !supervisor.publish(request) {
        return Err(format!("{} tool is not running", kind.label()));
    }

    loop {
        match events.recv_timeout(STEP_TIMEOUT) {
            Ok(WorkerEvent::PreviewReady { tool }) if tool == kind => break,
            Ok(WorkerEvent::Warning { tool, message }) if tool == kind => {
                supervisor.cancel(kind, || {});
                return Err(format!("{} failed: {}", kind.label(), message));
            }
            Ok(WorkerEvent::Status { tool, text }) if tool == kind => {
                if text == EngineStatus::NotAttached.message() {
                    supervisor.cancel(kind, || {});
                    return Err(text);
                }
                log::debug!("{} status: {:?}", kind.label(), text);
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                supervisor.cancel(kind, || {});
                return Err(format!("{} timed out", kind.label()));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(format!("{} worker channel closed", kind.label()));
            }
        }
    }

    if !supervisor.apply(kind, || {}) {
        return Err(format!("{} could not be applied: no image loaded", kind.label()));
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Literal paths are taken as-is; anything else is expanded as a glob.
/// Order of first appearance is kept and duplicates are dropped.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    fn push_unique(files: &mut Vec<PathBuf>, path: PathBuf) {
        if !files.contains(&path) {
            files.push(path);
        }
    }

    let mut files: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let literal = PathBuf::from(pattern);
        if literal.exists() {
            push_unique(&mut files, literal);
            continue;
        }
        let entries = match glob::glob(pattern) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("ignoring malformed glob {:?}: {}", pattern, e);
                eprintln!("warning: bad input pattern {:?}: {}", pattern, e);
                continue;
            }
        };
        let before = files.len();
        for path in entries.flatten() {
            push_unique(&mut files, path);
        }
        if files.len() == before {
            eprintln!("warning: nothing matches {:?}", pattern);
        }
    }

    files
}

/// `--format` wins; otherwise the output extension; otherwise PNG.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> Result<SaveFormat, String> {
    if let Some(f) = format_arg {
        return SaveFormat::from_extension(f).ok_or_else(|| format!("unsupported format '{}'", f));
    }
    match output {
        Some(out) => SaveFormat::from_path(out).map_err(|e| e.to_string()),
        None => Ok(SaveFormat::Png),
    }
}

fn save_options(args: &CliArgs, format: SaveFormat) -> Result<SaveOptions, String> {
    let options = match format {
        SaveFormat::Jpeg => SaveOptions::Jpeg(JpegOptions {
            quality: args.quality,
            restart_interval: args.restart_interval,
            progressive: args.progressive,
            optimize: args.optimize,
        }),
        SaveFormat::Png => SaveOptions::Png(PngOptions {
            compression: args.png_compression,
            strategy: PngStrategy::parse(&args.png_strategy)
                .ok_or_else(|| format!("unknown PNG strategy '{}'", args.png_strategy))?,
            bilevel: args.bilevel,
        }),
        SaveFormat::Webp => SaveOptions::Webp(WebpOptions { quality: args.webp_quality }),
    };
    options.validate().map_err(|e| e.to_string())?;
    Ok(options)
}

/// `op:kind[:weight]`; weight defaults to 50 for smooth/sharpen and 1 for
/// edge detection.
pub fn parse_filter(text: &str) -> Result<FilterParams, String> {
    let mut parts = text.splitn(3, ':');
    let op = parts.next().unwrap_or_default();
    let kind = parts.next().ok_or_else(|| format!("--filter: expected op:kind[:weight], got '{}'", text))?;
    let kind = FilterKind::parse(&format!("{}:{}", op, kind))
        .ok_or_else(|| format!("--filter: unknown filter '{}:{}'", op, kind))?;
    let weight = match parts.next() {
        Some(w) => w.trim().parse::<u32>().map_err(|_| format!("--filter: bad weight '{}'", w))?,
        None if matches!(kind, FilterKind::Edge(_)) => 1,
        None => 50,
    };
    Ok(FilterParams { kind, weight })
}

/// `WIDTHxHEIGHT`, both positive.
pub fn parse_scale(text: &str) -> Result<(u32, u32), String> {
    let (w, h) = text
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("--scale: expected WIDTHxHEIGHT, got '{}'", text))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("--scale: bad width '{}'", w))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("--scale: bad height '{}'", h))?;
    if w == 0 || h == 0 {
        return Err(format!("--scale: {}x{} has no area", w, h));
    }
    Ok((w, h))
}

/// Destination for one input: `--output` verbatim, else `<dir>/<stem>.<ext>`
/// under `--output-dir`, else next to the input. A result that would
/// overwrite the input gets an `_out` suffix.
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>, format: SaveFormat) -> Option<PathBuf> {
    if let Some(explicit) = output {
        return Some(explicit.to_path_buf());
    }

    let stem = input.file_stem()?.to_string_lossy();
    let file_name = |suffix: &str| format!("{}{}.{}", stem, suffix, format.extension());

    match output_dir {
        Some(dir) => Some(dir.join(file_name(""))),
        None => {
            let beside = input.with_file_name(file_name(""));
            if beside == input {
                Some(input.with_file_name(file_name("_out")))
            } else {
                Some(beside)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::filters::{EdgeKind, SmoothKind};

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["photofe", "-i", "in.png"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_make_an_empty_plan() {
        let plan = EditPlan::from_args(&args(&[])).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn log_level_names() {
        assert_eq!(args(&["--log-level", "debug"]).log_level_filter(), log::LevelFilter::Debug);
        assert_eq!(args(&["--log-level", "chatty"]).log_level_filter(), log::LevelFilter::Info);
        assert_eq!(args(&[]).log_level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn slider_flags_map_through_slider_curves() {
        let plan = EditPlan::from_args(&args(&["--contrast", "190", "--gamma", "-100", "--grayscale"])).unwrap();
        let p = plan.adjust.unwrap();
        assert_eq!(p.contrast, contrast_from_slider(190));
        assert_eq!(p.gamma, gamma_from_slider(-100));
        assert_eq!(p.color_mode, ColorMode::Grayscale);
        assert_eq!(p.brightness, 0.0);
    }

    #[test]
    fn negative_values_parse() {
        let plan = EditPlan::from_args(&args(&["--brightness", "-40", "--rotate", "-30"])).unwrap();
        assert_eq!(plan.adjust.unwrap().brightness, -40.0);
        assert_eq!(plan.transforms, vec![TransformRequest::Rotate { degrees: -30.0, auto_crop: false }]);
    }

    #[test]
    fn transforms_are_ordered_crop_rotate_scale() {
        let plan = EditPlan::from_args(&args(&["--scale", "10x20", "--rotate", "5", "--auto-crop", "--crop", "0,0,8,8"]))
            .unwrap();
        assert_eq!(
            plan.transforms,
            vec![
                TransformRequest::Crop(Roi::new(0, 0, 8, 8)),
                TransformRequest::Rotate { degrees: 5.0, auto_crop: true },
                TransformRequest::Scale { width: 10, height: 20 },
            ]
        );
    }

    #[test]
    fn malformed_crop_is_rejected_before_any_work() {
        let err = EditPlan::from_args(&args(&["--crop", "1,2,x,4"])).unwrap_err();
        assert!(err.contains("Invalid"), "{}", err);
    }

    #[test]
    fn filter_spec_parsing() {
        assert_eq!(
            parse_filter("smooth:median:30").unwrap(),
            FilterParams { kind: FilterKind::Smooth(SmoothKind::Median), weight: 30 }
        );
        assert_eq!(parse_filter("edge:canny").unwrap().kind, FilterKind::Edge(EdgeKind::Canny));
        assert_eq!(parse_filter("edge:canny").unwrap().weight, 1);
        assert!(parse_filter("smooth").is_err());
        assert!(parse_filter("smooth:wobbly").is_err());
        assert!(parse_filter("smooth:box:lots").is_err());
    }

    #[test]
    fn scale_spec_parsing() {
        assert_eq!(parse_scale("800x600").unwrap(), (800, 600));
        assert_eq!(parse_scale("8X6").unwrap(), (8, 6));
        assert!(parse_scale("0x600").is_err());
        assert!(parse_scale("800").is_err());
    }

    #[test]
    fn format_and_options() {
        assert_eq!(parse_format(None, Some(Path::new("a.jpg"))).unwrap(), SaveFormat::Jpeg);
        assert_eq!(parse_format(Some("webp"), Some(Path::new("a.jpg"))).unwrap(), SaveFormat::Webp);
        assert_eq!(parse_format(None, None).unwrap(), SaveFormat::Png);
        assert!(parse_format(Some("bmp"), None).is_err());

        let a = args(&["--png-strategy", "rle", "--png-compression", "9", "--bilevel"]);
        assert_eq!(
            save_options(&a, SaveFormat::Png).unwrap(),
            SaveOptions::Png(PngOptions { compression: 9, strategy: PngStrategy::Rle, bilevel: true })
        );
        assert!(save_options(&args(&["--png-compression", "12"]), SaveFormat::Png).is_err());
        assert!(save_options(&args(&["--webp-quality", "0"]), SaveFormat::Webp).is_err());
    }

    #[test]
    fn output_path_rules() {
        let input = Path::new("dir/photo.png");
        assert_eq!(
            build_output_path(input, None, Some(Path::new("out")), SaveFormat::Jpeg),
            Some(PathBuf::from("out/photo.jpg"))
        );
        assert_eq!(build_output_path(input, None, None, SaveFormat::Png), Some(PathBuf::from("dir/photo_out.png")));
        assert_eq!(build_output_path(input, None, None, SaveFormat::Webp), Some(PathBuf::from("dir/photo.webp")));
    }
}
