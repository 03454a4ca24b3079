use std::sync::mpsc::Receiver;
use std::time::Duration;

use photofe::cli::{EditPlan, process_file, run_step};
use photofe::io::{PngOptions, SaveFormat, SaveOptions, decode_image, encode_and_write};
use photofe::ops::adjustments::AdjustParams;
use photofe::ops::filters::{EdgeKind, FilterKind, FilterParams, SmoothKind};
use photofe::ops::sliders::{depth_from_slider, gamma_from_slider};
use photofe::ops::transform::{Roi, TransformRequest};
use photofe::{PipelineSettings, Raster, SharedCanvas, ToolKind, ToolRequest, ToolSupervisor, WorkerEvent};

fn supervisor_with(raster: Raster) -> (SharedCanvas, ToolSupervisor, Receiver<WorkerEvent>) {
    let canvas = SharedCanvas::new();
    let (mut sup, rx) = ToolSupervisor::new(canvas.clone(), PipelineSettings::default());
    sup.attach_image(raster, || {});
    (canvas, sup, rx)
}

fn preview_after(sup: &mut ToolSupervisor, rx: &Receiver<WorkerEvent>, canvas: &SharedCanvas, request: ToolRequest) -> Raster {
    let kind = request.kind();
    sup.show(kind, || {}).unwrap();
    assert!(sup.publish(request));
    loop {
        match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
            WorkerEvent::PreviewReady { tool } if tool == kind => break,
            WorkerEvent::Warning { message, .. } => panic!("warning: {}", message),
            _ => {}
        }
    }
    canvas.preview_snapshot().unwrap()
}

fn textured(w: u32, h: u32) -> Raster {
    let mut r = Raster::new(w, h, 3);
    r.par_rows_mut(|y, row| {
        for (x, px) in row.chunks_exact_mut(3).enumerate() {
            px.copy_from_slice(&[(x * 5 % 256) as u8, (y * 3 % 256) as u8, ((x ^ y) % 256) as u8]);
        }
    });
    r
}

#[test]
fn solid_red_brightness_shift() {
    let (canvas, mut sup, rx) = supervisor_with(Raster::filled(4, 4, [255, 0, 0]));
    let params = AdjustParams { brightness: 10.0, contrast: 1.0, ..AdjustParams::default() };
    let preview = preview_after(&mut sup, &rx, &canvas, ToolRequest::Adjust(params));
    assert_eq!(preview, Raster::filled(4, 4, [255, 10, 10]));
    // Master is untouched until apply.
    assert_eq!(canvas.master_snapshot().unwrap(), Raster::filled(4, 4, [255, 0, 0]));
}

#[test]
fn full_depth_is_a_no_op_and_posterize_then_restore() {
    let original = textured(100, 100);
    let (canvas, mut sup, rx) = supervisor_with(original.clone());

    let coarse = AdjustParams { depth: depth_from_slider(128), ..AdjustParams::default() };
    let posterized = preview_after(&mut sup, &rx, &canvas, ToolRequest::Adjust(coarse));
    assert_ne!(posterized, original);

    let full = AdjustParams { depth: depth_from_slider(255), ..AdjustParams::default() };
    let restored = preview_after(&mut sup, &rx, &canvas, ToolRequest::Adjust(full));
    assert_eq!(restored, original);
}

#[test]
fn gamma_and_shadow_combine_on_lightness() {
    let (canvas, mut sup, rx) = supervisor_with(Raster::filled(8, 8, [100, 100, 100]));
    // Slider -75 is gamma 0.5: 255 * (100/255)^2 = 39.2, plus a shadow lift of 20 - 2^4 = 4.
    let params = AdjustParams { gamma: gamma_from_slider(-75), shadow: 20.0, ..AdjustParams::default() };
    assert_eq!(params.gamma, 0.5);
    let preview = preview_after(&mut sup, &rx, &canvas, ToolRequest::Adjust(params));
    assert_eq!(preview, Raster::filled(8, 8, [43, 43, 43]));
}

#[test]
fn minimum_weight_smoothing_keeps_flat_field() {
    let flat = Raster::filled(64, 48, [33, 66, 99]);
    for kind in [SmoothKind::Average, SmoothKind::Gaussian, SmoothKind::Median] {
        let (canvas, mut sup, rx) = supervisor_with(flat.clone());
        let params = FilterParams { kind: FilterKind::Smooth(kind), weight: 1 };
        assert_eq!(preview_after(&mut sup, &rx, &canvas, ToolRequest::Filter(params)), flat);
    }
}

#[test]
fn canny_on_flat_field_is_all_zero() {
    let (canvas, mut sup, rx) = supervisor_with(Raster::filled(64, 48, [120, 120, 120]));
    let params = FilterParams { kind: FilterKind::Edge(EdgeKind::Canny), weight: 1 };
    let preview = preview_after(&mut sup, &rx, &canvas, ToolRequest::Filter(params));
    assert_eq!(preview.dimensions(), (64, 48));
    assert!(preview.as_raw().iter().all(|&v| v == 0));
}

#[test]
fn chained_steps_apply_into_master() {
    let (canvas, mut sup, rx) = supervisor_with(textured(40, 30));

    run_step(&mut sup, &rx, ToolRequest::Transform(TransformRequest::Crop(Roi::new(30, 20, 10, 5)))).unwrap();
    assert_eq!(canvas.master_snapshot().unwrap().dimensions(), (20, 15));

    run_step(&mut sup, &rx, ToolRequest::Transform(TransformRequest::Rotate { degrees: 90.0, auto_crop: false }))
        .unwrap();
    assert_eq!(canvas.master_snapshot().unwrap().dimensions(), (15, 20));

    run_step(&mut sup, &rx, ToolRequest::Adjust(AdjustParams { brightness: 5.0, ..AdjustParams::default() })).unwrap();
    run_step(&mut sup, &rx, ToolRequest::Transform(TransformRequest::Scale { width: 30, height: 40 })).unwrap();
    assert_eq!(canvas.master_snapshot().unwrap().dimensions(), (30, 40));

    // Each apply leaves preview equal to master.
    assert_eq!(canvas.preview_snapshot(), canvas.master_snapshot());
    assert_ne!(sup.state(ToolKind::Adjust), photofe::WorkerState::Running);
}

#[test]
fn headless_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    encode_and_write(&Raster::filled(16, 12, [255, 0, 0]), &input, &SaveOptions::defaults_for(SaveFormat::Png))
        .unwrap();

    let plan = EditPlan {
        adjust: Some(AdjustParams { brightness: 10.0, ..AdjustParams::default() }),
        filter: Some(FilterParams { kind: FilterKind::Smooth(SmoothKind::Gaussian), weight: 100 }),
        transforms: vec![TransformRequest::Crop(Roi::new(2, 2, 10, 8))],
    };
    process_file(&input, &output, &plan, &SaveOptions::Png(PngOptions::default()), &PipelineSettings::default())
        .unwrap();

    assert_eq!(decode_image(&output).unwrap(), Raster::filled(8, 6, [255, 10, 10]));
}

#[test]
fn out_of_bounds_crop_fails_before_saving() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    encode_and_write(&Raster::filled(8, 8, [1, 2, 3]), &input, &SaveOptions::defaults_for(SaveFormat::Png)).unwrap();

    let plan = EditPlan { transforms: vec![TransformRequest::Crop(Roi::new(0, 0, 9, 8))], ..EditPlan::default() };
    let err = process_file(&input, &output, &plan, &SaveOptions::defaults_for(SaveFormat::Png), &PipelineSettings::default())
        .unwrap_err();
    assert!(err.contains("Invalid"), "{}", err);
    assert!(!output.exists());
}

#[test]
fn missing_input_reports_load_failure() {
    let dir = tempfile::tempdir().unwrap();
    let err = process_file(
        &dir.path().join("nope.png"),
        &dir.path().join("out.png"),
        &EditPlan::default(),
        &SaveOptions::defaults_for(SaveFormat::Png),
        &PipelineSettings::default(),
    )
    .unwrap_err();
    assert!(err.starts_with("load failed"), "{}", err);
}
