use anyhow::Result;
use image::RgbImage;
use std::sync::mpsc;
use std::time::Duration;

use detr_vision::detect::{DetectionPipeline, DetectorBackend, StubBackend};
use detr_vision::ingest::{self, CameraConfig, CameraSession, SessionState, SyntheticCamera};
use detr_vision::live::{
    Command, FrameSaver, FrameSink, LiveLoop, LiveOptions, NoControl, StopReason,
};
use detr_vision::render::{ColorAssigner, OverlayRenderer};
use detr_vision::DetectionSet;

#[derive(Default)]
struct CountingSink {
    frames: usize,
    labels: Vec<String>,
}

impl FrameSink for CountingSink {
    fn present(&mut self, _frame: &RgbImage, detections: &DetectionSet) {
        self.frames += 1;
        self.labels
            .extend(detections.iter().map(|r| r.label().to_string()));
    }
}

fn camera_config() -> CameraConfig {
    CameraConfig {
        index: 0,
        width: 64,
        height: 48,
        warmup: Duration::ZERO,
    }
}

#[test]
fn stub_device_runs_through_boxed_pipeline() -> Result<()> {
    let backend: Box<dyn DetectorBackend> = Box::new(
        StubBackend::new()
            .with_input_size(32, 32)
            .with_detection("person", 0.8, [4.0, 4.0, 16.0, 28.0]),
    );
    let mut pipeline: DetectionPipeline = DetectionPipeline::new(backend);
    let renderer = OverlayRenderer::default();
    let mut colors = ColorAssigner::with_seed(4);

    let mut session = CameraSession::new(ingest::device_for("stub://test")?, camera_config());
    let mut sink = CountingSink::default();
    let options = LiveOptions {
        max_frames: Some(6),
        ..LiveOptions::default()
    };
    let summary = LiveLoop::new(&mut pipeline, &renderer, &mut colors, options).run(
        &mut session,
        &mut sink,
        &mut NoControl,
    )?;

    assert_eq!(summary.reason, StopReason::FrameLimit);
    assert_eq!(summary.frames, 6);
    assert_eq!(sink.frames, 6);
    assert!(sink.labels.iter().all(|l| l == "person"));

    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    Ok(())
}

#[test]
fn channel_commands_save_then_quit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut pipeline = DetectionPipeline::new(StubBackend::new());
    let renderer = OverlayRenderer::default();
    let mut colors = ColorAssigner::with_seed(4);
    let mut session =
        CameraSession::new(SyntheticCamera::new().fail_after(50), camera_config());

    let (tx, mut rx) = mpsc::channel();
    tx.send(Command::Save)?;
    tx.send(Command::Quit)?;

    let summary = LiveLoop::new(&mut pipeline, &renderer, &mut colors, LiveOptions::default())
        .with_saver(FrameSaver::on_demand(dir.path().join("saved")))
        .run(&mut session, &mut CountingSink::default(), &mut rx)?;

    assert_eq!(summary.frames, 2);
    assert_eq!(summary.saved, 1);
    assert_eq!(summary.reason, StopReason::Quit);

    let saved: Vec<_> = std::fs::read_dir(dir.path().join("saved"))?
        .filter_map(|entry| entry.ok())
        .collect();
    assert_eq!(saved.len(), 1);
    let saved = detr_vision::codec::load_image(saved[0].path())?;
    assert_eq!(saved.dimensions(), (64, 48));
    Ok(())
}

#[test]
fn stream_ends_cleanly_when_device_fails() -> Result<()> {
    let mut session = CameraSession::new(SyntheticCamera::new().fail_after(2), camera_config());
    let frames = session.stream()?.count();
    assert_eq!(frames, 2);
    assert_eq!(session.frames_read(), 2);
    assert_eq!(session.stream()?.count(), 0);
    Ok(())
}
