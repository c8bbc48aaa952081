//! Live camera loop: read -> detect -> render -> present, with FPS tracking and
//! on-demand frame saving.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::codec;
use crate::detect::{DetectionPipeline, DetectionSet, DetectorBackend};
use crate::error::{check_threshold, Result};
use crate::ingest::{CameraDevice, CameraSession};
use crate::render::{ColorAssigner, OverlayRenderer};

/// Frames-per-second over fixed reporting windows.
#[derive(Clone, Debug)]
pub struct FpsCounter {
    window_start: Instant,
    frames: u32,
    interval: Duration,
    current: Option<f64>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            window_start: start,
            frames: 0,
            interval: Duration::from_secs(1),
            current: None,
        }
    }

    /// Count one frame at `now`. Returns the new rate when a window closes, after
    /// which counting restarts.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }
        let fps = self.frames as f64 / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = now;
        self.current = Some(fps);
        Some(fps)
    }

    /// Rate from the last closed window.
    pub fn current(&self) -> Option<f64> {
        self.current
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes annotated frames as timestamped JPEGs.
#[derive(Clone, Debug)]
pub struct FrameSaver {
    dir: PathBuf,
    always: bool,
}

impl FrameSaver {
    /// Save only on request.
    pub fn on_demand(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            always: false,
        }
    }

    /// Save every processed frame.
    pub fn always(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            always: true,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn saves_every_frame(&self) -> bool {
        self.always
    }

    /// Save `frame` as `detection_YYYYmmdd_HHMMSS_mmm.jpg`, adding `_N` if that name
    /// is taken.
    pub fn save(&self, frame: &RgbImage) -> Result<PathBuf> {
        let stem = format!(
            "detection_{}",
            chrono::Local::now().format("%Y%m%d_%H%M%S_%3f")
        );
        let mut path = self.dir.join(format!("{}.jpg", stem));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}_{}.jpg", stem, n));
            n += 1;
        }
        codec::save_image(frame, &path)?;
        Ok(path)
    }
}

/// Operator commands polled once per frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    Save,
}

pub trait ControlSource {
    /// Next pending command, without blocking.
    fn poll(&mut self) -> Option<Command>;
}

impl ControlSource for Receiver<Command> {
    fn poll(&mut self) -> Option<Command> {
        match self.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) => None,
            // Every sender is gone; nobody can ask to stop any more.
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// Control source that never issues commands.
pub struct NoControl;

impl ControlSource for NoControl {
    fn poll(&mut self) -> Option<Command> {
        None
    }
}

/// Receives every annotated frame.
pub trait FrameSink {
    fn present(&mut self, frame: &RgbImage, detections: &DetectionSet);
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    EndOfStream,
    FrameLimit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoopSummary {
    /// Frames read from the camera.
    pub frames: u64,
    /// Frames dropped because inference failed.
    pub skipped: u64,
    pub saved: u64,
    pub last_fps: Option<f64>,
    pub reason: StopReason,
}

#[derive(Clone, Debug)]
pub struct LiveOptions {
    pub threshold: f32,
    pub display_threshold: f32,
    pub max_frames: Option<u64>,
    pub show_fps: bool,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            display_threshold: 0.5,
            max_frames: None,
            show_fps: true,
        }
    }
}

/// Drives one camera session through the detection pipeline.
pub struct LiveLoop<'a, B: DetectorBackend> {
    pipeline: &'a mut DetectionPipeline<B>,
    renderer: &'a OverlayRenderer,
    colors: &'a mut ColorAssigner,
    saver: Option<FrameSaver>,
    options: LiveOptions,
}

impl<'a, B: DetectorBackend> LiveLoop<'a, B> {
    pub fn new(
        pipeline: &'a mut DetectionPipeline<B>,
        renderer: &'a OverlayRenderer,
        colors: &'a mut ColorAssigner,
        options: LiveOptions,
    ) -> Self {
        Self {
            pipeline,
            renderer,
            colors,
            saver: None,
            options,
        }
    }

    pub fn with_saver(mut self, saver: FrameSaver) -> Self {
        self.saver = Some(saver);
        self
    }

    /// Run until the stream ends, a `Quit` arrives or the frame limit is hit.
    ///
    /// A frame whose inference fails is logged and skipped. The session is left
    /// open; closing it is the owner's call.
    pub fn run<D: CameraDevice>(
        &mut self,
        session: &mut CameraSession<D>,
        sink: &mut dyn FrameSink,
        control: &mut dyn ControlSource,
    ) -> Result<LoopSummary> {
        let threshold = check_threshold(self.options.threshold)?;
        let display_threshold = check_threshold(self.options.display_threshold)?;

        let mut summary = LoopSummary {
            frames: 0,
            skipped: 0,
            saved: 0,
            last_fps: None,
            reason: StopReason::EndOfStream,
        };

        let stream = session.stream()?;
        let mut fps = FpsCounter::new();
        for frame in stream {
            summary.frames += 1;

            let detections = match self.pipeline.run(&frame.input(), threshold) {
                Ok(detections) => detections,
                Err(err) => {
                    log::warn!("frame {}: skipped: {}", summary.frames, err);
                    summary.skipped += 1;
                    match control.poll() {
                        Some(Command::Quit) => {
                            summary.reason = StopReason::Quit;
                            break;
                        }
                        Some(Command::Save) => {
                            log::warn!("frame {}: nothing to save", summary.frames);
                        }
                        None => {}
                    }
                    if self.limit_reached(summary.frames) {
                        summary.reason = StopReason::FrameLimit;
                        break;
                    }
                    continue;
                }
            };

            let rgb = frame.to_rgb_image();
            let mut annotated =
                self.renderer
                    .render(&rgb, &detections, display_threshold, self.colors);
            if let Some(rate) = fps.tick(Instant::now()) {
                log::debug!("fps {:.1}", rate);
                summary.last_fps = Some(rate);
            }
            if self.options.show_fps {
                self.renderer
                    .draw_fps(&mut annotated, fps.current().unwrap_or(0.0));
            }
            sink.present(&annotated, &detections);

            let command = control.poll();
            let wants_save = command == Some(Command::Save)
                || self.saver.as_ref().is_some_and(FrameSaver::saves_every_frame);
            if wants_save {
                match &self.saver {
                    Some(saver) => match saver.save(&annotated) {
                        Ok(path) => {
                            summary.saved += 1;
                            log::info!("saved {}", path.display());
                        }
                        Err(err) => log::error!("failed to save frame: {}", err),
                    },
                    None => log::warn!("save requested but no output directory is configured"),
                }
            }
            if command == Some(Command::Quit) {
                summary.reason = StopReason::Quit;
                break;
            }
            if self.limit_reached(summary.frames) {
                summary.reason = StopReason::FrameLimit;
                break;
            }
        }

        log::info!(
            "live loop stopped ({:?}): {} frames, {} skipped, {} saved",
            summary.reason,
            summary.frames,
            summary.skipped,
            summary.saved
        );
        Ok(summary)
    }

    fn limit_reached(&self, frames: u64) -> bool {
        self.options.max_frames.is_some_and(|max| frames >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::ingest::{CameraConfig, SessionState, SyntheticCamera};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<(u32, u32)>,
        detections: usize,
    }

    impl FrameSink for Recorder {
        fn present(&mut self, frame: &RgbImage, detections: &DetectionSet) {
            self.frames.push(frame.dimensions());
            self.detections += detections.len();
        }
    }

    struct Script(VecDeque<Option<Command>>);

    impl ControlSource for Script {
        fn poll(&mut self) -> Option<Command> {
            self.0.pop_front().flatten()
        }
    }

    fn session(frames: u64) -> CameraSession<SyntheticCamera> {
        CameraSession::new(
            SyntheticCamera::new().fail_after(frames),
            CameraConfig {
                index: 0,
                width: 32,
                height: 24,
                warmup: Duration::ZERO,
            },
        )
    }

    fn pipeline() -> DetectionPipeline<StubBackend> {
        DetectionPipeline::new(StubBackend::new().with_detection(
            "person",
            0.8,
            [2.0, 2.0, 20.0, 20.0],
        ))
    }

    #[test]
    fn runs_until_end_of_stream() -> Result<()> {
        let mut pipeline = pipeline();
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(1);
        let mut session = session(5);
        let mut sink = Recorder::default();

        let summary = LiveLoop::new(&mut pipeline, &renderer, &mut colors, LiveOptions::default())
            .run(&mut session, &mut sink, &mut NoControl)?;

        assert_eq!(summary.frames, 5);
        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert_eq!(sink.frames, vec![(32, 24); 5]);
        assert_eq!(sink.detections, 5);
        assert_eq!(session.state(), SessionState::Open);
        assert!(colors.get("person").is_some());
        Ok(())
    }

    #[test]
    fn quit_stops_after_current_frame() -> Result<()> {
        let mut pipeline = pipeline();
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(1);
        let mut session = session(100);
        let mut sink = Recorder::default();
        let mut control = Script(VecDeque::from(vec![None, None, Some(Command::Quit)]));

        let summary = LiveLoop::new(&mut pipeline, &renderer, &mut colors, LiveOptions::default())
            .run(&mut session, &mut sink, &mut control)?;

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.reason, StopReason::Quit);
        assert_eq!(sink.frames.len(), 3);
        Ok(())
    }

    #[test]
    fn save_command_writes_one_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut pipeline = pipeline();
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(1);
        let mut session = session(4);
        let mut control = Script(VecDeque::from(vec![None, Some(Command::Save)]));

        let summary = LiveLoop::new(&mut pipeline, &renderer, &mut colors, LiveOptions::default())
            .with_saver(FrameSaver::on_demand(dir.path()))
            .run(&mut session, &mut Recorder::default(), &mut control)?;

        assert_eq!(summary.saved, 1);
        let files: Vec<_> = std::fs::read_dir(dir.path())?.collect();
        assert_eq!(files.len(), 1);
        Ok(())
    }

    #[test]
    fn always_save_keeps_every_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut pipeline = pipeline();
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(1);
        let mut session = session(3);

        let summary = LiveLoop::new(&mut pipeline, &renderer, &mut colors, LiveOptions::default())
            .with_saver(FrameSaver::always(dir.path().join("frames")))
            .run(&mut session, &mut Recorder::default(), &mut NoControl)?;

        assert_eq!(summary.saved, 3);
        assert_eq!(std::fs::read_dir(dir.path().join("frames"))?.count(), 3);
        Ok(())
    }

    #[test]
    fn inference_failures_skip_frames() -> Result<()> {
        let mut pipeline = DetectionPipeline::new(StubBackend::new().failing("gpu on fire"));
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(1);
        let mut session = session(4);
        let mut sink = Recorder::default();

        let summary = LiveLoop::new(&mut pipeline, &renderer, &mut colors, LiveOptions::default())
            .run(&mut session, &mut sink, &mut NoControl)?;

        assert_eq!(summary.frames, 4);
        assert_eq!(summary.skipped, 4);
        assert!(sink.frames.is_empty());
        Ok(())
    }

    #[test]
    fn quit_is_honoured_while_inference_keeps_failing() -> Result<()> {
        let mut pipeline = DetectionPipeline::new(StubBackend::new().failing("boom"));
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(1);
        let mut session = session(1000);
        let mut sink = Recorder::default();
        let mut control = Script(VecDeque::from(vec![Some(Command::Quit)]));

        let summary = LiveLoop::new(&mut pipeline, &renderer, &mut colors, LiveOptions::default())
            .run(&mut session, &mut sink, &mut control)?;

        assert_eq!(summary.frames, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.reason, StopReason::Quit);
        assert!(sink.frames.is_empty());
        Ok(())
    }

    #[test]
    fn fps_window_starts_after_camera_warmup() -> Result<()> {
        let mut pipeline = pipeline();
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(1);
        let mut session = CameraSession::new(
            SyntheticCamera::new().fail_after(1),
            CameraConfig {
                index: 0,
                width: 32,
                height: 24,
                warmup: Duration::from_millis(1100),
            },
        );

        let summary = LiveLoop::new(&mut pipeline, &renderer, &mut colors, LiveOptions::default())
            .run(&mut session, &mut Recorder::default(), &mut NoControl)?;

        assert_eq!(summary.frames, 1);
        assert_eq!(summary.last_fps, None);
        Ok(())
    }

    #[test]
    fn frame_limit_stops_the_loop() -> Result<()> {
        let mut pipeline = pipeline();
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(1);
        let mut session = session(100);
        let options = LiveOptions {
            max_frames: Some(2),
            ..LiveOptions::default()
        };

        let summary = LiveLoop::new(&mut pipeline, &renderer, &mut colors, options).run(
            &mut session,
            &mut Recorder::default(),
            &mut NoControl,
        )?;

        assert_eq!(summary.frames, 2);
        assert_eq!(summary.reason, StopReason::FrameLimit);
        Ok(())
    }

    #[test]
    fn invalid_display_threshold_is_rejected() {
        let mut pipeline = pipeline();
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(1);
        let mut session = session(1);
        let options = LiveOptions {
            display_threshold: 2.0,
            ..LiveOptions::default()
        };

        let result = LiveLoop::new(&mut pipeline, &renderer, &mut colors, options).run(
            &mut session,
            &mut Recorder::default(),
            &mut NoControl,
        );
        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn fps_is_reported_per_window() {
        let start = Instant::now();
        let mut fps = FpsCounter::starting_at(start);
        assert_eq!(fps.tick(start + Duration::from_millis(300)), None);
        assert_eq!(fps.tick(start + Duration::from_millis(600)), None);
        let rate = fps.tick(start + Duration::from_millis(1000)).expect("window closed");
        assert!((rate - 3.0).abs() < 1e-9);
        assert_eq!(fps.current(), Some(rate));

        assert_eq!(fps.tick(start + Duration::from_millis(1500)), None);
        assert_eq!(fps.current(), Some(rate));
    }

    #[test]
    fn saver_never_overwrites() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let saver = FrameSaver::on_demand(dir.path());
        let frame = RgbImage::new(4, 4);
        let first = saver.save(&frame)?;
        let second = saver.save(&frame)?;
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
        let name = first.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("detection_") && name.ends_with(".jpg"));
        Ok(())
    }
}
