//! detect_webcam - live detection on a camera stream
//!
//! Type `s` + Enter to save the current annotated frame, `q` + Enter (or Ctrl-C)
//! to quit.

use anyhow::{Context, Result};
use clap::Parser;
use image::RgbImage;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use detr_vision::config::VisionConfig;
use detr_vision::detect::{load_backend, DetectionPipeline};
use detr_vision::ingest::{self, CameraSession};
use detr_vision::live::{Command, FrameSaver, FrameSink, LiveLoop, LiveOptions};
use detr_vision::render::ColorAssigner;
use detr_vision::DetectionSet;

const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera index (`/dev/video<N>`).
    #[arg(long)]
    camera_id: Option<u32>,
    /// Camera selector overriding the index: a device node or `stub://<name>`.
    #[arg(long, env = "DETR_VISION_DEVICE")]
    device: Option<String>,
    /// Requested capture width.
    #[arg(long)]
    width: Option<u32>,
    /// Requested capture height.
    #[arg(long)]
    height: Option<u32>,
    /// Minimum confidence for a detection to be kept.
    #[arg(long)]
    threshold: Option<f32>,
    /// Minimum confidence for a detection to be drawn [default: the threshold].
    #[arg(long)]
    display_threshold: Option<f32>,
    /// Save every annotated frame into this directory.
    #[arg(long)]
    save_path: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Warm-up delay after opening the camera, in milliseconds.
    #[arg(long)]
    warmup_ms: Option<u64>,
    /// ONNX model file (overrides config).
    #[arg(long)]
    model: Option<PathBuf>,
    /// Do not draw the FPS readout.
    #[arg(long)]
    no_fps: bool,
}

/// Prints label counts whenever they change.
#[derive(Default)]
struct ConsoleSink {
    frames: u64,
    last_counts: Vec<(String, usize)>,
}

impl FrameSink for ConsoleSink {
    fn present(&mut self, _frame: &RgbImage, detections: &DetectionSet) {
        self.frames += 1;
        let counts = detections.label_counts();
        if counts != self.last_counts {
            let summary: Vec<String> = counts
                .iter()
                .map(|(label, n)| format!("{} {}", n, label))
                .collect();
            if summary.is_empty() {
                println!("frame {}: nothing detected", self.frames);
            } else {
                println!("frame {}: {}", self.frames, summary.join(", "));
            }
            self.last_counts = counts;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = VisionConfig::load()?;

    let mut camera = config.camera_config();
    if let Some(index) = args.camera_id {
        camera.index = index;
    }
    if let Some(width) = args.width {
        camera.width = width;
    }
    if let Some(height) = args.height {
        camera.height = height;
    }
    if let Some(ms) = args.warmup_ms {
        camera.warmup = Duration::from_millis(ms);
    }
    let selector = args.device.unwrap_or_else(|| config.camera.device.clone());

    let threshold = args
        .threshold
        .or(config.threshold)
        .unwrap_or(DEFAULT_THRESHOLD);
    let options = LiveOptions {
        threshold,
        display_threshold: args
            .display_threshold
            .or(config.display_threshold)
            .unwrap_or(threshold),
        max_frames: args.max_frames,
        show_fps: !args.no_fps,
    };
    let saver = match args.save_path {
        Some(dir) => FrameSaver::always(dir),
        None if config.always_save => FrameSaver::always(config.save_dir.clone()),
        None => FrameSaver::on_demand(config.save_dir.clone()),
    };

    let model = args.model.as_deref().or(config.model_path.as_deref());
    let mut pipeline = DetectionPipeline::new(load_backend(model, config.model_input)?);
    pipeline.warm_up()?;
    let renderer = config.renderer()?;
    let mut colors = ColorAssigner::new();

    let (tx, mut rx) = mpsc::channel();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Command::Quit);
    })
    .context("error setting Ctrl-C handler")?;
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "q" | "quit" => Command::Quit,
                "s" | "save" => Command::Save,
                _ => continue,
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    });

    let device = ingest::device_for(&selector)?;
    let mut session = CameraSession::new(device, camera);
    log::info!("press 's' + Enter to save a frame, 'q' + Enter or Ctrl-C to quit");

    let mut sink = ConsoleSink::default();
    let summary = LiveLoop::new(&mut pipeline, &renderer, &mut colors, options)
        .with_saver(saver)
        .run(&mut session, &mut sink, &mut rx);
    session.close();
    let summary = summary?;

    println!(
        "stopped ({:?}): {} frames, {} skipped, {} saved, last fps {}",
        summary.reason,
        summary.frames,
        summary.skipped,
        summary.saved,
        summary
            .last_fps
            .map(|fps| format!("{:.1}", fps))
            .unwrap_or_else(|| "n/a".to_string())
    );
    Ok(())
}
