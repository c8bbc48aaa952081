//! detect_api - HTTP detection service
//!
//! Serves `/health`, `/classes` and `POST /detect` until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use detr_vision::api::{ApiConfig, ApiServer};
use detr_vision::config::VisionConfig;
use detr_vision::detect::{load_backend, DetectionPipeline};
use detr_vision::render::ColorAssigner;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Listen address (overrides DETR_VISION_API_ADDR / config).
    #[arg(long)]
    addr: Option<String>,
    /// Threshold used when a request does not pass `?threshold=`.
    #[arg(long)]
    threshold: Option<f32>,
    /// Minimum confidence for a detection to be drawn on the returned image.
    #[arg(long)]
    display_threshold: Option<f32>,
    /// ONNX model file (overrides config).
    #[arg(long)]
    model: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = VisionConfig::load()?;

    let defaults = ApiConfig::default();
    let api_config = ApiConfig {
        addr: args.addr.unwrap_or_else(|| config.api_addr.clone()),
        max_body_bytes: config.api_max_body_bytes,
        default_threshold: args
            .threshold
            .or(config.threshold)
            .unwrap_or(defaults.default_threshold),
        display_threshold: args
            .display_threshold
            .or(config.display_threshold)
            .unwrap_or(defaults.display_threshold),
    };
    detr_vision::error::check_threshold(api_config.default_threshold)?;
    detr_vision::error::check_threshold(api_config.display_threshold)?;

    let model = args.model.as_deref().or(config.model_path.as_deref());
    let mut pipeline = DetectionPipeline::new(load_backend(model, config.model_input)?);
    pipeline.warm_up()?;

    let server = ApiServer::new(
        api_config,
        pipeline,
        config.renderer()?,
        ColorAssigner::new().shared(),
    );
    let api_handle = server.spawn()?;
    log::info!("detect_api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("detect_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;
    Ok(())
}
