//! detect_image - detect objects in one image and save the annotated result

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use detr_vision::codec;
use detr_vision::config::VisionConfig;
use detr_vision::detect::{load_backend, DetectionPipeline};
use detr_vision::render::ColorAssigner;
use detr_vision::ImageInput;

const DEFAULT_THRESHOLD: f32 = 0.7;
const DEFAULT_DISPLAY_THRESHOLD: f32 = 0.0;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file to process (or an http(s) URL with the `fetch` feature).
    image: String,
    /// Minimum confidence for a detection to be kept.
    #[arg(long)]
    threshold: Option<f32>,
    /// Minimum confidence for a kept detection to be drawn.
    #[arg(long)]
    display_threshold: Option<f32>,
    /// Where to write the annotated image [default: <save_dir>/result_<file name>].
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// ONNX model file (overrides config).
    #[arg(long)]
    model: Option<PathBuf>,
    /// Print detections as JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = VisionConfig::load()?;

    let threshold = args
        .threshold
        .or(config.threshold)
        .unwrap_or(DEFAULT_THRESHOLD);
    let display_threshold = args
        .display_threshold
        .or(config.display_threshold)
        .unwrap_or(DEFAULT_DISPLAY_THRESHOLD);

    let source = resolve_input(&args.image, &config.save_dir)?;
    let bytes =
        std::fs::read(&source).with_context(|| format!("failed to read {}", source.display()))?;
    let image = codec::decode_image(&bytes)
        .with_context(|| format!("failed to decode {}", source.display()))?;

    let model = args.model.as_deref().or(config.model_path.as_deref());
    let mut pipeline = DetectionPipeline::new(load_backend(model, config.model_input)?);
    let detections = pipeline.run(&ImageInput::image(&image), threshold)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&detections)?);
    } else {
        for record in &detections {
            let [x1, y1, x2, y2] = record.bbox();
            println!(
                "Detected {} with confidence {:.3} at location [{:.1}, {:.1}, {:.1}, {:.1}]",
                record.label(),
                record.score(),
                x1,
                y1,
                x2,
                y2
            );
        }
        for (label, count) in detections.label_counts() {
            println!("{}: {}", label, count);
        }
    }

    let renderer = config.renderer()?;
    let mut colors = ColorAssigner::new();
    let annotated = renderer.render(&image.to_rgb8(), &detections, display_threshold, &mut colors);

    let output = match args.output {
        Some(path) => path,
        None => default_output(&source, &config.save_dir),
    };
    codec::save_image(&annotated, &output)
        .with_context(|| format!("failed to save {}", output.display()))?;
    log::info!(
        "{} detections, result saved to {}",
        detections.len(),
        output.display()
    );
    Ok(())
}

fn default_output(source: &Path, save_dir: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string());
    save_dir.join(format!("result_{}", name))
}

#[cfg(feature = "fetch")]
fn resolve_input(input: &str, save_dir: &Path) -> Result<PathBuf> {
    if input.starts_with("http://") || input.starts_with("https://") {
        let name = input
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("download.jpg");
        let path = save_dir.join("downloads").join(name);
        codec::download_image(input, &path)?;
        return Ok(path);
    }
    Ok(PathBuf::from(input))
}

#[cfg(not(feature = "fetch"))]
fn resolve_input(input: &str, _save_dir: &Path) -> Result<PathBuf> {
    if input.starts_with("http://") || input.starts_with("https://") {
        anyhow::bail!("downloading {} requires the fetch feature", input);
    }
    Ok(PathBuf::from(input))
}
