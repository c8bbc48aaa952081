use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::CameraConfig;
use crate::render::{OverlayRenderer, OverlayStyle, TrueTypeFont};

const DEFAULT_MODEL_INPUT: u32 = 800;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_WARMUP_MS: u64 = 500;
const DEFAULT_SAVE_DIR: &str = "data/outputs";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8800";
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_FONT_PX: f32 = 16.0;

#[derive(Debug, Deserialize, Default)]
struct VisionConfigFile {
    model: Option<ModelConfigFile>,
    detection: Option<DetectionConfigFile>,
    camera: Option<CameraConfigFile>,
    output: Option<OutputConfigFile>,
    api: Option<ApiConfigFile>,
    font: Option<FontConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    threshold: Option<f32>,
    display_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    index: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    warmup_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    save_dir: Option<PathBuf>,
    always_save: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_body_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct FontConfigFile {
    path: Option<PathBuf>,
    size_px: Option<f32>,
}

/// Settings shared by the binaries.
///
/// Thresholds stay `None` unless configured so each entry point can apply its own
/// default (stills and the HTTP service are stricter than the webcam loop).
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub model_path: Option<PathBuf>,
    pub model_input: (u32, u32),
    pub threshold: Option<f32>,
    pub display_threshold: Option<f32>,
    pub camera: CameraSettings,
    pub save_dir: PathBuf,
    pub always_save: bool,
    pub api_addr: String,
    pub api_max_body_bytes: usize,
    pub font_path: Option<PathBuf>,
    pub font_size_px: f32,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// `stub://...` for a synthetic device, a device node path, or empty for
    /// `/dev/video<index>`.
    pub device: String,
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub warmup: Duration,
}

impl VisionConfig {
    /// Defaults, then the JSON file named by `DETR_VISION_CONFIG`, then
    /// `DETR_VISION_*` environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETR_VISION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VisionConfigFile) -> Self {
        let model = file.model.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let output = file.output.unwrap_or_default();
        let api = file.api.unwrap_or_default();
        let font = file.font.unwrap_or_default();

        Self {
            model_path: model.path,
            model_input: (
                model.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                model.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
            ),
            threshold: detection.threshold,
            display_threshold: detection.display_threshold,
            camera: CameraSettings {
                device: camera.device.unwrap_or_default(),
                index: camera.index.unwrap_or(0),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                warmup: Duration::from_millis(camera.warmup_ms.unwrap_or(DEFAULT_WARMUP_MS)),
            },
            save_dir: output
                .save_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_DIR)),
            always_save: output.always_save.unwrap_or(false),
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            api_max_body_bytes: api.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
            font_path: font.path,
            font_size_px: font.size_px.unwrap_or(DEFAULT_FONT_PX),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("DETR_VISION_MODEL") {
            if !path.trim().is_empty() {
                self.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(value) = std::env::var("DETR_VISION_THRESHOLD") {
            self.threshold = Some(parse_threshold("DETR_VISION_THRESHOLD", &value)?);
        }
        if let Ok(value) = std::env::var("DETR_VISION_DISPLAY_THRESHOLD") {
            self.display_threshold =
                Some(parse_threshold("DETR_VISION_DISPLAY_THRESHOLD", &value)?);
        }
        if let Ok(camera) = std::env::var("DETR_VISION_CAMERA") {
            let camera = camera.trim();
            if let Ok(index) = camera.parse::<u32>() {
                self.camera.index = index;
                self.camera.device.clear();
            } else if !camera.is_empty() {
                self.camera.device = camera.to_string();
            }
        }
        if let Ok(dir) = std::env::var("DETR_VISION_SAVE_DIR") {
            if !dir.trim().is_empty() {
                self.save_dir = PathBuf::from(dir);
            }
        }
        if let Ok(addr) = std::env::var("DETR_VISION_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(path) = std::env::var("DETR_VISION_FONT") {
            if !path.trim().is_empty() {
                self.font_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("threshold", self.threshold),
            ("display_threshold", self.display_threshold),
        ] {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) {
                    return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
                }
            }
        }
        if self.model_input.0 == 0 || self.model_input.1 == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.api_max_body_bytes == 0 {
            return Err(anyhow!("api max_body_bytes must be greater than zero"));
        }
        if !(self.font_size_px.is_finite() && self.font_size_px > 0.0) {
            return Err(anyhow!("font size must be positive"));
        }
        Ok(())
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            index: self.camera.index,
            width: self.camera.width,
            height: self.camera.height,
            warmup: self.camera.warmup,
        }
    }

    /// Overlay renderer with the configured font, or the built-in bitmap font.
    pub fn renderer(&self) -> Result<OverlayRenderer> {
        let renderer = OverlayRenderer::new(OverlayStyle::default());
        match &self.font_path {
            Some(path) => {
                let font = TrueTypeFont::load(path, self.font_size_px)?;
                Ok(renderer.with_font(Box::new(font)))
            }
            None => Ok(renderer),
        }
    }
}

fn parse_threshold(name: &str, value: &str) -> Result<f32> {
    value
        .trim()
        .parse::<f32>()
        .map_err(|_| anyhow!("{} must be a number", name))
}

fn read_config_file(path: &Path) -> Result<VisionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
