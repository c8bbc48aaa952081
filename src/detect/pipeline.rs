//! Detection pipeline: normalize → resize to model space → detect → remap → filter.

use std::borrow::Cow;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{DetectionRecord, DetectionSet, RawDetections};
use crate::error::{check_threshold, Result, VisionError};
use crate::frame::ImageInput;

/// Turns caller images into coordinate-correct `DetectionSet`s.
///
/// Every `run` is a fresh inference; nothing is cached between calls.
pub struct DetectionPipeline<B: DetectorBackend = Box<dyn DetectorBackend>> {
    backend: B,
    filter: FilterType,
}

impl<B: DetectorBackend> DetectionPipeline<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            filter: FilterType::Triangle,
        }
    }

    /// Resampling filter used when shrinking to the model input size.
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Classes the underlying detector can report.
    pub fn class_names(&self) -> Vec<String> {
        self.backend.class_names()
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.backend.warm_up().map_err(VisionError::inference)
    }

    /// Detect objects in `input`, keeping only records with `score >= threshold`.
    ///
    /// Boxes come back in the pixel space of the caller's original image.
    pub fn run(&mut self, input: &ImageInput<'_>, threshold: f32) -> Result<DetectionSet> {
        let threshold = check_threshold(threshold)?;
        let rgb = input.to_rgb()?;
        let (orig_w, orig_h) = rgb.dimensions();

        let model_image: Cow<'_, RgbImage> = match self.backend.input_size() {
            Some((0, _)) | Some((_, 0)) => {
                return Err(VisionError::inference(anyhow::anyhow!(
                    "backend {} declares an empty input size",
                    self.backend.name()
                )));
            }
            Some((w, h)) if (w, h) != (orig_w, orig_h) => {
                Cow::Owned(imageops::resize(&rgb, w, h, self.filter))
            }
            _ => Cow::Borrowed(&rgb),
        };
        let (model_w, model_h) = model_image.dimensions();

        let raw = self
            .backend
            .detect(&model_image, threshold)
            .map_err(VisionError::inference)?;
        raw.check_aligned()?;

        let scale = Scale {
            x: orig_w as f32 / model_w as f32,
            y: orig_h as f32 / model_h as f32,
            max_x: orig_w as f32,
            max_y: orig_h as f32,
        };

        let mut set = DetectionSet::new((orig_w, orig_h));
        for ((label, score), bbox) in raw.labels.iter().zip(&raw.scores).zip(&raw.boxes) {
            if !score.is_finite() || *score < threshold {
                continue;
            }
            if *score > 1.0 {
                log::warn!("{}: dropping {} with score {}", self.backend.name(), label, score);
                continue;
            }
            let Some(mapped) = scale.apply(*bbox) else {
                log::debug!("{}: dropping degenerate box {:?}", self.backend.name(), bbox);
                continue;
            };
            set.push(DetectionRecord::new(label.clone(), *score, mapped)?);
        }

        log::debug!(
            "{}: {} raw -> {} kept (threshold {:.2}, {}x{} -> {}x{})",
            self.backend.name(),
            raw.len(),
            set.len(),
            threshold,
            model_w,
            model_h,
            orig_w,
            orig_h
        );
        Ok(set)
    }
}

/// Model-space → original-space mapping.
struct Scale {
    x: f32,
    y: f32,
    max_x: f32,
    max_y: f32,
}

impl Scale {
    fn apply(&self, bbox: [f32; 4]) -> Option<[f32; 4]> {
        if !bbox.iter().all(|v| v.is_finite()) {
            return None;
        }
        let x1 = (bbox[0] * self.x).clamp(0.0, self.max_x);
        let y1 = (bbox[1] * self.y).clamp(0.0, self.max_y);
        let x2 = (bbox[2] * self.x).clamp(0.0, self.max_x);
        let y2 = (bbox[3] * self.y).clamp(0.0, self.max_y);
        if x1 >= x2 || y1 >= y2 {
            return None;
        }
        Some([x1, y1, x2, y2])
    }
}
