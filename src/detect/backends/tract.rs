#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::backends::coco;
use crate::detect::result::RawDetections;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Tract-based backend for DETR ONNX exports.
///
/// Expects a single `pixel_values` input of shape `1x3xHxW` and two outputs:
/// class logits `1xQx(C+1)` (last class is "no object") and normalized
/// `cx, cy, w, h` boxes `1xQx4`. Loads a local model file only.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for a fixed input size.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{})",
            model_path.display(),
            width,
            height
        );
        Ok(Self {
            model,
            width,
            height,
        })
    }

    fn build_input(&self, image: &RgbImage) -> Result<Tensor> {
        let (width, height) = image.dimensions();
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, channel, y, x)| {
                let value = image.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0;
                (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, threshold: f32) -> Result<RawDetections> {
        if outputs.len() < 2 {
            return Err(anyhow!(
                "expected logits and boxes outputs, model produced {}",
                outputs.len()
            ));
        }
        // Boxes are the output whose last axis is 4.
        let (logits, boxes) = if outputs[1].shape().last() == Some(&4) {
            (&outputs[0], &outputs[1])
        } else {
            (&outputs[1], &outputs[0])
        };
        let logits = logits
            .to_array_view::<f32>()
            .context("logits tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("logits tensor must be rank 3")?;
        let boxes = boxes
            .to_array_view::<f32>()
            .context("boxes tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("boxes tensor must be rank 3")?;

        let queries = logits.shape()[1];
        let classes = logits.shape()[2];
        if boxes.shape()[1] != queries || classes < 2 {
            return Err(anyhow!(
                "unexpected output shapes {:?} / {:?}",
                logits.shape(),
                boxes.shape()
            ));
        }

        let (w, h) = (self.width as f32, self.height as f32);
        let mut out = RawDetections::default();
        for q in 0..queries {
            let row = logits.slice(tract_ndarray::s![0, q, ..]);
            let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let denom: f32 = row.iter().map(|v| (v - max).exp()).sum();

            // Skip the trailing "no object" class.
            let (class_id, best) = row
                .iter()
                .take(classes - 1)
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |acc, (i, v)| {
                    if *v > acc.1 {
                        (i, *v)
                    } else {
                        acc
                    }
                });
            let score = (best - max).exp() / denom;
            if !score.is_finite() || score < threshold {
                continue;
            }

            let (cx, cy, bw, bh) = (
                boxes[[0, q, 0]],
                boxes[[0, q, 1]],
                boxes[[0, q, 2]],
                boxes[[0, q, 3]],
            );
            out.push(
                coco::label_for(class_id),
                score,
                [
                    (cx - bw / 2.0) * w,
                    (cy - bh / 2.0) * h,
                    (cx + bw / 2.0) * w,
                    (cy + bh / 2.0) * h,
                ],
            );
        }
        Ok(out)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }

    fn class_names(&self) -> Vec<String> {
        coco::class_names()
    }

    fn detect(&mut self, image: &RgbImage, threshold: f32) -> Result<RawDetections> {
        let input = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, threshold)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.width, self.height);
        self.detect(&blank, 1.0).map(|_| ())
    }
}
