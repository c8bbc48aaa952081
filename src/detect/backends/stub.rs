use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetections;

/// Stub backend for testing and dry runs.
///
/// Returns a fixed, scripted set of model-space detections on every call (empty by
/// default) and can be told to fail. No model file is involved.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    input_size: Option<(u32, u32)>,
    script: RawDetections,
    failure: Option<String>,
    calls: u64,
    last_input: Option<(u32, u32)>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a fixed model input size; the pipeline resizes to it before `detect`.
    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.input_size = Some((width, height));
        self
    }

    /// Append a scripted detection, `bbox` in model-space pixels.
    pub fn with_detection(mut self, label: &str, score: f32, bbox: [f32; 4]) -> Self {
        self.script.push(label, score, bbox);
        self
    }

    /// Make every `detect` call fail with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Dimensions of the image received by the most recent call.
    pub fn last_input(&self) -> Option<(u32, u32)> {
        self.last_input
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        self.input_size
    }

    fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for label in &self.script.labels {
            if !names.contains(label) {
                names.push(label.clone());
            }
        }
        names
    }

    fn detect(&mut self, image: &RgbImage, threshold: f32) -> Result<RawDetections> {
        self.calls += 1;
        self.last_input = Some(image.dimensions());
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }

        let mut out = RawDetections::default();
        for ((label, score), bbox) in self
            .script
            .labels
            .iter()
            .zip(&self.script.scores)
            .zip(&self.script.boxes)
        {
            if *score >= threshold {
                out.push(label.clone(), *score, *bbox);
            }
        }
        Ok(out)
    }
}
