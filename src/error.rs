//! Error taxonomy for the detection core.
//!
//! End-of-stream is not represented here: a camera that stops delivering frames
//! terminates its frame iterator instead of raising.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    /// The caller handed in an image the pipeline cannot normalize.
    #[error("unsupported input: {0}")]
    UnsupportedInputType(String),

    /// The detector backend failed or produced malformed output. Never retried.
    #[error("inference failed: {0:#}")]
    InferenceError(anyhow::Error),

    /// The camera device could not be opened.
    #[error("camera {index} unavailable: {reason}")]
    CameraUnavailable { index: u32, reason: String },

    #[error("threshold {0} outside [0, 1]")]
    InvalidThreshold(f32),

    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VisionError {
    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedInputType(msg.into())
    }

    pub(crate) fn inference(err: impl Into<anyhow::Error>) -> Self {
        Self::InferenceError(err.into())
    }
}

pub type Result<T, E = VisionError> = std::result::Result<T, E>;

/// Validate a confidence threshold.
pub fn check_threshold(threshold: f32) -> Result<f32> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(VisionError::InvalidThreshold(threshold))
    }
}
