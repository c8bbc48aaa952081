use anyhow::Result;
use image::RgbImage;

use crate::detect::result::RawDetections;

/// Detector backend trait.
///
/// The pipeline treats a backend as an opaque capability: it hands over an RGB image
/// already resized to `input_size()` and receives boxes in that image's pixel space.
/// Remapping to the caller's original coordinates happens in the pipeline.
///
/// Backends are reentrant for sequential calls only; concurrent callers must
/// serialize access (the HTTP service owns its pipeline on one thread).
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Model input size as `(width, height)`, or `None` to receive the image at its
    /// original size.
    fn input_size(&self) -> Option<(u32, u32)>;

    /// Class vocabulary the backend can emit.
    fn class_names(&self) -> Vec<String>;

    /// Run detection on an RGB image. Results below `threshold` may be dropped by
    /// the backend; the pipeline filters again regardless.
    fn detect(&mut self, image: &RgbImage, threshold: f32) -> Result<RawDetections>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        (**self).input_size()
    }

    fn class_names(&self) -> Vec<String> {
        (**self).class_names()
    }

    fn detect(&mut self, image: &RgbImage, threshold: f32) -> anyhow::Result<RawDetections> {
        (**self).detect(image, threshold)
    }

    fn warm_up(&mut self) -> anyhow::Result<()> {
        (**self).warm_up()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;

    #[test]
    fn boxed_backend_forwards_every_call() {
        let mut boxed: Box<dyn DetectorBackend> =
            Box::new(StubBackend::new().with_detection("cat", 0.9, [1.0, 1.0, 4.0, 4.0]));
        assert_eq!(boxed.name(), "stub");
        assert_eq!(boxed.class_names(), vec!["cat".to_string()]);
        boxed.warm_up().expect("warm up");

        let raw = boxed.detect(&RgbImage::new(8, 8), 0.5).expect("detect");
        assert_eq!(raw.labels, vec!["cat".to_string()]);
    }
}
