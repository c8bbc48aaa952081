use std::path::Path;

use anyhow::Result;

use crate::detect::backend::DetectorBackend;

pub mod coco;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Backend for an optional model file.
///
/// A model path needs the `backend-tract` feature. Without a model the stub backend
/// is used, which never detects anything.
pub fn load_backend(model: Option<&Path>, input: (u32, u32)) -> Result<Box<dyn DetectorBackend>> {
    match model {
        #[cfg(feature = "backend-tract")]
        Some(path) => Ok(Box::new(TractBackend::new(path, input.0, input.1)?)),
        #[cfg(not(feature = "backend-tract"))]
        Some(path) => Err(anyhow::anyhow!(
            "model {} requires the backend-tract feature ({}x{} input)",
            path.display(),
            input.0,
            input.1
        )),
        None => {
            log::warn!("no model configured; using the stub backend (no detections)");
            Ok(Box::new(StubBackend::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_falls_back_to_stub() -> Result<()> {
        let backend = load_backend(None, (800, 800))?;
        assert_eq!(backend.name(), "stub");
        Ok(())
    }

    #[test]
    fn unreadable_model_is_an_error() {
        assert!(load_backend(Some(Path::new("/nonexistent/detr.onnx")), (800, 800)).is_err());
    }
}
