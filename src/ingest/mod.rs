//! Camera ingestion.
//!
//! - `CameraSession`: lifecycle and lazy frame stream over one device
//! - `SyntheticCamera`: generated frames (`stub://`), used by tests and dry runs
//! - `V4l2Camera`: USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Every device buffer is normalized to BGR before it leaves this module.

mod camera;
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use camera::{
    CameraConfig, CameraDevice, CameraSession, FrameStream, SessionState, DEFAULT_WARMUP,
};
pub use normalize::PixelFormat;
pub use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

/// Device for a camera selector: `stub://...` is synthetic, anything else is a V4L2
/// device node (empty means `/dev/video<index>`).
pub fn device_for(selector: &str) -> anyhow::Result<Box<dyn CameraDevice>> {
    if selector.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new()));
    }
    hardware_device(selector)
}

#[cfg(feature = "ingest-v4l2")]
fn hardware_device(selector: &str) -> anyhow::Result<Box<dyn CameraDevice>> {
    if selector.is_empty() {
        Ok(Box::new(V4l2Camera::new()))
    } else {
        Ok(Box::new(V4l2Camera::with_path(selector)))
    }
}

#[cfg(not(feature = "ingest-v4l2"))]
fn hardware_device(selector: &str) -> anyhow::Result<Box<dyn CameraDevice>> {
    Err(anyhow::anyhow!(
        "camera {:?} requires the ingest-v4l2 feature; use stub:// for a synthetic device",
        selector
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_selector_is_synthetic() -> anyhow::Result<()> {
        let device = device_for("stub://bench")?;
        assert_eq!(device.name(), "stub://synthetic");
        Ok(())
    }
}
