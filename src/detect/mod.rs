//! Object detection: backend seam, result model and the pipeline that ties them.

mod backend;
pub mod backends;
mod pipeline;
mod result;

pub use backend::DetectorBackend;
pub use backends::{load_backend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use pipeline::DetectionPipeline;
pub use result::{DetectionRecord, DetectionSet, RawDetections};
