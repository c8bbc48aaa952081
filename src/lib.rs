//! DETR Vision
//!
//! Object detection on still images and live camera frames, with labeled box
//! overlays for display or storage.
//!
//! # Architecture
//!
//! image → `DetectionPipeline` → `DetectionSet` → `OverlayRenderer` (+ `ColorAssigner`)
//! → annotated image → caller saves / returns / displays. `LiveLoop` wraps that per
//! camera frame.
//!
//! # Module Structure
//!
//! - `frame`: accepted image representations (`BgrFrame`, `ImageInput`)
//! - `detect`: backend seam, result model and the detection pipeline
//! - `render`: per-label colors, fonts and the overlay painter
//! - `ingest`: camera devices and `CameraSession`
//! - `live`: the camera loop (FPS, save-on-demand, quit)
//! - `codec`: image decode/encode and persistence
//! - `config`: file + environment configuration for the binaries
//! - `api`: HTTP detection service

pub mod api;
pub mod codec;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod live;
pub mod render;

pub use detect::{
    DetectionPipeline, DetectionRecord, DetectionSet, DetectorBackend, RawDetections,
    StubBackend,
};
pub use error::{Result, VisionError};
pub use frame::{BgrFrame, ImageInput};
pub use ingest::{CameraConfig, CameraDevice, CameraSession, SessionState, SyntheticCamera};
pub use live::{Command, LiveLoop, LiveOptions, LoopSummary, StopReason};
pub use render::{ColorAssigner, OverlayRenderer, SharedColorAssigner};
