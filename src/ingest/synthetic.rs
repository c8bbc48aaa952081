//! Synthetic camera for tests and dry runs (`stub://` devices).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::frame::BgrFrame;
use crate::ingest::camera::CameraDevice;
use crate::ingest::normalize::{normalize_to_bgr, PixelFormat};

/// Camera that generates a moving test pattern.
///
/// Frames are produced in the configured native pixel layout and normalized to BGR
/// the same way a real device's buffers are.
#[derive(Debug)]
pub struct SyntheticCamera {
    format: PixelFormat,
    fail_after: Option<u64>,
    fail_open: Option<String>,
    opened: Option<(u32, u32, u32)>,
    open_calls: u64,
    frame_count: u64,
    releases: Arc<AtomicUsize>,
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            format: PixelFormat::Bgr24,
            fail_after: None,
            fail_open: None,
            opened: None,
            open_calls: 0,
            frame_count: 0,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Native layout of generated frames.
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Fail every read after `frames` successful ones.
    pub fn fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Refuse to open with `reason`.
    pub fn fail_open(mut self, reason: &str) -> Self {
        self.fail_open = Some(reason.to_string());
        self
    }

    /// `(index, width, height)` of the current open, if any.
    pub fn opened(&self) -> Option<(u32, u32, u32)> {
        self.opened
    }

    pub fn open_calls(&self) -> u64 {
        self.open_calls
    }

    /// Counter of `release` calls on an open device; stays valid after the camera is
    /// moved into a session.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }

    fn generate(&self, width: u32, height: u32) -> Vec<u8> {
        let shift = self.frame_count as u32;
        let mut pixels = Vec::with_capacity(self.format.frame_len(width, height).unwrap_or(0));
        for y in 0..height {
            for x in 0..width {
                match self.format {
                    PixelFormat::Bgr24 => pixels.extend_from_slice(&[
                        (x + shift) as u8,
                        y as u8,
                        (x + y) as u8,
                    ]),
                    PixelFormat::Rgb24 => pixels.extend_from_slice(&[
                        (x + y) as u8,
                        y as u8,
                        (x + shift) as u8,
                    ]),
                    PixelFormat::Yuyv => {
                        if x % 2 == 0 {
                            pixels.extend_from_slice(&[
                                (x + shift) as u8,
                                128,
                                (x + 1 + shift) as u8,
                                128,
                            ]);
                        }
                    }
                }
            }
        }
        pixels
    }
}

impl CameraDevice for SyntheticCamera {
    fn name(&self) -> String {
        "stub://synthetic".to_string()
    }

    fn open(&mut self, index: u32, width: u32, height: u32) -> Result<()> {
        self.open_calls += 1;
        if let Some(reason) = &self.fail_open {
            return Err(anyhow!("{}", reason));
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("invalid resolution {}x{}", width, height));
        }
        self.opened = Some((index, width, height));
        self.frame_count = 0;
        Ok(())
    }

    fn read(&mut self) -> Result<BgrFrame> {
        let (_, width, height) = self.opened.ok_or_else(|| anyhow!("device not open"))?;
        if let Some(limit) = self.fail_after {
            if self.frame_count >= limit {
                return Err(anyhow!("synthetic device stopped after {} frames", limit));
            }
        }
        let raw = self.generate(width, height);
        let bgr = normalize_to_bgr(&raw, width, height, self.format)?;
        self.frame_count += 1;
        Ok(BgrFrame::new(bgr, width, height)?)
    }

    fn release(&mut self) {
        if self.opened.take().is_some() {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
