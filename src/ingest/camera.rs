//! Camera session lifecycle.
//!
//! A `CameraSession` exclusively owns one `CameraDevice` and moves through
//! `Closed -> Open -> Streaming -> Closed`. Frames are pulled lazily through
//! `FrameStream`; the first failed read ends the stream instead of raising.

use std::iter::FusedIterator;
use std::time::Duration;

use crate::error::{Result, VisionError};
use crate::frame::BgrFrame;

/// Default delay after opening a device before the first read.
pub const DEFAULT_WARMUP: Duration = Duration::from_millis(500);

/// A capture device addressed by index.
pub trait CameraDevice: Send {
    /// Human-readable device identifier for logs.
    fn name(&self) -> String;

    /// Open the device at the requested resolution. The device may settle on a
    /// different resolution; frames carry their actual size.
    fn open(&mut self, index: u32, width: u32, height: u32) -> anyhow::Result<()>;

    /// Read the next frame as BGR.
    fn read(&mut self) -> anyhow::Result<BgrFrame>;

    /// Release the device. Must be safe to call when not open.
    fn release(&mut self);
}

impl<D: CameraDevice + ?Sized> CameraDevice for Box<D> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn open(&mut self, index: u32, width: u32, height: u32) -> anyhow::Result<()> {
        (**self).open(index, width, height)
    }

    fn read(&mut self) -> anyhow::Result<BgrFrame> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Configuration for a camera session.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    /// Sleep after a successful open, before frames are read.
    pub warmup: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            warmup: DEFAULT_WARMUP,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
    Streaming,
}

/// Owns one camera device for its whole lifetime.
pub struct CameraSession<D: CameraDevice = Box<dyn CameraDevice>> {
    device: D,
    config: CameraConfig,
    state: SessionState,
    frames_read: u64,
}

impl<D: CameraDevice> CameraSession<D> {
    /// Create a closed session. Nothing touches the device until `open`.
    pub fn new(device: D, config: CameraConfig) -> Self {
        Self {
            device,
            config,
            state: SessionState::Closed,
            frames_read: 0,
        }
    }

    /// Open the device and wait out the warm-up delay. No-op when already open.
    pub fn open(&mut self) -> Result<()> {
        if self.state != SessionState::Closed {
            return Ok(());
        }
        let CameraConfig {
            index,
            width,
            height,
            warmup,
        } = self.config;
        self.device
            .open(index, width, height)
            .map_err(|err| VisionError::CameraUnavailable {
                index,
                reason: format!("{:#}", err),
            })?;
        self.state = SessionState::Open;
        log::info!(
            "camera {}: opened {} at {}x{}",
            index,
            self.device.name(),
            width,
            height
        );
        if !warmup.is_zero() {
            std::thread::sleep(warmup);
        }
        Ok(())
    }

    /// Lazy frame sequence, opening the session first if it is closed.
    pub fn stream(&mut self) -> Result<FrameStream<'_, D>> {
        self.open()?;
        self.state = SessionState::Streaming;
        Ok(FrameStream {
            session: self,
            done: false,
        })
    }

    /// Release the device. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.device.release();
        self.state = SessionState::Closed;
        log::info!(
            "camera {}: closed after {} frames",
            self.config.index,
            self.frames_read
        );
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Frames successfully read over the session's lifetime.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl<D: CameraDevice> Drop for CameraSession<D> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Frames from an open session. Ends at the first failed read and stays ended.
pub struct FrameStream<'a, D: CameraDevice> {
    session: &'a mut CameraSession<D>,
    done: bool,
}

impl<D: CameraDevice> FrameStream<'_, D> {
    /// True once a read has failed.
    pub fn is_finished(&self) -> bool {
        self.done
    }

    /// Stop streaming and release the device in one step.
    pub fn close(mut self) {
        self.done = true;
        self.session.close();
    }
}

impl<D: CameraDevice> Iterator for FrameStream<'_, D> {
    type Item = BgrFrame;

    fn next(&mut self) -> Option<BgrFrame> {
        if self.done {
            return None;
        }
        match self.session.device.read() {
            Ok(frame) => {
                self.session.frames_read += 1;
                Some(frame)
            }
            Err(err) => {
                log::warn!(
                    "camera {}: read failed, ending stream: {:#}",
                    self.session.config.index,
                    err
                );
                self.done = true;
                None
            }
        }
    }
}

impl<D: CameraDevice> FusedIterator for FrameStream<'_, D> {}

impl<D: CameraDevice> Drop for FrameStream<'_, D> {
    fn drop(&mut self) {
        if self.session.state == SessionState::Streaming {
            self.session.state = SessionState::Open;
        }
    }
}
