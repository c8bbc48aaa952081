//! V4L2 camera device.
//!
//! Opens `/dev/video<index>`, asks for BGR24 at the requested resolution and accepts
//! whatever BGR24/RGB24/YUYV format the driver settles on. Buffers are memory-mapped
//! and normalized to BGR on read.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use crate::frame::BgrFrame;
use crate::ingest::camera::CameraDevice;
use crate::ingest::normalize::{normalize_to_bgr, PixelFormat};

const MMAP_BUFFERS: u32 = 4;

/// V4L2 capture device.
pub struct V4l2Camera {
    path: Option<String>,
    state: Option<V4l2State>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl Default for V4l2Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl V4l2Camera {
    pub fn new() -> Self {
        Self {
            path: None,
            state: None,
            width: 0,
            height: 0,
            format: PixelFormat::Bgr24,
        }
    }

    /// Use an explicit device node instead of `/dev/video<index>`.
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new()
        }
    }

    fn device_path(&self, index: u32) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/dev/video{}", index))
    }
}

fn pixel_format(fourcc: v4l::FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"BGR3" => Some(PixelFormat::Bgr24),
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"YUYV" => Some(PixelFormat::Yuyv),
        _ => None,
    }
}

impl CameraDevice for V4l2Camera {
    fn name(&self) -> String {
        self.path.clone().unwrap_or_else(|| "v4l2".to_string())
    }

    fn open(&mut self, index: u32, width: u32, height: u32) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = self.device_path(index);
        let device =
            v4l::Device::with_path(&path).with_context(|| format!("open v4l2 device {}", path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(b"BGR3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Camera: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = pixel_format(format.fourcc)
            .ok_or_else(|| anyhow!("{} delivers unsupported format {}", path, format.fourcc))?;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        self.state = Some(state);
        self.width = format.width;
        self.height = format.height;
        self.format = pixel_format;
        if (format.width, format.height) != (width, height) {
            log::warn!(
                "V4l2Camera: {} settled on {}x{} instead of {}x{}",
                path,
                format.width,
                format.height,
                width,
                height
            );
        }
        log::info!(
            "V4l2Camera: opened {} ({}x{} {:?})",
            path,
            self.width,
            self.height,
            self.format
        );
        Ok(())
    }

    fn read(&mut self) -> Result<BgrFrame> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.width, self.height, self.format);
        let expected = format.frame_len(width, height)?;
        let state = self.state.as_mut().context("v4l2 device not open")?;
        let raw = state.with_stream_mut(|stream| -> Result<Vec<u8>> {
            let (buf, meta) = stream.next().context("capture v4l2 frame")?;
            let used = match meta.bytesused as usize {
                0 => buf.len(),
                n => n.min(buf.len()),
            };
            if used < expected {
                return Err(anyhow!(
                    "short v4l2 frame: {} bytes, expected {}",
                    used,
                    expected
                ));
            }
            Ok(buf[..expected].to_vec())
        })?;

        let bgr = normalize_to_bgr(&raw, width, height, format)?;
        Ok(BgrFrame::new(bgr, width, height)?)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::debug!("V4l2Camera: released {}", self.name());
        }
    }
}
