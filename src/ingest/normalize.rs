use anyhow::{anyhow, Result};

/// Pixel layouts a camera device may deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Bgr24,
    Rgb24,
    /// Packed 4:2:2, `Y0 U Y1 V` per pixel pair.
    Yuyv,
}

impl PixelFormat {
    /// Bytes a `width`x`height` frame occupies in this layout.
    pub fn frame_len(self, width: u32, height: u32) -> Result<usize> {
        let per_pixel = match self {
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => 3,
            PixelFormat::Yuyv => 2,
        };
        width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(per_pixel))
            .map(|v| v as usize)
            .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", self))
    }
}

/// Convert a device buffer to interleaved BGR.
pub(crate) fn normalize_to_bgr(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = format.frame_len(width, height)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }

    match format {
        PixelFormat::Bgr24 => Ok(pixels.to_vec()),
        PixelFormat::Rgb24 => {
            let mut bgr = pixels.to_vec();
            crate::frame::swap_red_blue(&mut bgr);
            Ok(bgr)
        }
        PixelFormat::Yuyv => yuyv_to_bgr(pixels, width, height),
    }
}

fn yuyv_to_bgr(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frame width {} is not even", width));
    }
    let mut bgr = vec![0u8; width as usize * height as usize * 3];
    for (pair, chunk) in pixels.chunks_exact(4).enumerate() {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for (half, y) in [chunk[0], chunk[2]].into_iter().enumerate() {
            let y = y as f32;
            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (pair * 2 + half) * 3;
            bgr[offset] = clamp_to_u8(b);
            bgr[offset + 1] = clamp_to_u8(g);
            bgr[offset + 2] = clamp_to_u8(r);
        }
    }
    Ok(bgr)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
