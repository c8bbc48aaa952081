//! Image representations accepted by the detection pipeline.
//!
//! - `BgrFrame`: owned, row-major interleaved BGR buffer. This is what camera devices
//!   produce.
//! - `ImageInput`: borrowed, tagged input for `DetectionPipeline::run`. Every variant
//!   normalizes into one canonical `RgbImage` copy; the caller's pixels are never
//!   touched.

use image::{DynamicImage, RgbImage};

use crate::error::{Result, VisionError};

/// Owned BGR frame. Length is always `width * height * 3`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BgrFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl BgrFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = bgr_len(width, height)?;
        if data.len() != expected {
            return Err(VisionError::unsupported(format!(
                "BGR buffer length mismatch: expected {}, got {}",
                expected,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Build a BGR frame from an RGB image (channel swap, copy).
    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let mut data = image.as_raw().clone();
        swap_red_blue(&mut data);
        Self {
            data,
            width,
            height,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        let mut data = self.data.clone();
        swap_red_blue(&mut data);
        // Length was validated at construction.
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    pub fn input(&self) -> ImageInput<'_> {
        ImageInput::from(self)
    }
}

/// Tagged image input for the detection pipeline.
#[derive(Clone, Copy, Debug)]
pub enum ImageInput<'a> {
    /// Interleaved BGR bytes, row-major, as produced by common capture devices.
    Bgr {
        data: &'a [u8],
        width: u32,
        height: u32,
    },
    /// Any decoded image; converted to RGB8.
    Image(&'a DynamicImage),
}

impl<'a> ImageInput<'a> {
    pub fn bgr(data: &'a [u8], width: u32, height: u32) -> Self {
        Self::Bgr {
            data,
            width,
            height,
        }
    }

    pub fn image(image: &'a DynamicImage) -> Self {
        Self::Image(image)
    }

    /// Original (width, height) of the caller's image.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Bgr { width, height, .. } => (*width, *height),
            Self::Image(image) => (image.width(), image.height()),
        }
    }

    /// Normalize into a fresh RGB copy.
    pub fn to_rgb(&self) -> Result<RgbImage> {
        let (width, height) = self.dimensions();
        if width == 0 || height == 0 {
            return Err(VisionError::unsupported(format!(
                "image has zero extent ({}x{})",
                width, height
            )));
        }
        match self {
            Self::Bgr { data, .. } => {
                let expected = bgr_len(width, height)?;
                if data.len() != expected {
                    return Err(VisionError::unsupported(format!(
                        "BGR buffer length mismatch: expected {} ({}x{}x3), got {}",
                        expected,
                        width,
                        height,
                        data.len()
                    )));
                }
                let mut rgb = data.to_vec();
                swap_red_blue(&mut rgb);
                RgbImage::from_raw(width, height, rgb)
                    .ok_or_else(|| VisionError::unsupported("BGR buffer rejected"))
            }
            Self::Image(image) => Ok(image.to_rgb8()),
        }
    }
}

impl<'a> From<&'a BgrFrame> for ImageInput<'a> {
    fn from(frame: &'a BgrFrame) -> Self {
        Self::bgr(frame.as_bytes(), frame.width, frame.height)
    }
}

impl<'a> From<&'a DynamicImage> for ImageInput<'a> {
    fn from(image: &'a DynamicImage) -> Self {
        Self::Image(image)
    }
}

fn bgr_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| VisionError::unsupported("frame dimensions overflow"))
}

/// In-place BGR <-> RGB swap on interleaved 3-channel data.
pub(crate) fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn bgr_input_is_converted_on_a_copy() -> Result<()> {
        // one blue pixel, one red pixel in BGR order
        let bgr = vec![255u8, 0, 0, 0, 0, 255];
        let snapshot = bgr.clone();
        let rgb = ImageInput::bgr(&bgr, 2, 1).to_rgb()?;

        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([255, 0, 0]));
        assert_eq!(bgr, snapshot);
        Ok(())
    }

    #[test]
    fn bgr_length_mismatch_is_unsupported() {
        let err = ImageInput::bgr(&[0u8; 5], 2, 1).to_rgb().unwrap_err();
        assert!(matches!(err, VisionError::UnsupportedInputType(_)));
    }

    #[test]
    fn zero_sized_image_is_unsupported() {
        let image = DynamicImage::new_rgb8(0, 4);
        let err = ImageInput::image(&image).to_rgb().unwrap_err();
        assert!(matches!(err, VisionError::UnsupportedInputType(_)));
    }

    #[test]
    fn dynamic_images_normalize_to_rgb() -> Result<()> {
        let image = DynamicImage::new_luma8(3, 2);
        let rgb = ImageInput::image(&image).to_rgb()?;
        assert_eq!(rgb.dimensions(), (3, 2));
        Ok(())
    }

    #[test]
    fn bgr_frame_round_trips_through_rgb() -> Result<()> {
        let frame = BgrFrame::new(vec![1, 2, 3, 4, 5, 6], 1, 2)?;
        let rgb = frame.to_rgb_image();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([3, 2, 1]));
        assert_eq!(BgrFrame::from_rgb_image(&rgb), frame);
        Ok(())
    }
}
