//! Image decoding, persistence and JPEG/data-URI encoding.

use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::error::{Result, VisionError};

/// JPEG quality used for saved frames and HTTP responses.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Decode an encoded image (format sniffed from the bytes).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(VisionError::unsupported("empty image payload"));
    }
    let format = image::guess_format(bytes)
        .map_err(|_| VisionError::unsupported("unrecognized image format"))?;
    Ok(image::load_from_memory_with_format(bytes, format)?)
}

/// Load an image from disk as RGB.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    Ok(image::open(path.as_ref())?.to_rgb8())
}

/// Save an image, creating missing parent directories. The format follows the
/// file extension; `.jpg`/`.jpeg` use `DEFAULT_JPEG_QUALITY`.
pub fn save_image<P: AsRef<Path>>(image: &RgbImage, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    match ImageFormat::from_path(path) {
        Ok(ImageFormat::Jpeg) => {
            let bytes = encode_jpeg(image, DEFAULT_JPEG_QUALITY)?;
            std::fs::write(path, bytes)?;
        }
        _ => image.save(path)?,
    }
    log::debug!("saved {}", path.display());
    Ok(())
}

/// Encode as baseline JPEG.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(image)?;
    Ok(out.into_inner())
}

/// `data:image/jpeg;base64,...` URI for embedding in JSON responses.
pub fn to_data_uri(image: &RgbImage) -> Result<String> {
    let jpeg = encode_jpeg(image, DEFAULT_JPEG_QUALITY)?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        general_purpose::STANDARD.encode(jpeg)
    ))
}

/// Download an image over HTTP(S) to `path`, creating parent directories.
#[cfg(feature = "fetch")]
pub fn download_image<P: AsRef<Path>>(url: &str, path: P) -> anyhow::Result<RgbImage> {
    use anyhow::Context;
    use std::io::Read;

    const MAX_DOWNLOAD_BYTES: u64 = 32 * 1024 * 1024;

    let response = ureq::get(url)
        .call()
        .with_context(|| format!("GET {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_DOWNLOAD_BYTES)
        .read_to_end(&mut bytes)
        .with_context(|| format!("read body of {}", url))?;

    let image = decode_image(&bytes)
        .with_context(|| format!("decode {}", url))?
        .to_rgb8();
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    std::fs::write(path, &bytes).with_context(|| format!("write {}", path.display()))?;
    log::info!("downloaded {} -> {}", url, path.display());
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn sample() -> RgbImage {
        RgbImage::from_fn(16, 8, |x, y| Rgb([(x * 16) as u8, (y * 32) as u8, 90]))
    }

    #[test]
    fn save_creates_parent_directories() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested/out/result.png");
        save_image(&sample(), &path)?;
        assert_eq!(load_image(&path)?, sample());
        Ok(())
    }

    #[test]
    fn jpeg_round_trip_keeps_dimensions() -> Result<()> {
        let bytes = encode_jpeg(&sample(), 80)?;
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = decode_image(&bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
        Ok(())
    }

    #[test]
    fn data_uri_has_jpeg_prefix() -> Result<()> {
        let uri = to_data_uri(&sample())?;
        let payload = uri
            .strip_prefix("data:image/jpeg;base64,")
            .expect("data uri prefix");
        let jpeg = general_purpose::STANDARD.decode(payload).expect("base64");
        assert!(decode_image(&jpeg).is_ok());
        Ok(())
    }

    #[test]
    fn garbage_is_unsupported() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(VisionError::UnsupportedInputType(_))
        ));
        assert!(matches!(
            decode_image(&[]),
            Err(VisionError::UnsupportedInputType(_))
        ));
    }
}
