//! Still-image encode/decode shared by the camera and the export pipeline

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TourError};

/// Container formats the app writes
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    /// File extension used inside export archives
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encode `img` as `format`. `quality` (1-100) only affects JPEG.
pub fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder)?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new(&mut buffer);
            img.write_with_encoder(encoder)?;
        }
    }
    Ok(buffer)
}

/// Decode any supported still, guessing the format from its magic bytes
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(TourError::EncodingFailure("empty image data".into()));
    }
    Ok(image::load_from_memory(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn pattern(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7) as u8, (y * 5) as u8, 128, 200])
        }))
    }

    #[test]
    fn test_jpeg_drops_alpha_and_keeps_size() {
        let bytes = encode(&pattern(32, 16), OutputFormat::Jpeg, 80).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = decode(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn test_png_is_lossless() {
        let original = pattern(8, 8);
        let bytes = encode(&original, OutputFormat::Png, 10).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.to_rgba8(), original.to_rgba8());
    }

    #[test]
    fn test_garbage_is_encoding_failure() {
        assert!(matches!(decode(&[]), Err(TourError::EncodingFailure(_))));
        assert!(matches!(decode(b"not an image"), Err(TourError::EncodingFailure(_))));
    }
}
