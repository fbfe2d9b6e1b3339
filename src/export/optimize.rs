//! Image normalisation for a destination profile
//!
//! Each [`ExportImage`] remembers the encoding it was last given, so running
//! the same profile twice is a no-op instead of a second lossy pass.

use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::debug;

use super::profile::PlatformProfile;
use crate::codec::{self, OutputFormat};
use crate::error::{Result, TourError};
use crate::state::data::{CapturedImage, GeoCoordinates};

/// Encoding parameters an image was produced with
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedEncoding {
    pub format: OutputFormat,
    pub quality: u8,
    pub max_width: u32,
    pub max_height: u32,
}

impl AppliedEncoding {
    pub fn for_profile(profile: &PlatformProfile) -> Self {
        Self {
            format: profile.image_format,
            quality: profile.jpeg_quality,
            max_width: profile.max_width,
            max_height: profile.max_height,
        }
    }
}

/// A copy of a captured image on its way into an export package
#[derive(Debug, Clone, PartialEq)]
pub struct ExportImage {
    pub bytes: Vec<u8>,
    pub room_label: String,
    pub captured_at: DateTime<Utc>,
    pub angle_degrees: f64,
    pub coordinates: Option<GeoCoordinates>,
    /// Known once the image has been decoded
    pub dimensions: Option<(u32, u32)>,
    pub applied: Option<AppliedEncoding>,
}

impl ExportImage {
    pub fn from_captured(image: &CapturedImage) -> Self {
        Self {
            bytes: image.image_bytes().to_vec(),
            room_label: image.room_label().to_string(),
            captured_at: image.captured_at(),
            angle_degrees: image.angle_degrees(),
            coordinates: image.coordinates(),
            dimensions: None,
            applied: None,
        }
    }

    /// Container format of `bytes`, if this image has been normalised
    pub fn format(&self) -> Option<OutputFormat> {
        self.applied.map(|applied| applied.format)
    }
}

/// Re-encode one image for `profile`, downscaling to fit but never upscaling
pub fn optimize_image(image: ExportImage, profile: &PlatformProfile) -> Result<ExportImage> {
    let target = AppliedEncoding::for_profile(profile);
    if image.applied == Some(target) {
        return Ok(image);
    }

    let decoded = codec::decode(&image.bytes)?;
    let fitted = if decoded.width() > target.max_width || decoded.height() > target.max_height {
        decoded.resize(target.max_width, target.max_height, FilterType::Lanczos3)
    } else {
        decoded
    };

    let bytes = codec::encode(&fitted, target.format, target.quality)?;
    debug!(
        room = image.room_label.as_str(),
        width = fitted.width(),
        height = fitted.height(),
        before = image.bytes.len(),
        after = bytes.len(),
        "image optimized"
    );

    Ok(ExportImage {
        bytes,
        dimensions: Some((fitted.width(), fitted.height())),
        applied: Some(target),
        ..image
    })
}

pub fn optimize_images(images: Vec<ExportImage>, profile: &PlatformProfile) -> Result<Vec<ExportImage>> {
    images
        .into_iter()
        .map(|image| optimize_image(image, profile))
        .collect()
}

/// [`optimize_images`] on the blocking pool; decoding and resizing are CPU-bound
pub async fn optimize_images_in_background(
    images: Vec<ExportImage>,
    profile: PlatformProfile,
) -> Result<Vec<ExportImage>> {
    task::spawn_blocking(move || optimize_images(images, &profile))
        .await
        .map_err(|e| TourError::EncodingFailure(format!("optimizer task failed: {}", e)))?
}
