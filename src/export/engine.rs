//! Export engine
//!
//! One pipeline for every destination, driven by the injected
//! [`PlatformRegistry`]: optimise images, describe the flat, build the
//! manifest, stage a download and a submission link. The source tour is
//! only ever read.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};
use url::Url;

use super::archive::{self, TourManifest};
use super::description::build_description;
use super::optimize::{self, ExportImage};
use super::profile::{PackageKind, PlatformRegistry, SubmissionTarget};
use crate::error::{Result, TourError};
use crate::state::data::Tour;

/// Outcome of a platform export, always returned, never raised
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    pub success: bool,
    /// User-facing summary
    pub message: String,
    /// File staged for the user to download
    pub download_reference: Option<PathBuf>,
    /// Link that opens the site's listing form with the tour attached
    pub submission_url: Option<String>,
}

impl ExportResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            download_reference: None,
            submission_url: None,
        }
    }
}

/// Containers for exports that are not tied to a listing site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericFormat {
    Archive,
    Json,
}

impl GenericFormat {
    pub fn parse(format: &str) -> Result<Self> {
        match format.trim().to_ascii_lowercase().as_str() {
            "zip" | "archive" => Ok(GenericFormat::Archive),
            "json" => Ok(GenericFormat::Json),
            _ => Err(TourError::UnsupportedFormat(format.to_string())),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            GenericFormat::Archive => "zip",
            GenericFormat::Json => "json",
        }
    }
}

impl fmt::Display for GenericFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A packaged tour held in memory until saved
#[derive(Debug, Clone, PartialEq)]
pub struct GenericPackage {
    pub format: GenericFormat,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Everything about a tour, image bytes included
#[derive(Serialize)]
struct TourDump<'a> {
    description: String,
    tour: &'a Tour,
}

#[derive(Debug, Clone)]
pub struct ExportEngine {
    registry: PlatformRegistry,
    output_dir: PathBuf,
}

impl ExportEngine {
    pub fn new(registry: PlatformRegistry, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            output_dir: output_dir.into(),
        }
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    /// Prepare `tour` for a listing site. Failures come back as an
    /// unsuccessful [`ExportResult`].
    pub async fn export_to_platform(&self, tour: &Tour, platform_id: &str) -> ExportResult {
        match self.prepare_for_platform(tour, platform_id).await {
            Ok(result) => result,
            Err(err) => {
                warn!(platform = platform_id, tour_id = tour.id, "export failed: {}", err);
                ExportResult::failure(format!("Could not prepare the tour for {}: {}", platform_id, err))
            }
        }
    }

    async fn prepare_for_platform(&self, tour: &Tour, platform_id: &str) -> Result<ExportResult> {
        let profile = self.registry.get(platform_id)?.clone();
        if tour.images.is_empty() {
            return Err(TourError::EncodingFailure("tour has no images".into()));
        }

        let images: Vec<ExportImage> = tour.images.iter().map(ExportImage::from_captured).collect();
        let images = optimize::optimize_images_in_background(images, profile.clone()).await?;

        let payload_bytes: u64 = images.iter().map(|image| image.bytes.len() as u64).sum();
        if payload_bytes > profile.max_payload_bytes() {
            return Err(TourError::EncodingFailure(format!(
                "{} bytes of images exceed the {} MB limit",
                payload_bytes, profile.max_payload_size_mb
            )));
        }

        let description = build_description(&tour.rooms);
        let manifest = TourManifest::new(tour, description, &images).with_platform(profile.metadata.clone());
        let submission_url = submission_url(&profile.submission, &manifest)?;

        let (extension, bytes) = match profile.package {
            PackageKind::Json => ("json", super::json_document(&manifest)?),
            PackageKind::Archive => ("zip", archive::package_tour(&manifest, &images)?),
        };
        let file_name = format!("tour-{}-{}.{}", tour.id, profile.platform_id, extension);
        let path = self.write_output(&file_name, &bytes).await?;

        info!(
            platform = profile.platform_id.as_str(),
            tour_id = tour.id,
            images = images.len(),
            bytes = bytes.len(),
            "📦 Export staged at {}",
            path.display()
        );
        Ok(ExportResult {
            success: true,
            message: format!("Tour prepared for {}", profile.display_name),
            download_reference: Some(path),
            submission_url: Some(submission_url),
        })
    }

    /// Package the full tour as an archive or a JSON dump, untouched by any
    /// site profile
    pub fn export_generic(&self, tour: &Tour, format: &str) -> Result<GenericPackage> {
        let format = GenericFormat::parse(format)?;
        let description = build_description(&tour.rooms);

        let bytes = match format {
            GenericFormat::Archive => {
                let images: Vec<ExportImage> =
                    tour.images.iter().map(ExportImage::from_captured).collect();
                let manifest = TourManifest::new(tour, description, &images);
                archive::package_tour(&manifest, &images)?
            }
            GenericFormat::Json => super::json_document(&TourDump { description, tour })?,
        };

        Ok(GenericPackage {
            format,
            file_name: format!("tour-{}.{}", tour.id, format.extension()),
            bytes,
        })
    }

    /// Write a generic package into the output directory
    pub async fn save_to_device(&self, package: &GenericPackage) -> Result<PathBuf> {
        let path = self.write_output(&package.file_name, &package.bytes).await?;
        info!("💾 Saved {} ({} bytes)", path.display(), package.bytes.len());
        Ok(path)
    }

    async fn write_output(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

fn submission_url(target: &SubmissionTarget, manifest: &TourManifest) -> Result<String> {
    let mut url = Url::parse(&target.endpoint).map_err(|e| {
        TourError::InvalidConfiguration(format!("submission endpoint {}: {}", target.endpoint, e))
    })?;
    let payload = serde_json::to_string(manifest)
        .map_err(|e| TourError::EncodingFailure(format!("submission payload: {}", e)))?;

    {
        let mut query = url.query_pairs_mut();
        for (key, value) in &target.fixed_params {
            query.append_pair(key, value);
        }
        query.append_pair(&target.payload_param, &payload);
    }

    Ok(url.into())
}
