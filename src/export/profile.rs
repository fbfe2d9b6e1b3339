//! Listing-site profiles
//!
//! Every supported destination is one row of data; the export engine is
//! parameterized by the row instead of having a type per site.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::codec::OutputFormat;
use crate::error::{Result, TourError};

/// Where a prepared tour is handed to the site
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubmissionTarget {
    /// Page that accepts the tour, without a query string
    pub endpoint: String,
    /// Query pairs placed before the payload
    pub fixed_params: Vec<(String, String)>,
    /// Query key carrying the serialized tour
    pub payload_param: String,
}

impl SubmissionTarget {
    fn new(endpoint: &str, fixed_params: &[(&str, &str)], payload_param: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            fixed_params: fixed_params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            payload_param: payload_param.to_string(),
        }
    }
}

/// What the user downloads next to the submission link
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// The submission payload as a JSON document
    Json,
    /// The full zip archive, images included
    Archive,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlatformProfile {
    pub platform_id: String,
    pub display_name: String,
    pub image_format: OutputFormat,
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
    pub max_payload_size_mb: u32,
    pub submission: SubmissionTarget,
    pub package: PackageKind,
    /// Extra metadata merged into the payload, e.g. the yandex requirements block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PlatformProfile {
    pub fn max_payload_bytes(&self) -> u64 {
        u64::from(self.max_payload_size_mb) * 1024 * 1024
    }

    pub fn avito() -> Self {
        Self {
            platform_id: "avito".into(),
            display_name: "Avito".into(),
            image_format: OutputFormat::Jpeg,
            max_width: 1600,
            max_height: 1200,
            jpeg_quality: 75,
            max_payload_size_mb: 30,
            submission: SubmissionTarget::new("https://www.avito.ru/add-item", &[], "tourData"),
            package: PackageKind::Json,
            metadata: None,
        }
    }

    pub fn cian() -> Self {
        Self {
            platform_id: "cian".into(),
            display_name: "CIAN".into(),
            image_format: OutputFormat::Jpeg,
            max_width: 1920,
            max_height: 1080,
            jpeg_quality: 80,
            max_payload_size_mb: 50,
            submission: SubmissionTarget::new(
                "https://www.cian.ru/add-object/",
                &[("type", "virtual_tour")],
                "data",
            ),
            package: PackageKind::Json,
            metadata: None,
        }
    }

    pub fn domclick() -> Self {
        Self {
            platform_id: "domclick".into(),
            display_name: "DomClick".into(),
            image_format: OutputFormat::Jpeg,
            max_width: 2048,
            max_height: 1536,
            jpeg_quality: 85,
            max_payload_size_mb: 40,
            submission: SubmissionTarget::new("https://domclick.ru/add-property", &[], "tour"),
            package: PackageKind::Json,
            metadata: None,
        }
    }

    pub fn yandex() -> Self {
        Self {
            platform_id: "yandex".into(),
            display_name: "Yandex Realty".into(),
            image_format: OutputFormat::Jpeg,
            max_width: 2048,
            max_height: 2048,
            jpeg_quality: 90,
            max_payload_size_mb: 50,
            submission: SubmissionTarget::new("https://realty.yandex.ru/add/", &[], "tourData"),
            package: PackageKind::Archive,
            metadata: Some(serde_json::json!({
                "platform": "yandex_realty",
                "version": "1.0",
                "requirements": {
                    "image_format": "jpg",
                    "max_size": "2048x2048",
                    "compression": "high"
                }
            })),
        }
    }
}

/// Profiles by platform id, injected into the export engine
#[derive(Debug, Clone, Default)]
pub struct PlatformRegistry {
    profiles: BTreeMap<String, PlatformProfile>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four listing sites the app ships with
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for profile in [
            PlatformProfile::avito(),
            PlatformProfile::cian(),
            PlatformProfile::domclick(),
            PlatformProfile::yandex(),
        ] {
            registry.register(profile);
        }
        registry
    }

    /// Add or replace a profile
    pub fn register(&mut self, profile: PlatformProfile) {
        self.profiles.insert(profile.platform_id.clone(), profile);
    }

    pub fn get(&self, platform_id: &str) -> Result<&PlatformProfile> {
        self.profiles
            .get(platform_id)
            .ok_or_else(|| TourError::UnknownPlatform(platform_id.to_string()))
    }

    /// Profiles in platform-id order
    pub fn profiles(&self) -> impl Iterator<Item = &PlatformProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles() {
        let registry = PlatformRegistry::builtin();
        assert_eq!(registry.len(), 4);

        let cian = registry.get("cian").unwrap();
        assert_eq!((cian.max_width, cian.max_height, cian.jpeg_quality), (1920, 1080, 80));
        assert_eq!(registry.get("domclick").unwrap().image_format, OutputFormat::Jpeg);
        assert_eq!(registry.get("yandex").unwrap().package, PackageKind::Archive);
        assert_eq!(registry.get("avito").unwrap().max_payload_bytes(), 30 * 1024 * 1024);
    }

    #[test]
    fn test_unknown_platform() {
        let registry = PlatformRegistry::builtin();
        assert!(matches!(
            registry.get("unknown-platform"),
            Err(TourError::UnknownPlatform(id)) if id == "unknown-platform"
        ));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = PlatformRegistry::builtin();
        let mut avito = PlatformProfile::avito();
        avito.jpeg_quality = 60;
        registry.register(avito);

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.get("avito").unwrap().jpeg_quality, 60);
    }

    #[test]
    fn test_ids_in_order() {
        let registry = PlatformRegistry::builtin();
        let ids: Vec<&str> = registry
            .profiles()
            .map(|p| p.platform_id.as_str())
            .collect();
        assert_eq!(ids, vec!["avito", "cian", "domclick", "yandex"]);
    }
}
