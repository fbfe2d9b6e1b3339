//! Application configuration
//!
//! Stored as JSON in the user's config directory:
//! - Linux: ~/.config/tourforge/config.json
//! - macOS: ~/Library/Application Support/tourforge/config.json
//! - Windows: %APPDATA%\tourforge\config.json
//!
//! A missing file means defaults; a malformed one is an error so a typo does
//! not silently reset the user's room list.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::capture::session::SessionConfig;
use crate::error::{Result, TourError};

const APP_DIR: &str = "tourforge";
const CONFIG_FILE: &str = "config.json";

/// How densely each room is photographed during the 360° turn
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureDensity {
    /// One shot every 45°, 8 per room
    #[default]
    Standard,
    /// One shot every 30°, 12 per room
    Dense,
}

impl CaptureDensity {
    pub fn angle_step_degrees(self) -> f64 {
        match self {
            CaptureDensity::Standard => 45.0,
            CaptureDensity::Dense => 30.0,
        }
    }

    pub fn captures_per_room(self) -> usize {
        (360.0 / self.angle_step_degrees()) as usize
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Rooms visited by the guided capture, in order
    pub room_sequence: Vec<String>,
    pub capture_density: CaptureDensity,
    /// Upper bound on waiting for a position fix per capture
    pub geolocation_timeout_ms: u64,
    /// JPEG quality (1-100) of stills grabbed from the camera
    pub frame_quality: u8,
    /// Where the tour database lives; `None` = platform data directory
    pub data_dir: Option<PathBuf>,
    /// Where export packages are written; `None` = `<data_dir>/exports`
    pub export_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            room_sequence: default_rooms(),
            capture_density: CaptureDensity::default(),
            geolocation_timeout_ms: 5_000,
            frame_quality: 80,
            data_dir: None,
            export_dir: None,
        }
    }
}

fn default_rooms() -> Vec<String> {
    ["Living room", "Kitchen", "Bedroom", "Bathroom", "Hallway", "Balcony"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl AppConfig {
    /// Load from the platform config directory. On first run the defaults are
    /// written there so the room list can be edited.
    pub fn load() -> Result<Self> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(Self::default());
        };
        let path = dir.join(APP_DIR).join(CONFIG_FILE);
        let config = Self::load_from(&path)?;
        if !path.exists() {
            if let Err(err) = config.save_to(&path) {
                warn!("⚠️  Could not write default configuration to {}: {}", path.display(), err);
            }
        }
        Ok(config)
    }

    /// Load from an explicit file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&json).map_err(|e| {
            TourError::InvalidConfiguration(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;

        info!("⚙️  Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.room_sequence.is_empty() {
            return Err(TourError::InvalidConfiguration(
                "room_sequence must name at least one room".into(),
            ));
        }
        if !(1..=100).contains(&self.frame_quality) {
            return Err(TourError::InvalidConfiguration(format!(
                "frame_quality must be 1-100, got {}",
                self.frame_quality
            )));
        }
        self.session_config().validate()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            room_sequence: self.room_sequence.clone(),
            max_captures_per_room: self.capture_density.captures_per_room(),
            capture_angle_step_degrees: self.capture_density.angle_step_degrees(),
        }
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_millis(self.geolocation_timeout_ms)
    }

    /// Directory holding the tour database
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("tourforge.db")
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("exports"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_density_maps_to_full_turn() {
        assert_eq!(CaptureDensity::Standard.captures_per_room(), 8);
        assert_eq!(CaptureDensity::Dense.captures_per_room(), 12);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"capture_density": "dense", "room_sequence": ["Studio"]}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        let session = config.session_config();

        assert_eq!(session.room_sequence, vec!["Studio".to_string()]);
        assert_eq!(session.max_captures_per_room, 12);
        assert_eq!(session.capture_angle_step_degrees, 30.0);
        assert_eq!(config.geolocation_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_malformed_file_is_invalid_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            AppConfig::load_from(&path),
            Err(TourError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_empty_room_list_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"room_sequence": []}"#).unwrap();

        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_duplicate_rooms_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"room_sequence": ["Kitchen", "Kitchen"]}"#).unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Kitchen"));
    }

    #[test]
    fn test_blank_room_rejected() {
        let config = AppConfig {
            room_sequence: vec!["Kitchen".into(), "  ".into()],
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(TourError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.json");
        let config = AppConfig {
            export_dir: Some(dir.path().join("out")),
            ..AppConfig::default()
        };

        config.save_to(&path).unwrap();

        let reloaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.export_dir(), dir.path().join("out"));
    }
}
