//! Panorama stitching
//!
//! No stitching happens yet: [`DemoPanorama`] points the viewer at a static
//! equirectangular image and drops one hotspot per capture at its nominal
//! yaw.

use crate::state::data::{CapturedImage, Hotspot, PanoramaDescriptor};

pub const DEMO_PANORAMA_SOURCE: &str = "https://pannellum.org/images/alma.jpg";

pub trait PanoramaStitcher: Send + Sync {
    fn stitch(&self, images: &[CapturedImage]) -> PanoramaDescriptor;
}

#[derive(Debug, Clone)]
pub struct DemoPanorama {
    source: String,
    yaw_step_degrees: f64,
}

impl DemoPanorama {
    pub fn new(yaw_step_degrees: f64) -> Self {
        Self {
            source: DEMO_PANORAMA_SOURCE.to_string(),
            yaw_step_degrees,
        }
    }
}

impl PanoramaStitcher for DemoPanorama {
    fn stitch(&self, images: &[CapturedImage]) -> PanoramaDescriptor {
        let hotspots = (0..images.len())
            .map(|index| Hotspot {
                pitch: 0.0,
                yaw: (index as f64 * self.yaw_step_degrees).rem_euclid(360.0),
                label: format!("Shot {}", index + 1),
            })
            .collect();

        PanoramaDescriptor {
            projection: "equirectangular".to_string(),
            source: self.source.clone(),
            auto_load: true,
            hotspots,
        }
    }
}
