//! Shared data structures for captured tours
//!
//! These structs flow from the capture session through the floor-plan
//! generator into the tour store and finally into the export engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latitude/longitude attached to a capture
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoCoordinates {
    pub lat: f64,
    pub lng: f64,
}

impl GeoCoordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// The "unknown position" value used when geolocation is unavailable
    pub fn zero() -> Self {
        Self::default()
    }
}

/// A single still taken during a capture session.
///
/// Fields are private: the room label is fixed when the image is created and
/// nothing downstream can rewrite it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CapturedImage {
    image_bytes: Vec<u8>,
    room_label: String,
    captured_at: DateTime<Utc>,
    angle_degrees: f64,
    coordinates: Option<GeoCoordinates>,
}

impl CapturedImage {
    pub fn new(
        image_bytes: Vec<u8>,
        room_label: impl Into<String>,
        captured_at: DateTime<Utc>,
        angle_degrees: f64,
        coordinates: Option<GeoCoordinates>,
    ) -> Self {
        Self {
            image_bytes,
            room_label: room_label.into(),
            captured_at,
            angle_degrees,
            coordinates,
        }
    }

    /// Encoded still (JPEG from the frame adapter)
    pub fn image_bytes(&self) -> &[u8] {
        &self.image_bytes
    }

    /// Move the encoded still out, leaving only metadata behind
    pub(crate) fn take_image_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.image_bytes)
    }

    pub(crate) fn restore_image_bytes(&mut self, bytes: Vec<u8>) {
        self.image_bytes = bytes;
    }

    pub fn room_label(&self) -> &str {
        &self.room_label
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Heading at capture time, degrees in [0, 360)
    pub fn angle_degrees(&self) -> f64 {
        self.angle_degrees
    }

    pub fn coordinates(&self) -> Option<GeoCoordinates> {
        self.coordinates
    }
}

/// Position of a room on the floor-plan canvas (plan units, not meters)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutPoint {
    pub x: f32,
    pub y: f32,
}

impl LayoutPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// RGBA fill used when drawing a room, components in 0..=255 plus alpha 0..=1
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct DisplayColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl DisplayColor {
    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// CSS notation, as written into the archive viewer page
    pub fn to_css(&self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

/// One logical room of a finished tour
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoomRecord {
    pub name: String,
    pub area_sq_m: f64,
    pub layout: LayoutPoint,
    pub color: DisplayColor,
}

/// A point of interest inside the panorama
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Hotspot {
    pub pitch: f64,
    pub yaw: f64,
    pub label: String,
}

/// Opaque reference handed to the 360° viewer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PanoramaDescriptor {
    /// Projection, e.g. "equirectangular"
    pub projection: String,
    /// Image the viewer should load
    pub source: String,
    pub auto_load: bool,
    pub hotspots: Vec<Hotspot>,
}

/// A finalized capture session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tour {
    /// Creation time in milliseconds since the Unix epoch
    pub id: i64,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    /// Encoded bytes of the first capture, empty for an image-less tour
    pub preview_image: Vec<u8>,
    pub rooms: Vec<RoomRecord>,
    pub images: Vec<CapturedImage>,
    pub panorama: Option<PanoramaDescriptor>,
}

impl Tour {
    /// Assemble a tour, deriving id, name and preview from the inputs
    pub fn new(
        created_at: DateTime<Utc>,
        images: Vec<CapturedImage>,
        rooms: Vec<RoomRecord>,
        panorama: Option<PanoramaDescriptor>,
    ) -> Self {
        let preview_image = images
            .first()
            .map(|image| image.image_bytes().to_vec())
            .unwrap_or_default();

        Self {
            id: created_at.timestamp_millis(),
            display_name: format!("Tour from {}", created_at.format("%Y-%m-%d")),
            created_at,
            preview_image,
            rooms,
            images,
            panorama,
        }
    }

    /// Sum of all room areas in square meters
    pub fn total_area(&self) -> f64 {
        self.rooms.iter().fold(0.0, |acc, room| acc + room.area_sq_m)
    }

    /// Images captured in the named room, in capture order
    pub fn images_in_room<'a>(&'a self, room: &'a str) -> impl Iterator<Item = &'a CapturedImage> {
        self.images.iter().filter(move |image| image.room_label() == room)
    }
}
