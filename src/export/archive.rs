//! Zip packaging of a prepared tour
//!
//! Layout, shared by every destination that ships an archive:
//!
//! ```text
//! images/<room-slug>-<n>.<ext>   one per image, n counts from 1 within a room
//! tour.json                      TourManifest
//! README.txt                     upload instructions
//! viewer.html                    static page showing the images by room
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::optimize::ExportImage;
use crate::codec::OutputFormat;
use crate::error::Result;
use crate::state::data::{GeoCoordinates, PanoramaDescriptor, RoomRecord, Tour};

pub const MANIFEST_PATH: &str = "tour.json";
pub const README_PATH: &str = "README.txt";
pub const VIEWER_PATH: &str = "viewer.html";

/// Metadata of one packaged image; no pixel data
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageEntry {
    pub path: String,
    pub room: String,
    pub captured_at: DateTime<Utc>,
    pub angle_degrees: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GeoCoordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Structured description of a packaged tour
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TourManifest {
    #[serde(rename = "type")]
    pub kind: String,
    pub tour_id: i64,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub total_area_sq_m: f64,
    pub rooms: Vec<RoomRecord>,
    pub images: Vec<ImageEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panorama: Option<PanoramaDescriptor>,
    /// Destination-specific block, e.g. yandex requirements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<serde_json::Value>,
}

impl TourManifest {
    pub fn new(tour: &Tour, description: String, images: &[ExportImage]) -> Self {
        let images = image_paths(images)
            .into_iter()
            .zip(images)
            .map(|(path, image)| ImageEntry {
                path,
                room: image.room_label.clone(),
                captured_at: image.captured_at,
                angle_degrees: image.angle_degrees,
                coordinates: image.coordinates,
                width: image.dimensions.map(|(w, _)| w),
                height: image.dimensions.map(|(_, h)| h),
            })
            .collect();

        Self {
            kind: "virtual_tour".to_string(),
            tour_id: tour.id,
            display_name: tour.display_name.clone(),
            created_at: tour.created_at,
            description,
            total_area_sq_m: tour.total_area(),
            rooms: tour.rooms.clone(),
            images,
            panorama: tour.panorama.clone(),
            platform: None,
        }
    }

    pub fn with_platform(mut self, metadata: Option<serde_json::Value>) -> Self {
        self.platform = metadata;
        self
    }
}

/// File-name safe form of a room name: "Living room" -> "living-room"
pub fn slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("room");
    }
    slug
}

/// Archive path of every image, numbered per room in capture order
pub fn image_paths(images: &[ExportImage]) -> Vec<String> {
    let mut per_room: HashMap<&str, usize> = HashMap::new();
    images
        .iter()
        .map(|image| {
            let n = per_room.entry(image.room_label.as_str()).or_insert(0);
            *n += 1;
            let ext = image.format().unwrap_or(OutputFormat::Jpeg).extension();
            format!("images/{}-{}.{}", slug(&image.room_label), n, ext)
        })
        .collect()
}

/// Thin wrapper over an in-memory zip: add entries, then finish to bytes
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Add a file. Already-compressed data (JPEG, PNG) is stored as is.
    pub fn add_entry(&mut self, path: &str, bytes: &[u8], compress: bool) -> Result<()> {
        let method = if compress {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        let options = SimpleFileOptions::default().compression_method(method);
        self.writer.start_file(path, options)?;
        self.writer.write_all(bytes)?;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        Ok(self.writer.finish()?.into_inner())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pack images, manifest, instructions and viewer into one zip
pub fn package_tour(manifest: &TourManifest, images: &[ExportImage]) -> Result<Vec<u8>> {
    let mut archive = ArchiveBuilder::new();

    for (entry, image) in manifest.images.iter().zip(images) {
        archive.add_entry(&entry.path, &image.bytes, false)?;
    }
    archive.add_entry(MANIFEST_PATH, &super::json_document(manifest)?, true)?;
    archive.add_entry(README_PATH, readme(manifest).as_bytes(), true)?;
    archive.add_entry(VIEWER_PATH, viewer_html(manifest).as_bytes(), true)?;

    archive.finish()
}

fn readme(manifest: &TourManifest) -> String {
    let mut text = format!(
        "{}\n\n{}\n\nContents\n  images/      {} photos, named <room>-<number>\n  {}    rooms, areas and per-photo metadata\n  {}  open in a browser to preview the tour\n\n",
        manifest.display_name,
        manifest.description,
        manifest.images.len(),
        MANIFEST_PATH,
        VIEWER_PATH,
    );
    text.push_str(
        "Uploading\n  1. Open the listing form of your real-estate site.\n  2. Attach the photos from images/ in the order of their numbers.\n  3. Paste the description above into the listing text.\n",
    );
    text
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn viewer_html(manifest: &TourManifest) -> String {
    let mut sections = String::new();
    for room in &manifest.rooms {
        sections.push_str(&format!(
            "<section style=\"border-left:6px solid {}\">\n<h2>{} <small>{} m²</small></h2>\n",
            room.color.to_css(),
            escape_html(&room.name),
            super::description::format_area(room.area_sq_m)
        ));
        for image in manifest.images.iter().filter(|i| i.room == room.name) {
            sections.push_str(&format!(
                "<img src=\"{}\" alt=\"{}\" loading=\"lazy\">\n",
                escape_html(&image.path),
                escape_html(&image.room)
            ));
        }
        sections.push_str("</section>\n");
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n<title>{title}</title>\n<style>body{{font-family:sans-serif;margin:1rem}}img{{max-width:32%;margin:2px}}</style>\n</head>\n<body>\n<h1>{title}</h1>\n<p>{description}</p>\n{sections}</body>\n</html>\n",
        title = escape_html(&manifest.display_name),
        description = escape_html(&manifest.description),
        sections = sections,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::{CapturedImage, DisplayColor, LayoutPoint};
    use std::io::Read;
    use zip::ZipArchive;

    fn image(room: &str) -> ExportImage {
        ExportImage::from_captured(&CapturedImage::new(vec![0xFF, 0xD8, 0xFF], room, Utc::now(), 0.0, None))
    }

    fn tour() -> Tour {
        let rooms = vec![RoomRecord {
            name: "Living room".into(),
            area_sq_m: 20.0,
            layout: LayoutPoint::new(50.0, 50.0),
            color: DisplayColor::rgba(255, 107, 107, 0.6),
        }];
        Tour::new(Utc::now(), vec![], rooms, None)
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Living room"), "living-room");
        assert_eq!(slug("  Kids' room #2 "), "kids-room-2");
        assert_eq!(slug("Кухня"), "кухня");
        assert_eq!(slug("***"), "room");
    }

    #[test]
    fn test_paths_count_per_room() {
        let images = [image("Kitchen"), image("Living room"), image("Kitchen")];
        assert_eq!(
            image_paths(&images),
            vec!["images/kitchen-1.jpg", "images/living-room-1.jpg", "images/kitchen-2.jpg"]
        );
    }

    #[test]
    fn test_archive_layout() {
        let images = vec![image("Living room"), image("Living room")];
        let manifest = TourManifest::new(&tour(), "A flat".into(), &images);

        let bytes = package_tour(&manifest, &images).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "README.txt",
                "images/living-room-1.jpg",
                "images/living-room-2.jpg",
                "tour.json",
                "viewer.html",
            ]
        );

        let mut json = String::new();
        archive.by_name(MANIFEST_PATH).unwrap().read_to_string(&mut json).unwrap();
        let parsed: TourManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);

        let mut html = String::new();
        archive.by_name(VIEWER_PATH).unwrap().read_to_string(&mut html).unwrap();
        assert!(html.contains("images/living-room-2.jpg"));
        assert!(html.contains("border-left:6px solid rgba(255, 107, 107, 0.6)"));
    }

    #[test]
    fn test_viewer_escapes_names() {
        let mut manifest = TourManifest::new(&tour(), "<b>".into(), &[]);
        manifest.display_name = "A & B".into();
        let html = viewer_html(&manifest);
        assert!(html.contains("A &amp; B"));
        assert!(html.contains("&lt;b&gt;"));
    }
}
