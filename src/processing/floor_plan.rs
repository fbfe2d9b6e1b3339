//! Floor-plan generation
//!
//! [`FixedLayout`] does not look at pixels: every known room type has a
//! canned area, position and color. It still honours the generator contract
//! of one record per distinct room label, in order of first capture, so a
//! real reconstruction can replace it without touching callers.

use cgmath::Point2;
use std::collections::HashSet;

use crate::state::data::{CapturedImage, DisplayColor, LayoutPoint, RoomRecord};

/// Plan units per meter of room side when drawing square rooms
pub const PLAN_UNITS_PER_METER: f32 = 10.0;

pub trait FloorPlanGenerator: Send + Sync {
    /// Derive room records from the ordered captures of one session
    fn generate(&self, images: &[CapturedImage]) -> Vec<RoomRecord>;
}

/// Canned placement for one room type
#[derive(Debug, Clone, PartialEq)]
pub struct RoomTemplate {
    pub name: String,
    pub area_sq_m: f64,
    pub layout: LayoutPoint,
    pub color: DisplayColor,
}

impl RoomTemplate {
    fn new(name: &str, area_sq_m: f64, x: f32, y: f32, color: DisplayColor) -> Self {
        Self {
            name: name.to_string(),
            area_sq_m,
            layout: LayoutPoint::new(x, y),
            color,
        }
    }
}

/// Area given to rooms the template table does not know
const FALLBACK_AREA: f64 = 10.0;

const FALLBACK_COLORS: [DisplayColor; 4] = [
    DisplayColor::rgba(255, 206, 84, 0.6),
    DisplayColor::rgba(72, 207, 173, 0.6),
    DisplayColor::rgba(236, 135, 192, 0.6),
    DisplayColor::rgba(172, 146, 236, 0.6),
];

#[derive(Debug, Clone)]
pub struct FixedLayout {
    templates: Vec<RoomTemplate>,
}

impl Default for FixedLayout {
    fn default() -> Self {
        Self::new(vec![
            RoomTemplate::new("Living room", 20.0, 50.0, 50.0, DisplayColor::rgba(255, 107, 107, 0.6)),
            RoomTemplate::new("Kitchen", 12.0, 150.0, 50.0, DisplayColor::rgba(77, 171, 247, 0.6)),
            RoomTemplate::new("Bedroom", 15.0, 50.0, 150.0, DisplayColor::rgba(130, 224, 170, 0.6)),
            RoomTemplate::new("Bathroom", 8.0, 150.0, 150.0, DisplayColor::rgba(180, 142, 173, 0.6)),
            RoomTemplate::new("Hallway", 10.0, 100.0, 100.0, DisplayColor::rgba(245, 176, 65, 0.6)),
        ])
    }
}

impl FixedLayout {
    pub fn new(templates: Vec<RoomTemplate>) -> Self {
        Self { templates }
    }

    fn template_for(&self, label: &str) -> Option<&RoomTemplate> {
        self.templates
            .iter()
            .find(|template| template.name.eq_ignore_ascii_case(label))
    }

    /// Unknown rooms go on a three-wide grid below the canned layout
    fn fallback_slot(slot: usize) -> (LayoutPoint, DisplayColor) {
        let column = (slot % 3) as f32;
        let row = (slot / 3) as f32;
        (
            LayoutPoint::new(50.0 + column * 100.0, 250.0 + row * 100.0),
            FALLBACK_COLORS[slot % FALLBACK_COLORS.len()],
        )
    }
}

impl FloorPlanGenerator for FixedLayout {
    fn generate(&self, images: &[CapturedImage]) -> Vec<RoomRecord> {
        let mut seen = HashSet::new();
        let mut rooms = Vec::new();
        let mut unknown = 0;

        for image in images {
            let label = image.room_label();
            if !seen.insert(label) {
                continue;
            }

            let record = match self.template_for(label) {
                Some(template) => RoomRecord {
                    name: label.to_string(),
                    area_sq_m: template.area_sq_m,
                    layout: template.layout,
                    color: template.color,
                },
                None => {
                    let (layout, color) = Self::fallback_slot(unknown);
                    unknown += 1;
                    RoomRecord {
                        name: label.to_string(),
                        area_sq_m: FALLBACK_AREA,
                        layout,
                        color,
                    }
                }
            };
            rooms.push(record);
        }

        rooms
    }
}

/// Side length, in plan units, of the square a room is drawn as
pub fn room_side(room: &RoomRecord) -> f32 {
    (room.area_sq_m.max(0.0) as f32).sqrt() * PLAN_UNITS_PER_METER
}

/// Bottom-right corner of the drawn plan, for fitting it into a viewport
pub fn plan_extent(rooms: &[RoomRecord]) -> Point2<f32> {
    rooms.iter().fold(Point2::new(0.0, 0.0), |extent, room| {
        let side = room_side(room);
        Point2::new(
            extent.x.max(room.layout.x + side),
            extent.y.max(room.layout.y + side),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn shots(labels: &[&str]) -> Vec<CapturedImage> {
        labels
            .iter()
            .map(|label| CapturedImage::new(vec![], *label, Utc::now(), 0.0, None))
            .collect()
    }

    #[test]
    fn test_one_record_per_distinct_label_in_capture_order() {
        let rooms = FixedLayout::default().generate(&shots(&[
            "Kitchen", "Kitchen", "Living room", "Kitchen", "Bathroom",
        ]));

        let names: Vec<&str> = rooms.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Kitchen", "Living room", "Bathroom"]);
        assert_eq!(rooms[0].area_sq_m, 12.0);
        assert_eq!(rooms[1].layout, LayoutPoint::new(50.0, 50.0));
    }

    #[test]
    fn test_unknown_rooms_get_fallback_slots() {
        let rooms = FixedLayout::default().generate(&shots(&["Balcony", "Pantry", "Kitchen"]));

        assert_eq!(rooms[0].area_sq_m, FALLBACK_AREA);
        assert_eq!(rooms[0].layout, LayoutPoint::new(50.0, 250.0));
        assert_eq!(rooms[1].layout, LayoutPoint::new(150.0, 250.0));
        assert_ne!(rooms[0].color, rooms[1].color);
        assert_eq!(rooms[2].area_sq_m, 12.0);
    }

    #[test]
    fn test_no_images_no_rooms() {
        assert!(FixedLayout::default().generate(&[]).is_empty());
    }

    #[test]
    fn test_plan_extent_covers_every_room() {
        let rooms = FixedLayout::default().generate(&shots(&["Living room", "Bathroom"]));
        let extent = plan_extent(&rooms);

        // Bathroom: 8 m² at (150, 150) -> side ~28.3
        assert!((extent.x - (150.0 + 8f32.sqrt() * 10.0)).abs() < 1e-3);
        assert!((extent.y - (150.0 + 8f32.sqrt() * 10.0)).abs() < 1e-3);
    }
}
