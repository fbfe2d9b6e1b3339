//! Listing text built from the floor plan

use crate::state::data::RoomRecord;

/// Whole numbers print without a fraction, everything else with up to two decimals
pub fn format_area(area: f64) -> String {
    // -0.0 + 0.0 is +0.0, so an empty sum never prints "-0"
    let area = area + 0.0;
    if area.fract() == 0.0 {
        format!("{:.0}", area)
    } else {
        let text = format!("{:.2}", area);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Deterministic listing description: total area followed by every room
pub fn build_description(rooms: &[RoomRecord]) -> String {
    let total = rooms.iter().fold(0.0, |acc, room| acc + room.area_sq_m);
    let listing = if rooms.is_empty() {
        "none".to_string()
    } else {
        rooms
            .iter()
            .map(|room| format!("{} ({} m²)", room.name, format_area(room.area_sq_m)))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "Virtual tour of an apartment with a total area of {} m². Rooms: {}.",
        format_area(total),
        listing
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::{DisplayColor, LayoutPoint};
    use proptest::prelude::*;

    fn room(name: &str, area: f64) -> RoomRecord {
        RoomRecord {
            name: name.to_string(),
            area_sq_m: area,
            layout: LayoutPoint::new(0.0, 0.0),
            color: DisplayColor::rgba(0, 0, 0, 1.0),
        }
    }

    #[test]
    fn test_kitchen_and_bath() {
        let text = build_description(&[room("Kitchen", 12.0), room("Bath", 8.0)]);

        assert_eq!(
            text,
            "Virtual tour of an apartment with a total area of 20 m². Rooms: Kitchen (12 m²), Bath (8 m²)."
        );
        assert_eq!(text.matches("Kitchen").count(), 1);
        assert_eq!(text.matches("Bath").count(), 1);
    }

    #[test]
    fn test_fractional_areas() {
        assert_eq!(format_area(12.5), "12.5");
        assert_eq!(format_area(7.25), "7.25");
        assert_eq!(format_area(3.0), "3");
    }

    #[test]
    fn test_negative_zero_prints_as_zero() {
        assert_eq!(format_area(-0.0), "0");
    }

    #[test]
    fn test_no_rooms() {
        assert_eq!(
            build_description(&[]),
            "Virtual tour of an apartment with a total area of 0 m². Rooms: none."
        );
    }

    proptest! {
        #[test]
        fn prop_total_is_sum_of_whole_areas(areas in proptest::collection::vec(1u32..200, 1..8)) {
            let rooms: Vec<RoomRecord> = areas
                .iter()
                .enumerate()
                .map(|(i, area)| room(&format!("Room{}", i), f64::from(*area)))
                .collect();
            let total: u32 = areas.iter().sum();

            let text = build_description(&rooms);

            let expected_total = format!("total area of {} m²", total);
            prop_assert!(text.contains(&expected_total));
            prop_assert_eq!(text.clone(), build_description(&rooms));
            for (i, area) in areas.iter().enumerate() {
                let entry = format!("Room{} ({} m²)", i, area);
                prop_assert!(text.contains(&entry));
            }
        }
    }
}
