//! Stand-ins for the "smart" steps between capture and tour
//!
//! Each step is a strategy trait with a placeholder implementation:
//! - Room classification (classifier.rs)
//! - Floor-plan layout (floor_plan.rs)
//! - Panorama stitching (panorama.rs)

pub mod classifier;
pub mod floor_plan;
pub mod panorama;
