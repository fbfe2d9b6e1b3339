pub mod floor_plan;
