pub mod camera;
pub mod controller;
pub mod geo;
pub mod sensor;
pub mod session;
