//! TourForge: guided room capture, floor plans and listing-site export for
//! virtual apartment tours.
//!
//! The desktop shell in `main.rs` is a thin iced front end; everything it
//! does goes through the modules below.

pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod processing;
pub mod state;

pub use error::{Result, TourError};
