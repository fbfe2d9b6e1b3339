//! State management module
//!
//! - Tour store on SQLite (library.rs)
//! - Shared data structures (data.rs)

pub mod data;
pub mod library;
