//! # Emberlight Demos
//!
//! Demo scenes driving Emberlight render graphs.
//!
//! ## Available Demos
//!
//! - `cube_demo` - Spinning cube with a depth buffer and an alpha-blended
//!   overlay, rendered headless through simulated resizes

pub mod geometry;

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
