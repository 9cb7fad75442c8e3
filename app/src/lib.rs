//! # Emberlight App
//!
//! Headless application framework for driving an Emberlight render graph.
//!
//! This crate provides a generic `App` struct that owns the backend, a
//! simulated swapchain and the render graph. It compiles the graph, replays
//! it once per frame and recompiles after resizes or new declarations.
//!
//! ## Overview
//!
//! - [`AppHandler`] - Trait for declaring the graph and reacting to frames
//! - [`AppArgs`] - Trait for parsing command line arguments
//! - [`App`] - Main application struct that runs the frame loop
//!
//! ## Example
//!
//! ```ignore
//! use emberlight_app::{App, AppArgs, AppContext, AppHandler, DefaultAppArgs};
//!
//! struct MyApp;
//!
//! impl AppHandler for MyApp {
//!     fn on_init(&mut self, ctx: &mut AppContext) {
//!         // Declare resources and stages, then ctx.set_target(...)
//!     }
//! }
//!
//! fn main() {
//!     let args = DefaultAppArgs::parse();
//!     if let Err(e) = App::run(MyApp, args) {
//!         log::error!("{e}");
//!     }
//! }
//! ```

mod app;
mod args;
mod context;
mod handler;

pub use app::{App, AppError, AppSummary};
pub use args::{AppArgs, BackendKind, DefaultAppArgs, ResizeEvent, ResizeParseError};
pub use context::AppContext;
pub use handler::AppHandler;

/// App library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the app subsystem.
///
/// This should be called before using any app functionality.
pub fn init() {
    log::info!("Emberlight App v{} initialized", VERSION);
}
