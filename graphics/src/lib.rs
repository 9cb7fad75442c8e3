//! # Emberlight Graphics
//!
//! Declarative render graph compiled into GPU work.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderGraph`] - Declarations of buffers, textures, stages, extra
//!   pipelines and resource descriptors
//! - [`CompiledGraph`] - Stage order and the physical GPU objects of one
//!   compilation, replayed every frame with [`CompiledGraph::render`]
//! - [`GraphicsPipelineBuilder`] - Reusable, graph-agnostic pipeline builder
//! - [`GpuBackend`] - Trait for graphics backend implementations, with a
//!   Dummy backend for tests and a Vulkan backend behind `vulkan-backend`
//!
//! ## Example
//!
//! ```ignore
//! use emberlight_graphics::{RenderGraph, TextureUsage, Format};
//!
//! let mut graph = RenderGraph::new();
//! let back_buffer = graph.add_texture("back buffer", TextureUsage::BackBuffer, Format::Bgra8Srgb, None);
//! graph.add_graphics_stage("clear", |stage| {
//!     stage.writes_to(back_buffer).set_clears_target(true).set_on_record(|_, _| {});
//! });
//!
//! let mut compiled = graph.compile(&backend, &surface, back_buffer)?;
//! loop {
//!     let stats = compiled.render(&mut graph, image_index, &mut recorder)?;
//! }
//! ```

pub mod backend;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod graph;
pub mod pipeline;
pub mod profiling;
pub mod types;

// Re-export main types for convenience
pub use backend::{
    CommandRecorder, DummyBackend, GpuBackend, PresentationSurface, RecordedCommand,
    RecordingCommandBuffer, SurfaceImages,
};
pub use compiler::{CompiledGraph, PhysicalBuffer, PhysicalStage, PhysicalTexture};
pub use error::{ConfigurationError, GraphError, GraphicsError};
pub use executor::{FrameStats, StageContext};
pub use graph::{
    BufferHandle, DescriptorHandle, GraphOptions, PipelineHandle, RenderGraph, ResourceHandle,
    StageHandle, TextureHandle, UnwrittenReadPolicy,
};
pub use pipeline::GraphicsPipelineBuilder;
pub use types::{
    BufferUsage, ClearValue, Extent2d, Format, IndexFormat, ShaderStage, ShaderStages,
    TextureUsage,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// Only logs the version; there is no global state to set up.
pub fn init() {
    log::info!("Emberlight Graphics v{} initialized", VERSION);
}
