//! Common utilities for render graph integration tests.
//!
//! Tests run against the dummy backend, which tracks every object it creates
//! and validates attachment counts, extents and upload sizes the same way a
//! real device would reject them.

use std::sync::Arc;

use emberlight_graphics::backend::{GpuShaderModule, ObjectKind};
use emberlight_graphics::{
    BufferHandle, BufferUsage, DummyBackend, Extent2d, Format, GpuBackend, RenderGraph,
    ResourceHandle, ShaderStage, StageHandle, SurfaceImages, TextureHandle, TextureUsage,
};

/// SPIR-V magic number, enough for the dummy backend to accept a module.
pub const SPIRV_STUB: &[u32] = &[0x0723_0203];

pub const SURFACE_EXTENT: Extent2d = Extent2d::new(800, 600);
pub const SURFACE_FORMAT: Format = Format::Bgra8Srgb;
pub const SURFACE_IMAGES: usize = 3;

// ============================================================================
// Test Context
// ============================================================================

/// Dummy device plus a simulated swapchain.
pub struct TestContext {
    /// Concrete backend, for stats and failure injection.
    pub dummy: Arc<DummyBackend>,
    /// The same backend as the graph sees it.
    pub backend: Arc<dyn GpuBackend>,
    pub surface: SurfaceImages,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_extent(SURFACE_EXTENT)
    }

    pub fn with_extent(extent: Extent2d) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dummy = Arc::new(DummyBackend::new());
        let surface = dummy.create_surface(extent, SURFACE_FORMAT, SURFACE_IMAGES);
        let backend: Arc<dyn GpuBackend> = dummy.clone();
        Self {
            dummy,
            backend,
            surface,
        }
    }

    /// Replace the surface, as a swapchain recreation would.
    pub fn resize(&mut self, extent: Extent2d) {
        self.surface = self
            .dummy
            .create_surface(extent, SURFACE_FORMAT, SURFACE_IMAGES);
    }

    pub fn shader(&self, stage: ShaderStage) -> Arc<GpuShaderModule> {
        Arc::new(
            self.backend
                .create_shader_module("test shader", stage, SPIRV_STUB)
                .expect("Failed to create shader module"),
        )
    }

    pub fn live(&self, kind: ObjectKind) -> usize {
        self.dummy.stats().live(kind)
    }

    /// Total live objects of every kind except shader modules, which the
    /// graph declarations own.
    pub fn live_graph_objects(&self) -> usize {
        let stats = self.dummy.stats();
        ObjectKind::ALL
            .iter()
            .filter(|&&kind| kind != ObjectKind::ShaderModule)
            .map(|&kind| stats.live(kind))
            .sum()
    }
}

// ============================================================================
// Graph Helpers
// ============================================================================

pub fn back_buffer(graph: &mut RenderGraph) -> TextureHandle {
    graph.add_texture("back buffer", TextureUsage::BackBuffer, SURFACE_FORMAT, None)
}

/// A color texture sized like the surface.
pub fn color_target(graph: &mut RenderGraph, name: &str) -> TextureHandle {
    graph.add_texture(name, TextureUsage::Sampled, Format::Rgba16Float, None)
}

/// A vertex buffer with a position attribute and `vertex_count` vertices.
pub fn position_buffer(graph: &mut RenderGraph, name: &str, vertex_count: usize) -> BufferHandle {
    let buffer = graph.add_buffer(name, BufferUsage::Vertex);
    graph
        .buffer_mut(buffer)
        .expect("buffer just declared")
        .add_vertex_attribute(Format::Rgb32Float, 0)
        .set_element_size(12);
    graph
        .request_update(buffer, &vec![[0.0f32; 3]; vertex_count])
        .expect("buffer just declared");
    buffer
}

/// Declare a stage with both shaders and a no-op record callback.
pub fn simple_stage(
    ctx: &TestContext,
    graph: &mut RenderGraph,
    name: &str,
    reads: &[ResourceHandle],
    writes: &[ResourceHandle],
) -> StageHandle {
    let vertex = ctx.shader(ShaderStage::Vertex);
    let fragment = ctx.shader(ShaderStage::Fragment);
    graph.add_graphics_stage(name, |stage| {
        for &read in reads {
            stage.reads_from(read);
        }
        for &write in writes {
            stage.writes_to(write);
        }
        stage
            .uses_shader(ShaderStage::Vertex, vertex, "main")
            .uses_shader(ShaderStage::Fragment, fragment, "main")
            .set_on_record(|_, recorder| recorder.draw(3, 1, 0, 0));
    })
}
