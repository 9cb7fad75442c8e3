//! Application context shared with the handler callbacks.

use std::sync::Arc;

use emberlight_graphics::backend::GpuShaderModule;
use emberlight_graphics::backend::dummy::DummyStats;
use emberlight_graphics::{
    CompiledGraph, DummyBackend, Extent2d, Format, GpuBackend, GraphicsError, PresentationSurface,
    RenderGraph, ResourceHandle, ShaderStage, SurfaceImages,
};

/// Application context providing access to the graph and its device.
///
/// The handler declares its render graph through [`graph_mut`](Self::graph_mut)
/// and names the resource it renders to with [`set_target`](Self::set_target).
/// The app compiles and re-compiles the graph as declarations and the
/// surface change.
pub struct AppContext {
    /// The backend the graph is compiled against.
    pub(crate) backend: Arc<dyn GpuBackend>,
    /// Hands out simulated swapchain images.
    pub(crate) surface_provider: Arc<DummyBackend>,
    /// The current swapchain images.
    pub(crate) surface: SurfaceImages,
    pub(crate) graph: RenderGraph,
    pub(crate) target: Option<ResourceHandle>,
    pub(crate) compiled: Option<CompiledGraph>,
    /// Current frame number.
    pub(crate) frame_number: u64,
    /// Swapchain image the current frame renders into.
    pub(crate) image_index: u32,
    /// Delta time since last frame in seconds.
    pub(crate) delta_time: f32,
    /// Time since application start in seconds.
    pub(crate) elapsed_time: f32,
}

impl AppContext {
    pub(crate) fn new(
        backend: Arc<dyn GpuBackend>,
        surface_provider: Arc<DummyBackend>,
        surface: SurfaceImages,
    ) -> Self {
        Self {
            backend,
            surface_provider,
            surface,
            graph: RenderGraph::new(),
            target: None,
            compiled: None,
            frame_number: 0,
            image_index: 0,
            delta_time: 0.0,
            elapsed_time: 0.0,
        }
    }

    /// Get the graphics backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Get the current swapchain images.
    pub fn surface(&self) -> &SurfaceImages {
        &self.surface
    }

    /// Statistics of the backend that owns the swapchain images.
    ///
    /// Covers every graph object too while the dummy backend renders.
    pub fn device_stats(&self) -> DummyStats {
        self.surface_provider.stats()
    }

    /// Get the current surface extent.
    pub fn extent(&self) -> Extent2d {
        self.surface.extent()
    }

    /// Get the current surface width.
    pub fn width(&self) -> u32 {
        self.surface.extent().width
    }

    /// Get the current surface height.
    pub fn height(&self) -> u32 {
        self.surface.extent().height
    }

    /// Get the surface aspect ratio.
    pub fn aspect_ratio(&self) -> f32 {
        self.width() as f32 / self.height().max(1) as f32
    }

    /// Format of the swapchain images; declare the back buffer with it.
    pub fn surface_format(&self) -> Format {
        self.surface.image_format()
    }

    /// Get the current frame number.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Swapchain image index of the current frame.
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Get the delta time since last frame in seconds.
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the elapsed time since application start in seconds.
    pub fn elapsed_time(&self) -> f32 {
        self.elapsed_time
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    /// Mutable access to the render graph.
    ///
    /// Adding declarations makes the current compilation stale; the app
    /// compiles again before the next frame.
    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.graph
    }

    /// Set the resource whose contents make up the frame.
    pub fn set_target(&mut self, target: impl Into<ResourceHandle>) {
        self.target = Some(target.into());
    }

    pub fn target(&self) -> Option<ResourceHandle> {
        self.target
    }

    /// The current compilation, once the first frame has been prepared.
    pub fn compiled(&self) -> Option<&CompiledGraph> {
        self.compiled.as_ref()
    }

    /// Create a shader module on the graph's backend.
    pub fn create_shader_module(
        &self,
        label: &str,
        stage: ShaderStage,
        code: &[u32],
    ) -> Result<Arc<GpuShaderModule>, GraphicsError> {
        self.backend
            .create_shader_module(label, stage, code)
            .map(Arc::new)
    }
}
