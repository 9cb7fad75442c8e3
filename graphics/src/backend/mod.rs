//! GPU backend abstraction layer.
//!
//! The render graph never talks to a graphics API directly. It consumes three
//! collaborators, all defined here:
//!
//! - [`GpuBackend`]: the device handle that creates buffers, images,
//!   render passes, pipelines and framebuffers
//! - [`PresentationSurface`]: the swapchain, exposing its extent, format and
//!   one image view per image
//! - [`CommandRecorder`]: the command buffer a frame is recorded into
//!
//! # Available Backends
//!
//! - [`DummyBackend`](dummy::DummyBackend) (always): no GPU work, tracks
//!   object lifetimes and records commands for tests
//! - `vulkan-backend`: native Vulkan via ash, wrapping a device created by
//!   the application
//!
//! GPU objects are returned as backend-tagged enums ([`GpuBuffer`],
//! [`GpuImage`], ...). Dropping one releases the underlying object.

pub mod dummy;
mod handles;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipelineDescriptor;
use crate::types::{
    BufferDescriptor, ClearValue, DescriptorSetLayoutDescriptor, DescriptorWrite, Extent2d,
    Format, ImageDescriptor, IndexFormat, PushConstantRange, RenderPassDescriptor,
    SamplerDescriptor, ScissorRect, ShaderStage, ShaderStages, Viewport,
};

pub use dummy::{DummyBackend, RecordedCommand, RecordingCommandBuffer};
pub use handles::{
    GpuBuffer, GpuDescriptorSet, GpuDescriptorSetLayout, GpuFramebuffer, GpuImage, GpuImageView,
    GpuPipeline, GpuPipelineLayout, GpuRenderPass, GpuSampler, GpuShaderModule,
};

/// Kind of GPU object, used for diagnostics and object accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Image,
    Sampler,
    ShaderModule,
    RenderPass,
    Framebuffer,
    DescriptorSetLayout,
    DescriptorSet,
    PipelineLayout,
    Pipeline,
}

impl ObjectKind {
    /// All object kinds, in creation-dependency order.
    pub const ALL: [ObjectKind; 10] = [
        Self::Buffer,
        Self::Image,
        Self::Sampler,
        Self::ShaderModule,
        Self::RenderPass,
        Self::Framebuffer,
        Self::DescriptorSetLayout,
        Self::DescriptorSet,
        Self::PipelineLayout,
        Self::Pipeline,
    ];
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Buffer => "buffer",
            Self::Image => "image",
            Self::Sampler => "sampler",
            Self::ShaderModule => "shader module",
            Self::RenderPass => "render pass",
            Self::Framebuffer => "framebuffer",
            Self::DescriptorSetLayout => "descriptor set layout",
            Self::DescriptorSet => "descriptor set",
            Self::PipelineLayout => "pipeline layout",
            Self::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

/// Descriptor for creating a framebuffer.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferDescriptor<'a> {
    pub label: &'a str,
    pub render_pass: &'a GpuRenderPass,
    /// Attachment views in the render pass's attachment order.
    pub attachments: &'a [GpuImageView],
    pub extent: Extent2d,
}

/// Descriptor for creating a pipeline layout.
#[derive(Debug, Clone, Copy)]
pub struct PipelineLayoutDescriptor<'a> {
    pub label: &'a str,
    pub set_layouts: &'a [&'a GpuDescriptorSetLayout],
    pub push_constant_ranges: &'a [PushConstantRange],
}

/// GPU backend trait for abstracting different GPU APIs.
///
/// Every creation call is synchronous. A rejected request is reported as a
/// [`GraphicsError`] and never retried by the caller.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a buffer populated with `contents`.
    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
        contents: &[u8],
    ) -> Result<GpuBuffer, GraphicsError>;

    /// Create an image together with its default view.
    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<GpuImage, GraphicsError>;

    /// Upload tightly packed texel data covering the whole image.
    ///
    /// The image is left ready for sampling in fragment shaders.
    fn write_image(&self, image: &GpuImage, data: &[u8]) -> Result<(), GraphicsError>;

    /// Create a sampler.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError>;

    /// Create a shader module from SPIR-V words.
    fn create_shader_module(
        &self,
        label: &str,
        stage: ShaderStage,
        code: &[u32],
    ) -> Result<GpuShaderModule, GraphicsError>;

    /// Create a single-subpass render pass.
    fn create_render_pass(
        &self,
        descriptor: &RenderPassDescriptor,
    ) -> Result<GpuRenderPass, GraphicsError>;

    /// Create a framebuffer for a render pass.
    fn create_framebuffer(
        &self,
        descriptor: &FramebufferDescriptor<'_>,
    ) -> Result<GpuFramebuffer, GraphicsError>;

    /// Create a descriptor-set layout.
    fn create_descriptor_set_layout(
        &self,
        descriptor: &DescriptorSetLayoutDescriptor,
    ) -> Result<GpuDescriptorSetLayout, GraphicsError>;

    /// Allocate a descriptor set with the given layout.
    fn allocate_descriptor_set(
        &self,
        label: &str,
        layout: &GpuDescriptorSetLayout,
    ) -> Result<GpuDescriptorSet, GraphicsError>;

    /// Point bindings of a descriptor set at resources.
    fn update_descriptor_set(
        &self,
        set: &GpuDescriptorSet,
        writes: &[DescriptorWrite<'_>],
    ) -> Result<(), GraphicsError>;

    /// Create a pipeline layout.
    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor<'_>,
    ) -> Result<GpuPipelineLayout, GraphicsError>;

    /// Create a graphics pipeline.
    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor<'_>,
    ) -> Result<GpuPipeline, GraphicsError>;

    /// Block until the device has finished all submitted work.
    fn wait_idle(&self) -> Result<(), GraphicsError>;
}

/// The command-recording object a frame is recorded into.
///
/// Recording is CPU-side work and cannot fail. Backends log and skip
/// commands given objects that belong to a different backend.
pub trait CommandRecorder {
    /// Begin a render pass on `framebuffer`, covering `render_area`.
    fn begin_render_pass(
        &mut self,
        render_pass: &GpuRenderPass,
        framebuffer: &GpuFramebuffer,
        render_area: Extent2d,
        clear_values: &[ClearValue],
    );

    /// End the current render pass.
    fn end_render_pass(&mut self);

    /// Bind a graphics pipeline.
    fn bind_pipeline(&mut self, pipeline: &GpuPipeline);

    /// Bind consecutive vertex buffers starting at `first_binding`.
    fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[&GpuBuffer]);

    /// Bind an index buffer.
    fn bind_index_buffer(&mut self, buffer: &GpuBuffer, format: IndexFormat);

    /// Bind descriptor sets starting at `first_set`.
    fn bind_descriptor_sets(
        &mut self,
        layout: &GpuPipelineLayout,
        first_set: u32,
        sets: &[&GpuDescriptorSet],
    );

    /// Update push constants.
    fn push_constants(
        &mut self,
        layout: &GpuPipelineLayout,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    );

    /// Set the dynamic viewport.
    fn set_viewport(&mut self, viewport: &Viewport);

    /// Set the dynamic scissor rectangle.
    fn set_scissor(&mut self, scissor: &ScissorRect);

    /// Draw non-indexed primitives.
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    /// Draw indexed primitives.
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// Full execution and memory barrier between everything recorded before
    /// and everything recorded after.
    fn full_barrier(&mut self);
}

/// A presentation surface the graph renders into.
pub trait PresentationSurface {
    /// Current extent of the surface images.
    fn extent(&self) -> Extent2d;

    /// Format of the surface images.
    fn image_format(&self) -> Format;

    /// One view per surface image, indexed by image index.
    fn image_views(&self) -> &[GpuImageView];
}

/// Plain presentation surface built from swapchain images owned elsewhere.
#[derive(Debug, Clone)]
pub struct SurfaceImages {
    extent: Extent2d,
    format: Format,
    views: Vec<GpuImageView>,
}

impl SurfaceImages {
    /// Wrap the views of a swapchain.
    pub fn new(extent: Extent2d, format: Format, views: Vec<GpuImageView>) -> Self {
        Self {
            extent,
            format,
            views,
        }
    }

    /// Number of surface images.
    pub fn image_count(&self) -> usize {
        self.views.len()
    }
}

impl PresentationSurface for SurfaceImages {
    fn extent(&self) -> Extent2d {
        self.extent
    }

    fn image_format(&self) -> Format {
        self.format
    }

    fn image_views(&self) -> &[GpuImageView] {
        &self.views
    }
}

static_assertions::assert_impl_all!(SurfaceImages: Send, Sync);
static_assertions::assert_obj_safe!(GpuBackend, CommandRecorder, PresentationSurface);
