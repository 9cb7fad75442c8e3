//! Render graph declarations.
//!
//! A [`RenderGraph`] holds everything the application declares once at
//! setup: resources, stages, extra pipelines and resource descriptors. None
//! of these own GPU objects. [`RenderGraph::compile`] resolves them into a
//! [`CompiledGraph`](crate::compiler::CompiledGraph) for one presentation
//! target; [`CompiledGraph::render`](crate::compiler::CompiledGraph::render)
//! then replays it every frame.
//!
//! # Architecture
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Declarations | [`RenderGraph`] | Resources, stages, pipelines, descriptors (this module) |
//! | Compilation | [`CompiledGraph`](crate::compiler::CompiledGraph) | Stage order and physical GPU objects |
//! | Execution | [`StageContext`](crate::executor::StageContext) | Per-frame refresh and recording |
//!
//! Dependencies are never declared directly. A stage depends on every stage
//! that writes a resource it reads.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = RenderGraph::new();
//! let back_buffer = graph.add_texture("back buffer", TextureUsage::BackBuffer, Format::Bgra8Srgb, None);
//! let vertices = graph.add_buffer("vertices", BufferUsage::Vertex);
//! graph.request_update(vertices, &cube_vertices)?;
//!
//! graph.add_graphics_stage("scene", |stage| {
//!     stage
//!         .bind_buffer(vertices, 0)
//!         .writes_to(back_buffer)
//!         .set_clears_target(true)
//!         .uses_shader(ShaderStage::Vertex, vs, "main")
//!         .uses_shader(ShaderStage::Fragment, fs, "main")
//!         .set_on_record(|_ctx, cmd| cmd.draw(36, 1, 0, 0));
//! });
//!
//! let mut compiled = graph.compile(&backend, &surface, back_buffer)?;
//! compiled.render(&mut graph, image_index, &mut recorder)?;
//! ```

mod descriptor;
mod resource;
mod stage;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;
use slotmap::SlotMap;

use crate::backend::{GpuBackend, PresentationSurface};
use crate::compiler::CompiledGraph;
use crate::error::{ConfigurationError, GraphError};
use crate::pipeline::GraphicsPipelineBuilder;
use crate::types::{BufferUsage, Extent2d, Format, TextureUsage};

pub use descriptor::{
    DescriptorBinding, DescriptorHandle, DescriptorResource, DescriptorSetBuilder,
    ResourceDescriptor,
};
pub use resource::{
    BufferHandle, BufferResource, BufferUpdateFn, ResourceHandle, ResourceRegistry, TextureHandle,
    TextureResource, TextureUpdateFn,
};
pub use stage::{
    GraphicsStageConfig, PipelineConfigureFn, PipelineDeclaration, PipelineHandle, RecordFn,
    ShaderBinding, Stage, StageBuilder, StageHandle, StageKind, StageRegistry, StageUpdateFn,
};

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// What compile does with a read that nothing produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnwrittenReadPolicy {
    /// Reject the graph with [`ConfigurationError::UnwrittenRead`].
    #[default]
    Error,
    /// Log a warning and compile anyway.
    Allow,
}

/// Compile-time validation options of a [`RenderGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphOptions {
    /// Handling of reads with no writer and no external supply.
    pub unwritten_reads: UnwrittenReadPolicy,
    /// Report dependency cycles as configuration errors.
    pub detect_cycles: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            unwritten_reads: UnwrittenReadPolicy::Error,
            detect_cycles: true,
        }
    }
}

impl GraphOptions {
    pub fn with_unwritten_reads(mut self, policy: UnwrittenReadPolicy) -> Self {
        self.unwritten_reads = policy;
        self
    }

    pub fn with_cycle_detection(mut self, enabled: bool) -> Self {
        self.detect_cycles = enabled;
        self
    }
}

/// Declarations of a frame: resources, stages, pipelines and descriptors.
#[derive(Debug)]
pub struct RenderGraph {
    id: u64,
    /// Bumped by every declaration, so compiled graphs can detect staleness.
    revision: u64,
    options: GraphOptions,
    resources: ResourceRegistry,
    stages: StageRegistry,
    descriptors: SlotMap<DescriptorHandle, ResourceDescriptor>,
    pipelines: SlotMap<PipelineHandle, PipelineDeclaration>,
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderGraph {
    /// Create a new empty render graph with default options.
    pub fn new() -> Self {
        Self::with_options(GraphOptions::default())
    }

    pub fn with_options(options: GraphOptions) -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            revision: 0,
            options,
            resources: ResourceRegistry::new(),
            stages: StageRegistry::new(),
            descriptors: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
        }
    }

    /// Process-unique identity of this graph.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Declaration revision. Changes whenever something is declared or a
    /// vertex buffer's layout changes.
    pub fn revision(&self) -> u64 {
        self.revision + self.resources.layout_revision()
    }

    pub fn options(&self) -> GraphOptions {
        self.options
    }

    pub fn set_options(&mut self, options: GraphOptions) {
        self.options = options;
        self.revision += 1;
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Declare a buffer.
    pub fn add_buffer(&mut self, name: impl Into<String>, usage: BufferUsage) -> BufferHandle {
        self.insert_buffer(name.into(), usage, None)
    }

    /// Declare a buffer refreshed by `update` once per frame.
    pub fn add_buffer_with_update(
        &mut self,
        name: impl Into<String>,
        usage: BufferUsage,
        update: impl FnMut(&mut BufferResource) + 'static,
    ) -> BufferHandle {
        self.insert_buffer(name.into(), usage, Some(Box::new(update)))
    }

    fn insert_buffer(
        &mut self,
        name: String,
        usage: BufferUsage,
        update: Option<BufferUpdateFn>,
    ) -> BufferHandle {
        self.revision += 1;
        log::trace!("Declaring {} buffer '{}'", usage, name);
        self.resources
            .insert_buffer(BufferResource::new(name, usage, update))
    }

    /// Declare a texture. Without an explicit extent it follows the
    /// presentation surface.
    pub fn add_texture(
        &mut self,
        name: impl Into<String>,
        usage: TextureUsage,
        format: Format,
        extent: Option<Extent2d>,
    ) -> TextureHandle {
        self.insert_texture(name.into(), usage, format, extent, None)
    }

    /// Declare a texture refreshed by `update` once per frame.
    pub fn add_texture_with_update(
        &mut self,
        name: impl Into<String>,
        usage: TextureUsage,
        format: Format,
        extent: Option<Extent2d>,
        update: impl FnMut(&mut TextureResource) + 'static,
    ) -> TextureHandle {
        self.insert_texture(name.into(), usage, format, extent, Some(Box::new(update)))
    }

    fn insert_texture(
        &mut self,
        name: String,
        usage: TextureUsage,
        format: Format,
        extent: Option<Extent2d>,
        update: Option<TextureUpdateFn>,
    ) -> TextureHandle {
        self.revision += 1;
        log::trace!("Declaring {:?} texture '{}' ({:?})", usage, name, format);
        self.resources
            .insert_texture(TextureResource::new(name, usage, format, extent, update))
    }

    /// Replace the staging data of a buffer or texture and mark it dirty.
    pub fn request_update<T: Pod>(
        &mut self,
        resource: impl Into<ResourceHandle>,
        data: &[T],
    ) -> Result<(), GraphError> {
        let resource = resource.into();
        match resource {
            ResourceHandle::Buffer(handle) => self
                .resources
                .buffer_mut(handle)
                .map(|buffer| buffer.request_update(data)),
            ResourceHandle::Texture(handle) => self
                .resources
                .texture_mut(handle)
                .map(|texture| texture.request_update(data)),
        }
        .ok_or_else(|| ConfigurationError::UnknownResource(resource).into())
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Mutable access to resource state such as staging data, vertex
    /// attributes and external marks.
    pub fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&BufferResource> {
        self.resources.buffer(handle)
    }

    pub fn buffer_mut(&mut self, handle: BufferHandle) -> Option<&mut BufferResource> {
        self.resources.buffer_mut(handle)
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureResource> {
        self.resources.texture(handle)
    }

    pub fn texture_mut(&mut self, handle: TextureHandle) -> Option<&mut TextureResource> {
        self.resources.texture_mut(handle)
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// Declare a graphics stage configured by `build`.
    pub fn add_graphics_stage(
        &mut self,
        name: impl Into<String>,
        build: impl FnOnce(&mut StageBuilder),
    ) -> StageHandle {
        self.revision += 1;
        let name = name.into();
        log::trace!("Declaring stage '{}'", name);
        self.stages.add(name, build)
    }

    /// Same as [`add_graphics_stage`](Self::add_graphics_stage).
    pub fn add_graphics_pass(
        &mut self,
        name: impl Into<String>,
        build: impl FnOnce(&mut StageBuilder),
    ) -> StageHandle {
        self.add_graphics_stage(name, build)
    }

    /// Declare an additional pipeline for `stage`.
    ///
    /// `configure` receives a builder already holding the stage's pipeline
    /// layout, render pass, viewport and scissor. It runs on every compile.
    pub fn add_graphics_pipeline(
        &mut self,
        stage: StageHandle,
        name: impl Into<String>,
        configure: impl Fn(&mut GraphicsPipelineBuilder) + 'static,
    ) -> PipelineHandle {
        self.revision += 1;
        self.pipelines.insert(PipelineDeclaration::new(
            name.into(),
            stage,
            Box::new(configure),
        ))
    }

    /// Declare a descriptor set whose bindings reference graph resources.
    pub fn add_resource_descriptor(
        &mut self,
        name: impl Into<String>,
        build: impl FnOnce(&mut DescriptorSetBuilder),
    ) -> DescriptorHandle {
        self.revision += 1;
        let mut builder = DescriptorSetBuilder::new();
        build(&mut builder);
        self.descriptors.insert(builder.finish(name.into()))
    }

    pub fn stages(&self) -> &StageRegistry {
        &self.stages
    }

    pub fn stage(&self, handle: StageHandle) -> Option<&Stage> {
        self.stages.get(handle)
    }

    pub fn descriptor(&self, handle: DescriptorHandle) -> Option<&ResourceDescriptor> {
        self.descriptors.get(handle)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = (DescriptorHandle, &ResourceDescriptor)> {
        self.descriptors.iter()
    }

    pub fn pipeline(&self, handle: PipelineHandle) -> Option<&PipelineDeclaration> {
        self.pipelines.get(handle)
    }

    pub fn pipelines(&self) -> impl Iterator<Item = (PipelineHandle, &PipelineDeclaration)> {
        self.pipelines.iter()
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut ResourceRegistry, &mut StageRegistry) {
        (&mut self.resources, &mut self.stages)
    }

    /// Compile the stages contributing to `target` into physical GPU state.
    ///
    /// Nothing is created unless the declarations validate; any rejected
    /// GPU object aborts the compile and releases what was already built.
    pub fn compile(
        &self,
        backend: &Arc<dyn GpuBackend>,
        surface: &dyn PresentationSurface,
        target: impl Into<ResourceHandle>,
    ) -> Result<CompiledGraph, GraphError> {
        crate::compiler::compile(self, backend, surface, target.into())
    }
}

impl std::fmt::Display for RenderGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "RenderGraph #{} (revision {}):", self.id, self.revision())?;
        for (_, stage) in self.stages.iter() {
            let names = |handles: &[ResourceHandle]| {
                handles
                    .iter()
                    .map(|&handle| self.resources.describe(handle))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            writeln!(
                f,
                "  {}: reads [{}] writes [{}]",
                stage.name(),
                names(stage.reads()),
                names(stage.writes())
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declarations_bump_revision() {
        let mut graph = RenderGraph::new();
        assert_eq!(graph.revision(), 0);

        let buffer = graph.add_buffer("vertices", BufferUsage::Vertex);
        let texture = graph.add_texture(
            "back buffer",
            TextureUsage::BackBuffer,
            Format::Bgra8Srgb,
            None,
        );
        graph.add_graphics_stage("scene", |stage| {
            stage.bind_buffer(buffer, 0).writes_to(texture);
        });
        assert_eq!(graph.revision(), 3);

        // The first upload infers the vertex stride.
        graph.request_update(buffer, &[0u32; 4]).unwrap();
        assert_eq!(graph.revision(), 4);
        graph.request_update(buffer, &[1u32; 4]).unwrap();
        assert_eq!(graph.revision(), 4);
    }

    #[test]
    fn test_graph_ids_are_unique() {
        assert_ne!(RenderGraph::new().id(), RenderGraph::new().id());
    }

    #[test]
    fn test_request_update_marks_dirty() {
        let mut graph = RenderGraph::new();
        let texture = graph.add_texture(
            "albedo",
            TextureUsage::Sampled,
            Format::Rgba8Unorm,
            Some(Extent2d::new(2, 2)),
        );
        graph.request_update(texture, &[0xffu8; 16]).unwrap();

        let texture = graph.texture(texture).unwrap();
        assert!(texture.is_dirty());
        assert_eq!(texture.data().len(), 16);
    }

    #[test]
    fn test_options_builder() {
        let options = GraphOptions::default()
            .with_unwritten_reads(UnwrittenReadPolicy::Allow)
            .with_cycle_detection(false);
        assert_eq!(options.unwritten_reads, UnwrittenReadPolicy::Allow);
        assert!(!options.detect_cycles);
        assert!(GraphOptions::default().detect_cycles);
    }

    #[test]
    fn test_display_lists_stages() {
        let mut graph = RenderGraph::new();
        let target = graph.add_texture("target", TextureUsage::Sampled, Format::Rgba8Unorm, None);
        graph.add_graphics_pass("blit", |stage| {
            stage.writes_to(target);
        });
        let text = graph.to_string();
        assert!(text.contains("blit: reads [] writes [target]"));
    }
}
