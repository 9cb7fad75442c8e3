//! Render graph compilation.
//!
//! Compiling a [`RenderGraph`] for one presentation target happens in two
//! halves:
//!
//! 1. **Resolution** - build the writer index, order the stages reachable
//!    from the target with a depth-first post-order traversal, and validate
//!    them. Nothing touches the GPU yet.
//! 2. **Realization** - allocate physical textures, placeholder buffers and
//!    descriptor sets, then build a render pass, pipeline layout, pipeline
//!    and one framebuffer per surface image for every ordered stage.
//!
//! A backend rejection in the second half aborts the whole compile. Objects
//! created up to that point are released on return.
//!
//! Within a compiled graph, stages execute sequentially with a full barrier
//! between them. There is no aliasing, barrier batching or multi-queue
//! scheduling.
//!
//! # Example
//!
//! ```ignore
//! let mut compiled = graph.compile(&backend, &surface, back_buffer)?;
//! for stage in compiled.stage_order() {
//!     println!("{}", graph.stage(*stage).unwrap().name());
//! }
//!
//! // After a resize:
//! compiled = compiled.recompile(&graph, &new_surface)?;
//! ```

mod ordering;
mod physical;
mod validate;

use std::sync::Arc;

use slotmap::SecondaryMap;

use crate::backend::{
    GpuBackend, GpuDescriptorSet, GpuPipeline, ObjectKind, PresentationSurface,
};
use crate::error::{ConfigurationError, GraphError};
use crate::graph::{
    BufferHandle, DescriptorHandle, DescriptorResource, PipelineHandle, RenderGraph,
    ResourceHandle, StageHandle, TextureHandle,
};
use crate::pipeline::GraphicsPipelineBuilder;
use crate::profiling::profile_function;
use crate::types::Extent2d;

pub use physical::{PhysicalBuffer, PhysicalDescriptor, PhysicalStage, PhysicalTexture};

pub(crate) use physical::{buffer_reads, write_descriptor};

/// A render graph compiled for one presentation target and surface.
///
/// Owns every physical GPU object of the compilation. Dropping it, or
/// replacing it through [`recompile`](Self::recompile), releases them.
pub struct CompiledGraph {
    graph_id: u64,
    revision: u64,
    target: ResourceHandle,
    extent: Extent2d,
    image_count: usize,
    stage_order: Vec<StageHandle>,
    // Field order is drop order: pipelines go before the stages owning their
    // layouts and render passes, stages before the images they attach.
    pub(crate) pipelines: SecondaryMap<PipelineHandle, GpuPipeline>,
    pub(crate) physical_stages: SecondaryMap<StageHandle, PhysicalStage>,
    pub(crate) descriptors: SecondaryMap<DescriptorHandle, PhysicalDescriptor>,
    pub(crate) buffers: SecondaryMap<BufferHandle, PhysicalBuffer>,
    pub(crate) textures: SecondaryMap<TextureHandle, PhysicalTexture>,
    pub(crate) backend: Arc<dyn GpuBackend>,
}

impl CompiledGraph {
    /// Id of the graph this was compiled from.
    pub fn graph_id(&self) -> u64 {
        self.graph_id
    }

    /// Declaration revision this was compiled from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn target(&self) -> ResourceHandle {
        self.target
    }

    /// Surface extent at compile time.
    pub fn extent(&self) -> Extent2d {
        self.extent
    }

    /// Number of surface images, and so of framebuffers per stage.
    pub fn image_count(&self) -> usize {
        self.image_count
    }

    /// Stages in execution order.
    pub fn stage_order(&self) -> &[StageHandle] {
        &self.stage_order
    }

    pub fn stage_count(&self) -> usize {
        self.stage_order.len()
    }

    pub fn physical_stage(&self, stage: StageHandle) -> Option<&PhysicalStage> {
        self.physical_stages.get(stage)
    }

    pub fn physical_buffer(&self, buffer: BufferHandle) -> Option<&PhysicalBuffer> {
        self.buffers.get(buffer)
    }

    pub fn physical_texture(&self, texture: TextureHandle) -> Option<&PhysicalTexture> {
        self.textures.get(texture)
    }

    pub fn physical_descriptor(&self, descriptor: DescriptorHandle) -> Option<&PhysicalDescriptor> {
        self.descriptors.get(descriptor)
    }

    pub fn descriptor_set(&self, descriptor: DescriptorHandle) -> Option<&GpuDescriptorSet> {
        self.descriptors.get(descriptor).map(PhysicalDescriptor::set)
    }

    /// A user-declared pipeline. Pipelines of stages outside the compiled
    /// order are not built.
    pub fn pipeline(&self, pipeline: PipelineHandle) -> Option<&GpuPipeline> {
        self.pipelines.get(pipeline)
    }

    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Wait for the device to go idle, release this generation and compile
    /// `graph` again for the same target against `surface`.
    ///
    /// Staging data survives in the declarations, so buffers and textures
    /// are re-materialized by the next render.
    pub fn recompile(
        self,
        graph: &RenderGraph,
        surface: &dyn PresentationSurface,
    ) -> Result<CompiledGraph, GraphError> {
        if graph.id() != self.graph_id {
            return Err(GraphError::ForeignGraph);
        }
        self.backend.wait_idle().map_err(GraphError::DeviceWait)?;

        let backend = Arc::clone(&self.backend);
        let target = self.target;
        log::debug!(
            "Recompiling graph #{} for {} surface",
            self.graph_id,
            surface.extent()
        );
        drop(self);
        graph.compile(&backend, surface, target)
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("graph_id", &self.graph_id)
            .field("revision", &self.revision)
            .field("target", &self.target)
            .field("extent", &self.extent)
            .field("image_count", &self.image_count)
            .field("stage_order", &self.stage_order)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

/// Compile the stages of `graph` contributing to `target`.
pub(crate) fn compile(
    graph: &RenderGraph,
    backend: &Arc<dyn GpuBackend>,
    surface: &dyn PresentationSurface,
    target: ResourceHandle,
) -> Result<CompiledGraph, GraphError> {
    profile_function!();

    let resources = graph.resources();
    if !resources.contains(target) {
        return Err(ConfigurationError::UnknownResource(target).into());
    }

    let writers = ordering::writer_index(graph.stages());
    let stage_order =
        ordering::order_stages(graph, &writers, target, graph.options().detect_cycles)?;
    if stage_order.is_empty() {
        return Err(ConfigurationError::TargetHasNoWriter {
            resource: resources.describe(target),
        }
        .into());
    }

    let extent = surface.extent();
    validate::validate(graph, &stage_order, &writers, extent)?;

    log::debug!(
        "Stage order for '{}': {}",
        resources.describe(target),
        stage_order
            .iter()
            .map(|&stage| graph.stages().describe(stage))
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    let image_count = surface.image_views().len();
    if image_count == 0 {
        return Err(ConfigurationError::NoSurfaceImages.into());
    }

    let device: &dyn GpuBackend = backend.as_ref();
    let buffers = physical::allocate_buffers(resources);
    let textures = physical::allocate_textures(device, resources, surface)?;

    let mut descriptors = SecondaryMap::new();
    for &handle in &stage_order {
        let Some(stage) = graph.stage(handle) else {
            continue;
        };
        for &descriptor in stage.descriptors() {
            if descriptors.contains_key(descriptor) {
                continue;
            }
            let Some(declared) = graph.descriptor(descriptor) else {
                continue;
            };
            let physical = physical::build_descriptor(device, declared)?;
            // Buffers are still placeholders, so only image bindings resolve.
            write_descriptor(device, declared, &physical, &buffers, &textures, |resource| {
                matches!(resource, DescriptorResource::CombinedImageSampler(_))
            })
            .map_err(GraphError::creation(
                ObjectKind::DescriptorSet,
                declared.name(),
            ))?;
            descriptors.insert(descriptor, physical);
        }
    }

    let mut factory = physical::StageFactory {
        backend: device,
        graph,
        surface,
        textures: &textures,
        descriptors: &descriptors,
        builder: GraphicsPipelineBuilder::new(),
    };

    let mut physical_stages = SecondaryMap::new();
    for &handle in &stage_order {
        if let Some(stage) = graph.stage(handle) {
            physical_stages.insert(handle, factory.build_stage(stage)?);
        }
    }

    let mut pipelines = SecondaryMap::new();
    for (handle, declaration) in graph.pipelines() {
        if let Some(stage) = physical_stages.get(declaration.stage()) {
            pipelines.insert(handle, factory.build_pipeline(declaration, stage)?);
        }
    }
    drop(factory);

    log::debug!(
        "Compiled {} stages, {} textures, {} descriptor sets, {} extra pipelines at {}",
        physical_stages.len(),
        textures.len(),
        descriptors.len(),
        pipelines.len(),
        extent
    );

    Ok(CompiledGraph {
        graph_id: graph.id(),
        revision: graph.revision(),
        target,
        extent,
        image_count,
        stage_order,
        pipelines,
        physical_stages,
        descriptors,
        buffers,
        textures,
        backend: Arc::clone(backend),
    })
}

static_assertions::assert_impl_all!(CompiledGraph: Send, Sync);
