//! Render stages and the registry that owns them.

use std::sync::Arc;

use slotmap::{SlotMap, new_key_type};

use crate::backend::{CommandRecorder, GpuShaderModule};
use crate::executor::StageContext;
use crate::pipeline::GraphicsPipelineBuilder;
use crate::types::{
    ColorBlendAttachment, CullMode, PolygonMode, PrimitiveTopology, PushConstantRange,
    ShaderStage,
};

use super::descriptor::DescriptorHandle;
use super::resource::{BufferHandle, ResourceHandle, ResourceRegistry};

new_key_type! {
    /// Handle to a stage in a [`StageRegistry`].
    pub struct StageHandle;
    /// Handle to an additional pipeline declared on a stage.
    pub struct PipelineHandle;
}

/// Records the commands of one stage. Runs once per frame, inside the
/// stage's render pass, after its buffers and pipeline are bound.
pub type RecordFn = Box<dyn FnMut(&StageContext<'_>, &mut dyn CommandRecorder)>;

/// Runs once per frame before recording; requests resource updates.
pub type StageUpdateFn = Box<dyn FnMut(&mut ResourceRegistry)>;

/// Configures a pipeline builder already seeded with the stage's layout,
/// render pass, viewport and scissor.
pub type PipelineConfigureFn = Box<dyn Fn(&mut GraphicsPipelineBuilder)>;

/// A shader module bound to a pipeline stage.
#[derive(Debug, Clone)]
pub struct ShaderBinding {
    pub stage: ShaderStage,
    pub module: Arc<GpuShaderModule>,
    pub entry_point: String,
}

/// Fixed-function and shader configuration of a graphics stage.
#[derive(Debug, Clone, Default)]
pub struct GraphicsStageConfig {
    shaders: Vec<ShaderBinding>,
    vertex_bindings: Vec<(BufferHandle, u32)>,
    depth_test: bool,
    depth_write: bool,
    blend_attachments: Vec<ColorBlendAttachment>,
    cull_mode: CullMode,
    polygon_mode: PolygonMode,
    topology: PrimitiveTopology,
}

impl GraphicsStageConfig {
    pub fn shaders(&self) -> &[ShaderBinding] {
        &self.shaders
    }

    /// Vertex binding index of a read buffer.
    pub fn vertex_binding(&self, buffer: BufferHandle) -> Option<u32> {
        self.vertex_bindings
            .iter()
            .find(|(handle, _)| *handle == buffer)
            .map(|(_, binding)| *binding)
    }

    pub fn depth_test(&self) -> bool {
        self.depth_test
    }

    pub fn depth_write(&self) -> bool {
        self.depth_write
    }

    /// Declared blend attachments. Empty means one opaque attachment per
    /// color target.
    pub fn blend_attachments(&self) -> &[ColorBlendAttachment] {
        &self.blend_attachments
    }

    pub fn cull_mode(&self) -> CullMode {
        self.cull_mode
    }

    pub fn polygon_mode(&self) -> PolygonMode {
        self.polygon_mode
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }
}

/// What kind of GPU work a stage performs.
#[derive(Debug, Clone)]
pub enum StageKind {
    Graphics(GraphicsStageConfig),
}

/// A logical render stage.
pub struct Stage {
    name: String,
    reads: Vec<ResourceHandle>,
    writes: Vec<ResourceHandle>,
    clears_target: bool,
    clear_color: Option<[f32; 4]>,
    kind: StageKind,
    descriptors: Vec<DescriptorHandle>,
    push_constant_ranges: Vec<PushConstantRange>,
    record: Option<RecordFn>,
    update: Option<StageUpdateFn>,
}

impl Stage {
    fn new(name: String) -> Self {
        Self {
            name,
            reads: Vec::new(),
            writes: Vec::new(),
            clears_target: false,
            clear_color: None,
            kind: StageKind::Graphics(GraphicsStageConfig::default()),
            descriptors: Vec::new(),
            push_constant_ranges: Vec::new(),
            record: None,
            update: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resources read, in declaration order.
    pub fn reads(&self) -> &[ResourceHandle] {
        &self.reads
    }

    /// Resources written, in declaration order.
    pub fn writes(&self) -> &[ResourceHandle] {
        &self.writes
    }

    pub fn clears_target(&self) -> bool {
        self.clears_target
    }

    pub fn clear_color(&self) -> Option<[f32; 4]> {
        self.clear_color
    }

    pub fn kind(&self) -> &StageKind {
        &self.kind
    }

    /// Graphics configuration of the stage.
    pub fn graphics(&self) -> &GraphicsStageConfig {
        match &self.kind {
            StageKind::Graphics(config) => config,
        }
    }

    pub fn descriptors(&self) -> &[DescriptorHandle] {
        &self.descriptors
    }

    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }

    pub fn has_record_callback(&self) -> bool {
        self.record.is_some()
    }

    pub(crate) fn record_mut(&mut self) -> Option<&mut RecordFn> {
        self.record.as_mut()
    }

    pub(crate) fn update_mut(&mut self) -> Option<&mut StageUpdateFn> {
        self.update.as_mut()
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("clears_target", &self.clears_target)
            .field("kind", &self.kind)
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

/// Mutable view of a stage under construction.
///
/// ```ignore
/// graph.add_graphics_stage("scene", |stage| {
///     stage
///         .reads_from(vertices)
///         .bind_buffer(vertices, 0)
///         .writes_to(back_buffer)
///         .writes_to(depth)
///         .set_clears_target(true)
///         .set_depth_options(true, true)
///         .uses_shader(ShaderStage::Vertex, vs, "main")
///         .uses_shader(ShaderStage::Fragment, fs, "main")
///         .set_on_record(|ctx, cmd| cmd.draw(36, 1, 0, 0));
/// });
/// ```
pub struct StageBuilder {
    stage: Stage,
}

impl StageBuilder {
    fn new(name: String) -> Self {
        Self {
            stage: Stage::new(name),
        }
    }

    fn config(&mut self) -> &mut GraphicsStageConfig {
        match &mut self.stage.kind {
            StageKind::Graphics(config) => config,
        }
    }

    /// Declare a read. Reading the same resource twice has no effect.
    pub fn reads_from(&mut self, resource: impl Into<ResourceHandle>) -> &mut Self {
        let resource = resource.into();
        if !self.stage.reads.contains(&resource) {
            self.stage.reads.push(resource);
        }
        self
    }

    /// Declare a write. Writes become attachments in declaration order.
    pub fn writes_to(&mut self, resource: impl Into<ResourceHandle>) -> &mut Self {
        let resource = resource.into();
        if !self.stage.writes.contains(&resource) {
            self.stage.writes.push(resource);
        }
        self
    }

    /// Read `buffer` as vertex input at binding index `binding`.
    pub fn bind_buffer(&mut self, buffer: BufferHandle, binding: u32) -> &mut Self {
        self.reads_from(buffer);
        let config = self.config();
        match config
            .vertex_bindings
            .iter()
            .position(|(handle, _)| *handle == buffer)
        {
            Some(index) => config.vertex_bindings[index].1 = binding,
            None => config.vertex_bindings.push((buffer, binding)),
        }
        self
    }

    pub fn set_clears_target(&mut self, clears: bool) -> &mut Self {
        self.stage.clears_target = clears;
        self
    }

    /// Color used when clearing color targets. Defaults to transparent black.
    pub fn set_clear_color(&mut self, color: [f32; 4]) -> &mut Self {
        self.stage.clear_color = Some(color);
        self
    }

    pub fn set_depth_options(&mut self, test: bool, write: bool) -> &mut Self {
        let config = self.config();
        config.depth_test = test;
        config.depth_write = write;
        self
    }

    pub fn uses_shader(
        &mut self,
        stage: ShaderStage,
        module: Arc<GpuShaderModule>,
        entry_point: impl Into<String>,
    ) -> &mut Self {
        self.config().shaders.push(ShaderBinding {
            stage,
            module,
            entry_point: entry_point.into(),
        });
        self
    }

    /// Same as [`uses_shader`](Self::uses_shader).
    pub fn add_shader(
        &mut self,
        stage: ShaderStage,
        module: Arc<GpuShaderModule>,
        entry_point: impl Into<String>,
    ) -> &mut Self {
        self.uses_shader(stage, module, entry_point)
    }

    /// Add a blend attachment. When any are declared, there must be one per
    /// written color texture.
    pub fn add_color_blend_attachment(&mut self, attachment: ColorBlendAttachment) -> &mut Self {
        self.config().blend_attachments.push(attachment);
        self
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) -> &mut Self {
        self.config().cull_mode = mode;
        self
    }

    pub fn set_wireframe(&mut self, wireframe: bool) -> &mut Self {
        self.config().polygon_mode = if wireframe {
            PolygonMode::Line
        } else {
            PolygonMode::Fill
        };
        self
    }

    pub fn set_topology(&mut self, topology: PrimitiveTopology) -> &mut Self {
        self.config().topology = topology;
        self
    }

    /// Bind a resource descriptor. Its set layout is added to the stage's
    /// pipeline layout at the next set index and its resources become reads.
    pub fn uses_descriptor(&mut self, descriptor: DescriptorHandle) -> &mut Self {
        if !self.stage.descriptors.contains(&descriptor) {
            self.stage.descriptors.push(descriptor);
        }
        self
    }

    pub fn add_push_constant_range(&mut self, range: PushConstantRange) -> &mut Self {
        self.stage.push_constant_ranges.push(range);
        self
    }

    /// Register the record callback, replacing any previous one.
    pub fn set_on_record(
        &mut self,
        record: impl FnMut(&StageContext<'_>, &mut dyn CommandRecorder) + 'static,
    ) -> &mut Self {
        self.stage.record = Some(Box::new(record));
        self
    }

    /// Register the per-frame update callback, replacing any previous one.
    pub fn set_on_update(
        &mut self,
        update: impl FnMut(&mut ResourceRegistry) + 'static,
    ) -> &mut Self {
        self.stage.update = Some(Box::new(update));
        self
    }

    pub(crate) fn finish(self) -> Stage {
        self.stage
    }
}

/// An additional pipeline declared on a stage.
pub struct PipelineDeclaration {
    name: String,
    stage: StageHandle,
    configure: PipelineConfigureFn,
}

impl PipelineDeclaration {
    pub(crate) fn new(name: String, stage: StageHandle, configure: PipelineConfigureFn) -> Self {
        Self {
            name,
            stage,
            configure,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> StageHandle {
        self.stage
    }

    pub(crate) fn configure(&self, builder: &mut GraphicsPipelineBuilder) {
        (self.configure)(builder);
    }
}

impl std::fmt::Debug for PipelineDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDeclaration")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

/// Owner of all stages of a graph, in declaration order.
#[derive(Debug, Default)]
pub struct StageRegistry {
    stages: SlotMap<StageHandle, Stage>,
    order: Vec<StageHandle>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(
        &mut self,
        name: String,
        build: impl FnOnce(&mut StageBuilder),
    ) -> StageHandle {
        let mut builder = StageBuilder::new(name);
        build(&mut builder);
        let handle = self.stages.insert(builder.finish());
        self.order.push(handle);
        handle
    }

    pub fn get(&self, handle: StageHandle) -> Option<&Stage> {
        self.stages.get(handle)
    }

    pub(crate) fn get_mut(&mut self, handle: StageHandle) -> Option<&mut Stage> {
        self.stages.get_mut(handle)
    }

    pub fn contains(&self, handle: StageHandle) -> bool {
        self.stages.contains_key(handle)
    }

    /// Stages in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (StageHandle, &Stage)> {
        self.order
            .iter()
            .filter_map(|&handle| self.stages.get(handle).map(|stage| (handle, stage)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Name for diagnostics, falling back to the handle for unknown stages.
    pub(crate) fn describe(&self, handle: StageHandle) -> String {
        self.get(handle)
            .map(|stage| stage.name.clone())
            .unwrap_or_else(|| format!("{handle:?}"))
    }
}
