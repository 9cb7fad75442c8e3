//! Retained graphics-pipeline builder.

use std::sync::Arc;

use crate::backend::{
    GpuBackend, GpuDescriptorSetLayout, GpuPipeline, GpuPipelineLayout, GpuRenderPass,
    GpuShaderModule, PipelineLayoutDescriptor,
};
use crate::error::GraphicsError;
use crate::types::{
    ColorBlendAttachment, CompareOp, CullMode, DepthStencilState, DynamicState, FrontFace,
    InputAssemblyState, MultisampleState, PolygonMode, PrimitiveTopology, PushConstantRange,
    RasterizationState, ScissorRect, ShaderStage, VertexAttributeDescription,
    VertexBindingDescription, VertexInputState, Viewport,
};

use super::{GraphicsPipelineDescriptor, ShaderStageDescriptor};

#[derive(Debug, Clone)]
struct ShaderEntry {
    stage: ShaderStage,
    module: Arc<GpuShaderModule>,
    entry_point: String,
}

/// Stateful builder for graphics pipelines.
///
/// Every setter returns `&mut Self` so calls can be chained on a builder
/// that outlives a single pipeline. [`build`](Self::build) always resets the
/// builder, whether or not the backend accepted the pipeline.
#[derive(Debug, Default)]
pub struct GraphicsPipelineBuilder {
    shaders: Vec<ShaderEntry>,
    vertex_input: VertexInputState,
    input_assembly: InputAssemblyState,
    rasterization: RasterizationState,
    multisample: MultisampleState,
    depth_stencil: DepthStencilState,
    color_blend_attachments: Vec<ColorBlendAttachment>,
    dynamic_states: Vec<DynamicState>,
    push_constant_ranges: Vec<PushConstantRange>,
    descriptor_set_layouts: Vec<Arc<GpuDescriptorSetLayout>>,
    viewports: Vec<Viewport>,
    scissors: Vec<ScissorRect>,
    layout: Option<Arc<GpuPipelineLayout>>,
    render_pass: Option<Arc<GpuRenderPass>>,
    subpass: u32,
}

impl GraphicsPipelineBuilder {
    /// Create a builder in its default state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore the default state: triangle list without restart, filled
    /// polygons, back-face culling, clockwise front faces, line width 1, one
    /// sample, no depth test, no blend attachments and no dynamic state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    // ========================================================================
    // Shaders and layout
    // ========================================================================

    /// Add a shader stage. Stages are passed to the backend in insertion order.
    pub fn add_shader(
        &mut self,
        stage: ShaderStage,
        module: Arc<GpuShaderModule>,
        entry_point: impl Into<String>,
    ) -> &mut Self {
        self.shaders.push(ShaderEntry {
            stage,
            module,
            entry_point: entry_point.into(),
        });
        self
    }

    /// Drop all shader stages added so far.
    pub fn clear_shaders(&mut self) -> &mut Self {
        self.shaders.clear();
        self
    }

    /// Use an existing pipeline layout.
    pub fn set_layout(&mut self, layout: Arc<GpuPipelineLayout>) -> &mut Self {
        self.layout = Some(layout);
        self
    }

    /// Render pass and subpass the pipeline will be used in.
    pub fn set_render_pass(&mut self, render_pass: Arc<GpuRenderPass>) -> &mut Self {
        self.render_pass = Some(render_pass);
        self
    }

    pub fn set_subpass(&mut self, subpass: u32) -> &mut Self {
        self.subpass = subpass;
        self
    }

    /// Add a descriptor-set layout used by [`create_layout`](Self::create_layout).
    pub fn add_descriptor_set_layout(&mut self, layout: Arc<GpuDescriptorSetLayout>) -> &mut Self {
        self.descriptor_set_layouts.push(layout);
        self
    }

    /// Add a push-constant range used by [`create_layout`](Self::create_layout).
    pub fn add_push_constant_range(&mut self, range: PushConstantRange) -> &mut Self {
        self.push_constant_ranges.push(range);
        self
    }

    /// Create a pipeline layout from the accumulated descriptor-set layouts and
    /// push-constant ranges, and use it for the next build.
    pub fn create_layout(
        &mut self,
        backend: &dyn GpuBackend,
        label: &str,
    ) -> Result<Arc<GpuPipelineLayout>, GraphicsError> {
        let set_layouts: Vec<&GpuDescriptorSetLayout> =
            self.descriptor_set_layouts.iter().map(Arc::as_ref).collect();
        let layout = Arc::new(backend.create_pipeline_layout(&PipelineLayoutDescriptor {
            label,
            set_layouts: &set_layouts,
            push_constant_ranges: &self.push_constant_ranges,
        })?);
        self.layout = Some(Arc::clone(&layout));
        Ok(layout)
    }

    // ========================================================================
    // Vertex input and input assembly
    // ========================================================================

    pub fn add_vertex_binding(&mut self, binding: VertexBindingDescription) -> &mut Self {
        self.vertex_input.bindings.push(binding);
        self
    }

    pub fn add_vertex_attribute(&mut self, attribute: VertexAttributeDescription) -> &mut Self {
        self.vertex_input.attributes.push(attribute);
        self
    }

    /// Replace the whole vertex input configuration.
    pub fn set_vertex_input(&mut self, vertex_input: VertexInputState) -> &mut Self {
        self.vertex_input = vertex_input;
        self
    }

    pub fn set_topology(&mut self, topology: PrimitiveTopology) -> &mut Self {
        self.input_assembly.topology = topology;
        self
    }

    pub fn set_primitive_restart(&mut self, enabled: bool) -> &mut Self {
        self.input_assembly.primitive_restart = enabled;
        self
    }

    // ========================================================================
    // Rasterization and multisampling
    // ========================================================================

    pub fn set_polygon_mode(&mut self, mode: PolygonMode) -> &mut Self {
        self.rasterization.polygon_mode = mode;
        self
    }

    /// Shorthand for line or fill polygon mode.
    pub fn set_wireframe(&mut self, wireframe: bool) -> &mut Self {
        self.set_polygon_mode(if wireframe {
            PolygonMode::Line
        } else {
            PolygonMode::Fill
        })
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) -> &mut Self {
        self.rasterization.cull_mode = mode;
        self
    }

    pub fn set_front_face(&mut self, front_face: FrontFace) -> &mut Self {
        self.rasterization.front_face = front_face;
        self
    }

    pub fn set_line_width(&mut self, width: f32) -> &mut Self {
        self.rasterization.line_width = width;
        self
    }

    /// Rasterization sample count and minimum sample-shading fraction.
    pub fn set_multisampling(&mut self, samples: u32, min_sample_shading: f32) -> &mut Self {
        self.multisample = MultisampleState {
            samples,
            min_sample_shading,
        };
        self
    }

    // ========================================================================
    // Depth and blending
    // ========================================================================

    pub fn set_depth_stencil(&mut self, state: DepthStencilState) -> &mut Self {
        self.depth_stencil = state;
        self
    }

    /// Enable depth testing and writing with the given comparison.
    pub fn set_depth_test(&mut self, test: bool, write: bool, compare: CompareOp) -> &mut Self {
        self.depth_stencil = DepthStencilState {
            depth_test: test,
            depth_write: write,
            compare,
        };
        self
    }

    /// Add an opaque blend attachment writing all channels.
    pub fn add_default_color_blend_attachment(&mut self) -> &mut Self {
        self.color_blend_attachments
            .push(ColorBlendAttachment::default());
        self
    }

    pub fn add_color_blend_attachment(&mut self, attachment: ColorBlendAttachment) -> &mut Self {
        self.color_blend_attachments.push(attachment);
        self
    }

    pub fn add_dynamic_state(&mut self, state: DynamicState) -> &mut Self {
        if !self.dynamic_states.contains(&state) {
            self.dynamic_states.push(state);
        }
        self
    }

    // ========================================================================
    // Viewport and scissor
    // ========================================================================

    /// Replace the viewports with a single one.
    pub fn set_viewport(&mut self, viewport: Viewport) -> &mut Self {
        self.viewports.clear();
        self.viewports.push(viewport);
        self
    }

    /// Replace the scissors with a single one.
    pub fn set_scissor(&mut self, scissor: ScissorRect) -> &mut Self {
        self.scissors.clear();
        self.scissors.push(scissor);
        self
    }

    /// Current vertex input configuration.
    pub fn vertex_input(&self) -> &VertexInputState {
        &self.vertex_input
    }

    /// Current rasterization state.
    pub fn rasterization(&self) -> RasterizationState {
        self.rasterization
    }

    /// Number of color blend attachments added so far.
    pub fn color_blend_attachment_count(&self) -> usize {
        self.color_blend_attachments.len()
    }

    /// Build a pipeline from the accumulated state, then reset.
    pub fn build(
        &mut self,
        backend: &dyn GpuBackend,
        label: &str,
    ) -> Result<GpuPipeline, GraphicsError> {
        let result = self.build_inner(backend, label);
        self.reset();
        result
    }

    fn build_inner(
        &self,
        backend: &dyn GpuBackend,
        label: &str,
    ) -> Result<GpuPipeline, GraphicsError> {
        let missing = |what: &str| {
            GraphicsError::InvalidParameter(format!("pipeline '{label}' has no {what}"))
        };
        let layout = self.layout.as_deref().ok_or_else(|| missing("layout"))?;
        let render_pass = self
            .render_pass
            .as_deref()
            .ok_or_else(|| missing("render pass"))?;
        if self.shaders.is_empty() {
            return Err(missing("shaders"));
        }
        if self.viewports.is_empty() {
            return Err(missing("viewport"));
        }
        if self.scissors.is_empty() {
            return Err(missing("scissor"));
        }

        let descriptor = GraphicsPipelineDescriptor {
            label,
            layout,
            render_pass,
            subpass: self.subpass,
            shaders: self
                .shaders
                .iter()
                .map(|shader| ShaderStageDescriptor {
                    stage: shader.stage,
                    module: &shader.module,
                    entry_point: &shader.entry_point,
                })
                .collect(),
            vertex_input: &self.vertex_input,
            input_assembly: self.input_assembly,
            rasterization: self.rasterization,
            multisample: self.multisample,
            depth_stencil: self.depth_stencil,
            color_blend_attachments: &self.color_blend_attachments,
            viewports: &self.viewports,
            scissors: &self.scissors,
            dynamic_states: &self.dynamic_states,
        };

        log::trace!(
            "Building pipeline '{}' ({} shaders, {} vertex bindings)",
            label,
            descriptor.shaders.len(),
            descriptor.vertex_input.bindings.len()
        );
        backend.create_graphics_pipeline(&descriptor)
    }
}
