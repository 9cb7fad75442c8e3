//! Graphics pipeline construction.
//!
//! [`GraphicsPipelineBuilder`] is a retained, reusable builder: setters
//! accumulate state, [`GraphicsPipelineBuilder::build`] turns that state into
//! a [`GraphicsPipelineDescriptor`] handed to the backend, and then resets
//! itself to the defaults. The builder knows nothing about render graphs; the
//! graph compiler seeds it from stage declarations.
//!
//! ```ignore
//! let mut builder = GraphicsPipelineBuilder::new();
//! builder
//!     .set_layout(layout)
//!     .set_render_pass(render_pass)
//!     .add_shader(ShaderStage::Vertex, vertex_module, "main")
//!     .add_shader(ShaderStage::Fragment, fragment_module, "main")
//!     .set_viewport(Viewport::from_extent(extent))
//!     .set_scissor(ScissorRect::from_extent(extent))
//!     .set_wireframe(true);
//! let pipeline = builder.build(backend.as_ref(), "wireframe")?;
//! ```

mod builder;

pub use builder::GraphicsPipelineBuilder;

use crate::backend::{GpuPipelineLayout, GpuRenderPass, GpuShaderModule};
use crate::types::{
    ColorBlendAttachment, DepthStencilState, DynamicState, InputAssemblyState, MultisampleState,
    RasterizationState, ScissorRect, ShaderStage, VertexInputState, Viewport,
};

/// One programmable stage of a pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ShaderStageDescriptor<'a> {
    pub stage: ShaderStage,
    pub module: &'a GpuShaderModule,
    pub entry_point: &'a str,
}

/// Complete description of a graphics pipeline, borrowed from builder state.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptor<'a> {
    pub label: &'a str,
    pub layout: &'a GpuPipelineLayout,
    pub render_pass: &'a GpuRenderPass,
    /// Subpass of `render_pass` the pipeline is used in.
    pub subpass: u32,
    pub shaders: Vec<ShaderStageDescriptor<'a>>,
    pub vertex_input: &'a VertexInputState,
    pub input_assembly: InputAssemblyState,
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,
    pub color_blend_attachments: &'a [ColorBlendAttachment],
    pub viewports: &'a [Viewport],
    pub scissors: &'a [ScissorRect],
    pub dynamic_states: &'a [DynamicState],
}
