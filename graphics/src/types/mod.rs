//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage kinds and flags, and the
//! backend-agnostic descriptor structs the render graph hands to a
//! [`GpuBackend`](crate::backend::GpuBackend).

mod buffer;
mod common;
mod descriptor;
mod format;
mod pipeline;
mod render_pass;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage, IndexFormat, VertexAttribute};
pub use common::{ClearValue, Extent2d, ScissorRect, Viewport};
pub use descriptor::{
    DescriptorSetLayoutBinding, DescriptorSetLayoutDescriptor, DescriptorType, DescriptorWrite,
    DescriptorWriteResource, PushConstantRange, ShaderStages,
};
pub use format::Format;
pub use pipeline::{
    BlendFactor, BlendOp, ColorBlendAttachment, ColorWrites, CompareOp, CullMode,
    DepthStencilState, DynamicState, FrontFace, InputAssemblyState, MultisampleState,
    PolygonMode, PrimitiveTopology, RasterizationState, ShaderStage, VertexAttributeDescription,
    VertexBindingDescription, VertexInputRate, VertexInputState,
};
pub use render_pass::{
    AttachmentDescription, AttachmentReference, ImageLayout, LoadOp, RenderPassDescriptor, StoreOp,
};
pub use texture::{
    AddressMode, FilterMode, ImageAspect, ImageDescriptor, ImageUsage, SamplerDescriptor,
    TextureUsage,
};
