//! Render pass descriptions.
//!
//! A [`RenderPassDescriptor`] always describes a single subpass. Backends add
//! one external dependency to it that orders color-attachment output after
//! any prior work touching the same attachments.

use super::Format;

/// What happens to an attachment's contents when the render pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    /// Clear to the stage's clear value.
    Clear,
    /// Preserve existing contents.
    Load,
    /// Contents are undefined.
    DontCare,
}

/// What happens to an attachment's contents when the render pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// Image layouts the graph reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    ColorAttachment,
    DepthStencilAttachment,
    ShaderReadOnly,
    TransferDst,
    PresentSrc,
}

/// One attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDescription {
    pub format: Format,
    pub samples: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

/// Reference from the subpass to an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentReference {
    /// Index into [`RenderPassDescriptor::attachments`].
    pub attachment: u32,
    /// Layout during the subpass.
    pub layout: ImageLayout,
}

/// Descriptor for creating a single-subpass render pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderPassDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Attachments in write-declaration order.
    pub attachments: Vec<AttachmentDescription>,
    /// Color references of the subpass.
    pub color_references: Vec<AttachmentReference>,
    /// Depth/stencil reference of the subpass.
    pub depth_reference: Option<AttachmentReference>,
}

impl RenderPassDescriptor {
    /// Number of color attachments the subpass writes.
    pub fn color_attachment_count(&self) -> usize {
        self.color_references.len()
    }
}
