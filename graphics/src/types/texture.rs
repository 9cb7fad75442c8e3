//! Texture types and descriptors.

use bitflags::bitflags;

use super::{Extent2d, Format, ImageLayout};

/// Role of a texture resource in the render graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    /// The presentation-surface image shown on screen.
    BackBuffer,
    /// A depth/stencil attachment.
    DepthStencil,
    /// A color texture that can be rendered to and sampled.
    Sampled,
}

impl TextureUsage {
    /// Image usage flags for a dedicated image of this kind.
    ///
    /// Back buffers are never allocated by the graph and have no flags.
    pub fn image_usage(self) -> ImageUsage {
        match self {
            Self::BackBuffer => ImageUsage::empty(),
            Self::DepthStencil => ImageUsage::DEPTH_STENCIL_ATTACHMENT,
            Self::Sampled => {
                ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST
            }
        }
    }

    /// Aspects addressed by a view of an image of this kind.
    pub fn image_aspect(self, format: Format) -> ImageAspect {
        match self {
            Self::DepthStencil if format.has_stencil() => ImageAspect::DEPTH | ImageAspect::STENCIL,
            Self::DepthStencil => ImageAspect::DEPTH,
            Self::BackBuffer | Self::Sampled => ImageAspect::COLOR,
        }
    }

    /// Layout an attachment of this kind is left in at the end of a render pass.
    pub fn attachment_final_layout(self) -> ImageLayout {
        match self {
            Self::BackBuffer => ImageLayout::PresentSrc,
            Self::DepthStencil => ImageLayout::DepthStencilAttachment,
            Self::Sampled => ImageLayout::ShaderReadOnly,
        }
    }
}

bitflags! {
    /// Usage flags for GPU images.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        /// Image can be a color attachment.
        const COLOR_ATTACHMENT = 1 << 0;
        /// Image can be a depth/stencil attachment.
        const DEPTH_STENCIL_ATTACHMENT = 1 << 1;
        /// Image can be sampled in a shader.
        const SAMPLED = 1 << 2;
        /// Image can be the destination of a copy.
        const TRANSFER_DST = 1 << 3;
    }
}

bitflags! {
    /// Aspects of an image addressed by a view.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAspect: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Descriptor for creating a GPU image together with its default view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    /// Debug label for the image.
    pub label: Option<String>,
    /// Size of the image.
    pub extent: Extent2d,
    /// Texel format.
    pub format: Format,
    /// Usage flags.
    pub usage: ImageUsage,
    /// Aspects covered by the view.
    pub aspect: ImageAspect,
}

impl ImageDescriptor {
    /// Create a new 2D image descriptor.
    pub fn new_2d(extent: Extent2d, format: Format, usage: ImageUsage, aspect: ImageAspect) -> Self {
        Self {
            label: None,
            extent,
            format,
            usage,
            aspect,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Size in bytes of tightly packed texel data covering the image.
    pub fn data_size(&self) -> u64 {
        self.extent.area() * self.format.block_size() as u64
    }
}

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

/// Texture coordinate addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    Repeat,
    MirrorRepeat,
    #[default]
    ClampToEdge,
}

/// Descriptor for creating a sampler.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SamplerDescriptor {
    /// Debug label for the sampler.
    pub label: Option<String>,
    /// Magnification and minification filter.
    pub filter: FilterMode,
    /// Addressing mode for all coordinates.
    pub address_mode: AddressMode,
}

impl SamplerDescriptor {
    /// Create a linear, edge-clamped sampler.
    pub fn linear() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
