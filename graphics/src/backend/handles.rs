//! Backend-tagged GPU object handles.
//!
//! Owning handles release their object on drop. [`GpuImageView`] is the only
//! non-owning handle: it refers to a view owned by a [`GpuImage`] or by the
//! presentation surface.

use super::dummy::DummyObject;
use crate::types::{Extent2d, Format};

#[cfg(feature = "vulkan-backend")]
use super::vulkan::resources::{VkObject, VulkanBuffer, VulkanDescriptorSet, VulkanImage};
#[cfg(feature = "vulkan-backend")]
use ash::vk::{self, Handle};

/// Declares an owning handle whose only payload is the raw object.
macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident, $raw:ty) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub enum $name {
            /// Dummy backend object.
            Dummy(DummyObject),
            /// Vulkan backend object.
            #[cfg(feature = "vulkan-backend")]
            Vulkan(VkObject<$raw>),
        }

        impl $name {
            /// Backend-unique identifier of the object.
            pub fn id(&self) -> u64 {
                match self {
                    Self::Dummy(object) => object.id(),
                    #[cfg(feature = "vulkan-backend")]
                    Self::Vulkan(object) => object.id(),
                }
            }
        }
    };
}

gpu_handle!(
    /// Handle to a GPU sampler.
    GpuSampler,
    vk::Sampler
);
gpu_handle!(
    /// Handle to a compiled shader module.
    GpuShaderModule,
    vk::ShaderModule
);
gpu_handle!(
    /// Handle to a descriptor-set layout.
    GpuDescriptorSetLayout,
    vk::DescriptorSetLayout
);
gpu_handle!(
    /// Handle to a pipeline layout.
    GpuPipelineLayout,
    vk::PipelineLayout
);
gpu_handle!(
    /// Handle to a graphics pipeline.
    GpuPipeline,
    vk::Pipeline
);

/// Handle to a GPU buffer.
#[derive(Debug)]
pub enum GpuBuffer {
    /// Dummy backend buffer (no GPU allocation).
    Dummy { object: DummyObject, size: u64 },
    /// Vulkan backend buffer.
    #[cfg(feature = "vulkan-backend")]
    Vulkan(VulkanBuffer),
}

impl GpuBuffer {
    /// Size of the buffer in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Dummy { size, .. } => *size,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(buffer) => buffer.size(),
        }
    }

    /// Backend-unique identifier of the buffer.
    pub fn id(&self) -> u64 {
        match self {
            Self::Dummy { object, .. } => object.id(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(buffer) => buffer.raw().as_raw(),
        }
    }
}

/// Handle to a GPU image and its default view.
#[derive(Debug)]
pub enum GpuImage {
    /// Dummy backend image.
    Dummy {
        object: DummyObject,
        view_id: u64,
        extent: Extent2d,
        format: Format,
    },
    /// Vulkan backend image.
    #[cfg(feature = "vulkan-backend")]
    Vulkan(VulkanImage),
}

impl GpuImage {
    /// Size of the image.
    pub fn extent(&self) -> Extent2d {
        match self {
            Self::Dummy { extent, .. } => *extent,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(image) => image.extent(),
        }
    }

    /// Texel format of the image.
    pub fn format(&self) -> Format {
        match self {
            Self::Dummy { format, .. } => *format,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(image) => image.format(),
        }
    }

    /// Non-owning handle to the image's default view.
    pub fn view(&self) -> GpuImageView {
        match self {
            Self::Dummy {
                view_id, extent, ..
            } => GpuImageView::Dummy {
                id: *view_id,
                extent: *extent,
            },
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(image) => GpuImageView::Vulkan {
                view: image.view(),
                extent: image.extent(),
            },
        }
    }

    /// Backend-unique identifier of the image.
    pub fn id(&self) -> u64 {
        match self {
            Self::Dummy { object, .. } => object.id(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(image) => image.raw().as_raw(),
        }
    }
}

/// Non-owning handle to an image view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuImageView {
    /// Dummy backend view.
    Dummy { id: u64, extent: Extent2d },
    /// Vulkan backend view.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        view: vk::ImageView,
        extent: Extent2d,
    },
}

impl GpuImageView {
    /// Wrap a swapchain image view owned by the application.
    #[cfg(feature = "vulkan-backend")]
    pub fn from_vulkan(view: vk::ImageView, extent: Extent2d) -> Self {
        Self::Vulkan { view, extent }
    }

    /// Size of the viewed image.
    pub fn extent(&self) -> Extent2d {
        match self {
            Self::Dummy { extent, .. } => *extent,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { extent, .. } => *extent,
        }
    }

    /// Backend-unique identifier of the view.
    pub fn id(&self) -> u64 {
        match self {
            Self::Dummy { id, .. } => *id,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { view, .. } => view.as_raw(),
        }
    }
}

/// Handle to a render pass.
#[derive(Debug)]
pub enum GpuRenderPass {
    /// Dummy backend render pass.
    Dummy {
        object: DummyObject,
        attachment_count: usize,
    },
    /// Vulkan backend render pass.
    #[cfg(feature = "vulkan-backend")]
    Vulkan(VkObject<vk::RenderPass>),
}

impl GpuRenderPass {
    /// Backend-unique identifier of the render pass.
    pub fn id(&self) -> u64 {
        match self {
            Self::Dummy { object, .. } => object.id(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(object) => object.id(),
        }
    }
}

/// Handle to a framebuffer.
#[derive(Debug)]
pub enum GpuFramebuffer {
    /// Dummy backend framebuffer.
    Dummy { object: DummyObject, extent: Extent2d },
    /// Vulkan backend framebuffer.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        object: VkObject<vk::Framebuffer>,
        extent: Extent2d,
    },
}

impl GpuFramebuffer {
    /// Size of the framebuffer.
    pub fn extent(&self) -> Extent2d {
        match self {
            Self::Dummy { extent, .. } => *extent,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { extent, .. } => *extent,
        }
    }

    /// Backend-unique identifier of the framebuffer.
    pub fn id(&self) -> u64 {
        match self {
            Self::Dummy { object, .. } => object.id(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { object, .. } => object.id(),
        }
    }
}

/// Handle to an allocated descriptor set.
#[derive(Debug)]
pub enum GpuDescriptorSet {
    /// Dummy backend descriptor set.
    Dummy(DummyObject),
    /// Vulkan backend descriptor set.
    #[cfg(feature = "vulkan-backend")]
    Vulkan(VulkanDescriptorSet),
}

impl GpuDescriptorSet {
    /// Backend-unique identifier of the descriptor set.
    pub fn id(&self) -> u64 {
        match self {
            Self::Dummy(object) => object.id(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(set) => set.raw().as_raw(),
        }
    }
}

static_assertions::assert_impl_all!(GpuBuffer: Send, Sync);
static_assertions::assert_impl_all!(GpuImage: Send, Sync);
static_assertions::assert_impl_all!(GpuPipeline: Send, Sync);
