//! Owning wrappers around raw Vulkan objects.
//!
//! Every wrapper destroys its object on drop. The graph only drops physical
//! objects after the caller has waited for the device to go idle, so nothing
//! here defers destruction.

use std::sync::Arc;

use ash::vk::{self, Handle};
use gpu_allocator::vulkan::{Allocation, Allocator};
use parking_lot::Mutex;

use crate::backend::GpuImageView;
use crate::types::{Extent2d, Format};

/// A Vulkan object destroyed with a single device call.
pub struct VkObject<T: Handle + Copy> {
    device: ash::Device,
    raw: T,
    destroy: fn(&ash::Device, T),
}

impl<T: Handle + Copy> VkObject<T> {
    pub(crate) fn new(device: &ash::Device, raw: T, destroy: fn(&ash::Device, T)) -> Self {
        Self {
            device: device.clone(),
            raw,
            destroy,
        }
    }

    /// The raw Vulkan handle.
    pub fn raw(&self) -> T {
        self.raw
    }

    pub fn id(&self) -> u64 {
        self.raw.as_raw()
    }
}

impl<T: Handle + Copy> Drop for VkObject<T> {
    fn drop(&mut self) {
        (self.destroy)(&self.device, self.raw);
    }
}

impl<T: Handle + Copy> std::fmt::Debug for VkObject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("VkObject")
            .field(&format_args!("{:#x}", self.raw.as_raw()))
            .finish()
    }
}

/// A buffer bound to memory from the shared allocator.
pub struct VulkanBuffer {
    pub(crate) device: ash::Device,
    pub(crate) buffer: vk::Buffer,
    pub(crate) allocation: Option<Allocation>,
    pub(crate) allocator: Arc<Mutex<Allocator>>,
    pub(crate) size: u64,
}

impl VulkanBuffer {
    pub fn raw(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.allocator.lock().free(allocation)
        {
            log::warn!("Failed to free buffer memory: {}", e);
        }
        unsafe { self.device.destroy_buffer(self.buffer, None) };
    }
}

impl std::fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBuffer")
            .field("buffer", &self.buffer)
            .field("size", &self.size)
            .finish()
    }
}

/// A 2D image, its memory and its default view.
pub struct VulkanImage {
    pub(crate) device: ash::Device,
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    pub(crate) allocation: Option<Allocation>,
    pub(crate) allocator: Arc<Mutex<Allocator>>,
    pub(crate) extent: Extent2d,
    pub(crate) format: Format,
    pub(crate) aspect: vk::ImageAspectFlags,
}

impl VulkanImage {
    pub fn raw(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn extent(&self) -> Extent2d {
        self.extent
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Non-owning handle to the default view.
    pub fn image_view(&self) -> GpuImageView {
        GpuImageView::from_vulkan(self.view, self.extent)
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        unsafe { self.device.destroy_image_view(self.view, None) };
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.allocator.lock().free(allocation)
        {
            log::warn!("Failed to free image memory: {}", e);
        }
        unsafe { self.device.destroy_image(self.image, None) };
    }
}

impl std::fmt::Debug for VulkanImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanImage")
            .field("image", &self.image)
            .field("extent", &self.extent)
            .field("format", &self.format)
            .finish()
    }
}

/// A descriptor set returned to its pool on drop.
pub struct VulkanDescriptorSet {
    pub(crate) device: ash::Device,
    pub(crate) pool: vk::DescriptorPool,
    pub(crate) set: vk::DescriptorSet,
}

impl VulkanDescriptorSet {
    pub fn raw(&self) -> vk::DescriptorSet {
        self.set
    }
}

impl Drop for VulkanDescriptorSet {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.device.free_descriptor_sets(self.pool, &[self.set]) } {
            log::warn!("Failed to free descriptor set: {:?}", e);
        }
    }
}

impl std::fmt::Debug for VulkanDescriptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("VulkanDescriptorSet").field(&self.set).finish()
    }
}
