//! Descriptor-set layouts, descriptor writes and push constants.

use bitflags::bitflags;

use super::ImageLayout;
use crate::backend::{GpuBuffer, GpuImage, GpuSampler};

bitflags! {
    /// Shader stages a binding or push-constant range is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const VERTEX_FRAGMENT = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

/// Kind of resource a descriptor binding exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    CombinedImageSampler,
}

/// One binding of a descriptor-set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    pub stages: ShaderStages,
}

/// Descriptor for creating a descriptor-set layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptorSetLayoutDescriptor {
    pub label: Option<String>,
    pub bindings: Vec<DescriptorSetLayoutBinding>,
}

/// A range of push-constant bytes visible to some shader stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub stages: ShaderStages,
    pub offset: u32,
    pub size: u32,
}

impl PushConstantRange {
    pub fn new(stages: ShaderStages, offset: u32, size: u32) -> Self {
        Self {
            stages,
            offset,
            size,
        }
    }
}

/// Resource written into a descriptor binding.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorWriteResource<'a> {
    UniformBuffer(&'a GpuBuffer),
    CombinedImageSampler {
        image: &'a GpuImage,
        sampler: &'a GpuSampler,
        layout: ImageLayout,
    },
}

/// An update of a single descriptor binding.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorWrite<'a> {
    pub binding: u32,
    pub resource: DescriptorWriteResource<'a>,
}
