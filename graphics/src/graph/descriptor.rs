//! Resource descriptors: descriptor sets whose bindings point at graph
//! resources.

use slotmap::new_key_type;

use crate::types::{DescriptorType, SamplerDescriptor, ShaderStages};

use super::resource::{BufferHandle, ResourceHandle, TextureHandle};

new_key_type! {
    /// Handle to a resource descriptor declared on a graph.
    pub struct DescriptorHandle;
}

/// Graph resource referenced by a descriptor binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorResource {
    UniformBuffer(BufferHandle),
    CombinedImageSampler(TextureHandle),
}

impl DescriptorResource {
    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            Self::UniformBuffer(_) => DescriptorType::UniformBuffer,
            Self::CombinedImageSampler(_) => DescriptorType::CombinedImageSampler,
        }
    }

    pub fn resource(&self) -> ResourceHandle {
        match *self {
            Self::UniformBuffer(buffer) => buffer.into(),
            Self::CombinedImageSampler(texture) => texture.into(),
        }
    }
}

/// One binding of a resource descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub resource: DescriptorResource,
    pub stages: ShaderStages,
}

/// A declared descriptor set.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    name: String,
    bindings: Vec<DescriptorBinding>,
    sampler: SamplerDescriptor,
}

impl ResourceDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Sampler used by every combined image sampler binding.
    pub fn sampler(&self) -> &SamplerDescriptor {
        &self.sampler
    }

    pub fn needs_sampler(&self) -> bool {
        self.bindings
            .iter()
            .any(|b| matches!(b.resource, DescriptorResource::CombinedImageSampler(_)))
    }

    /// Resources the descriptor reads.
    pub fn resources(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.bindings.iter().map(|binding| binding.resource.resource())
    }
}

/// Builder passed to [`RenderGraph::add_resource_descriptor`](super::RenderGraph::add_resource_descriptor).
///
/// Binding numbers follow declaration order, starting at 0.
#[derive(Debug, Default)]
pub struct DescriptorSetBuilder {
    bindings: Vec<DescriptorBinding>,
    sampler: SamplerDescriptor,
}

impl DescriptorSetBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, resource: DescriptorResource, stages: ShaderStages) -> &mut Self {
        self.bindings.push(DescriptorBinding {
            binding: self.bindings.len() as u32,
            resource,
            stages,
        });
        self
    }

    pub fn add_uniform_buffer(&mut self, buffer: BufferHandle, stages: ShaderStages) -> &mut Self {
        self.push(DescriptorResource::UniformBuffer(buffer), stages)
    }

    pub fn add_combined_image_sampler(
        &mut self,
        texture: TextureHandle,
        stages: ShaderStages,
    ) -> &mut Self {
        self.push(DescriptorResource::CombinedImageSampler(texture), stages)
    }

    /// Sampler for image bindings. Defaults to linear, edge-clamped sampling.
    pub fn set_sampler(&mut self, sampler: SamplerDescriptor) -> &mut Self {
        self.sampler = sampler;
        self
    }

    pub(crate) fn finish(self, name: String) -> ResourceDescriptor {
        ResourceDescriptor {
            sampler: self.sampler.with_label(format!("{name} sampler")),
            name,
            bindings: self.bindings,
        }
    }
}
