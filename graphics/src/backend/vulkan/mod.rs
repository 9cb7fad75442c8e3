//! Native Vulkan backend implementation using ash.
//!
//! [`VulkanBackend`] wraps a logical device created by the application
//! together with its graphics queue and a gpu-allocator instance. Instance,
//! device and swapchain creation stay with the application; the backend only
//! creates the objects a render graph needs. It owns one command pool for
//! upload work and one descriptor pool from which graph descriptor sets are
//! allocated and individually freed.

mod command;
pub(crate) mod conversion;
pub mod resources;

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme, Allocator};
use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipelineDescriptor;
use crate::types::{
    BufferDescriptor, DescriptorSetLayoutDescriptor, DescriptorWrite, DescriptorWriteResource,
    ImageDescriptor, ImageLayout, RenderPassDescriptor, SamplerDescriptor, ShaderStage,
};

use super::{
    FramebufferDescriptor, GpuBackend, GpuBuffer, GpuDescriptorSet, GpuDescriptorSetLayout,
    GpuFramebuffer, GpuImage, GpuImageView, GpuPipeline, GpuPipelineLayout, GpuRenderPass,
    GpuSampler, GpuShaderModule, PipelineLayoutDescriptor,
};

pub use command::{VulkanCommandRecorder, create_command_pool};
pub use resources::{VkObject, VulkanBuffer, VulkanDescriptorSet, VulkanImage};

use self::conversion::{
    convert_address_mode, convert_blend_attachment, convert_buffer_usage, convert_compare_op,
    convert_cull_mode, convert_descriptor_type, convert_dynamic_state, convert_filter_mode,
    convert_format, convert_front_face, convert_image_aspect, convert_image_layout,
    convert_image_usage, convert_input_rate, convert_load_op, convert_mipmap_filter_mode,
    convert_polygon_mode, convert_sample_count, convert_shader_stage, convert_shader_stages,
    convert_store_op, convert_topology, convert_vk_error,
};

/// Descriptor sets of each type the backend's pool can hold.
const DESCRIPTOR_POOL_CAPACITY: u32 = 256;

/// Vulkan-based GPU backend using ash.
pub struct VulkanBackend {
    device: ash::Device,
    graphics_queue: vk::Queue,
    graphics_queue_family: u32,
    allocator: Arc<Mutex<Allocator>>,
    /// Command pool for one-shot upload work.
    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("graphics_queue_family", &self.graphics_queue_family)
            .finish()
    }
}

impl VulkanBackend {
    /// Wrap a device created by the application.
    ///
    /// The device must outlive the backend and every object it creates.
    pub fn new(
        device: ash::Device,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        allocator: Arc<Mutex<Allocator>>,
    ) -> Result<Self, GraphicsError> {
        let command_pool = create_command_pool(&device, graphics_queue_family)?;

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: DESCRIPTOR_POOL_CAPACITY,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: DESCRIPTOR_POOL_CAPACITY,
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(DESCRIPTOR_POOL_CAPACITY)
            .pool_sizes(&pool_sizes);

        let descriptor_pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(GraphicsError::InitializationFailed(format!(
                    "Failed to create descriptor pool: {:?}",
                    e
                )));
            }
        };

        log::info!(
            "Vulkan backend ready (graphics queue family {})",
            graphics_queue_family
        );

        Ok(Self {
            device,
            graphics_queue,
            graphics_queue_family,
            allocator,
            command_pool,
            descriptor_pool,
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// A recorder writing into `cmd`, which must be in the recording state.
    pub fn command_recorder(&self, cmd: vk::CommandBuffer) -> VulkanCommandRecorder {
        VulkanCommandRecorder::new(self.device.clone(), cmd)
    }

    fn allocate_memory(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<gpu_allocator::vulkan::Allocation, GraphicsError> {
        self.allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to allocate memory for '{}': {}",
                    name, e
                ))
            })
    }

    /// Create a host-visible buffer filled with `contents`.
    fn create_host_buffer(
        &self,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        contents: &[u8],
    ) -> Result<VulkanBuffer, GraphicsError> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(|e| convert_vk_error("Failed to create buffer", e))?;

        // From here on the wrapper releases whatever has been created.
        let mut wrapped = VulkanBuffer {
            device: self.device.clone(),
            buffer,
            allocation: None,
            allocator: Arc::clone(&self.allocator),
            size,
        };

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let allocation =
            self.allocate_memory(name, requirements, MemoryLocation::CpuToGpu, true)?;

        let bind = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        let mapped = allocation.mapped_ptr();
        wrapped.allocation = Some(allocation);
        bind.map_err(|e| convert_vk_error("Failed to bind buffer memory", e))?;

        let Some(mapped) = mapped else {
            return Err(GraphicsError::Internal(format!(
                "buffer '{}' memory is not host mapped",
                name
            )));
        };
        unsafe {
            std::ptr::copy_nonoverlapping(
                contents.as_ptr(),
                mapped.as_ptr() as *mut u8,
                contents.len(),
            );
        }

        Ok(wrapped)
    }

    /// Record and synchronously submit one-shot upload commands.
    fn submit_one_shot(
        &self,
        record: impl FnOnce(vk::CommandBuffer),
    ) -> Result<(), GraphicsError> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let cmd_buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| GraphicsError::Internal(format!("Failed to allocate command buffer: {:?}", e)))?;
        let cmd = cmd_buffers[0];

        let result = (|| {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { self.device.begin_command_buffer(cmd, &begin_info) }
                .map_err(|e| convert_vk_error("Failed to begin command buffer", e))?;

            record(cmd);

            unsafe { self.device.end_command_buffer(cmd) }
                .map_err(|e| convert_vk_error("Failed to end command buffer", e))?;

            let submit_info = vk::SubmitInfo::default().command_buffers(&cmd_buffers);
            unsafe {
                self.device
                    .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())
            }
            .map_err(|e| convert_vk_error("Failed to submit upload", e))?;

            // Uploads are rare; waiting keeps staging lifetimes trivial.
            unsafe { self.device.queue_wait_idle(self.graphics_queue) }
                .map_err(|e| convert_vk_error("Failed to wait for upload", e))
        })();

        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &cmd_buffers)
        };
        result
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device
                .destroy_descriptor_pool(self.descriptor_pool, None);
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

fn to_vk_extent(extent: crate::types::Extent2d) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

fn other_backend(what: &str) -> GraphicsError {
    GraphicsError::InvalidParameter(format!("{what} was not created by the Vulkan backend"))
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
        contents: &[u8],
    ) -> Result<GpuBuffer, GraphicsError> {
        if descriptor.size == 0 || contents.len() as u64 > descriptor.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {:?}: {} bytes of contents for size {}",
                descriptor.label,
                contents.len(),
                descriptor.size
            )));
        }
        let name = descriptor.label.as_deref().unwrap_or("buffer");
        log::trace!("VulkanBackend: creating buffer '{}' ({} bytes)", name, descriptor.size);

        // Graph buffers are rebuilt from CPU data whenever they change, so they
        // live in host-visible memory and are written directly.
        let buffer = self.create_host_buffer(
            name,
            descriptor.size,
            convert_buffer_usage(descriptor.usage),
            contents,
        )?;
        Ok(GpuBuffer::Vulkan(buffer))
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<GpuImage, GraphicsError> {
        let name = descriptor.label.as_deref().unwrap_or("image");
        let format = convert_format(descriptor.format);
        let aspect = convert_image_aspect(descriptor.aspect);
        log::trace!(
            "VulkanBackend: creating image '{}' {} {:?}",
            name,
            descriptor.extent,
            descriptor.format
        );

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: descriptor.extent.width,
                height: descriptor.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_image_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None) }
            .map_err(|e| convert_vk_error("Failed to create image", e))?;

        let mut wrapped = VulkanImage {
            device: self.device.clone(),
            image,
            view: vk::ImageView::null(),
            allocation: None,
            allocator: Arc::clone(&self.allocator),
            extent: descriptor.extent,
            format: descriptor.format,
            aspect,
        };

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let allocation =
            self.allocate_memory(name, requirements, MemoryLocation::GpuOnly, false)?;
        let bind = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        wrapped.allocation = Some(allocation);
        bind.map_err(|e| convert_vk_error("Failed to bind image memory", e))?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        wrapped.view = unsafe { self.device.create_image_view(&view_info, None) }
            .map_err(|e| convert_vk_error("Failed to create image view", e))?;

        Ok(GpuImage::Vulkan(wrapped))
    }

    fn write_image(&self, image: &GpuImage, data: &[u8]) -> Result<(), GraphicsError> {
        let GpuImage::Vulkan(image) = image else {
            return Err(other_backend("image"));
        };
        let expected = image.extent().area() * image.format().block_size() as u64;
        if data.len() as u64 != expected {
            return Err(GraphicsError::InvalidParameter(format!(
                "image write of {} bytes, expected {}",
                data.len(),
                expected
            )));
        }

        let staging = self.create_host_buffer(
            "image_staging",
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            data,
        )?;

        let subresource_range = vk::ImageSubresourceRange {
            aspect_mask: image.aspect(),
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        self.submit_one_shot(|cmd| {
            let to_transfer = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.raw())
                .subresource_range(subresource_range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: image.aspect(),
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width: image.extent().width,
                    height: image.extent().height,
                    depth: 1,
                });

            let to_shader_read = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(convert_image_layout(ImageLayout::ShaderReadOnly))
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.raw())
                .subresource_range(subresource_range)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);

            unsafe {
                self.device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_transfer],
                );
                self.device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.raw(),
                    image.raw(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
                self.device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_shader_read],
                );
            }
        })
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        let address_mode = convert_address_mode(descriptor.address_mode);
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(convert_filter_mode(descriptor.filter))
            .min_filter(convert_filter_mode(descriptor.filter))
            .mipmap_mode(convert_mipmap_filter_mode(descriptor.filter))
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .mip_lod_bias(0.0)
            .anisotropy_enable(false)
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { self.device.create_sampler(&sampler_info, None) }
            .map_err(|e| convert_vk_error("Failed to create sampler", e))?;

        Ok(GpuSampler::Vulkan(VkObject::new(
            &self.device,
            sampler,
            |device, sampler| unsafe { device.destroy_sampler(sampler, None) },
        )))
    }

    fn create_shader_module(
        &self,
        label: &str,
        stage: ShaderStage,
        code: &[u32],
    ) -> Result<GpuShaderModule, GraphicsError> {
        if code.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "shader module '{label}' has no code"
            )));
        }
        log::trace!("VulkanBackend: creating {:?} shader module '{}'", stage, label);

        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { self.device.create_shader_module(&create_info, None) }
            .map_err(|e| convert_vk_error("Failed to create shader module", e))?;

        Ok(GpuShaderModule::Vulkan(VkObject::new(
            &self.device,
            module,
            |device, module| unsafe { device.destroy_shader_module(module, None) },
        )))
    }

    fn create_render_pass(
        &self,
        descriptor: &RenderPassDescriptor,
    ) -> Result<GpuRenderPass, GraphicsError> {
        let attachments: Vec<vk::AttachmentDescription> = descriptor
            .attachments
            .iter()
            .map(|attachment| {
                vk::AttachmentDescription::default()
                    .format(convert_format(attachment.format))
                    .samples(convert_sample_count(attachment.samples))
                    .load_op(convert_load_op(attachment.load_op))
                    .store_op(convert_store_op(attachment.store_op))
                    .stencil_load_op(convert_load_op(attachment.stencil_load_op))
                    .stencil_store_op(convert_store_op(attachment.stencil_store_op))
                    .initial_layout(convert_image_layout(attachment.initial_layout))
                    .final_layout(convert_image_layout(attachment.final_layout))
            })
            .collect();

        let color_references: Vec<vk::AttachmentReference> = descriptor
            .color_references
            .iter()
            .map(|reference| vk::AttachmentReference {
                attachment: reference.attachment,
                layout: convert_image_layout(reference.layout),
            })
            .collect();
        let depth_reference = descriptor
            .depth_reference
            .map(|reference| vk::AttachmentReference {
                attachment: reference.attachment,
                layout: convert_image_layout(reference.layout),
            });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_references);
        if let Some(depth_reference) = depth_reference.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_reference);
        }

        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            );

        let subpasses = [subpass];
        let dependencies = [dependency];
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { self.device.create_render_pass(&create_info, None) }
            .map_err(|e| convert_vk_error("Failed to create render pass", e))?;

        Ok(GpuRenderPass::Vulkan(VkObject::new(
            &self.device,
            render_pass,
            |device, render_pass| unsafe { device.destroy_render_pass(render_pass, None) },
        )))
    }

    fn create_framebuffer(
        &self,
        descriptor: &FramebufferDescriptor<'_>,
    ) -> Result<GpuFramebuffer, GraphicsError> {
        let GpuRenderPass::Vulkan(render_pass) = descriptor.render_pass else {
            return Err(other_backend("render pass"));
        };
        let mut views = Vec::with_capacity(descriptor.attachments.len());
        for attachment in descriptor.attachments {
            match attachment {
                GpuImageView::Vulkan { view, .. } => views.push(*view),
                GpuImageView::Dummy { .. } => return Err(other_backend("image view")),
            }
        }

        let extent = to_vk_extent(descriptor.extent);
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.raw())
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { self.device.create_framebuffer(&create_info, None) }
            .map_err(|e| convert_vk_error("Failed to create framebuffer", e))?;

        Ok(GpuFramebuffer::Vulkan {
            object: VkObject::new(&self.device, framebuffer, |device, framebuffer| unsafe {
                device.destroy_framebuffer(framebuffer, None)
            }),
            extent: descriptor.extent,
        })
    }

    fn create_descriptor_set_layout(
        &self,
        descriptor: &DescriptorSetLayoutDescriptor,
    ) -> Result<GpuDescriptorSetLayout, GraphicsError> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = descriptor
            .bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(convert_descriptor_type(binding.ty))
                    .descriptor_count(1)
                    .stage_flags(convert_shader_stages(binding.stages))
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { self.device.create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| convert_vk_error("Failed to create descriptor set layout", e))?;

        Ok(GpuDescriptorSetLayout::Vulkan(VkObject::new(
            &self.device,
            layout,
            |device, layout| unsafe { device.destroy_descriptor_set_layout(layout, None) },
        )))
    }

    fn allocate_descriptor_set(
        &self,
        label: &str,
        layout: &GpuDescriptorSetLayout,
    ) -> Result<GpuDescriptorSet, GraphicsError> {
        let GpuDescriptorSetLayout::Vulkan(layout) = layout else {
            return Err(other_backend("descriptor set layout"));
        };
        log::trace!("VulkanBackend: allocating descriptor set '{}'", label);

        let layouts = [layout.raw()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(|e| convert_vk_error("Failed to allocate descriptor set", e))?;

        Ok(GpuDescriptorSet::Vulkan(VulkanDescriptorSet {
            device: self.device.clone(),
            pool: self.descriptor_pool,
            set: sets[0],
        }))
    }

    fn update_descriptor_set(
        &self,
        set: &GpuDescriptorSet,
        writes: &[DescriptorWrite<'_>],
    ) -> Result<(), GraphicsError> {
        let GpuDescriptorSet::Vulkan(set) = set else {
            return Err(other_backend("descriptor set"));
        };

        // Infos must stay alive until the update call.
        let mut buffer_infos = Vec::with_capacity(writes.len());
        let mut image_infos = Vec::with_capacity(writes.len());
        for write in writes {
            match write.resource {
                DescriptorWriteResource::UniformBuffer(buffer) => {
                    let GpuBuffer::Vulkan(buffer) = buffer else {
                        return Err(other_backend("buffer"));
                    };
                    buffer_infos.push((
                        write.binding,
                        [vk::DescriptorBufferInfo {
                            buffer: buffer.raw(),
                            offset: 0,
                            range: vk::WHOLE_SIZE,
                        }],
                    ));
                }
                DescriptorWriteResource::CombinedImageSampler {
                    image,
                    sampler,
                    layout,
                } => {
                    let (GpuImage::Vulkan(image), GpuSampler::Vulkan(sampler)) = (image, sampler)
                    else {
                        return Err(other_backend("image or sampler"));
                    };
                    image_infos.push((
                        write.binding,
                        [vk::DescriptorImageInfo {
                            sampler: sampler.raw(),
                            image_view: image.view(),
                            image_layout: convert_image_layout(layout),
                        }],
                    ));
                }
            }
        }

        let vk_writes: Vec<vk::WriteDescriptorSet> = buffer_infos
            .iter()
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set.raw())
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(info)
            })
            .chain(image_infos.iter().map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set.raw())
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(info)
            }))
            .collect();

        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) };
        Ok(())
    }

    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor<'_>,
    ) -> Result<GpuPipelineLayout, GraphicsError> {
        let mut set_layouts = Vec::with_capacity(descriptor.set_layouts.len());
        for layout in descriptor.set_layouts {
            let GpuDescriptorSetLayout::Vulkan(layout) = layout else {
                return Err(other_backend("descriptor set layout"));
            };
            set_layouts.push(layout.raw());
        }
        let push_constant_ranges: Vec<vk::PushConstantRange> = descriptor
            .push_constant_ranges
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: convert_shader_stages(range.stages),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        let layout = unsafe { self.device.create_pipeline_layout(&create_info, None) }
            .map_err(|e| convert_vk_error("Failed to create pipeline layout", e))?;

        Ok(GpuPipelineLayout::Vulkan(VkObject::new(
            &self.device,
            layout,
            |device, layout| unsafe { device.destroy_pipeline_layout(layout, None) },
        )))
    }

    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor<'_>,
    ) -> Result<GpuPipeline, GraphicsError> {
        let GpuPipelineLayout::Vulkan(layout) = descriptor.layout else {
            return Err(other_backend("pipeline layout"));
        };
        let GpuRenderPass::Vulkan(render_pass) = descriptor.render_pass else {
            return Err(other_backend("render pass"));
        };

        let entry_points = descriptor
            .shaders
            .iter()
            .map(|shader| {
                CString::new(shader.entry_point).map_err(|e| {
                    GraphicsError::InvalidParameter(format!(
                        "Invalid entry point name (contains null byte): {}",
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut shader_stages = Vec::with_capacity(descriptor.shaders.len());
        for (shader, entry_point) in descriptor.shaders.iter().zip(&entry_points) {
            let GpuShaderModule::Vulkan(module) = shader.module else {
                return Err(other_backend("shader module"));
            };
            shader_stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(convert_shader_stage(shader.stage))
                    .module(module.raw())
                    .name(entry_point),
            );
        }

        let binding_descriptions: Vec<vk::VertexInputBindingDescription> = descriptor
            .vertex_input
            .bindings
            .iter()
            .map(|binding| {
                vk::VertexInputBindingDescription::default()
                    .binding(binding.binding)
                    .stride(binding.stride)
                    .input_rate(convert_input_rate(binding.input_rate))
            })
            .collect();
        let attribute_descriptions: Vec<vk::VertexInputAttributeDescription> = descriptor
            .vertex_input
            .attributes
            .iter()
            .map(|attribute| {
                vk::VertexInputAttributeDescription::default()
                    .location(attribute.location)
                    .binding(attribute.binding)
                    .format(convert_format(attribute.format))
                    .offset(attribute.offset)
            })
            .collect();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(convert_topology(descriptor.input_assembly.topology))
            .primitive_restart_enable(descriptor.input_assembly.primitive_restart);

        let viewports: Vec<vk::Viewport> = descriptor
            .viewports
            .iter()
            .map(|viewport| vk::Viewport {
                x: viewport.x,
                y: viewport.y,
                width: viewport.width,
                height: viewport.height,
                min_depth: viewport.min_depth,
                max_depth: viewport.max_depth,
            })
            .collect();
        let scissors: Vec<vk::Rect2D> = descriptor
            .scissors
            .iter()
            .map(|scissor| vk::Rect2D {
                offset: vk::Offset2D {
                    x: scissor.x,
                    y: scissor.y,
                },
                extent: vk::Extent2D {
                    width: scissor.width,
                    height: scissor.height,
                },
            })
            .collect();
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = descriptor.rasterization;
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(convert_polygon_mode(rasterization.polygon_mode))
            .line_width(rasterization.line_width)
            .cull_mode(convert_cull_mode(rasterization.cull_mode))
            .front_face(convert_front_face(rasterization.front_face))
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(convert_sample_count(descriptor.multisample.samples))
            .sample_shading_enable(descriptor.multisample.samples > 1)
            .min_sample_shading(descriptor.multisample.min_sample_shading);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(descriptor.depth_stencil.depth_test)
            .depth_write_enable(descriptor.depth_stencil.depth_write)
            .depth_compare_op(convert_compare_op(descriptor.depth_stencil.compare))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = descriptor
            .color_blend_attachments
            .iter()
            .map(convert_blend_attachment)
            .collect();
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states: Vec<vk::DynamicState> = descriptor
            .dynamic_states
            .iter()
            .copied()
            .map(convert_dynamic_state)
            .collect();
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.raw())
            .render_pass(render_pass.raw())
            .subpass(descriptor.subpass);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| convert_vk_error("Failed to create graphics pipeline", e))?;

        Ok(GpuPipeline::Vulkan(VkObject::new(
            &self.device,
            pipelines[0],
            |device, pipeline| unsafe { device.destroy_pipeline(pipeline, None) },
        )))
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| convert_vk_error("Failed to wait for device idle", e))
    }
}
