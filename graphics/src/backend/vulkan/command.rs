//! Vulkan command pool creation and command recording.

use ash::vk;

use crate::backend::{
    CommandRecorder, GpuBuffer, GpuDescriptorSet, GpuFramebuffer, GpuPipeline, GpuPipelineLayout,
    GpuRenderPass,
};
use crate::error::GraphicsError;
use crate::types::{ClearValue, Extent2d, IndexFormat, ScissorRect, ShaderStages, Viewport};

use super::conversion::{convert_clear_value, convert_index_format, convert_shader_stages};

/// Create a command pool for graphics operations.
pub fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> Result<vk::CommandPool, GraphicsError> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family_index)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create command pool: {:?}", e))
    })
}

/// Records graph commands into a command buffer owned by the application.
///
/// The command buffer must be in the recording state for as long as the
/// recorder is used.
pub struct VulkanCommandRecorder {
    device: ash::Device,
    cmd: vk::CommandBuffer,
}

impl VulkanCommandRecorder {
    pub fn new(device: ash::Device, cmd: vk::CommandBuffer) -> Self {
        Self { device, cmd }
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }
}

macro_rules! vulkan_or_skip {
    ($value:expr, $pattern:pat => $raw:expr, $what:literal) => {
        match $value {
            $pattern => $raw,
            #[allow(unreachable_patterns)]
            _ => {
                log::warn!(concat!("Skipping ", $what, " of a non-Vulkan object"));
                return;
            }
        }
    };
}

impl CommandRecorder for VulkanCommandRecorder {
    fn begin_render_pass(
        &mut self,
        render_pass: &GpuRenderPass,
        framebuffer: &GpuFramebuffer,
        render_area: Extent2d,
        clear_values: &[ClearValue],
    ) {
        let render_pass = vulkan_or_skip!(render_pass, GpuRenderPass::Vulkan(object) => object.raw(), "render pass begin");
        let framebuffer = vulkan_or_skip!(framebuffer, GpuFramebuffer::Vulkan { object, .. } => object.raw(), "render pass begin");
        let clear_values: Vec<vk::ClearValue> =
            clear_values.iter().map(convert_clear_value).collect();

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: render_area.width,
                    height: render_area.height,
                },
            })
            .clear_values(&clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.cmd, &begin_info, vk::SubpassContents::INLINE)
        };
    }

    fn end_render_pass(&mut self) {
        unsafe { self.device.cmd_end_render_pass(self.cmd) };
    }

    fn bind_pipeline(&mut self, pipeline: &GpuPipeline) {
        let pipeline = vulkan_or_skip!(pipeline, GpuPipeline::Vulkan(object) => object.raw(), "pipeline bind");
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[&GpuBuffer]) {
        let mut raw = Vec::with_capacity(buffers.len());
        for buffer in buffers {
            raw.push(vulkan_or_skip!(buffer, GpuBuffer::Vulkan(buffer) => buffer.raw(), "vertex buffer bind"));
        }
        let offsets = vec![0; raw.len()];
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.cmd, first_binding, &raw, &offsets)
        };
    }

    fn bind_index_buffer(&mut self, buffer: &GpuBuffer, format: IndexFormat) {
        let buffer = vulkan_or_skip!(buffer, GpuBuffer::Vulkan(buffer) => buffer.raw(), "index buffer bind");
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.cmd, buffer, 0, convert_index_format(format))
        };
    }

    fn bind_descriptor_sets(
        &mut self,
        layout: &GpuPipelineLayout,
        first_set: u32,
        sets: &[&GpuDescriptorSet],
    ) {
        let layout = vulkan_or_skip!(layout, GpuPipelineLayout::Vulkan(object) => object.raw(), "descriptor set bind");
        let mut raw = Vec::with_capacity(sets.len());
        for set in sets {
            raw.push(vulkan_or_skip!(set, GpuDescriptorSet::Vulkan(set) => set.raw(), "descriptor set bind"));
        }
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                &raw,
                &[],
            )
        };
    }

    fn push_constants(
        &mut self,
        layout: &GpuPipelineLayout,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        let layout = vulkan_or_skip!(layout, GpuPipelineLayout::Vulkan(object) => object.raw(), "push constant update");
        unsafe {
            self.device.cmd_push_constants(
                self.cmd,
                layout,
                convert_shader_stages(stages),
                offset,
                data,
            )
        };
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        let viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.device.cmd_set_viewport(self.cmd, 0, &[viewport]) };
    }

    fn set_scissor(&mut self, scissor: &ScissorRect) {
        let scissor = vk::Rect2D {
            offset: vk::Offset2D {
                x: scissor.x,
                y: scissor.y,
            },
            extent: vk::Extent2D {
                width: scissor.width,
                height: scissor.height,
            },
        };
        unsafe { self.device.cmd_set_scissor(self.cmd, 0, &[scissor]) };
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device.cmd_draw(
                self.cmd,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        };
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.cmd,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    fn full_barrier(&mut self) {
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE);
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.cmd,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            )
        };
    }
}
