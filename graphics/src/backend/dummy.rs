//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out
//! [`DummyObject`]s that report their destruction back to the backend, so
//! tests can check exactly how many objects of each kind a compilation
//! created and how many are still alive. [`RecordingCommandBuffer`] keeps
//! every recorded command in order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipelineDescriptor;
use crate::types::{
    BufferDescriptor, ClearValue, DescriptorSetLayoutDescriptor, DescriptorWrite, Extent2d,
    Format, ImageDescriptor, IndexFormat, RenderPassDescriptor, SamplerDescriptor, ScissorRect,
    ShaderStage, ShaderStages, Viewport,
};

use super::{
    CommandRecorder, FramebufferDescriptor, GpuBackend, GpuBuffer, GpuDescriptorSet,
    GpuDescriptorSetLayout, GpuFramebuffer, GpuImage, GpuImageView, GpuPipeline,
    GpuPipelineLayout, GpuRenderPass, GpuSampler, GpuShaderModule, ObjectKind,
    PipelineLayoutDescriptor, SurfaceImages,
};

/// Created/alive counters for one object kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectCounts {
    pub created: usize,
    pub live: usize,
}

/// Object accounting of a [`DummyBackend`].
#[derive(Debug, Clone, Default)]
pub struct DummyStats {
    objects: HashMap<ObjectKind, ObjectCounts>,
    bytes_uploaded: u64,
    image_writes: usize,
    descriptor_writes: usize,
    wait_idle_calls: usize,
}

impl DummyStats {
    /// Number of objects of `kind` ever created.
    pub fn created(&self, kind: ObjectKind) -> usize {
        self.objects.get(&kind).map_or(0, |c| c.created)
    }

    /// Number of objects of `kind` currently alive.
    pub fn live(&self, kind: ObjectKind) -> usize {
        self.objects.get(&kind).map_or(0, |c| c.live)
    }

    /// Total bytes passed to buffer creation and image writes.
    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    /// Number of image writes.
    pub fn image_writes(&self) -> usize {
        self.image_writes
    }

    /// Number of individual descriptor bindings written.
    pub fn descriptor_writes(&self) -> usize {
        self.descriptor_writes
    }

    /// Number of device idle waits.
    pub fn wait_idle_calls(&self) -> usize {
        self.wait_idle_calls
    }
}

/// An object created by the dummy backend.
///
/// Dropping it marks the object as destroyed in the owning backend's stats.
#[derive(Debug)]
pub struct DummyObject {
    id: u64,
    kind: ObjectKind,
    stats: Arc<Mutex<DummyStats>>,
}

impl DummyObject {
    /// Backend-unique identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Kind of the object.
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }
}

impl Drop for DummyObject {
    fn drop(&mut self) {
        let mut stats = self.stats.lock();
        if let Some(counts) = stats.objects.get_mut(&self.kind) {
            counts.live = counts.live.saturating_sub(1);
        }
    }
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    stats: Arc<Mutex<DummyStats>>,
    next_id: AtomicU64,
    failing_kind: Mutex<Option<ObjectKind>>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        }
    }

    /// Snapshot of the object accounting.
    pub fn stats(&self) -> DummyStats {
        self.stats.lock().clone()
    }

    /// Make every future creation of `kind` fail, or stop failing with `None`.
    pub fn fail_creation_of(&self, kind: Option<ObjectKind>) {
        *self.failing_kind.lock() = kind;
    }

    /// Create presentation-surface image views for a simulated swapchain.
    pub fn create_surface(&self, extent: Extent2d, format: Format, image_count: usize) -> SurfaceImages {
        log::trace!(
            "DummyBackend: creating surface {} with {} images",
            extent,
            image_count
        );
        let views = (0..image_count)
            .map(|_| GpuImageView::Dummy {
                id: self.next_id(),
                extent,
            })
            .collect();
        SurfaceImages::new(extent, format, views)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn allocate(&self, kind: ObjectKind, label: &str) -> Result<DummyObject, GraphicsError> {
        if *self.failing_kind.lock() == Some(kind) {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "{kind} '{label}' rejected by dummy backend"
            )));
        }
        let id = self.next_id();
        log::trace!("DummyBackend: creating {} '{}' (id: {})", kind, label, id);
        let mut stats = self.stats.lock();
        let counts = stats.objects.entry(kind).or_default();
        counts.created += 1;
        counts.live += 1;
        Ok(DummyObject {
            id,
            kind,
            stats: Arc::clone(&self.stats),
        })
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
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
        let object = self.allocate(
            ObjectKind::Buffer,
            descriptor.label.as_deref().unwrap_or("buffer"),
        )?;
        self.stats.lock().bytes_uploaded += contents.len() as u64;
        Ok(GpuBuffer::Dummy {
            object,
            size: descriptor.size,
        })
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<GpuImage, GraphicsError> {
        if descriptor.extent.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "image {:?} has empty extent {}",
                descriptor.label, descriptor.extent
            )));
        }
        let object = self.allocate(
            ObjectKind::Image,
            descriptor.label.as_deref().unwrap_or("image"),
        )?;
        Ok(GpuImage::Dummy {
            object,
            view_id: self.next_id(),
            extent: descriptor.extent,
            format: descriptor.format,
        })
    }

    fn write_image(&self, image: &GpuImage, data: &[u8]) -> Result<(), GraphicsError> {
        let expected = image.extent().area() * image.format().block_size() as u64;
        if data.len() as u64 != expected {
            return Err(GraphicsError::InvalidParameter(format!(
                "image write of {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        log::trace!("DummyBackend: write_image len={}", data.len());
        let mut stats = self.stats.lock();
        stats.bytes_uploaded += data.len() as u64;
        stats.image_writes += 1;
        Ok(())
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        let object = self.allocate(
            ObjectKind::Sampler,
            descriptor.label.as_deref().unwrap_or("sampler"),
        )?;
        Ok(GpuSampler::Dummy(object))
    }

    fn create_shader_module(
        &self,
        label: &str,
        _stage: ShaderStage,
        code: &[u32],
    ) -> Result<GpuShaderModule, GraphicsError> {
        if code.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "shader module '{label}' has no code"
            )));
        }
        Ok(GpuShaderModule::Dummy(
            self.allocate(ObjectKind::ShaderModule, label)?,
        ))
    }

    fn create_render_pass(
        &self,
        descriptor: &RenderPassDescriptor,
    ) -> Result<GpuRenderPass, GraphicsError> {
        let object = self.allocate(
            ObjectKind::RenderPass,
            descriptor.label.as_deref().unwrap_or("render pass"),
        )?;
        Ok(GpuRenderPass::Dummy {
            object,
            attachment_count: descriptor.attachments.len(),
        })
    }

    fn create_framebuffer(
        &self,
        descriptor: &FramebufferDescriptor<'_>,
    ) -> Result<GpuFramebuffer, GraphicsError> {
        let expected = match descriptor.render_pass {
            GpuRenderPass::Dummy {
                attachment_count, ..
            } => *attachment_count,
            #[cfg(feature = "vulkan-backend")]
            GpuRenderPass::Vulkan(_) => {
                return Err(GraphicsError::InvalidParameter(format!(
                    "framebuffer '{}' uses a render pass of another backend",
                    descriptor.label
                )));
            }
        };
        if expected != descriptor.attachments.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "framebuffer '{}' has {} attachments, render pass expects {}",
                descriptor.label,
                descriptor.attachments.len(),
                expected
            )));
        }
        if let Some(view) = descriptor
            .attachments
            .iter()
            .find(|view| view.extent() != descriptor.extent)
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "framebuffer '{}' is {} but attachment is {}",
                descriptor.label,
                descriptor.extent,
                view.extent()
            )));
        }
        let object = self.allocate(ObjectKind::Framebuffer, descriptor.label)?;
        Ok(GpuFramebuffer::Dummy {
            object,
            extent: descriptor.extent,
        })
    }

    fn create_descriptor_set_layout(
        &self,
        descriptor: &DescriptorSetLayoutDescriptor,
    ) -> Result<GpuDescriptorSetLayout, GraphicsError> {
        let object = self.allocate(
            ObjectKind::DescriptorSetLayout,
            descriptor.label.as_deref().unwrap_or("descriptor set layout"),
        )?;
        Ok(GpuDescriptorSetLayout::Dummy(object))
    }

    fn allocate_descriptor_set(
        &self,
        label: &str,
        _layout: &GpuDescriptorSetLayout,
    ) -> Result<GpuDescriptorSet, GraphicsError> {
        Ok(GpuDescriptorSet::Dummy(
            self.allocate(ObjectKind::DescriptorSet, label)?,
        ))
    }

    fn update_descriptor_set(
        &self,
        set: &GpuDescriptorSet,
        writes: &[DescriptorWrite<'_>],
    ) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyBackend: updating descriptor set {} ({} writes)",
            set.id(),
            writes.len()
        );
        self.stats.lock().descriptor_writes += writes.len();
        Ok(())
    }

    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor<'_>,
    ) -> Result<GpuPipelineLayout, GraphicsError> {
        Ok(GpuPipelineLayout::Dummy(
            self.allocate(ObjectKind::PipelineLayout, descriptor.label)?,
        ))
    }

    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor<'_>,
    ) -> Result<GpuPipeline, GraphicsError> {
        Ok(GpuPipeline::Dummy(
            self.allocate(ObjectKind::Pipeline, descriptor.label)?,
        ))
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        self.stats.lock().wait_idle_calls += 1;
        Ok(())
    }
}

// ============================================================================
// Command Recording
// ============================================================================

/// A command captured by [`RecordingCommandBuffer`].
///
/// GPU objects are identified by their backend ids.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BeginRenderPass {
        render_pass: u64,
        framebuffer: u64,
        render_area: Extent2d,
        clear_values: Vec<ClearValue>,
    },
    EndRenderPass,
    BindPipeline {
        pipeline: u64,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<u64>,
    },
    BindIndexBuffer {
        buffer: u64,
        format: IndexFormat,
    },
    BindDescriptorSets {
        layout: u64,
        first_set: u32,
        sets: Vec<u64>,
    },
    PushConstants {
        layout: u64,
        stages: ShaderStages,
        offset: u32,
        size: usize,
    },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    FullBarrier,
}

/// Command recorder that stores commands instead of submitting them.
#[derive(Debug, Default)]
pub struct RecordingCommandBuffer {
    commands: Vec<RecordedCommand>,
}

impl RecordingCommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All commands recorded so far, in order.
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Forget all recorded commands, as when a command buffer is reset.
    pub fn reset(&mut self) {
        self.commands.clear();
    }

    /// Render pass ids in the order their passes began.
    pub fn render_pass_order(&self) -> Vec<u64> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::BeginRenderPass { render_pass, .. } => Some(*render_pass),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded commands matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&RecordedCommand) -> bool) -> usize {
        self.commands.iter().filter(|command| predicate(command)).count()
    }
}

impl CommandRecorder for RecordingCommandBuffer {
    fn begin_render_pass(
        &mut self,
        render_pass: &GpuRenderPass,
        framebuffer: &GpuFramebuffer,
        render_area: Extent2d,
        clear_values: &[ClearValue],
    ) {
        self.commands.push(RecordedCommand::BeginRenderPass {
            render_pass: render_pass.id(),
            framebuffer: framebuffer.id(),
            render_area,
            clear_values: clear_values.to_vec(),
        });
    }

    fn end_render_pass(&mut self) {
        self.commands.push(RecordedCommand::EndRenderPass);
    }

    fn bind_pipeline(&mut self, pipeline: &GpuPipeline) {
        self.commands.push(RecordedCommand::BindPipeline {
            pipeline: pipeline.id(),
        });
    }

    fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[&GpuBuffer]) {
        self.commands.push(RecordedCommand::BindVertexBuffers {
            first_binding,
            buffers: buffers.iter().map(|buffer| buffer.id()).collect(),
        });
    }

    fn bind_index_buffer(&mut self, buffer: &GpuBuffer, format: IndexFormat) {
        self.commands.push(RecordedCommand::BindIndexBuffer {
            buffer: buffer.id(),
            format,
        });
    }

    fn bind_descriptor_sets(
        &mut self,
        layout: &GpuPipelineLayout,
        first_set: u32,
        sets: &[&GpuDescriptorSet],
    ) {
        self.commands.push(RecordedCommand::BindDescriptorSets {
            layout: layout.id(),
            first_set,
            sets: sets.iter().map(|set| set.id()).collect(),
        });
    }

    fn push_constants(
        &mut self,
        layout: &GpuPipelineLayout,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        self.commands.push(RecordedCommand::PushConstants {
            layout: layout.id(),
            stages,
            offset,
            size: data.len(),
        });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.commands.push(RecordedCommand::SetViewport(*viewport));
    }

    fn set_scissor(&mut self, scissor: &ScissorRect) {
        self.commands.push(RecordedCommand::SetScissor(*scissor));
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.commands.push(RecordedCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.commands.push(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn full_barrier(&mut self) {
        self.commands.push(RecordedCommand::FullBarrier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PresentationSurface;
    use crate::types::BufferUsage;

    #[test]
    fn test_objects_are_counted_until_dropped() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::Vertex), &[0u8; 64])
            .unwrap();
        assert_eq!(buffer.size(), 64);
        assert_eq!(backend.stats().created(ObjectKind::Buffer), 1);
        assert_eq!(backend.stats().live(ObjectKind::Buffer), 1);
        assert_eq!(backend.stats().bytes_uploaded(), 64);

        drop(buffer);
        assert_eq!(backend.stats().created(ObjectKind::Buffer), 1);
        assert_eq!(backend.stats().live(ObjectKind::Buffer), 0);
    }

    #[test]
    fn test_injected_failure() {
        let backend = DummyBackend::new();
        backend.fail_creation_of(Some(ObjectKind::Sampler));
        assert!(matches!(
            backend.create_sampler(&SamplerDescriptor::linear()),
            Err(GraphicsError::ResourceCreationFailed(_))
        ));

        backend.fail_creation_of(None);
        assert!(backend.create_sampler(&SamplerDescriptor::linear()).is_ok());
    }

    #[test]
    fn test_surface_views_have_surface_extent() {
        let backend = DummyBackend::new();
        let surface = backend.create_surface(Extent2d::new(800, 600), Format::Bgra8Srgb, 3);
        assert_eq!(surface.image_count(), 3);
        assert!(
            surface
                .image_views()
                .iter()
                .all(|view| view.extent() == Extent2d::new(800, 600))
        );
    }

    #[test]
    fn test_write_image_checks_size() {
        let backend = DummyBackend::new();
        let image = backend
            .create_image(&ImageDescriptor::new_2d(
                Extent2d::new(4, 4),
                Format::Rgba8Unorm,
                crate::types::ImageUsage::SAMPLED,
                crate::types::ImageAspect::COLOR,
            ))
            .unwrap();
        assert!(backend.write_image(&image, &[0u8; 64]).is_ok());
        assert!(backend.write_image(&image, &[0u8; 63]).is_err());
        assert_eq!(backend.stats().image_writes(), 1);
    }

    #[test]
    fn test_recording_preserves_order() {
        let backend = DummyBackend::new();
        let pipeline = GpuPipeline::Dummy(backend.allocate(ObjectKind::Pipeline, "p").unwrap());
        let mut recorder = RecordingCommandBuffer::new();
        recorder.bind_pipeline(&pipeline);
        recorder.draw(3, 1, 0, 0);
        recorder.full_barrier();

        assert_eq!(
            recorder.commands(),
            &[
                RecordedCommand::BindPipeline {
                    pipeline: pipeline.id()
                },
                RecordedCommand::Draw {
                    vertex_count: 3,
                    instance_count: 1,
                    first_vertex: 0,
                    first_instance: 0
                },
                RecordedCommand::FullBarrier,
            ]
        );
        assert_eq!(
            recorder.count(|c| matches!(c, RecordedCommand::FullBarrier)),
            1
        );
    }
}
