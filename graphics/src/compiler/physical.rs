//! Physical GPU state realized from declarations.

use std::sync::Arc;

use slotmap::SecondaryMap;

use crate::backend::{
    FramebufferDescriptor, GpuBackend, GpuBuffer, GpuDescriptorSet, GpuDescriptorSetLayout,
    GpuFramebuffer, GpuImage, GpuImageView, GpuPipeline, GpuPipelineLayout, GpuRenderPass,
    GpuSampler, ObjectKind, PresentationSurface,
};
use crate::error::{GraphError, GraphicsError};
use crate::graph::{
    BufferHandle, BufferResource, DescriptorHandle, DescriptorResource, PipelineDeclaration,
    RenderGraph, ResourceDescriptor, ResourceHandle, ResourceRegistry, Stage, TextureHandle,
};
use crate::pipeline::GraphicsPipelineBuilder;
use crate::types::{
    AttachmentDescription, AttachmentReference, BufferUsage, ClearValue, CompareOp,
    DescriptorSetLayoutBinding, DescriptorSetLayoutDescriptor, DescriptorWrite,
    DescriptorWriteResource, Extent2d, ImageDescriptor, ImageLayout, LoadOp,
    RenderPassDescriptor, ScissorRect, StoreOp, TextureUsage, VertexAttributeDescription,
    VertexBindingDescription, VertexInputRate, VertexInputState, Viewport,
};

use super::validate::attachment_textures;

// ============================================================================
// Physical resources
// ============================================================================

/// GPU buffer behind a buffer resource. Materialized lazily from staging data.
#[derive(Debug, Default)]
pub struct PhysicalBuffer {
    buffer: Option<GpuBuffer>,
}

impl PhysicalBuffer {
    pub fn buffer(&self) -> Option<&GpuBuffer> {
        self.buffer.as_ref()
    }

    pub fn is_materialized(&self) -> bool {
        self.buffer.is_some()
    }

    /// Size in bytes, 0 while unmaterialized.
    pub fn size(&self) -> u64 {
        self.buffer.as_ref().map_or(0, GpuBuffer::size)
    }

    /// Drop the current buffer before a replacement is created.
    pub(crate) fn release(&mut self) {
        self.buffer = None;
    }

    pub(crate) fn set(&mut self, buffer: GpuBuffer) {
        self.buffer = Some(buffer);
    }
}

/// GPU image behind a texture resource.
#[derive(Debug)]
pub enum PhysicalTexture {
    /// Presentation-surface images, owned by the surface.
    BackBuffer { views: Vec<GpuImageView> },
    /// Dedicated image owned by the compiled graph.
    Image { image: GpuImage, uploaded: bool },
}

impl PhysicalTexture {
    /// View used as attachment or binding for a given surface image.
    pub fn view(&self, image_index: usize) -> Option<GpuImageView> {
        match self {
            Self::BackBuffer { views } => views.get(image_index).copied(),
            Self::Image { image, .. } => Some(image.view()),
        }
    }

    /// The owned image, if any.
    pub fn image(&self) -> Option<&GpuImage> {
        match self {
            Self::BackBuffer { .. } => None,
            Self::Image { image, .. } => Some(image),
        }
    }

    pub fn extent(&self) -> Option<Extent2d> {
        match self {
            Self::BackBuffer { views } => views.first().map(GpuImageView::extent),
            Self::Image { image, .. } => Some(image.extent()),
        }
    }
}

/// Descriptor set realized from a resource descriptor.
#[derive(Debug)]
pub struct PhysicalDescriptor {
    set: GpuDescriptorSet,
    sampler: Option<GpuSampler>,
    layout: Arc<GpuDescriptorSetLayout>,
}

impl PhysicalDescriptor {
    pub fn set(&self) -> &GpuDescriptorSet {
        &self.set
    }

    pub fn layout(&self) -> &Arc<GpuDescriptorSetLayout> {
        &self.layout
    }

    pub fn sampler(&self) -> Option<&GpuSampler> {
        self.sampler.as_ref()
    }
}

/// GPU state of one compiled stage.
#[derive(Debug)]
pub struct PhysicalStage {
    pipeline: GpuPipeline,
    framebuffers: Vec<GpuFramebuffer>,
    render_pass: Arc<GpuRenderPass>,
    layout: Arc<GpuPipelineLayout>,
    render_pass_descriptor: RenderPassDescriptor,
    vertex_input: VertexInputState,
    clear_values: Vec<ClearValue>,
    extent: Extent2d,
}

impl PhysicalStage {
    pub fn pipeline(&self) -> &GpuPipeline {
        &self.pipeline
    }

    pub fn pipeline_layout(&self) -> &GpuPipelineLayout {
        &self.layout
    }

    pub fn render_pass(&self) -> &GpuRenderPass {
        &self.render_pass
    }

    /// Description the render pass was created from.
    pub fn render_pass_descriptor(&self) -> &RenderPassDescriptor {
        &self.render_pass_descriptor
    }

    /// Framebuffers, indexed by surface image index.
    pub fn framebuffers(&self) -> &[GpuFramebuffer] {
        &self.framebuffers
    }

    pub fn framebuffer(&self, image_index: usize) -> Option<&GpuFramebuffer> {
        self.framebuffers.get(image_index)
    }

    pub fn vertex_input(&self) -> &VertexInputState {
        &self.vertex_input
    }

    /// One clear value per attachment when the stage clears, else empty.
    pub fn clear_values(&self) -> &[ClearValue] {
        &self.clear_values
    }

    /// Render area of the stage.
    pub fn extent(&self) -> Extent2d {
        self.extent
    }
}

// ============================================================================
// Resource allocation
// ============================================================================

pub(crate) fn allocate_buffers(
    resources: &ResourceRegistry,
) -> SecondaryMap<BufferHandle, PhysicalBuffer> {
    resources
        .buffers()
        .map(|(handle, _)| (handle, PhysicalBuffer::default()))
        .collect()
}

pub(crate) fn allocate_textures(
    backend: &dyn GpuBackend,
    resources: &ResourceRegistry,
    surface: &dyn PresentationSurface,
) -> Result<SecondaryMap<TextureHandle, PhysicalTexture>, GraphError> {
    let mut textures = SecondaryMap::new();
    for (handle, texture) in resources.textures() {
        let physical = match texture.usage() {
            TextureUsage::BackBuffer => PhysicalTexture::BackBuffer {
                views: surface.image_views().to_vec(),
            },
            usage => {
                let descriptor = ImageDescriptor::new_2d(
                    texture.extent().unwrap_or(surface.extent()),
                    texture.format(),
                    usage.image_usage(),
                    usage.image_aspect(texture.format()),
                )
                .with_label(texture.name());
                let image = backend
                    .create_image(&descriptor)
                    .map_err(GraphError::creation(ObjectKind::Image, texture.name()))?;
                PhysicalTexture::Image {
                    image,
                    uploaded: false,
                }
            }
        };
        textures.insert(handle, physical);
    }
    Ok(textures)
}

/// Buffers of one usage among the reads of a stage, in read order.
pub(crate) fn buffer_reads<'a>(
    resources: &'a ResourceRegistry,
    stage: &'a Stage,
    usage: BufferUsage,
) -> impl Iterator<Item = (BufferHandle, &'a BufferResource)> + 'a {
    stage.reads().iter().filter_map(move |&read| match read {
        ResourceHandle::Buffer(handle) => resources
            .buffer(handle)
            .filter(|buffer| buffer.usage() == usage)
            .map(|buffer| (handle, buffer)),
        ResourceHandle::Texture(_) => None,
    })
}

// ============================================================================
// Descriptors
// ============================================================================

pub(crate) fn build_descriptor(
    backend: &dyn GpuBackend,
    declared: &ResourceDescriptor,
) -> Result<PhysicalDescriptor, GraphError> {
    let name = declared.name();
    let layout_descriptor = DescriptorSetLayoutDescriptor {
        label: Some(format!("{name} layout")),
        bindings: declared
            .bindings()
            .iter()
            .map(|binding| DescriptorSetLayoutBinding {
                binding: binding.binding,
                ty: binding.resource.descriptor_type(),
                stages: binding.stages,
            })
            .collect(),
    };
    let layout = Arc::new(
        backend
            .create_descriptor_set_layout(&layout_descriptor)
            .map_err(GraphError::creation(ObjectKind::DescriptorSetLayout, name))?,
    );
    let set = backend
        .allocate_descriptor_set(name, &layout)
        .map_err(GraphError::creation(ObjectKind::DescriptorSet, name))?;
    let sampler = declared
        .needs_sampler()
        .then(|| backend.create_sampler(declared.sampler()))
        .transpose()
        .map_err(GraphError::creation(ObjectKind::Sampler, name))?;

    Ok(PhysicalDescriptor {
        set,
        sampler,
        layout,
    })
}

/// Point the selected bindings at their physical resources.
///
/// Bindings whose resource is not materialized yet are skipped. Returns the
/// number of bindings written.
pub(crate) fn write_descriptor(
    backend: &dyn GpuBackend,
    declared: &ResourceDescriptor,
    physical: &PhysicalDescriptor,
    buffers: &SecondaryMap<BufferHandle, PhysicalBuffer>,
    textures: &SecondaryMap<TextureHandle, PhysicalTexture>,
    select: impl Fn(&DescriptorResource) -> bool,
) -> Result<usize, GraphicsError> {
    let writes: Vec<DescriptorWrite<'_>> = declared
        .bindings()
        .iter()
        .filter(|binding| select(&binding.resource))
        .filter_map(|binding| {
            let resource = match binding.resource {
                DescriptorResource::UniformBuffer(handle) => {
                    DescriptorWriteResource::UniformBuffer(buffers.get(handle)?.buffer()?)
                }
                DescriptorResource::CombinedImageSampler(handle) => {
                    DescriptorWriteResource::CombinedImageSampler {
                        image: textures.get(handle)?.image()?,
                        sampler: physical.sampler()?,
                        layout: ImageLayout::ShaderReadOnly,
                    }
                }
            };
            Some(DescriptorWrite {
                binding: binding.binding,
                resource,
            })
        })
        .collect();

    if writes.is_empty() {
        return Ok(0);
    }
    backend.update_descriptor_set(&physical.set, &writes)?;
    Ok(writes.len())
}

// ============================================================================
// Stages
// ============================================================================

/// Vertex input of a stage: one binding per bound vertex buffer, with
/// attribute locations counted across all of them.
pub(crate) fn vertex_input_state(resources: &ResourceRegistry, stage: &Stage) -> VertexInputState {
    let mut state = VertexInputState::default();
    let mut location = 0;
    for (handle, buffer) in buffer_reads(resources, stage, BufferUsage::Vertex) {
        let Some(binding) = stage.graphics().vertex_binding(handle) else {
            continue;
        };
        state.bindings.push(VertexBindingDescription {
            binding,
            stride: vertex_stride(buffer),
            input_rate: VertexInputRate::Vertex,
        });
        for attribute in buffer.attributes() {
            state.attributes.push(VertexAttributeDescription {
                location,
                binding,
                format: attribute.format,
                offset: attribute.offset,
            });
            location += 1;
        }
    }
    state
}

/// Element size, or the attribute span when no element size is known yet.
fn vertex_stride(buffer: &BufferResource) -> u32 {
    match buffer.element_size() {
        0 => buffer
            .attributes()
            .iter()
            .map(|attribute| attribute.offset + attribute.format.block_size())
            .max()
            .unwrap_or(0),
        size => size,
    }
}

/// Render area of a stage: the common extent of its attachments, or the
/// surface extent when it writes none.
pub(crate) fn render_extent(
    resources: &ResourceRegistry,
    attachments: &[TextureHandle],
    surface_extent: Extent2d,
) -> Extent2d {
    attachments
        .iter()
        .filter_map(|&handle| resources.texture(handle))
        .map(|texture| texture.extent().unwrap_or(surface_extent))
        .next()
        .unwrap_or(surface_extent)
}

/// Builds stage objects against one set of physical resources, reusing a
/// single pipeline builder.
pub(crate) struct StageFactory<'a> {
    pub(crate) backend: &'a dyn GpuBackend,
    pub(crate) graph: &'a RenderGraph,
    pub(crate) surface: &'a dyn PresentationSurface,
    pub(crate) textures: &'a SecondaryMap<TextureHandle, PhysicalTexture>,
    pub(crate) descriptors: &'a SecondaryMap<DescriptorHandle, PhysicalDescriptor>,
    pub(crate) builder: GraphicsPipelineBuilder,
}

impl StageFactory<'_> {
    pub(crate) fn build_stage(&mut self, stage: &Stage) -> Result<PhysicalStage, GraphError> {
        let name = stage.name();
        let resources = self.graph.resources();
        let attachments = attachment_textures(stage);
        let extent = render_extent(resources, &attachments, self.surface.extent());

        let (render_pass_descriptor, clear_values) = self.render_pass_descriptor(stage, &attachments);
        let render_pass = Arc::new(
            self.backend
                .create_render_pass(&render_pass_descriptor)
                .map_err(GraphError::creation(ObjectKind::RenderPass, name))?,
        );

        for &handle in stage.descriptors() {
            if let Some(descriptor) = self.descriptors.get(handle) {
                self.builder
                    .add_descriptor_set_layout(Arc::clone(descriptor.layout()));
            }
        }
        for &range in stage.push_constant_ranges() {
            self.builder.add_push_constant_range(range);
        }
        let layout = self
            .builder
            .create_layout(self.backend, &format!("{name} layout"))
            .map_err(GraphError::creation(ObjectKind::PipelineLayout, name))?;

        let vertex_input = vertex_input_state(resources, stage);
        let config = stage.graphics();
        self.builder
            .set_render_pass(Arc::clone(&render_pass))
            .set_vertex_input(vertex_input.clone())
            .set_topology(config.topology())
            .set_polygon_mode(config.polygon_mode())
            .set_cull_mode(config.cull_mode())
            .set_depth_test(config.depth_test(), config.depth_write(), CompareOp::LessOrEqual)
            .set_viewport(Viewport::from_extent(extent))
            .set_scissor(ScissorRect::from_extent(extent));
        for shader in config.shaders() {
            self.builder.add_shader(
                shader.stage,
                Arc::clone(&shader.module),
                shader.entry_point.clone(),
            );
        }
        if config.blend_attachments().is_empty() {
            for _ in 0..render_pass_descriptor.color_attachment_count() {
                self.builder.add_default_color_blend_attachment();
            }
        } else {
            for &attachment in config.blend_attachments() {
                self.builder.add_color_blend_attachment(attachment);
            }
        }
        let pipeline = self
            .builder
            .build(self.backend, name)
            .map_err(GraphError::creation(ObjectKind::Pipeline, name))?;

        let image_count = self.surface.image_views().len();
        let mut framebuffers = Vec::with_capacity(image_count);
        for image_index in 0..image_count {
            let views: Vec<GpuImageView> = attachments
                .iter()
                .filter_map(|&handle| self.textures.get(handle)?.view(image_index))
                .collect();
            let label = format!("{name} framebuffer {image_index}");
            let framebuffer = self
                .backend
                .create_framebuffer(&FramebufferDescriptor {
                    label: &label,
                    render_pass: &render_pass,
                    attachments: &views,
                    extent,
                })
                .map_err(GraphError::creation(ObjectKind::Framebuffer, name))?;
            framebuffers.push(framebuffer);
        }

        Ok(PhysicalStage {
            pipeline,
            framebuffers,
            render_pass,
            layout,
            render_pass_descriptor,
            vertex_input,
            clear_values,
            extent,
        })
    }

    fn render_pass_descriptor(
        &self,
        stage: &Stage,
        attachments: &[TextureHandle],
    ) -> (RenderPassDescriptor, Vec<ClearValue>) {
        let clears = stage.clears_target();
        let mut descriptor = RenderPassDescriptor {
            label: Some(format!("{} render pass", stage.name())),
            ..Default::default()
        };
        let mut clear_values = Vec::new();

        for texture in attachments
            .iter()
            .filter_map(|&handle| self.graph.resources().texture(handle))
        {
            let usage = texture.usage();
            let format = match usage {
                TextureUsage::BackBuffer => self.surface.image_format(),
                _ => texture.format(),
            };
            let final_layout = usage.attachment_final_layout();
            let reference = descriptor.attachments.len() as u32;
            descriptor.attachments.push(AttachmentDescription {
                format,
                samples: 1,
                load_op: if clears { LoadOp::Clear } else { LoadOp::Load },
                store_op: StoreOp::Store,
                stencil_load_op: LoadOp::DontCare,
                stencil_store_op: StoreOp::DontCare,
                // Only the back buffer carries contents over from a prior frame.
                initial_layout: if !clears && usage == TextureUsage::BackBuffer {
                    ImageLayout::PresentSrc
                } else {
                    ImageLayout::Undefined
                },
                final_layout,
            });

            if usage == TextureUsage::DepthStencil {
                descriptor.depth_reference = Some(AttachmentReference {
                    attachment: reference,
                    layout: ImageLayout::DepthStencilAttachment,
                });
                if clears {
                    clear_values.push(ClearValue::FAR_DEPTH);
                }
            } else {
                descriptor.color_references.push(AttachmentReference {
                    attachment: reference,
                    layout: ImageLayout::ColorAttachment,
                });
                if clears {
                    clear_values.push(
                        stage
                            .clear_color()
                            .map_or(ClearValue::TRANSPARENT_BLACK, ClearValue::Color),
                    );
                }
            }
        }
        (descriptor, clear_values)
    }

    /// Build a user-declared pipeline against its stage's layout and render pass.
    pub(crate) fn build_pipeline(
        &mut self,
        declaration: &PipelineDeclaration,
        stage: &PhysicalStage,
    ) -> Result<GpuPipeline, GraphError> {
        self.builder
            .set_layout(Arc::clone(&stage.layout))
            .set_render_pass(Arc::clone(&stage.render_pass))
            .set_viewport(Viewport::from_extent(stage.extent))
            .set_scissor(ScissorRect::from_extent(stage.extent));
        declaration.configure(&mut self.builder);
        self.builder
            .build(self.backend, declaration.name())
            .map_err(GraphError::creation(ObjectKind::Pipeline, declaration.name()))
    }
}
