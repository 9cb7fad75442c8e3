//! Per-frame execution of a compiled graph.
//!
//! [`CompiledGraph::render`] runs in two steps:
//!
//! 1. **Update** - resource and stage update callbacks run, dirty buffers
//!    are rebuilt from their staging data, pending texel data is uploaded
//!    and descriptor sets pointing at rebuilt buffers are rewritten.
//! 2. **Replay** - every stage in compiled order is recorded inside its
//!    render pass, followed by a full barrier.
//!
//! Everything happens on the calling thread. The caller owns frame pacing
//! and must not reuse `recorder` while the GPU still executes it.

use std::collections::HashSet;

use crate::backend::{
    CommandRecorder, GpuBuffer, GpuDescriptorSet, GpuPipeline, GpuPipelineLayout,
};
use crate::compiler::{
    CompiledGraph, PhysicalStage, PhysicalTexture, buffer_reads, write_descriptor,
};
use crate::error::GraphError;
use crate::graph::{
    BufferHandle, DescriptorHandle, DescriptorResource, PipelineHandle, RenderGraph,
    ResourceRegistry, StageHandle, StageRegistry,
};
use crate::profiling::{profile_function, profile_plot, profile_scope};
use crate::types::{BufferDescriptor, BufferUsage, Extent2d, TextureUsage};

/// What one call to [`CompiledGraph::render`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub stages_recorded: usize,
    pub buffers_rebuilt: usize,
    pub textures_uploaded: usize,
}

/// What a record callback can see of its stage.
pub struct StageContext<'a> {
    compiled: &'a CompiledGraph,
    stage: StageHandle,
    physical: &'a PhysicalStage,
    image_index: u32,
}

impl<'a> StageContext<'a> {
    pub fn stage(&self) -> StageHandle {
        self.stage
    }

    pub fn physical(&self) -> &'a PhysicalStage {
        self.physical
    }

    pub fn pipeline_layout(&self) -> &'a GpuPipelineLayout {
        self.physical.pipeline_layout()
    }

    /// Render area of the stage.
    pub fn extent(&self) -> Extent2d {
        self.physical.extent()
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// A pipeline declared with
    /// [`RenderGraph::add_graphics_pipeline`](crate::graph::RenderGraph::add_graphics_pipeline).
    pub fn pipeline(&self, pipeline: PipelineHandle) -> Option<&'a GpuPipeline> {
        self.compiled.pipeline(pipeline)
    }

    pub fn descriptor_set(&self, descriptor: DescriptorHandle) -> Option<&'a GpuDescriptorSet> {
        self.compiled.descriptor_set(descriptor)
    }

    /// Physical buffer, if it has been materialized.
    pub fn buffer(&self, buffer: BufferHandle) -> Option<&'a GpuBuffer> {
        self.compiled.physical_buffer(buffer)?.buffer()
    }
}

impl CompiledGraph {
    /// Refresh CPU-driven resources and record every stage into `recorder`.
    ///
    /// `graph` must be the graph this was compiled from, unchanged since.
    pub fn render(
        &mut self,
        graph: &mut RenderGraph,
        image_index: u32,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<FrameStats, GraphError> {
        profile_function!();

        if graph.id() != self.graph_id() {
            return Err(GraphError::ForeignGraph);
        }
        if graph.revision() != self.revision() {
            return Err(GraphError::StaleCompilation);
        }
        if image_index as usize >= self.image_count() {
            return Err(GraphError::InvalidImageIndex {
                index: image_index,
                count: self.image_count(),
            });
        }

        let mut stats = FrameStats::default();
        {
            profile_scope!("update callbacks");
            let (resources, stages) = graph.parts_mut();
            self.run_updates(resources, stages);
        }
        // Callbacks may have changed a vertex layout baked into a pipeline.
        if graph.revision() != self.revision() {
            return Err(GraphError::StaleCompilation);
        }

        let rebuilt = {
            profile_scope!("update resources");
            let (resources, _) = graph.parts_mut();
            let rebuilt = self.refresh_buffers(resources)?;
            stats.buffers_rebuilt = rebuilt.len();
            stats.textures_uploaded = self.upload_textures(resources)?;
            rebuilt
        };
        if !rebuilt.is_empty() {
            self.refresh_descriptors(graph, &rebuilt)?;
        }

        let (resources, stages) = graph.parts_mut();
        stats.stages_recorded = self.replay(resources, stages, image_index, recorder)?;

        profile_plot!("stages_recorded", stats.stages_recorded);
        Ok(stats)
    }

    fn run_updates(&self, resources: &mut ResourceRegistry, stages: &mut StageRegistry) {
        for (_, buffer) in resources.buffers_mut() {
            buffer.run_update();
        }
        for (_, texture) in resources.textures_mut() {
            texture.run_update();
        }
        for &handle in self.stage_order() {
            if let Some(update) = stages.get_mut(handle).and_then(|stage| stage.update_mut()) {
                update(resources);
            }
        }
    }

    /// Rebuild every buffer that is dirty, or that has staging data but no
    /// physical buffer yet. Returns the rebuilt handles.
    fn refresh_buffers(
        &mut self,
        resources: &mut ResourceRegistry,
    ) -> Result<HashSet<BufferHandle>, GraphError> {
        let mut rebuilt = HashSet::new();
        for (handle, buffer) in resources.buffers_mut() {
            let Some(physical) = self.buffers.get_mut(handle) else {
                continue;
            };
            let pending = !physical.is_materialized() && !buffer.data().is_empty();
            if !buffer.is_dirty() && !pending {
                continue;
            }

            physical.release();
            if !buffer.data().is_empty() {
                let descriptor = BufferDescriptor::new(buffer.data().len() as u64, buffer.usage())
                    .with_label(buffer.name());
                let created = self
                    .backend
                    .create_buffer(&descriptor, buffer.data())
                    .map_err(|source| GraphError::Upload {
                        resource: buffer.name().to_owned(),
                        source,
                    })?;
                log::trace!(
                    "Rebuilt {} buffer '{}' ({} bytes)",
                    buffer.usage(),
                    buffer.name(),
                    created.size()
                );
                physical.set(created);
            }
            buffer.clear_dirty();
            rebuilt.insert(handle);
        }
        Ok(rebuilt)
    }

    /// Upload texel data of sampled textures that changed or were never
    /// uploaded to the current image.
    fn upload_textures(&mut self, resources: &mut ResourceRegistry) -> Result<usize, GraphError> {
        let mut uploaded_count = 0;
        for (handle, texture) in resources.textures_mut() {
            if texture.usage() != TextureUsage::Sampled || texture.data().is_empty() {
                continue;
            }
            let Some(PhysicalTexture::Image { image, uploaded }) = self.textures.get_mut(handle)
            else {
                continue;
            };
            if *uploaded && !texture.is_dirty() {
                continue;
            }
            self.backend
                .write_image(image, texture.data())
                .map_err(|source| GraphError::Upload {
                    resource: texture.name().to_owned(),
                    source,
                })?;
            *uploaded = true;
            texture.clear_dirty();
            uploaded_count += 1;
        }
        Ok(uploaded_count)
    }

    fn refresh_descriptors(
        &self,
        graph: &RenderGraph,
        rebuilt: &HashSet<BufferHandle>,
    ) -> Result<(), GraphError> {
        for (handle, physical) in self.descriptors.iter() {
            let Some(declared) = graph.descriptor(handle) else {
                continue;
            };
            write_descriptor(
                self.backend.as_ref(),
                declared,
                physical,
                &self.buffers,
                &self.textures,
                |resource| {
                    matches!(resource, DescriptorResource::UniformBuffer(buffer) if rebuilt.contains(buffer))
                },
            )
            .map_err(|source| GraphError::Upload {
                resource: declared.name().to_owned(),
                source,
            })?;
        }
        Ok(())
    }

    fn replay(
        &self,
        resources: &ResourceRegistry,
        stages: &mut StageRegistry,
        image_index: u32,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<usize, GraphError> {
        let mut recorded = 0;
        for &handle in self.stage_order() {
            let (Some(physical), Some(stage)) =
                (self.physical_stages.get(handle), stages.get_mut(handle))
            else {
                continue;
            };
            profile_scope!("record stage");

            let framebuffer = physical.framebuffer(image_index as usize).ok_or(
                GraphError::InvalidImageIndex {
                    index: image_index,
                    count: physical.framebuffers().len(),
                },
            )?;
            recorder.begin_render_pass(
                physical.render_pass(),
                framebuffer,
                physical.extent(),
                physical.clear_values(),
            );

            for (buffer, declared) in buffer_reads(resources, stage, BufferUsage::Index) {
                if let Some(gpu) = self.buffers.get(buffer).and_then(|b| b.buffer()) {
                    recorder.bind_index_buffer(gpu, declared.index_format());
                }
            }

            let vertex_buffers: Vec<(u32, &GpuBuffer)> =
                buffer_reads(resources, stage, BufferUsage::Vertex)
                    .filter_map(|(buffer, _)| {
                        let binding = stage.graphics().vertex_binding(buffer)?;
                        Some((binding, self.buffers.get(buffer)?.buffer()?))
                    })
                    .collect();
            bind_vertex_buffers(recorder, &vertex_buffers);

            recorder.bind_pipeline(physical.pipeline());

            if let Some(record) = stage.record_mut() {
                let context = StageContext {
                    compiled: self,
                    stage: handle,
                    physical,
                    image_index,
                };
                record(&context, recorder);
            }

            recorder.end_render_pass();
            recorder.full_barrier();
            recorded += 1;
        }
        Ok(recorded)
    }
}

/// Bind in one call when the bindings are consecutive in read order,
/// otherwise one call per buffer.
fn bind_vertex_buffers(recorder: &mut dyn CommandRecorder, buffers: &[(u32, &GpuBuffer)]) {
    let Some(&(first, _)) = buffers.first() else {
        return;
    };
    let consecutive = buffers
        .iter()
        .enumerate()
        .all(|(offset, &(binding, _))| first.checked_add(offset as u32) == Some(binding));
    if consecutive {
        let batch: Vec<&GpuBuffer> = buffers.iter().map(|&(_, buffer)| buffer).collect();
        recorder.bind_vertex_buffers(first, &batch);
    } else {
        for &(binding, buffer) in buffers {
            recorder.bind_vertex_buffers(binding, &[buffer]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, GpuBackend, RecordedCommand, RecordingCommandBuffer};

    fn dummy_buffer(backend: &DummyBackend, size: u64) -> GpuBuffer {
        backend
            .create_buffer(
                &BufferDescriptor::new(size, BufferUsage::Vertex),
                &vec![0u8; size as usize],
            )
            .unwrap()
    }

    #[test]
    fn test_consecutive_bindings_are_batched() {
        let backend = DummyBackend::new();
        let a = dummy_buffer(&backend, 16);
        let b = dummy_buffer(&backend, 16);

        let mut recorder = RecordingCommandBuffer::new();
        bind_vertex_buffers(&mut recorder, &[(2, &a), (3, &b)]);
        assert_eq!(
            recorder.commands(),
            &[RecordedCommand::BindVertexBuffers {
                first_binding: 2,
                buffers: vec![a.id(), b.id()]
            }]
        );
    }

    #[test]
    fn test_gapped_bindings_are_bound_individually() {
        let backend = DummyBackend::new();
        let a = dummy_buffer(&backend, 16);
        let b = dummy_buffer(&backend, 16);

        let mut recorder = RecordingCommandBuffer::new();
        bind_vertex_buffers(&mut recorder, &[(0, &a), (4, &b)]);
        assert_eq!(
            recorder.count(|c| matches!(c, RecordedCommand::BindVertexBuffers { .. })),
            2
        );

        recorder.reset();
        bind_vertex_buffers(&mut recorder, &[]);
        assert!(recorder.commands().is_empty());
    }

    #[test]
    fn test_bindings_past_u32_max_are_not_batched() {
        let backend = DummyBackend::new();
        let a = dummy_buffer(&backend, 16);
        let b = dummy_buffer(&backend, 16);

        let mut recorder = RecordingCommandBuffer::new();
        bind_vertex_buffers(&mut recorder, &[(u32::MAX, &a), (0, &b)]);
        assert_eq!(
            recorder.commands(),
            &[
                RecordedCommand::BindVertexBuffers {
                    first_binding: u32::MAX,
                    buffers: vec![a.id()]
                },
                RecordedCommand::BindVertexBuffers {
                    first_binding: 0,
                    buffers: vec![b.id()]
                },
            ]
        );
    }
}
