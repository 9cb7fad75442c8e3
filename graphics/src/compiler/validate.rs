//! Structural validation of the stages selected for compilation.
//!
//! Runs before any GPU object is created.

use crate::error::ConfigurationError;
use crate::graph::{
    DescriptorResource, RenderGraph, ResourceHandle, ResourceRegistry, Stage, StageHandle,
    UnwrittenReadPolicy,
};
use crate::types::{BufferUsage, Extent2d, TextureUsage};

use super::ordering::{WriterIndex, stage_inputs};

pub(crate) fn validate(
    graph: &RenderGraph,
    order: &[StageHandle],
    writers: &WriterIndex,
    surface_extent: Extent2d,
) -> Result<(), ConfigurationError> {
    for (pipeline, declaration) in graph.pipelines() {
        if !graph.stages().contains(declaration.stage()) {
            return Err(ConfigurationError::UnknownPipelineStage {
                pipeline,
                stage: declaration.stage(),
            });
        }
    }

    for &handle in order {
        let stage = graph
            .stage(handle)
            .ok_or(ConfigurationError::UnknownStage(handle))?;
        validate_stage(graph, stage, writers, surface_extent)?;
    }
    Ok(())
}

fn validate_stage(
    graph: &RenderGraph,
    stage: &Stage,
    writers: &WriterIndex,
    surface_extent: Extent2d,
) -> Result<(), ConfigurationError> {
    let resources = graph.resources();

    if !stage.has_record_callback() {
        return Err(ConfigurationError::MissingRecordCallback {
            stage: stage.name().to_owned(),
        });
    }
    if stage.graphics().shaders().is_empty() {
        return Err(ConfigurationError::MissingShaders {
            stage: stage.name().to_owned(),
        });
    }

    if let Some(&unknown) = stage
        .reads()
        .iter()
        .chain(stage.writes())
        .find(|&&resource| !resources.contains(resource))
    {
        return Err(ConfigurationError::UnknownResource(unknown));
    }

    validate_descriptors(graph, stage)?;

    for input in stage_inputs(graph, stage) {
        if writers.contains_key(&input) || resources.has_external_supply(input) {
            continue;
        }
        match graph.options().unwritten_reads {
            UnwrittenReadPolicy::Error => {
                return Err(ConfigurationError::UnwrittenRead {
                    stage: stage.name().to_owned(),
                    resource: resources.describe(input),
                });
            }
            UnwrittenReadPolicy::Allow => log::warn!(
                "Stage '{}' reads '{}', which nothing writes or supplies",
                stage.name(),
                resources.describe(input)
            ),
        }
    }

    for &read in stage.reads() {
        let ResourceHandle::Buffer(buffer) = read else {
            continue;
        };
        let is_vertex = resources
            .buffer(buffer)
            .is_some_and(|b| b.usage() == BufferUsage::Vertex);
        if is_vertex && stage.graphics().vertex_binding(buffer).is_none() {
            return Err(ConfigurationError::MissingVertexBinding {
                stage: stage.name().to_owned(),
                resource: resources.describe(read),
            });
        }
    }

    validate_attachments(resources, stage, surface_extent)
}

fn validate_descriptors(graph: &RenderGraph, stage: &Stage) -> Result<(), ConfigurationError> {
    let resources = graph.resources();
    for &handle in stage.descriptors() {
        let descriptor = graph
            .descriptor(handle)
            .ok_or(ConfigurationError::UnknownDescriptor(handle))?;
        for binding in descriptor.bindings() {
            let resource = binding.resource.resource();
            let matches = match binding.resource {
                DescriptorResource::UniformBuffer(buffer) => resources
                    .buffer(buffer)
                    .map(|b| b.usage() == BufferUsage::Uniform),
                DescriptorResource::CombinedImageSampler(texture) => resources
                    .texture(texture)
                    .map(|t| t.usage() == TextureUsage::Sampled),
            }
            .ok_or(ConfigurationError::UnknownResource(resource))?;
            if !matches {
                return Err(ConfigurationError::DescriptorKindMismatch {
                    descriptor: descriptor.name().to_owned(),
                    resource: resources.describe(resource),
                });
            }
        }
    }
    Ok(())
}

fn validate_attachments(
    resources: &ResourceRegistry,
    stage: &Stage,
    surface_extent: Extent2d,
) -> Result<(), ConfigurationError> {
    let mut depth_count = 0;
    let mut color_count = 0;
    let mut extent = None;

    for texture in attachment_textures(stage)
        .iter()
        .filter_map(|&handle| resources.texture(handle))
    {
        if texture.usage() == TextureUsage::DepthStencil {
            depth_count += 1;
        } else {
            color_count += 1;
        }
        let resolved = texture.extent().unwrap_or(surface_extent);
        if *extent.get_or_insert(resolved) != resolved {
            return Err(ConfigurationError::AttachmentExtentMismatch {
                stage: stage.name().to_owned(),
            });
        }
    }

    if depth_count > 1 {
        return Err(ConfigurationError::MultipleDepthAttachments {
            stage: stage.name().to_owned(),
        });
    }

    let declared = stage.graphics().blend_attachments().len();
    if declared != 0 && declared != color_count {
        return Err(ConfigurationError::BlendAttachmentMismatch {
            stage: stage.name().to_owned(),
            declared,
            expected: color_count,
        });
    }
    Ok(())
}

/// Written textures of a stage, in write order.
pub(crate) fn attachment_textures(stage: &Stage) -> Vec<crate::graph::TextureHandle> {
    stage
        .writes()
        .iter()
        .filter_map(|&resource| match resource {
            ResourceHandle::Texture(texture) => Some(texture),
            ResourceHandle::Buffer(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ordering::writer_index;
    use crate::graph::GraphOptions;
    use crate::backend::{DummyBackend, GpuBackend, GpuShaderModule};
    use crate::types::{ColorBlendAttachment, Format, ShaderStage, ShaderStages};
    use std::sync::Arc;

    const SURFACE: Extent2d = Extent2d::new(640, 480);

    fn check(graph: &RenderGraph) -> Result<(), ConfigurationError> {
        let order: Vec<_> = graph.stages().iter().map(|(handle, _)| handle).collect();
        validate(graph, &order, &writer_index(graph.stages()), SURFACE)
    }

    fn shader() -> Arc<GpuShaderModule> {
        let module = DummyBackend::new()
            .create_shader_module("test", ShaderStage::Vertex, &[0x0723_0203])
            .unwrap();
        Arc::new(module)
    }

    fn back_buffer(graph: &mut RenderGraph) -> crate::graph::TextureHandle {
        graph.add_texture("back buffer", TextureUsage::BackBuffer, Format::Bgra8Srgb, None)
    }

    #[test]
    fn test_missing_record_callback() {
        let mut graph = RenderGraph::new();
        let target = back_buffer(&mut graph);
        graph.add_graphics_stage("silent", |s| {
            s.writes_to(target);
        });
        assert_eq!(
            check(&graph),
            Err(ConfigurationError::MissingRecordCallback {
                stage: "silent".into()
            })
        );
    }

    #[test]
    fn test_stage_without_shaders() {
        let mut graph = RenderGraph::new();
        let target = back_buffer(&mut graph);
        graph.add_graphics_stage("blank", |s| {
            s.writes_to(target).set_on_record(|_, _| {});
        });
        assert_eq!(
            check(&graph),
            Err(ConfigurationError::MissingShaders {
                stage: "blank".into()
            })
        );
    }

    #[test]
    fn test_unwritten_read_follows_policy() {
        let mut graph = RenderGraph::new();
        let target = back_buffer(&mut graph);
        let lut = graph.add_texture("lut", TextureUsage::Sampled, Format::Rgba8Unorm, None);
        graph.add_graphics_stage("grade", |s| {
            s.reads_from(lut)
                .writes_to(target)
                .uses_shader(ShaderStage::Vertex, shader(), "main")
                .set_on_record(|_, _| {});
        });

        assert_eq!(
            check(&graph),
            Err(ConfigurationError::UnwrittenRead {
                stage: "grade".into(),
                resource: "lut".into()
            })
        );

        graph.set_options(GraphOptions::default().with_unwritten_reads(UnwrittenReadPolicy::Allow));
        assert_eq!(check(&graph), Ok(()));
    }

    #[test]
    fn test_external_mark_satisfies_read() {
        let mut graph = RenderGraph::new();
        let target = back_buffer(&mut graph);
        let history = graph.add_texture("history", TextureUsage::Sampled, Format::Rgba8Unorm, None);
        graph.texture_mut(history).unwrap().mark_external();
        graph.add_graphics_stage("taa", |s| {
            s.reads_from(history)
                .writes_to(target)
                .uses_shader(ShaderStage::Vertex, shader(), "main")
                .set_on_record(|_, _| {});
        });
        assert_eq!(check(&graph), Ok(()));
    }

    #[test]
    fn test_vertex_read_needs_binding() {
        let mut graph = RenderGraph::new();
        let target = back_buffer(&mut graph);
        let vertices = graph.add_buffer("vertices", BufferUsage::Vertex);
        graph.request_update(vertices, &[0.0f32; 9]).unwrap();
        graph.add_graphics_stage("scene", |s| {
            s.reads_from(vertices)
                .writes_to(target)
                .uses_shader(ShaderStage::Vertex, shader(), "main")
                .set_on_record(|_, _| {});
        });
        assert_eq!(
            check(&graph),
            Err(ConfigurationError::MissingVertexBinding {
                stage: "scene".into(),
                resource: "vertices".into()
            })
        );
    }

    #[test]
    fn test_attachment_rules() {
        let mut graph = RenderGraph::new();
        let target = back_buffer(&mut graph);
        let depth_a = graph.add_texture("depth a", TextureUsage::DepthStencil, Format::Depth32Float, None);
        let depth_b = graph.add_texture("depth b", TextureUsage::DepthStencil, Format::Depth32Float, None);

        graph.add_graphics_stage("two depths", |s| {
            s.writes_to(target)
                .writes_to(depth_a)
                .writes_to(depth_b)
                .uses_shader(ShaderStage::Vertex, shader(), "main")
                .set_on_record(|_, _| {});
        });
        assert_eq!(
            check(&graph),
            Err(ConfigurationError::MultipleDepthAttachments {
                stage: "two depths".into()
            })
        );

        let mut graph = RenderGraph::new();
        let target = back_buffer(&mut graph);
        let small = graph.add_texture(
            "small",
            TextureUsage::Sampled,
            Format::Rgba8Unorm,
            Some(Extent2d::new(64, 64)),
        );
        graph.add_graphics_stage("mixed", |s| {
            s.writes_to(target)
                .writes_to(small)
                .uses_shader(ShaderStage::Vertex, shader(), "main")
                .set_on_record(|_, _| {});
        });
        assert_eq!(
            check(&graph),
            Err(ConfigurationError::AttachmentExtentMismatch {
                stage: "mixed".into()
            })
        );
    }

    #[test]
    fn test_blend_attachment_count() {
        let mut graph = RenderGraph::new();
        let target = back_buffer(&mut graph);
        graph.add_graphics_stage("overlay", |s| {
            s.writes_to(target)
                .add_color_blend_attachment(ColorBlendAttachment::alpha_blending())
                .add_color_blend_attachment(ColorBlendAttachment::default())
                .uses_shader(ShaderStage::Vertex, shader(), "main")
                .set_on_record(|_, _| {});
        });
        assert_eq!(
            check(&graph),
            Err(ConfigurationError::BlendAttachmentMismatch {
                stage: "overlay".into(),
                declared: 2,
                expected: 1
            })
        );
    }

    #[test]
    fn test_descriptor_kind_mismatch() {
        let mut graph = RenderGraph::new();
        let target = back_buffer(&mut graph);
        let depth = graph.add_texture("depth", TextureUsage::DepthStencil, Format::Depth32Float, None);
        let descriptor = graph.add_resource_descriptor("bad", |d| {
            d.add_combined_image_sampler(depth, ShaderStages::FRAGMENT);
        });
        graph.add_graphics_stage("writer", |s| {
            s.writes_to(depth)
                .uses_shader(ShaderStage::Vertex, shader(), "main")
                .set_on_record(|_, _| {});
        });
        graph.add_graphics_stage("reader", |s| {
            s.uses_descriptor(descriptor)
                .writes_to(target)
                .uses_shader(ShaderStage::Vertex, shader(), "main")
                .set_on_record(|_, _| {});
        });
        assert_eq!(
            check(&graph),
            Err(ConfigurationError::DescriptorKindMismatch {
                descriptor: "bad".into(),
                resource: "depth".into()
            })
        );
    }

    #[test]
    fn test_unknown_resource() {
        let mut other = RenderGraph::new();
        let foreign = other.add_buffer("foreign", BufferUsage::Uniform);

        let mut graph = RenderGraph::new();
        let target = back_buffer(&mut graph);
        // This graph declares no buffers, so the foreign handle cannot resolve.
        graph.add_graphics_stage("scene", |s| {
            s.reads_from(foreign)
                .writes_to(target)
                .uses_shader(ShaderStage::Vertex, shader(), "main")
                .set_on_record(|_, _| {});
        });
        assert_eq!(
            check(&graph),
            Err(ConfigurationError::UnknownResource(foreign.into()))
        );
    }
}
