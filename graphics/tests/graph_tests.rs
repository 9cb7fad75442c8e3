//! Render graph integration tests.
//!
//! Every test declares a graph, compiles it against the dummy backend and a
//! simulated swapchain, and inspects the compiled objects or the commands a
//! frame records.
//!
//! # Test Categories
//!
//! - **Ordering Tests**: stage order and dead-stage elimination
//! - **Render Pass Tests**: load ops, layouts and vertex input
//! - **Frame Tests**: buffer refresh, texture upload, descriptors and replay
//! - **Lifecycle Tests**: recompilation, staleness and failure cleanup
//!
//! ```bash
//! cargo test -p emberlight-graphics --test graph_tests
//! ```

mod common;

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use rstest::rstest;

use common::{
    SURFACE_EXTENT, SURFACE_IMAGES, TestContext, back_buffer, color_target, position_buffer,
    simple_stage,
};
use emberlight_graphics::backend::ObjectKind;
use emberlight_graphics::types::{ImageLayout, LoadOp};
use emberlight_graphics::{
    BufferUsage, ClearValue, ConfigurationError, Extent2d, Format, GraphError, GraphOptions,
    IndexFormat, PipelineHandle, RecordedCommand, RecordingCommandBuffer, RenderGraph,
    ResourceHandle, ShaderStage, ShaderStages, StageHandle, TextureUsage, UnwrittenReadPolicy,
};

fn position(order: &[StageHandle], stage: StageHandle) -> usize {
    order
        .iter()
        .position(|&s| s == stage)
        .expect("stage missing from compiled order")
}

// ============================================================================
// Ordering Tests
// ============================================================================

/// Writers come before their readers regardless of declaration order.
#[rstest]
#[case::declared_forward(false)]
#[case::declared_reversed(true)]
fn test_writers_precede_readers(#[case] reversed: bool) {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let gbuffer = color_target(&mut graph, "gbuffer");
    let lighting = color_target(&mut graph, "lighting");

    let mut declarations: Vec<(&str, Vec<ResourceHandle>, Vec<ResourceHandle>)> = vec![
        ("geometry", vec![], vec![gbuffer.into()]),
        ("lighting", vec![gbuffer.into()], vec![lighting.into()]),
        ("compose", vec![gbuffer.into(), lighting.into()], vec![bb.into()]),
    ];
    if reversed {
        declarations.reverse();
    }
    let handles: Vec<(&str, StageHandle)> = declarations
        .iter()
        .map(|(name, reads, writes)| (*name, simple_stage(&ctx, &mut graph, name, reads, writes)))
        .collect();
    let handle = |name: &str| handles.iter().find(|(n, _)| *n == name).unwrap().1;

    let compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let order = compiled.stage_order();
    assert_eq!(order.len(), 3);
    assert!(position(order, handle("geometry")) < position(order, handle("lighting")));
    assert!(position(order, handle("lighting")) < position(order, handle("compose")));
    assert!(position(order, handle("geometry")) < position(order, handle("compose")));
}

/// Only stages contributing to the target are compiled.
#[test]
fn test_dead_stage_elimination() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let x = color_target(&mut graph, "x");
    let y = color_target(&mut graph, "y");
    let z = color_target(&mut graph, "z");

    let a = simple_stage(&ctx, &mut graph, "a", &[], &[x.into()]);
    let b = simple_stage(&ctx, &mut graph, "b", &[x.into()], &[y.into()]);
    let c = simple_stage(&ctx, &mut graph, "c", &[], &[z.into()]);

    let compiled = graph.compile(&ctx.backend, &ctx.surface, y).unwrap();
    assert_eq!(compiled.stage_order(), &[a, b]);
    assert!(compiled.physical_stage(c).is_none());
    assert_eq!(ctx.live(ObjectKind::RenderPass), 2);
}

/// A stage reached through several paths is compiled once.
#[test]
fn test_diamond_is_deduplicated() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let depth = color_target(&mut graph, "depth prepass");
    let ao = color_target(&mut graph, "ao");
    let shadows = color_target(&mut graph, "shadows");

    let prepass = simple_stage(&ctx, &mut graph, "prepass", &[], &[depth.into()]);
    simple_stage(&ctx, &mut graph, "ssao", &[depth.into()], &[ao.into()]);
    simple_stage(&ctx, &mut graph, "shadows", &[depth.into()], &[shadows.into()]);
    simple_stage(
        &ctx,
        &mut graph,
        "compose",
        &[ao.into(), shadows.into()],
        &[bb.into()],
    );

    let compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    assert_eq!(compiled.stage_count(), 4);
    assert_eq!(compiled.stage_order()[0], prepass);
}

#[test]
fn test_cycle_is_reported() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let x = color_target(&mut graph, "x");
    let y = color_target(&mut graph, "y");
    simple_stage(&ctx, &mut graph, "a", &[y.into()], &[x.into()]);
    simple_stage(&ctx, &mut graph, "b", &[x.into()], &[y.into()]);
    simple_stage(&ctx, &mut graph, "present", &[y.into()], &[bb.into()]);

    let err = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap_err();
    let stages = match err {
        GraphError::Configuration(ConfigurationError::Cycle { stages }) => stages,
        other => panic!("expected a cycle, got {other}"),
    };
    assert_eq!(stages.first(), stages.last());
    assert!(stages.iter().any(|s| s == "a"));
    assert!(stages.iter().any(|s| s == "b"));
    assert!(!stages.iter().any(|s| s == "present"));
    assert_eq!(ctx.live_graph_objects(), 0);
}

#[rstest]
#[case::error(UnwrittenReadPolicy::Error, false)]
#[case::allow(UnwrittenReadPolicy::Allow, true)]
fn test_unwritten_read_policy(#[case] policy: UnwrittenReadPolicy, #[case] compiles: bool) {
    let ctx = TestContext::new();
    let mut graph =
        RenderGraph::with_options(GraphOptions::default().with_unwritten_reads(policy));
    let bb = back_buffer(&mut graph);
    let history = color_target(&mut graph, "history");
    simple_stage(&ctx, &mut graph, "taa", &[history.into()], &[bb.into()]);

    let result = graph.compile(&ctx.backend, &ctx.surface, bb);
    assert_eq!(result.is_ok(), compiles);
    if let Err(err) = result {
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "invalid render graph: stage 'taa' reads 'history', which has no writer and no external supply"
        );
        // Rejected before any GPU object was created.
        assert_eq!(ctx.live_graph_objects(), 0);
    }
}

// ============================================================================
// Render Pass Tests
// ============================================================================

#[rstest]
#[case::cleared(true, LoadOp::Clear, ImageLayout::Undefined)]
#[case::loaded(false, LoadOp::Load, ImageLayout::PresentSrc)]
fn test_back_buffer_load_op(
    #[case] clears: bool,
    #[case] load_op: LoadOp,
    #[case] initial_layout: ImageLayout,
) {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let shader = ctx.shader(ShaderStage::Vertex);
    let stage = graph.add_graphics_stage("present", |s| {
        s.writes_to(bb)
            .set_clears_target(clears)
            .set_clear_color([0.1, 0.2, 0.3, 1.0])
            .uses_shader(ShaderStage::Vertex, shader, "main")
            .set_on_record(|_, _| {});
    });

    let compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let physical = compiled.physical_stage(stage).unwrap();
    let attachment = &physical.render_pass_descriptor().attachments[0];
    assert_eq!(attachment.load_op, load_op);
    assert_eq!(attachment.initial_layout, initial_layout);
    assert_eq!(attachment.final_layout, ImageLayout::PresentSrc);
    assert_eq!(attachment.format, Format::Bgra8Srgb);

    let expected_clears = if clears {
        vec![ClearValue::Color([0.1, 0.2, 0.3, 1.0])]
    } else {
        Vec::new()
    };
    assert_eq!(physical.clear_values(), expected_clears.as_slice());
}

#[test]
fn test_depth_attachment_layout() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let depth = graph.add_texture(
        "depth",
        TextureUsage::DepthStencil,
        Format::Depth32Float,
        None,
    );
    let shader = ctx.shader(ShaderStage::Vertex);
    let stage = graph.add_graphics_stage("scene", |s| {
        s.writes_to(bb)
            .writes_to(depth)
            .set_clears_target(true)
            .set_depth_options(true, true)
            .uses_shader(ShaderStage::Vertex, shader, "main")
            .set_on_record(|_, _| {});
    });

    let compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let descriptor = compiled.physical_stage(stage).unwrap().render_pass_descriptor();
    assert_eq!(descriptor.color_attachment_count(), 1);
    let depth_ref = descriptor.depth_reference.unwrap();
    assert_eq!(depth_ref.attachment, 1);
    assert_eq!(
        descriptor.attachments[1].final_layout,
        ImageLayout::DepthStencilAttachment
    );
    assert_eq!(
        compiled.physical_stage(stage).unwrap().clear_values(),
        &[ClearValue::TRANSPARENT_BLACK, ClearValue::FAR_DEPTH]
    );
    // Only the depth texture needs a dedicated image.
    assert_eq!(ctx.live(ObjectKind::Image), 1);
}

/// Dedicated images carry nothing over from a prior frame, so a stage that
/// loads instead of clearing still starts them undefined.
#[rstest]
#[case::depth(TextureUsage::DepthStencil, Format::Depth32Float)]
#[case::sampled(TextureUsage::Sampled, Format::Rgba16Float)]
fn test_dedicated_attachment_starts_undefined(#[case] usage: TextureUsage, #[case] format: Format) {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let texture = graph.add_texture("offscreen", usage, format, None);
    let shader = ctx.shader(ShaderStage::Vertex);
    let stage = graph.add_graphics_stage("scene", |s| {
        s.writes_to(bb)
            .writes_to(texture)
            .uses_shader(ShaderStage::Vertex, shader, "main")
            .set_on_record(|_, _| {});
    });

    let compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let descriptor = compiled.physical_stage(stage).unwrap().render_pass_descriptor();
    let [back, dedicated] = descriptor.attachments.as_slice() else {
        panic!("expected two attachments, got {:?}", descriptor.attachments);
    };
    assert_eq!(back.initial_layout, ImageLayout::PresentSrc);
    assert_eq!(dedicated.load_op, LoadOp::Load);
    assert_eq!(dedicated.initial_layout, ImageLayout::Undefined);
    assert_eq!(dedicated.final_layout, usage.attachment_final_layout());
}

/// Buffers bound at 0 and 1 become exactly two vertex bindings.
#[test]
fn test_vertex_bindings_follow_binding_map() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let positions = position_buffer(&mut graph, "positions", 3);
    let colors = graph.add_buffer("colors", BufferUsage::Vertex);
    graph
        .buffer_mut(colors)
        .unwrap()
        .add_vertex_attribute(Format::Rgba32Float, 0)
        .set_element_size(16);
    graph.request_update(colors, &[[1.0f32; 4]; 3]).unwrap();

    let shader = ctx.shader(ShaderStage::Vertex);
    let stage = graph.add_graphics_stage("scene", |s| {
        s.bind_buffer(positions, 0)
            .bind_buffer(colors, 1)
            .writes_to(bb)
            .uses_shader(ShaderStage::Vertex, shader, "main")
            .set_on_record(|_, recorder| recorder.draw(3, 1, 0, 0));
    });

    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let input = compiled.physical_stage(stage).unwrap().vertex_input().clone();
    assert_eq!(input.bindings.len(), 2);
    assert_eq!((input.bindings[0].binding, input.bindings[0].stride), (0, 12));
    assert_eq!((input.bindings[1].binding, input.bindings[1].stride), (1, 16));
    let locations: Vec<(u32, u32)> = input
        .attributes
        .iter()
        .map(|a| (a.location, a.binding))
        .collect();
    assert_eq!(locations, vec![(0, 0), (1, 1)]);

    let mut recorder = RecordingCommandBuffer::new();
    compiled.render(&mut graph, 0, &mut recorder).unwrap();
    let ids: Vec<u64> = [positions, colors]
        .iter()
        .map(|&b| compiled.physical_buffer(b).unwrap().buffer().unwrap().id())
        .collect();
    assert!(recorder.commands().contains(&RecordedCommand::BindVertexBuffers {
        first_binding: 0,
        buffers: ids,
    }));
}

#[test]
fn test_index_buffer_is_bound_not_vertex_input() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let positions = position_buffer(&mut graph, "positions", 4);
    let indices = graph.add_buffer("indices", BufferUsage::Index);
    graph
        .buffer_mut(indices)
        .unwrap()
        .set_index_format(IndexFormat::Uint16);
    graph.request_update(indices, &[0u16, 1, 2, 2, 1, 3]).unwrap();

    let shader = ctx.shader(ShaderStage::Vertex);
    let stage = graph.add_graphics_stage("quad", |s| {
        s.bind_buffer(positions, 0)
            .reads_from(indices)
            .writes_to(bb)
            .uses_shader(ShaderStage::Vertex, shader, "main")
            .set_on_record(|_, recorder| recorder.draw_indexed(6, 1, 0, 0, 0));
    });

    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    assert_eq!(
        compiled.physical_stage(stage).unwrap().vertex_input().bindings.len(),
        1
    );

    let mut recorder = RecordingCommandBuffer::new();
    compiled.render(&mut graph, 1, &mut recorder).unwrap();
    let index_buffer = compiled.physical_buffer(indices).unwrap();
    assert_eq!(index_buffer.size(), 12);
    assert!(recorder.commands().contains(&RecordedCommand::BindIndexBuffer {
        buffer: index_buffer.buffer().unwrap().id(),
        format: IndexFormat::Uint16,
    }));
}

// ============================================================================
// Frame Tests
// ============================================================================

/// A dirty buffer is materialized once and reused until updated again.
#[test]
fn test_dirty_buffer_is_rebuilt_once() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let positions = position_buffer(&mut graph, "positions", 4);
    let shader = ctx.shader(ShaderStage::Vertex);
    graph.add_graphics_stage("scene", |s| {
        s.bind_buffer(positions, 0)
            .writes_to(bb)
            .uses_shader(ShaderStage::Vertex, shader, "main")
            .set_on_record(|_, recorder| recorder.draw(4, 1, 0, 0));
    });

    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    assert!(!compiled.physical_buffer(positions).unwrap().is_materialized());

    let mut recorder = RecordingCommandBuffer::new();
    let stats = compiled.render(&mut graph, 0, &mut recorder).unwrap();
    assert_eq!(stats.buffers_rebuilt, 1);
    assert_eq!(compiled.physical_buffer(positions).unwrap().size(), 48);
    assert!(!graph.buffer(positions).unwrap().is_dirty());
    assert_eq!(graph.buffer(positions).unwrap().element_count(), 4);

    recorder.reset();
    let stats = compiled.render(&mut graph, 1, &mut recorder).unwrap();
    assert_eq!(stats.buffers_rebuilt, 0);
    assert_eq!(ctx.dummy.stats().created(ObjectKind::Buffer), 1);

    graph.request_update(positions, &[[0.5f32; 3]; 6]).unwrap();
    let stats = compiled.render(&mut graph, 2, &mut recorder).unwrap();
    assert_eq!(stats.buffers_rebuilt, 1);
    assert_eq!(compiled.physical_buffer(positions).unwrap().size(), 72);
    assert_eq!(ctx.live(ObjectKind::Buffer), 1);
}

/// S1 writes V and S2 reads V: S1 is recorded first, with a barrier between.
#[test]
fn test_replay_order_and_barriers() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let v = color_target(&mut graph, "v");
    let s2 = simple_stage(&ctx, &mut graph, "s2", &[v.into()], &[bb.into()]);
    let s1 = simple_stage(&ctx, &mut graph, "s1", &[], &[v.into()]);

    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let mut recorder = RecordingCommandBuffer::new();
    let stats = compiled.render(&mut graph, 0, &mut recorder).unwrap();
    assert_eq!(stats.stages_recorded, 2);

    let pass = |stage: StageHandle| compiled.physical_stage(stage).unwrap().render_pass().id();
    assert_eq!(recorder.render_pass_order(), vec![pass(s1), pass(s2)]);

    let commands = recorder.commands();
    let end_s1 = commands
        .iter()
        .position(|c| *c == RecordedCommand::EndRenderPass)
        .unwrap();
    assert_eq!(commands[end_s1 + 1], RecordedCommand::FullBarrier);
    assert!(matches!(
        commands[end_s1 + 2],
        RecordedCommand::BeginRenderPass { render_pass, .. } if render_pass == pass(s2)
    ));
    assert_eq!(recorder.count(|c| *c == RecordedCommand::FullBarrier), 2);
    assert_eq!(
        recorder.count(|c| matches!(c, RecordedCommand::Draw { .. })),
        2
    );
}

/// Same ordering when the shared resource is a vertex buffer.
#[test]
fn test_replay_order_and_barriers_through_buffer() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let v = position_buffer(&mut graph, "v", 3);
    let vertex = ctx.shader(ShaderStage::Vertex);
    let fragment = ctx.shader(ShaderStage::Fragment);
    let s2 = graph.add_graphics_stage("s2", |s| {
        s.bind_buffer(v, 0)
            .writes_to(bb)
            .uses_shader(ShaderStage::Vertex, vertex, "main")
            .uses_shader(ShaderStage::Fragment, fragment, "main")
            .set_on_record(|_, recorder| recorder.draw(3, 1, 0, 0));
    });
    let s1 = simple_stage(&ctx, &mut graph, "s1", &[], &[v.into()]);

    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    assert_eq!(compiled.stage_order(), &[s1, s2]);
    let mut recorder = RecordingCommandBuffer::new();
    let stats = compiled.render(&mut graph, 0, &mut recorder).unwrap();
    assert_eq!(stats.stages_recorded, 2);

    let pass = |stage: StageHandle| compiled.physical_stage(stage).unwrap().render_pass().id();
    assert_eq!(recorder.render_pass_order(), vec![pass(s1), pass(s2)]);

    let commands = recorder.commands();
    let end_s1 = commands
        .iter()
        .position(|c| *c == RecordedCommand::EndRenderPass)
        .unwrap();
    assert_eq!(commands[end_s1 + 1], RecordedCommand::FullBarrier);
    assert!(matches!(
        commands[end_s1 + 2],
        RecordedCommand::BeginRenderPass { render_pass, .. } if render_pass == pass(s2)
    ));
    let bind = commands
        .iter()
        .position(|c| matches!(c, RecordedCommand::BindVertexBuffers { .. }))
        .unwrap();
    assert!(bind > end_s1 + 2);
}

#[test]
fn test_framebuffer_follows_image_index() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let stage = simple_stage(&ctx, &mut graph, "present", &[], &[bb.into()]);

    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    for image_index in 0..SURFACE_IMAGES as u32 {
        let mut recorder = RecordingCommandBuffer::new();
        compiled.render(&mut graph, image_index, &mut recorder).unwrap();
        let expected = compiled
            .physical_stage(stage)
            .unwrap()
            .framebuffer(image_index as usize)
            .unwrap()
            .id();
        assert!(matches!(
            recorder.commands()[0],
            RecordedCommand::BeginRenderPass { framebuffer, render_area, .. }
                if framebuffer == expected && render_area == SURFACE_EXTENT
        ));
    }
}

/// Update callbacks run every frame before recording, only for compiled stages.
#[test]
fn test_update_callbacks_run_each_frame() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let unused = color_target(&mut graph, "unused");

    let frame = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&frame);
    let params = graph.add_buffer_with_update("params", BufferUsage::Uniform, move |buffer| {
        counter.set(counter.get() + 1);
        buffer.request_update(&[counter.get() as f32; 4]);
    });
    let params_descriptor = graph.add_resource_descriptor("params", |d| {
        d.add_uniform_buffer(params, ShaderStages::FRAGMENT);
    });

    let recorded = Rc::new(Cell::new(0u32));
    let record_count = Rc::clone(&recorded);
    let stage_updates = Rc::new(Cell::new(0u32));
    let update_count = Rc::clone(&stage_updates);
    let shader = ctx.shader(ShaderStage::Fragment);
    graph.add_graphics_stage("tonemap", |s| {
        s.uses_descriptor(params_descriptor)
            .writes_to(bb)
            .uses_shader(ShaderStage::Fragment, shader, "main")
            .set_on_update(move |_| update_count.set(update_count.get() + 1))
            .set_on_record(move |_, _| record_count.set(record_count.get() + 1));
    });

    let dead_updates = Rc::new(Cell::new(0u32));
    let dead_count = Rc::clone(&dead_updates);
    let dead_shader = ctx.shader(ShaderStage::Fragment);
    graph.add_graphics_stage("debug view", |s| {
        s.writes_to(unused)
            .uses_shader(ShaderStage::Fragment, dead_shader, "main")
            .set_on_update(move |_| dead_count.set(dead_count.get() + 1))
            .set_on_record(|_, _| panic!("dead stage recorded"));
    });

    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let mut recorder = RecordingCommandBuffer::new();
    for image_index in [0, 1, 2, 0] {
        let stats = compiled.render(&mut graph, image_index, &mut recorder).unwrap();
        assert_eq!(stats.buffers_rebuilt, 1);
    }
    assert_eq!(frame.get(), 4);
    assert_eq!(stage_updates.get(), 4);
    assert_eq!(recorded.get(), 4);
    assert_eq!(dead_updates.get(), 0);
    // The uniform binding is rewritten after every rebuild.
    assert_eq!(ctx.dummy.stats().descriptor_writes(), 4);
}

/// Descriptor sets and extra pipelines are reachable from the record callback.
#[test]
fn test_descriptors_and_extra_pipelines() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let camera = graph.add_buffer("camera", BufferUsage::Uniform);
    graph.request_update(camera, &[0.0f32; 16]).unwrap();
    let albedo = graph.add_texture(
        "albedo",
        TextureUsage::Sampled,
        Format::Rgba8Unorm,
        Some(Extent2d::new(4, 4)),
    );
    graph.request_update(albedo, &[[255u8; 4]; 16]).unwrap();

    let material = graph.add_resource_descriptor("material", |d| {
        d.add_uniform_buffer(camera, ShaderStages::VERTEX)
            .add_combined_image_sampler(albedo, ShaderStages::FRAGMENT);
    });

    let wireframe: Rc<Cell<Option<PipelineHandle>>> = Rc::new(Cell::new(None));
    let wireframe_handle = Rc::clone(&wireframe);
    let vertex = ctx.shader(ShaderStage::Vertex);
    let fragment = ctx.shader(ShaderStage::Fragment);
    let stage = graph.add_graphics_stage("scene", |s| {
        s.uses_descriptor(material)
            .writes_to(bb)
            .set_clears_target(true)
            .uses_shader(ShaderStage::Vertex, Arc::clone(&vertex), "main")
            .uses_shader(ShaderStage::Fragment, Arc::clone(&fragment), "main")
            .set_on_record(move |stage, recorder| {
                let set = stage.descriptor_set(material).expect("material set");
                recorder.bind_descriptor_sets(stage.pipeline_layout(), 0, &[set]);
                recorder.draw(36, 1, 0, 0);
                if let Some(pipeline) = wireframe_handle.get().and_then(|h| stage.pipeline(h)) {
                    recorder.bind_pipeline(pipeline);
                    recorder.draw(36, 1, 0, 0);
                }
            });
    });
    let handle = graph.add_graphics_pipeline(stage, "scene wireframe", move |builder| {
        builder
            .add_shader(ShaderStage::Vertex, Arc::clone(&vertex), "main")
            .add_shader(ShaderStage::Fragment, Arc::clone(&fragment), "main")
            .set_wireframe(true);
    });
    wireframe.set(Some(handle));

    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    assert!(compiled.pipeline(handle).is_some());
    assert_eq!(ctx.live(ObjectKind::Pipeline), 2);
    assert_eq!(ctx.live(ObjectKind::Sampler), 1);
    // Image bindings are written at compile time.
    assert_eq!(ctx.dummy.stats().descriptor_writes(), 1);

    let mut recorder = RecordingCommandBuffer::new();
    let stats = compiled.render(&mut graph, 0, &mut recorder).unwrap();
    assert_eq!(stats.buffers_rebuilt, 1);
    assert_eq!(stats.textures_uploaded, 1);
    assert_eq!(ctx.dummy.stats().descriptor_writes(), 2);
    // 64 bytes of camera uniform plus 64 bytes of texels.
    assert_eq!(ctx.dummy.stats().bytes_uploaded(), 128);

    let set_id = compiled.descriptor_set(material).unwrap().id();
    assert_eq!(
        recorder.count(|c| matches!(c, RecordedCommand::BindDescriptorSets { sets, .. } if sets == &[set_id])),
        1
    );
    assert!(recorder.commands().contains(&RecordedCommand::BindPipeline {
        pipeline: compiled.pipeline(handle).unwrap().id(),
    }));

    recorder.reset();
    let stats = compiled.render(&mut graph, 1, &mut recorder).unwrap();
    assert_eq!(stats.textures_uploaded, 0);
    assert_eq!(stats.buffers_rebuilt, 0);

    graph.request_update(albedo, &[[0u8; 4]; 16]).unwrap();
    let stats = compiled.render(&mut graph, 2, &mut recorder).unwrap();
    assert_eq!(stats.textures_uploaded, 1);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

/// After a resize and recompile, every dedicated object has the new extent.
#[test]
fn test_recompile_after_resize() {
    let mut ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let hdr = color_target(&mut graph, "hdr");
    let depth = graph.add_texture(
        "depth",
        TextureUsage::DepthStencil,
        Format::Depth32Float,
        None,
    );
    let positions = position_buffer(&mut graph, "positions", 3);

    let shader = ctx.shader(ShaderStage::Vertex);
    let scene = graph.add_graphics_stage("scene", |s| {
        s.bind_buffer(positions, 0)
            .writes_to(hdr)
            .writes_to(depth)
            .set_clears_target(true)
            .uses_shader(ShaderStage::Vertex, shader, "main")
            .set_on_record(|_, recorder| recorder.draw(3, 1, 0, 0));
    });
    let tonemap = simple_stage(&ctx, &mut graph, "tonemap", &[hdr.into()], &[bb.into()]);

    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let mut recorder = RecordingCommandBuffer::new();
    compiled.render(&mut graph, 0, &mut recorder).unwrap();

    let resized = Extent2d::new(1280, 720);
    ctx.resize(resized);
    let mut compiled = compiled.recompile(&graph, &ctx.surface).unwrap();
    assert_eq!(ctx.dummy.stats().wait_idle_calls(), 1);
    assert_eq!(compiled.extent(), resized);

    for texture in [hdr, depth] {
        assert_eq!(compiled.physical_texture(texture).unwrap().extent(), Some(resized));
    }
    for stage in [scene, tonemap] {
        let physical = compiled.physical_stage(stage).unwrap();
        assert_eq!(physical.extent(), resized);
        assert_eq!(physical.framebuffers().len(), SURFACE_IMAGES);
        assert!(physical.framebuffers().iter().all(|fb| fb.extent() == resized));
    }
    // The previous generation is gone.
    assert_eq!(ctx.live(ObjectKind::Image), 2);
    assert_eq!(ctx.live(ObjectKind::Framebuffer), 2 * SURFACE_IMAGES);

    // Staging data survives and is materialized again by the next frame.
    assert!(!compiled.physical_buffer(positions).unwrap().is_materialized());
    recorder.reset();
    let stats = compiled.render(&mut graph, 0, &mut recorder).unwrap();
    assert_eq!(stats.buffers_rebuilt, 1);
    assert_eq!(
        recorder.commands()[0],
        RecordedCommand::BeginRenderPass {
            render_pass: compiled.physical_stage(scene).unwrap().render_pass().id(),
            framebuffer: compiled.physical_stage(scene).unwrap().framebuffer(0).unwrap().id(),
            render_area: resized,
            clear_values: vec![ClearValue::TRANSPARENT_BLACK, ClearValue::FAR_DEPTH],
        }
    );
}

#[test]
fn test_declaration_change_makes_compilation_stale() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    simple_stage(&ctx, &mut graph, "present", &[], &[bb.into()]);
    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let mut recorder = RecordingCommandBuffer::new();

    graph.add_buffer("late", BufferUsage::Uniform);
    assert!(matches!(
        compiled.render(&mut graph, 0, &mut recorder),
        Err(GraphError::StaleCompilation)
    ));
    assert!(recorder.commands().is_empty());

    let mut compiled = compiled.recompile(&graph, &ctx.surface).unwrap();
    assert!(compiled.render(&mut graph, 0, &mut recorder).is_ok());
}

/// The vertex layout is baked into the pipeline, so changing it after
/// compiling has to force a recompile.
#[test]
fn test_vertex_layout_change_makes_compilation_stale() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let positions = position_buffer(&mut graph, "positions", 3);
    let shader = ctx.shader(ShaderStage::Vertex);
    let stage = graph.add_graphics_stage("scene", |s| {
        s.bind_buffer(positions, 0)
            .writes_to(bb)
            .uses_shader(ShaderStage::Vertex, shader, "main")
            .set_on_record(|_, recorder| recorder.draw(3, 1, 0, 0));
    });
    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let mut recorder = RecordingCommandBuffer::new();
    compiled.render(&mut graph, 0, &mut recorder).unwrap();

    // New data with the same stride leaves the compilation valid.
    graph.request_update(positions, &[[1.0f32; 3]; 3]).unwrap();
    assert_eq!(graph.revision(), compiled.revision());

    graph
        .buffer_mut(positions)
        .unwrap()
        .add_vertex_attribute(Format::Rg32Float, 12)
        .set_element_size(20);
    assert_ne!(graph.revision(), compiled.revision());
    recorder.reset();
    assert!(matches!(
        compiled.render(&mut graph, 0, &mut recorder),
        Err(GraphError::StaleCompilation)
    ));
    assert!(recorder.commands().is_empty());

    let mut compiled = compiled.recompile(&graph, &ctx.surface).unwrap();
    let input = compiled.physical_stage(stage).unwrap().vertex_input().clone();
    assert_eq!(input.bindings[0].stride, 20);
    assert_eq!(input.attributes.len(), 2);
    assert!(compiled.render(&mut graph, 0, &mut recorder).is_ok());
}

/// An update callback that sizes an unsized vertex buffer changes the
/// layout mid-frame; that frame is rejected before anything is recorded.
#[test]
fn test_update_callback_layout_change_makes_compilation_stale() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let colors = graph.add_buffer_with_update("colors", BufferUsage::Vertex, |buffer| {
        buffer.request_update(&[[1.0f32; 4]; 3]);
    });
    graph
        .buffer_mut(colors)
        .unwrap()
        .add_vertex_attribute(Format::Rgba32Float, 0);
    let shader = ctx.shader(ShaderStage::Vertex);
    let stage = graph.add_graphics_stage("scene", |s| {
        s.bind_buffer(colors, 0)
            .writes_to(bb)
            .uses_shader(ShaderStage::Vertex, shader, "main")
            .set_on_record(|_, recorder| recorder.draw(3, 1, 0, 0));
    });
    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let mut recorder = RecordingCommandBuffer::new();

    assert!(matches!(
        compiled.render(&mut graph, 0, &mut recorder),
        Err(GraphError::StaleCompilation)
    ));
    assert!(recorder.commands().is_empty());
    assert_eq!(graph.buffer(colors).unwrap().element_size(), 16);

    let mut compiled = compiled.recompile(&graph, &ctx.surface).unwrap();
    assert_eq!(
        compiled.physical_stage(stage).unwrap().vertex_input().bindings[0].stride,
        16
    );
    let stats = compiled.render(&mut graph, 0, &mut recorder).unwrap();
    assert_eq!(stats.buffers_rebuilt, 1);
}

#[test]
fn test_foreign_graph_is_rejected() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    simple_stage(&ctx, &mut graph, "present", &[], &[bb.into()]);
    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();

    let mut other = RenderGraph::new();
    let mut recorder = RecordingCommandBuffer::new();
    assert!(matches!(
        compiled.render(&mut other, 0, &mut recorder),
        Err(GraphError::ForeignGraph)
    ));
    assert!(matches!(
        compiled.recompile(&other, &ctx.surface),
        Err(GraphError::ForeignGraph)
    ));
}

#[rstest]
#[case::first(0, true)]
#[case::last(SURFACE_IMAGES as u32 - 1, true)]
#[case::past_end(SURFACE_IMAGES as u32, false)]
fn test_image_index_range(#[case] image_index: u32, #[case] valid: bool) {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    simple_stage(&ctx, &mut graph, "present", &[], &[bb.into()]);
    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();

    let mut recorder = RecordingCommandBuffer::new();
    match compiled.render(&mut graph, image_index, &mut recorder) {
        Ok(stats) => {
            assert!(valid);
            assert_eq!(stats.stages_recorded, 1);
        }
        Err(GraphError::InvalidImageIndex { index, count }) => {
            assert!(!valid);
            assert_eq!((index, count), (image_index, SURFACE_IMAGES));
        }
        Err(err) => panic!("unexpected error: {err}"),
    }
}

/// A rejected object aborts compilation and releases everything created so far.
#[rstest]
#[case::image(ObjectKind::Image, "depth")]
#[case::render_pass(ObjectKind::RenderPass, "scene")]
#[case::pipeline(ObjectKind::Pipeline, "scene")]
#[case::framebuffer(ObjectKind::Framebuffer, "scene")]
fn test_backend_failure_releases_partial_state(#[case] kind: ObjectKind, #[case] owner: &str) {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let depth = graph.add_texture(
        "depth",
        TextureUsage::DepthStencil,
        Format::Depth32Float,
        None,
    );
    let shader = ctx.shader(ShaderStage::Vertex);
    graph.add_graphics_stage("scene", |s| {
        s.writes_to(bb)
            .writes_to(depth)
            .uses_shader(ShaderStage::Vertex, shader, "main")
            .set_on_record(|_, _| {});
    });

    ctx.dummy.fail_creation_of(Some(kind));
    let err = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap_err();
    match &err {
        GraphError::BackendCreation { object, owner: failed, .. } => {
            assert_eq!(*object, kind);
            assert_eq!(failed, owner);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ctx.live_graph_objects(), 0);

    ctx.dummy.fail_creation_of(None);
    assert!(graph.compile(&ctx.backend, &ctx.surface, bb).is_ok());
}

#[test]
fn test_drop_releases_all_objects() {
    let ctx = TestContext::new();
    let mut graph = RenderGraph::new();
    let bb = back_buffer(&mut graph);
    let hdr = color_target(&mut graph, "hdr");
    let positions = position_buffer(&mut graph, "positions", 3);
    let shader = ctx.shader(ShaderStage::Vertex);
    graph.add_graphics_stage("scene", |s| {
        s.bind_buffer(positions, 0)
            .writes_to(hdr)
            .uses_shader(ShaderStage::Vertex, shader, "main")
            .set_on_record(|_, _| {});
    });
    simple_stage(&ctx, &mut graph, "tonemap", &[hdr.into()], &[bb.into()]);

    let mut compiled = graph.compile(&ctx.backend, &ctx.surface, bb).unwrap();
    let mut recorder = RecordingCommandBuffer::new();
    compiled.render(&mut graph, 0, &mut recorder).unwrap();
    assert!(ctx.live_graph_objects() > 0);

    drop(compiled);
    assert_eq!(ctx.live_graph_objects(), 0);
}
