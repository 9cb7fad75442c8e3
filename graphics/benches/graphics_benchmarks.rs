use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use emberlight_graphics::backend::GpuShaderModule;
use emberlight_graphics::types::BufferDescriptor;
use emberlight_graphics::{
    BufferUsage, DummyBackend, Extent2d, Format, GpuBackend, RecordingCommandBuffer, RenderGraph,
    ShaderStage, SurfaceImages, TextureHandle, TextureUsage,
};

const SURFACE: Extent2d = Extent2d::new(1920, 1080);

fn setup() -> (Arc<dyn GpuBackend>, SurfaceImages, Arc<GpuShaderModule>) {
    let dummy = Arc::new(DummyBackend::new());
    let surface = dummy.create_surface(SURFACE, Format::Bgra8Srgb, 3);
    let shader = Arc::new(
        dummy
            .create_shader_module("bench", ShaderStage::Vertex, &[0x0723_0203])
            .unwrap(),
    );
    let backend: Arc<dyn GpuBackend> = dummy;
    (backend, surface, shader)
}

/// A chain of `len` stages, each reading the previous one's output, ending
/// in the back buffer.
fn chain_graph(len: usize, shader: &Arc<GpuShaderModule>) -> (RenderGraph, TextureHandle) {
    let mut graph = RenderGraph::new();
    let back_buffer =
        graph.add_texture("back buffer", TextureUsage::BackBuffer, Format::Bgra8Srgb, None);
    let vertices = graph.add_buffer("vertices", BufferUsage::Vertex);
    graph
        .buffer_mut(vertices)
        .unwrap()
        .add_vertex_attribute(Format::Rgb32Float, 0)
        .set_element_size(12);
    graph.request_update(vertices, &[[0.0f32; 3]; 36]).unwrap();

    let mut previous = None;
    for i in 0..len {
        let output = if i + 1 == len {
            back_buffer
        } else {
            graph.add_texture(
                format!("target_{i}"),
                TextureUsage::Sampled,
                Format::Rgba16Float,
                None,
            )
        };
        let module = Arc::clone(shader);
        graph.add_graphics_stage(format!("stage_{i}"), |s| {
            if let Some(input) = previous {
                s.reads_from(input);
            }
            s.bind_buffer(vertices, 0)
                .writes_to(output)
                .uses_shader(ShaderStage::Vertex, module, "main")
                .set_on_record(|_, recorder| recorder.draw(36, 1, 0, 0));
        });
        previous = Some(output);
    }
    (graph, back_buffer)
}

// ---------------------------------------------------------------------------
// Render graph declaration
// ---------------------------------------------------------------------------

fn bench_graph_build_large(c: &mut Criterion) {
    let (_, _, shader) = setup();
    c.bench_function("render_graph_build_32_stages_chain", |b| {
        b.iter(|| {
            black_box(chain_graph(32, &shader));
        });
    });
}

// ---------------------------------------------------------------------------
// Render graph compilation
// ---------------------------------------------------------------------------

fn bench_graph_compile_small(c: &mut Criterion) {
    let (backend, surface, shader) = setup();
    let (graph, target) = chain_graph(4, &shader);
    c.bench_function("render_graph_compile_4_stages", |b| {
        b.iter(|| {
            black_box(graph.compile(&backend, &surface, target).unwrap());
        });
    });
}

fn bench_graph_compile_large(c: &mut Criterion) {
    let (backend, surface, shader) = setup();
    let (graph, target) = chain_graph(32, &shader);
    c.bench_function("render_graph_compile_32_stages_chain", |b| {
        b.iter(|| {
            black_box(graph.compile(&backend, &surface, target).unwrap());
        });
    });
}

// ---------------------------------------------------------------------------
// Frame execution
// ---------------------------------------------------------------------------

fn bench_render_frame(c: &mut Criterion) {
    let (backend, surface, shader) = setup();
    let (mut graph, target) = chain_graph(32, &shader);
    let mut compiled = graph.compile(&backend, &surface, target).unwrap();
    let mut recorder = RecordingCommandBuffer::new();
    let mut image_index = 0;

    c.bench_function("render_frame_32_stages", |b| {
        b.iter(|| {
            recorder.reset();
            let stats = compiled.render(&mut graph, image_index, &mut recorder).unwrap();
            image_index = (image_index + 1) % 3;
            black_box(stats);
        });
    });
}

// ---------------------------------------------------------------------------
// Dummy backend resource creation
// ---------------------------------------------------------------------------

fn bench_dummy_create_buffer(c: &mut Criterion) {
    let backend = DummyBackend::new();
    let contents = vec![0u8; 1024];

    c.bench_function("dummy_create_buffer_1kb", |b| {
        b.iter(|| {
            black_box(
                backend
                    .create_buffer(&BufferDescriptor::new(1024, BufferUsage::Vertex), &contents)
                    .unwrap(),
            );
        });
    });
}

criterion_group!(
    benches,
    bench_graph_build_large,
    bench_graph_compile_small,
    bench_graph_compile_large,
    bench_render_frame,
    bench_dummy_create_buffer,
);
criterion_main!(benches);
