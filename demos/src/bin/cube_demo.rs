//! # Cube Demo
//!
//! Demonstrates:
//! - Vertex and index buffers bound through the render graph
//! - A camera uniform refreshed every frame through a resource descriptor
//! - A depth attachment that follows the surface size
//! - An alpha-blended overlay stage drawn on top of the scene
//! - An extra wireframe pipeline on the scene stage
//! - Recompilation after simulated resizes
//!
//! Runs headless on the dummy backend:
//!
//! ```bash
//! cargo run --bin cube_demo -- --frames 240 --resize 120:1920x1080
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use emberlight_app::{App, AppArgs, AppContext, AppHandler, DefaultAppArgs};
use emberlight_demos::geometry::{self, CameraUniforms, MeshVertex, OverlayVertex};
use emberlight_graphics::types::{ColorBlendAttachment, CullMode, PushConstantRange};
use emberlight_graphics::{
    BufferHandle, BufferUsage, Format, FrameStats, GraphicsError, IndexFormat, PipelineHandle,
    RecordingCommandBuffer, ShaderStage, ShaderStages, TextureUsage,
};

/// Module header only; the dummy backend checks nothing past the magic number.
const PLACEHOLDER_SPIRV: &[u32] = &[0x0723_0203, 0x0001_0000, 0, 0, 0];

/// Radians the camera orbits per second.
const ORBIT_SPEED: f32 = 0.8;

/// Overlay tint pushed to the fragment shader, straight alpha.
const OVERLAY_TINT: [f32; 4] = [0.1, 0.1, 0.12, 0.6];

#[derive(Default)]
struct CubeDemo {
    camera: Option<BufferHandle>,
    index_count: u32,
    /// Toggled every 60 frames.
    show_wireframe: Rc<Cell<bool>>,
    recorded_commands: usize,
}

impl CubeDemo {
    fn declare_scene(&mut self, ctx: &mut AppContext) -> Result<(), GraphicsError> {
        let vertex_shader =
            ctx.create_shader_module("cube.vert", ShaderStage::Vertex, PLACEHOLDER_SPIRV)?;
        let fragment_shader =
            ctx.create_shader_module("cube.frag", ShaderStage::Fragment, PLACEHOLDER_SPIRV)?;
        let overlay_shader =
            ctx.create_shader_module("overlay.frag", ShaderStage::Fragment, PLACEHOLDER_SPIRV)?;

        let (vertices, indices) = geometry::cube();
        self.index_count = indices.len() as u32;
        let surface_format = ctx.surface_format();
        let initial_camera = CameraUniforms::orbit(0.0, ctx.aspect_ratio());
        let graph = ctx.graph_mut();

        // === Resources ===

        let back_buffer =
            graph.add_texture("back buffer", TextureUsage::BackBuffer, surface_format, None);
        let depth = graph.add_texture(
            "depth",
            TextureUsage::DepthStencil,
            Format::Depth32Float,
            None,
        );

        let cube_vertices = graph.add_buffer("cube vertices", BufferUsage::Vertex);
        let cube_indices = graph.add_buffer("cube indices", BufferUsage::Index);
        let camera = graph.add_buffer("camera", BufferUsage::Uniform);
        let overlay_vertices = graph.add_buffer("overlay vertices", BufferUsage::Vertex);
        if let Some(buffer) = graph.buffer_mut(cube_vertices) {
            buffer
                .add_vertex_attribute(Format::Rgb32Float, 0)
                .add_vertex_attribute(Format::Rgb32Float, 12)
                .set_element_size(std::mem::size_of::<MeshVertex>() as u32)
                .request_update(&vertices);
        }
        if let Some(buffer) = graph.buffer_mut(cube_indices) {
            buffer.set_index_format(IndexFormat::Uint16).request_update(&indices);
        }
        if let Some(buffer) = graph.buffer_mut(overlay_vertices) {
            buffer
                .add_vertex_attribute(Format::Rg32Float, 0)
                .set_element_size(std::mem::size_of::<OverlayVertex>() as u32)
                .request_update(&geometry::overlay_quad([-0.95, 0.7], [-0.35, 0.95]));
        }
        if let Some(buffer) = graph.buffer_mut(camera) {
            buffer.request_update(&[initial_camera]);
        }
        let camera_set = graph.add_resource_descriptor("camera", |set| {
            set.add_uniform_buffer(camera, ShaderStages::VERTEX);
        });
        self.camera = Some(camera);

        // === Scene stage ===

        let index_count = self.index_count;
        let wireframe: Rc<Cell<Option<PipelineHandle>>> = Rc::new(Cell::new(None));
        let wireframe_handle = Rc::clone(&wireframe);
        let show_wireframe = Rc::clone(&self.show_wireframe);
        let scene = graph.add_graphics_stage("scene", |stage| {
            stage
                .bind_buffer(cube_vertices, 0)
                .reads_from(cube_indices)
                .uses_descriptor(camera_set)
                .writes_to(back_buffer)
                .writes_to(depth)
                .set_clears_target(true)
                .set_clear_color([0.02, 0.02, 0.05, 1.0])
                .set_depth_options(true, true)
                .uses_shader(ShaderStage::Vertex, Arc::clone(&vertex_shader), "main")
                .uses_shader(ShaderStage::Fragment, Arc::clone(&fragment_shader), "main")
                .set_on_record(move |stage, recorder| {
                    if let Some(set) = stage.descriptor_set(camera_set) {
                        recorder.bind_descriptor_sets(stage.pipeline_layout(), 0, &[set]);
                    }
                    recorder.draw_indexed(index_count, 1, 0, 0, 0);

                    let wireframe = wireframe_handle.get().and_then(|h| stage.pipeline(h));
                    if show_wireframe.get()
                        && let Some(pipeline) = wireframe
                    {
                        recorder.bind_pipeline(pipeline);
                        recorder.draw_indexed(index_count, 1, 0, 0, 0);
                    }
                });
        });
        let handle = graph.add_graphics_pipeline(scene, "scene wireframe", move |builder| {
            builder
                .add_shader(ShaderStage::Vertex, Arc::clone(&vertex_shader), "main")
                .add_shader(ShaderStage::Fragment, Arc::clone(&fragment_shader), "main")
                .set_wireframe(true);
        });
        wireframe.set(Some(handle));

        // === Overlay stage ===

        let vertex_shader =
            ctx.create_shader_module("overlay.vert", ShaderStage::Vertex, PLACEHOLDER_SPIRV)?;
        let graph = ctx.graph_mut();
        graph.add_graphics_stage("overlay", |stage| {
            stage
                .bind_buffer(overlay_vertices, 0)
                .writes_to(back_buffer)
                .set_cull_mode(CullMode::None)
                .add_color_blend_attachment(ColorBlendAttachment::alpha_blending())
                .add_push_constant_range(PushConstantRange::new(ShaderStages::FRAGMENT, 0, 16))
                .uses_shader(ShaderStage::Vertex, vertex_shader, "main")
                .uses_shader(ShaderStage::Fragment, overlay_shader, "main")
                .set_on_record(|stage, recorder| {
                    recorder.push_constants(
                        stage.pipeline_layout(),
                        ShaderStages::FRAGMENT,
                        0,
                        bytemuck::bytes_of(&OVERLAY_TINT),
                    );
                    recorder.draw(6, 1, 0, 0);
                });
        });

        ctx.set_target(back_buffer);
        Ok(())
    }
}

impl AppHandler for CubeDemo {
    fn on_init(&mut self, ctx: &mut AppContext) {
        log::info!("Initializing cube demo at {}", ctx.extent());
        if let Err(e) = self.declare_scene(ctx) {
            log::error!("Failed to create shader modules: {}", e);
        }
        log::debug!("{}", ctx.graph());
    }

    fn on_resize(&mut self, ctx: &mut AppContext) {
        log::info!("Surface resized to {}", ctx.extent());
    }

    fn on_update(&mut self, ctx: &mut AppContext) -> bool {
        if ctx.frame_number() % 60 == 0 {
            self.show_wireframe.set(!self.show_wireframe.get());
        }
        let Some(camera) = self.camera else {
            return false;
        };
        let uniforms =
            CameraUniforms::orbit(ctx.elapsed_time() * ORBIT_SPEED, ctx.aspect_ratio());
        if let Err(e) = ctx.graph_mut().request_update(camera, &[uniforms]) {
            log::error!("Failed to update camera: {}", e);
            return false;
        }
        true
    }

    fn on_frame_recorded(
        &mut self,
        ctx: &mut AppContext,
        stats: &FrameStats,
        commands: &RecordingCommandBuffer,
    ) {
        self.recorded_commands += commands.commands().len();
        if ctx.frame_number() % 60 == 0 {
            log::info!(
                "Frame {}: {} stages, {} buffers rebuilt, {} commands",
                ctx.frame_number(),
                stats.stages_recorded,
                stats.buffers_rebuilt,
                commands.commands().len()
            );
        }
    }

    fn on_shutdown(&mut self, ctx: &mut AppContext) {
        let stats = ctx.device_stats();
        log::info!(
            "Shutting down: {} commands recorded, {} bytes uploaded",
            self.recorded_commands,
            stats.bytes_uploaded()
        );
    }
}

fn main() {
    let args = DefaultAppArgs::parse();
    match App::run(CubeDemo::default(), args) {
        Ok(summary) => log::info!(
            "Cube demo finished: {} frames, {} recompiles, final size {}",
            summary.frames,
            summary.recompiles,
            summary.final_extent
        ),
        Err(e) => {
            log::error!("Cube demo failed: {}", e);
            std::process::exit(1);
        }
    }
}
