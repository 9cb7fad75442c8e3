//! Main application struct and frame loop.

use std::sync::Arc;
use std::time::Instant;

use emberlight_graphics::{
    DummyBackend, Extent2d, Format, FrameStats, GpuBackend, GraphError, GraphicsError,
    RecordingCommandBuffer,
};

use crate::args::{AppArgs, BackendKind, ResizeEvent};
use crate::context::AppContext;
use crate::handler::AppHandler;

/// Format of the simulated swapchain images.
const SURFACE_FORMAT: Format = Format::Bgra8Srgb;

/// Errors that end an application run.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("the handler did not set a render target")]
    NoTarget,
    #[error("surface size must be non-zero, got {0}")]
    EmptySurface(Extent2d),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("graphics error: {0}")]
    Graphics(#[from] GraphicsError),
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppSummary {
    pub frames: u64,
    /// Compilations after the first one.
    pub recompiles: usize,
    pub stages_recorded: usize,
    pub buffers_rebuilt: usize,
    pub textures_uploaded: usize,
    pub final_extent: Extent2d,
}

impl AppSummary {
    fn add_frame(&mut self, stats: &FrameStats) {
        self.frames += 1;
        self.stages_recorded += stats.stages_recorded;
        self.buffers_rebuilt += stats.buffers_rebuilt;
        self.textures_uploaded += stats.textures_uploaded;
    }
}

/// Headless application that drives a render graph frame by frame.
///
/// The `App` struct is generic over:
/// - `H`: The handler type that implements [`AppHandler`]
/// - `A`: The arguments type that implements [`AppArgs`]
///
/// Frames are recorded into an in-memory command buffer and the swapchain
/// is simulated, so resizes come from [`AppArgs::resize_schedule`].
///
/// # Example
///
/// ```ignore
/// use emberlight_app::{App, AppArgs, DefaultAppArgs};
///
/// fn main() {
///     let args = DefaultAppArgs::parse();
///     if let Err(e) = App::run(MyApp::default(), args) {
///         log::error!("{e}");
///     }
/// }
/// ```
pub struct App<H, A>
where
    H: AppHandler,
    A: AppArgs,
{
    handler: H,
    args: A,
    context: AppContext,
    recorder: RecordingCommandBuffer,
    summary: AppSummary,
    start_time: Instant,
    last_frame_time: Instant,
    next_resize: usize,
}

impl<H, A> App<H, A>
where
    H: AppHandler,
    A: AppArgs,
{
    /// Create a new application and its backend.
    pub fn new(handler: H, args: A) -> Result<Self, AppError> {
        let extent = Extent2d::new(args.surface_width(), args.surface_height());
        if extent.is_empty() {
            return Err(AppError::EmptySurface(extent));
        }

        let dummy = Arc::new(DummyBackend::new());
        let backend: Arc<dyn GpuBackend> = match args.backend() {
            BackendKind::Dummy => dummy.clone(),
            BackendKind::Vulkan => {
                log::warn!(
                    "Vulkan needs a device created by the host application, falling back to the dummy backend"
                );
                dummy.clone()
            }
        };
        log::info!("{}: using {} backend", args.title(), backend.name());

        let surface = dummy.create_surface(extent, SURFACE_FORMAT, args.image_count().max(1));
        let now = Instant::now();
        Ok(Self {
            handler,
            args,
            context: AppContext::new(backend, dummy, surface),
            recorder: RecordingCommandBuffer::new(),
            summary: AppSummary::default(),
            start_time: now,
            last_frame_time: now,
            next_resize: 0,
        })
    }

    /// Run the application with the given handler and arguments.
    ///
    /// Initializes logging, then renders until the handler stops or
    /// `max_frames` is reached.
    pub fn run(handler: H, args: A) -> Result<AppSummary, AppError> {
        // Initialize logging
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(args.log_level().to_string()),
        )
        .try_init();

        emberlight_graphics::init();
        crate::init();

        Self::new(handler, args)?.run_frames()
    }

    /// Initialize the handler and render every frame.
    pub fn run_frames(mut self) -> Result<AppSummary, AppError> {
        self.handler.on_init(&mut self.context);
        let result = self.frame_loop();

        self.handler.on_shutdown(&mut self.context);
        self.context.backend.wait_idle()?;
        self.context.compiled = None;

        let summary = result?;
        log::info!(
            "{}: rendered {} frames, {} recompiles",
            self.args.title(),
            summary.frames,
            summary.recompiles
        );
        Ok(summary)
    }

    fn frame_loop(&mut self) -> Result<AppSummary, AppError> {
        loop {
            if let Some(max_frames) = self.args.max_frames()
                && self.context.frame_number >= max_frames
            {
                log::info!("Reached max frames limit ({}), exiting", max_frames);
                break;
            }

            self.apply_scheduled_resizes()?;

            let now = Instant::now();
            self.context.delta_time = (now - self.last_frame_time).as_secs_f32();
            self.context.elapsed_time = (now - self.start_time).as_secs_f32();
            self.last_frame_time = now;

            if !self.handler.on_update(&mut self.context) {
                log::info!("Handler requested exit");
                break;
            }

            self.render_frame()?;
        }

        self.summary.final_extent = self.context.extent();
        Ok(self.summary)
    }

    /// Replace the swapchain for every resize scheduled up to this frame.
    fn apply_scheduled_resizes(&mut self) -> Result<(), AppError> {
        let frame = self.context.frame_number;
        let pending: Vec<ResizeEvent> = self.args.resize_schedule()[self.next_resize..]
            .iter()
            .take_while(|resize| resize.frame <= frame)
            .copied()
            .collect();
        self.next_resize += pending.len();

        if let Some(last) = pending.last() {
            self.apply_resize(last.extent)?;
        }
        Ok(())
    }

    fn apply_resize(&mut self, extent: Extent2d) -> Result<(), AppError> {
        if extent == self.context.extent() {
            return Ok(());
        }
        if extent.is_empty() {
            return Err(AppError::EmptySurface(extent));
        }
        log::info!(
            "Resizing surface {} -> {} at frame {}",
            self.context.extent(),
            extent,
            self.context.frame_number
        );

        // Old framebuffers reference the old images.
        if let Some(compiled) = self.context.compiled.take() {
            self.context.backend.wait_idle()?;
            drop(compiled);
            self.summary.recompiles += 1;
        }
        let image_count = self.context.surface.image_count();
        self.context.surface =
            self.context
                .surface_provider
                .create_surface(extent, SURFACE_FORMAT, image_count);
        self.handler.on_resize(&mut self.context);
        Ok(())
    }

    /// Compile the graph if it never was, or recompile it if declarations
    /// or the target changed since.
    fn ensure_compiled(&mut self) -> Result<(), AppError> {
        let target = self.context.target.ok_or(AppError::NoTarget)?;
        let ctx = &mut self.context;

        match ctx.compiled.take() {
            Some(compiled)
                if compiled.revision() == ctx.graph.revision() && compiled.target() == target =>
            {
                ctx.compiled = Some(compiled);
            }
            Some(compiled) if compiled.target() == target => {
                log::debug!("Graph declarations changed, recompiling");
                ctx.compiled = Some(compiled.recompile(&ctx.graph, &ctx.surface)?);
                self.summary.recompiles += 1;
            }
            previous => {
                if let Some(previous) = previous {
                    ctx.backend.wait_idle()?;
                    drop(previous);
                    self.summary.recompiles += 1;
                }
                let compiled = ctx.graph.compile(&ctx.backend, &ctx.surface, target)?;
                log::debug!(
                    "Compiled {} stages for {}",
                    compiled.stage_count(),
                    compiled.extent()
                );
                ctx.compiled = Some(compiled);
            }
        }
        Ok(())
    }

    fn render_frame(&mut self) -> Result<(), AppError> {
        self.ensure_compiled()?;

        let ctx = &mut self.context;
        let image_count = ctx.surface.image_count().max(1) as u64;
        ctx.image_index = (ctx.frame_number % image_count) as u32;

        self.recorder.reset();
        let stats = match ctx.compiled.as_mut() {
            Some(compiled) => compiled.render(&mut ctx.graph, ctx.image_index, &mut self.recorder)?,
            None => return Err(AppError::NoTarget),
        };
        emberlight_graphics::frame_mark!();

        log::debug!(
            "Frame {}: image {}, {} stages, {} buffers rebuilt, {} textures uploaded, {} commands",
            ctx.frame_number,
            ctx.image_index,
            stats.stages_recorded,
            stats.buffers_rebuilt,
            stats.textures_uploaded,
            self.recorder.commands().len()
        );

        self.handler
            .on_frame_recorded(&mut self.context, &stats, &self.recorder);
        self.summary.add_frame(&stats);
        self.context.frame_number += 1;
        Ok(())
    }
}
