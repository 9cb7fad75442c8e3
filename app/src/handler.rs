//! Application handler trait.

use emberlight_graphics::{FrameStats, RecordingCommandBuffer};

use crate::context::AppContext;

/// Trait for handling application events.
///
/// Implement this trait to create custom application logic.
///
/// # Lifecycle
///
/// 1. `on_init` - Called once; declare the render graph and set its target
/// 2. `on_resize` - Called after the surface changed size
/// 3. `on_update` - Called every frame before the graph renders
/// 4. `on_frame_recorded` - Called every frame with the recorded commands
/// 5. `on_shutdown` - Called when the application is closing
///
/// # Example
///
/// ```ignore
/// use emberlight_app::{AppContext, AppHandler};
/// use emberlight_graphics::TextureUsage;
///
/// struct ClearApp;
///
/// impl AppHandler for ClearApp {
///     fn on_init(&mut self, ctx: &mut AppContext) {
///         let format = ctx.surface_format();
///         let graph = ctx.graph_mut();
///         let back_buffer = graph.add_texture("back buffer", TextureUsage::BackBuffer, format, None);
///         // ... declare stages writing to back_buffer
///         ctx.set_target(back_buffer);
///     }
/// }
/// ```
pub trait AppHandler {
    /// Called once when the application initializes.
    ///
    /// Use this to declare resources, stages and shaders.
    fn on_init(&mut self, _ctx: &mut AppContext) {}

    /// Called when the surface is resized.
    ///
    /// The new size is available in `ctx.width()` and `ctx.height()`. The
    /// graph is recompiled against the new surface afterwards.
    fn on_resize(&mut self, _ctx: &mut AppContext) {}

    /// Called every frame before rendering.
    ///
    /// Use this to request buffer and texture updates.
    /// Returns `true` to continue running, `false` to exit.
    fn on_update(&mut self, _ctx: &mut AppContext) -> bool {
        true
    }

    /// Called every frame after the graph has been recorded.
    fn on_frame_recorded(
        &mut self,
        _ctx: &mut AppContext,
        _stats: &FrameStats,
        _commands: &RecordingCommandBuffer,
    ) {
    }

    /// Called when the application is closing.
    fn on_shutdown(&mut self, _ctx: &mut AppContext) {}
}

impl<T: AppHandler + ?Sized> AppHandler for &mut T {
    fn on_init(&mut self, ctx: &mut AppContext) {
        (**self).on_init(ctx)
    }

    fn on_resize(&mut self, ctx: &mut AppContext) {
        (**self).on_resize(ctx)
    }

    fn on_update(&mut self, ctx: &mut AppContext) -> bool {
        (**self).on_update(ctx)
    }

    fn on_frame_recorded(
        &mut self,
        ctx: &mut AppContext,
        stats: &FrameStats,
        commands: &RecordingCommandBuffer,
    ) {
        (**self).on_frame_recorded(ctx, stats, commands)
    }

    fn on_shutdown(&mut self, ctx: &mut AppContext) {
        (**self).on_shutdown(ctx)
    }
}
