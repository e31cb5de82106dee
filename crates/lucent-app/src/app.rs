//! `App` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use winit::event::WindowEvent;

/// Trait for Lucent applications.
///
/// Implement this trait to build on the engine's frame driver. The
/// framework owns window creation, GPU initialization, swapchain recovery,
/// and per-frame synchronization; the application fills in scene state and
/// command recording.
pub trait App: Sized {
    /// Initialize the application.
    ///
    /// Called once after the GPU context and window have been created.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before recording, with the delta time in seconds.
    #[allow(unused_variables)]
    fn update(&mut self, ctx: &AppContext, dt: f32) {}

    /// Record rendering commands for the current frame.
    ///
    /// The command buffer in `frame` is already in the recording state.
    /// Acquisition, submission, and presentation happen in the driver.
    fn record(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()>;

    /// Handle a window event.
    ///
    /// Return `true` to consume the event before the driver sees it.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Called after the swapchain has been rebuilt at a new size.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Cleanup resources before shutdown. The device is idle here.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
