//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ash::vk;
use lucent_core::constants::FENCE_TIMEOUT_NS;
use lucent_gpu::command::submit_command_buffers;
use lucent_gpu::sync::{reset_fence, wait_for_fence};
use lucent_gpu::{GpuContextBuilder, RecoveryMachine};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::App;
use crate::context::AppContext;
use crate::frame::FrameContext;

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Lucent Engine".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

/// Run an [`App`] with the given configuration.
///
/// Initializes logging, creates the window and GPU context, and runs the
/// event loop until the application exits.
pub fn run_app<A: App + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
    }

    Ok(())
}

/// Internal application runner implementing winit's ApplicationHandler.
struct AppRunner<A: App> {
    config: AppConfig,
    state: Option<AppState<A>>,
}

/// Internal application state.
struct AppState<A: App> {
    ctx: AppContext,
    app: A,
    recovery: RecoveryMachine,
    target_frame_time: Option<Duration>,
}

impl<A: App + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready");
            }
            Err(e) => {
                error!("Failed to initialize application: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        error!("Render error: {e}");
                    }
                    state.ctx.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.handle_resize(size.width, size.height);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: App + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()?;

        let mut ctx = unsafe { AppContext::new(window, gpu)? };

        let app = A::init(&mut ctx)?;

        let target_frame_time = self
            .config
            .target_fps
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)));

        Ok(AppState {
            ctx,
            app,
            recovery: RecoveryMachine::new(),
            target_frame_time,
        })
    }
}

impl<A: App> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        let now = Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;

        self.app.update(&self.ctx, dt);

        // Mid-recovery frames do teardown/rebuild work instead of drawing.
        if !self.recovery.poll(&mut self.ctx)? {
            return Ok(());
        }

        let frame_data = &self.ctx.frames[self.ctx.current_frame_index];
        let (image_available, render_finished, in_flight_fence, command_buffer) = (
            frame_data.image_available,
            frame_data.render_finished,
            frame_data.in_flight_fence,
            frame_data.command_buffer,
        );

        let Some(swapchain) = self.ctx.swapchain.as_ref() else {
            return Ok(());
        };
        let device = self.ctx.gpu.device();

        unsafe {
            wait_for_fence(device, in_flight_fence, FENCE_TIMEOUT_NS)?;
        }

        // A failed acquire means the swapchain is stale; no image was
        // handed out and the fence stays signaled for the next attempt.
        let Some(image_index) = (unsafe {
            swapchain.acquire_next_image(
                &self.ctx.surface.swapchain_loader,
                image_available,
                FENCE_TIMEOUT_NS,
            )?
        }) else {
            self.recovery.notify_stale();
            return Ok(());
        };

        unsafe {
            reset_fence(device, in_flight_fence)?;

            device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(command_buffer, &begin_info)?;
        }

        let mut frame_ctx = FrameContext::new(
            command_buffer,
            image_index,
            swapchain.images[image_index as usize],
            self.ctx.extent(),
            dt,
            self.ctx.frame_count,
        );

        self.app.record(&self.ctx, &mut frame_ctx)?;

        unsafe {
            device.end_command_buffer(command_buffer)?;
        }

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let command_buffers = [command_buffer];

        unsafe {
            submit_command_buffers(
                device,
                self.ctx.gpu.graphics_queue(),
                &command_buffers,
                &wait_semaphores,
                &wait_stages,
                &signal_semaphores,
                in_flight_fence,
            )?;
        }

        let needs_recovery = unsafe {
            swapchain.present(
                &self.ctx.surface.swapchain_loader,
                self.ctx.gpu.graphics_queue(),
                image_index,
                &signal_semaphores,
            )?
        };

        if needs_recovery {
            self.recovery.notify_stale();
        }

        self.ctx.current_frame_index = (self.ctx.current_frame_index + 1) % self.ctx.frames.len();
        self.ctx.frame_count += 1;

        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) {
        // The recovery machine requeries the surface and rebuilds; a
        // zero-sized window keeps it in the recovering state until the
        // surface becomes usable again.
        info!("Resize to {width}x{height} requested");
        self.recovery.notify_stale();
    }

    fn cleanup(&mut self) {
        info!("Total frames rendered: {}", self.ctx.frame_count);

        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);

        unsafe {
            self.ctx.cleanup();
        }

        if let Err(e) = self.ctx.gpu.release_memory_resources() {
            error!("Failed to release GPU memory: {e}");
        }
    }
}
