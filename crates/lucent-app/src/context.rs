//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use lucent_core::constants::FRAMES_IN_FLIGHT;
use lucent_gpu::recovery::SwapchainDependents;
use lucent_gpu::sync::{create_fence, create_semaphore};
use lucent_gpu::{
    CommandPool, GpuContext, GpuError, Result, SurfaceContext, SurfaceProperties, Swapchain,
};
use lucent_render::DepthTarget;
use winit::window::Window;

/// Per-frame synchronization primitives.
pub(crate) struct FrameSyncData {
    /// Semaphore signaled when the swapchain image is available.
    pub image_available: vk::Semaphore,
    /// Semaphore signaled when rendering is complete.
    pub render_finished: vk::Semaphore,
    /// Fence signaled when this frame slot's submission retires.
    pub in_flight_fence: vk::Fence,
    /// Command buffer for this frame slot.
    pub command_buffer: vk::CommandBuffer,
}

/// Application context shared across all app methods.
///
/// Owns the window-facing GPU state and is the recovery machine's set of
/// swapchain dependents: sync objects, the swapchain itself, and the depth
/// target are torn down and rebuilt through the [`SwapchainDependents`]
/// implementation.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// GPU context with device, queues, allocator, and registries.
    pub gpu: GpuContext,
    /// Surface context for windowed rendering.
    pub surface: SurfaceContext,
    /// Surface snapshot the current swapchain generation was built from.
    pub properties: SurfaceProperties,
    /// Current swapchain, absent mid-recovery.
    pub swapchain: Option<Swapchain>,
    /// Depth attachment matching the swapchain extent.
    pub depth: Option<DepthTarget>,
    /// Command pool for per-frame command buffers.
    pub command_pool: CommandPool,
    /// Per-frame sync data, empty mid-recovery.
    pub(crate) frames: Vec<FrameSyncData>,
    /// Current frame slot index.
    pub(crate) current_frame_index: usize,
    /// Total frames rendered.
    pub frame_count: u64,
    /// Time of last frame, for delta time.
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    /// Create a new application context with a live swapchain.
    ///
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(window: Arc<Window>, gpu: GpuContext) -> Result<Self> {
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };

        if !surface.supports_present(&gpu)? {
            return Err(GpuError::SurfaceCreation(
                "graphics queue cannot present to this surface".to_string(),
            ));
        }

        let command_pool = unsafe {
            CommandPool::new(
                gpu.device(),
                gpu.graphics_queue_family(),
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };

        let mut ctx = Self {
            window,
            gpu,
            surface,
            properties: SurfaceProperties::default(),
            swapchain: None,
            depth: None,
            command_pool,
            frames: Vec::new(),
            current_frame_index: 0,
            frame_count: 0,
            last_frame_time: Instant::now(),
        };

        let properties = ctx.query_surface_properties()?;
        if !properties.is_valid() {
            return Err(GpuError::SurfaceCreation(
                "surface reported a zero-sized extent at startup".to_string(),
            ));
        }

        ctx.create_sync_objects()?;
        ctx.create_swapchain(&properties)?;
        ctx.create_depth_resources(&properties)?;
        ctx.create_framebuffers(&properties)?;

        Ok(ctx)
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.properties.extent
    }

    /// Aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Number of frame slots.
    pub fn frames_in_flight(&self) -> usize {
        FRAMES_IN_FLIGHT
    }

    pub(crate) fn desired_extent(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Cleanup all window-facing resources.
    ///
    /// # Safety
    /// The GPU must be idle and all resources must not be in use.
    pub(crate) unsafe fn cleanup(&mut self) {
        let _ = self.destroy_sync_objects();
        let _ = self.destroy_swapchain_resources();

        unsafe {
            self.command_pool.destroy(self.gpu.device());
            self.surface.destroy();
        }
    }
}

impl SwapchainDependents for AppContext {
    fn wait_device_idle(&mut self) -> Result<()> {
        self.gpu.wait_idle()
    }

    fn destroy_sync_objects(&mut self) -> Result<()> {
        let device = self.gpu.device();

        for frame in self.frames.drain(..) {
            unsafe {
                device.destroy_semaphore(frame.image_available, None);
                device.destroy_semaphore(frame.render_finished, None);
                device.destroy_fence(frame.in_flight_fence, None);
                device.free_command_buffers(self.command_pool.handle(), &[frame.command_buffer]);
            }
        }
        self.current_frame_index = 0;

        Ok(())
    }

    fn destroy_swapchain_resources(&mut self) -> Result<()> {
        if let Some(mut depth) = self.depth.take() {
            unsafe { depth.destroy(&self.gpu)? };
        }

        if let Some(swapchain) = self.swapchain.take() {
            unsafe { swapchain.destroy(self.gpu.device(), &self.surface.swapchain_loader) };
        }

        Ok(())
    }

    fn query_surface_properties(&mut self) -> Result<SurfaceProperties> {
        let desired = self.desired_extent();
        let properties = self.surface.query_properties(&self.gpu, desired)?;
        self.properties = properties;
        Ok(properties)
    }

    fn create_sync_objects(&mut self) -> Result<()> {
        debug_assert!(self.frames.is_empty());

        let device = self.gpu.device();
        let mut frames = Vec::with_capacity(FRAMES_IN_FLIGHT);

        for _ in 0..FRAMES_IN_FLIGHT {
            let command_buffer = unsafe {
                self.command_pool
                    .allocate_command_buffer(device, vk::CommandBufferLevel::PRIMARY)?
            };

            frames.push(FrameSyncData {
                image_available: unsafe { create_semaphore(device)? },
                render_finished: unsafe { create_semaphore(device)? },
                in_flight_fence: unsafe { create_fence(device, true)? },
                command_buffer,
            });
        }

        self.frames = frames;
        Ok(())
    }

    fn create_swapchain(&mut self, properties: &SurfaceProperties) -> Result<()> {
        let swapchain = unsafe {
            Swapchain::new(
                self.gpu.device(),
                &self.surface.swapchain_loader,
                self.surface.surface,
                properties,
                None,
                self.gpu.graphics_queue_family(),
            )?
        };

        tracing::info!(
            width = properties.extent.width,
            height = properties.extent.height,
            images = swapchain.image_count(),
            "swapchain created"
        );

        self.properties = *properties;
        self.swapchain = Some(swapchain);
        Ok(())
    }

    fn create_depth_resources(&mut self, properties: &SurfaceProperties) -> Result<()> {
        self.depth = Some(DepthTarget::new(&self.gpu, properties)?);
        Ok(())
    }

    fn create_framebuffers(&mut self, _properties: &SurfaceProperties) -> Result<()> {
        // Dynamic rendering binds attachments at record time; nothing is
        // built here.
        Ok(())
    }
}
