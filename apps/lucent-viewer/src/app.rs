//! Viewer application state.

use ash::vk;
use glam::{Mat4, Quat, Vec3};
use lucent_app::{App, AppContext, FrameContext};
use lucent_render::scene::{allocate_models_buffers, update_object_uniform};
use lucent_render::screenshot::{
    parse_frame_indices, read_swapchain_image, save_screenshot, ScreenshotConfig,
};
use lucent_render::{Mesh, Object};
use tracing::{error, info};

/// Demo viewer: a few spinning quads in one packed scene buffer.
pub struct Viewer {
    objects: Vec<Object>,
    screenshots: ScreenshotConfig,
    elapsed: f32,
}

impl App for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let mut objects: Vec<Object> = (0..3)
            .map(|i| {
                Object::new(Mesh::quad()).with_transform(Mat4::from_translation(Vec3::new(
                    i as f32 - 1.0,
                    0.0,
                    0.0,
                )))
            })
            .collect();

        let id = allocate_models_buffers(&ctx.gpu, &mut objects)?;
        info!(id, objects = objects.len(), "scene allocated");
        info!("{}", ctx.gpu.memory_report());

        Ok(Self {
            objects,
            screenshots: screenshot_config_from_args(),
            elapsed: 0.0,
        })
    }

    fn update(&mut self, ctx: &AppContext, dt: f32) {
        self.elapsed += dt;

        for (i, object) in self.objects.iter_mut().enumerate() {
            let angle = self.elapsed + i as f32 * std::f32::consts::FRAC_PI_3;
            object.transform = Mat4::from_scale_rotation_translation(
                Vec3::splat(0.5),
                Quat::from_rotation_z(angle),
                Vec3::new(i as f32 - 1.0, 0.0, 0.0),
            );
            if let Err(e) = update_object_uniform(&ctx.gpu, object) {
                error!("Failed to update object {i}: {e}");
            }
        }
    }

    fn record(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        let device = ctx.gpu.device();
        let cmd = frame.command_buffer;

        let t = self.elapsed;
        let clear_color = vk::ClearColorValue {
            float32: [
                0.5 + 0.5 * t.sin(),
                0.2,
                0.5 + 0.5 * (t * 0.7).cos(),
                1.0,
            ],
        };

        let range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);

        unsafe {
            barrier(
                device,
                cmd,
                frame.swapchain_image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );

            device.cmd_clear_color_image(
                cmd,
                frame.swapchain_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear_color,
                &[range],
            );

            barrier(
                device,
                cmd,
                frame.swapchain_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
            );
        }

        if self.screenshots.should_capture(frame.frame_number) {
            self.capture(ctx, frame);
        }

        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        for object in &mut self.objects {
            if let Some(id) = object.buffer_id.take() {
                if let Err(e) = ctx.gpu.release_buffer(id) {
                    error!("Failed to release scene buffer {id}: {e}");
                }
            }
        }
    }
}

impl Viewer {
    /// Queue a readback of the previous frame's image for this slot.
    ///
    /// The image was presented at least a full frame cycle ago, so the
    /// transfer recorded here cannot race the in-flight clear.
    fn capture(&mut self, ctx: &AppContext, frame: &FrameContext) {
        let path = self.screenshots.output_path(frame.frame_number);
        let extent = frame.extent;

        let result = unsafe {
            read_swapchain_image(
                &ctx.gpu,
                &ctx.command_pool,
                frame.swapchain_image,
                extent,
                ctx.properties.format.format,
            )
        };

        match result {
            Ok(pixels) => {
                if let Err(e) = save_screenshot(pixels, extent.width, extent.height, &path) {
                    error!("Screenshot failed: {e}");
                }
            }
            Err(e) => error!("Screenshot readback failed: {e}"),
        }
    }
}

fn screenshot_config_from_args() -> ScreenshotConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ScreenshotConfig::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output" if i + 1 < args.len() => {
                config = config.with_output(args[i + 1].clone());
                i += 1;
            }
            "-f" | "--frames" if i + 1 < args.len() => {
                config = config.with_frames(parse_frame_indices(&args[i + 1]));
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }

    if config.enabled && config.output_pattern.is_empty() {
        config = config.with_output("screenshot_{}.png");
    }
    if config.enabled && config.frames.is_empty() {
        config = config.with_frames([0]);
    }

    config
}

/// Full-barrier layout transition for the clear path.
unsafe fn barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .src_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
        .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}
