//! Screenshot capture.
//!
//! Copies a presented swapchain image into a host-visible staging buffer
//! and encodes it to an image file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ash::vk;
use image::{ImageBuffer, Rgba};
use lucent_core::constants::FENCE_TIMEOUT_NS;
use lucent_gpu::{execute_single_time_commands, BufferClass, CommandPool, GpuContext, Result};
use thiserror::Error;
use tracing::info;

/// Errors that can occur during screenshot capture.
#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("Failed to read screenshot data: {0}")]
    ReadbackFailed(String),
    #[error("Invalid image data")]
    InvalidImageData,
    #[error("Failed to save screenshot: {0}")]
    SaveFailed(String),
}

/// Screenshot capture configuration.
///
/// Defines which frames to capture and where to save them.
#[derive(Clone, Default)]
pub struct ScreenshotConfig {
    /// Whether screenshot capture is enabled.
    pub enabled: bool,
    /// Output path pattern (use `{}` for frame number placeholder).
    pub output_pattern: String,
    /// Frame indices to capture.
    pub frames: HashSet<u64>,
}

impl ScreenshotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable capture with the given output pattern.
    pub fn with_output(mut self, pattern: impl Into<String>) -> Self {
        self.enabled = true;
        self.output_pattern = pattern.into();
        self
    }

    /// Add frames to capture.
    pub fn with_frames(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.enabled = true;
        self.frames.extend(frames);
        self
    }

    /// Output path for a specific frame.
    pub fn output_path(&self, frame: u64) -> PathBuf {
        PathBuf::from(self.output_pattern.replace("{}", &frame.to_string()))
    }

    /// Whether the given frame should be captured.
    pub fn should_capture(&self, frame: u64) -> bool {
        self.enabled && self.frames.contains(&frame)
    }
}

/// Parse frame indices from a string like "0,5,10-15,20".
///
/// Supports single frames, comma separation, and inclusive ranges.
pub fn parse_frame_indices(s: &str) -> HashSet<u64> {
    let mut frames = HashSet::new();

    for part in s.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.parse::<u64>(), end.parse::<u64>()) {
                frames.extend(start..=end);
            }
        } else if let Ok(frame) = part.parse::<u64>() {
            frames.insert(frame);
        }
    }

    frames
}

/// Read a swapchain image back into CPU memory as RGBA bytes.
///
/// Records a one-shot transfer: the image is moved to TRANSFER_SRC, copied
/// into a staging buffer, and returned to PRESENT_SRC. The wait on the copy
/// fence is bounded. BGRA swapchain formats are swizzled to RGBA.
///
/// # Safety
/// The image must have been presented and not be in use by in-flight work
/// touching its layout.
pub unsafe fn read_swapchain_image(
    gpu: &GpuContext,
    pool: &CommandPool,
    image: vk::Image,
    extent: vk::Extent2D,
    format: vk::Format,
) -> Result<Vec<u8>> {
    let byte_size = u64::from(extent.width) * u64::from(extent.height) * 4;

    let mut staging = gpu.allocator().lock().create_buffer(
        byte_size,
        vk::BufferUsageFlags::TRANSFER_DST,
        BufferClass::Staging,
        "screenshot_staging",
    )?;

    let device = gpu.device();

    let result = unsafe {
        execute_single_time_commands(device, pool, gpu.graphics_queue(), FENCE_TIMEOUT_NS, |cmd| {
            readback_barrier(
                device,
                cmd,
                image,
                vk::ImageLayout::PRESENT_SRC_KHR,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            );

            let region = vk::BufferImageCopy::default()
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                });

            device.cmd_copy_image_to_buffer(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                staging.buffer,
                &[region],
            );

            readback_barrier(
                device,
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
            );
        })
    };

    let pixels = result.and_then(|()| {
        // The staging memory may be non-coherent; pull the device writes in
        // before reading through the mapping.
        unsafe {
            staging.invalidate(
                device,
                0,
                byte_size,
                gpu.capabilities().non_coherent_atom_size,
            )?;
        }

        let ptr = staging.mapped_ptr().ok_or_else(|| {
            lucent_gpu::GpuError::InvalidState("screenshot staging not mapped".to_string())
        })?;

        let mut pixels =
            unsafe { std::slice::from_raw_parts(ptr, byte_size as usize) }.to_vec();

        if matches!(
            format,
            vk::Format::B8G8R8A8_SRGB | vk::Format::B8G8R8A8_UNORM
        ) {
            for pixel in pixels.chunks_exact_mut(4) {
                pixel.swap(0, 2);
            }
        }

        Ok(pixels)
    });

    unsafe { gpu.allocator().lock().free_buffer(&mut staging)? };

    pixels
}

/// Transfer barrier used on both sides of the readback copy.
unsafe fn readback_barrier(
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
        .dst_access_mask(vk::AccessFlags::TRANSFER_READ | vk::AccessFlags::TRANSFER_WRITE)
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
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Save RGBA pixel data to an image file.
///
/// The output format is determined by the file extension.
pub fn save_screenshot(
    data: Vec<u8>,
    width: u32,
    height: u32,
    path: impl AsRef<Path>,
) -> std::result::Result<(), ScreenshotError> {
    let path = path.as_ref();

    let image = ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data)
        .ok_or(ScreenshotError::InvalidImageData)?;

    image
        .save(path)
        .map_err(|e| ScreenshotError::SaveFailed(e.to_string()))?;

    info!("Screenshot saved: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_frame() {
        assert_eq!(parse_frame_indices("5"), HashSet::from([5]));
    }

    #[test]
    fn parse_comma_separated() {
        assert_eq!(parse_frame_indices("0,5,10"), HashSet::from([0, 5, 10]));
    }

    #[test]
    fn parse_range_inclusive() {
        assert_eq!(parse_frame_indices("3-6"), HashSet::from([3, 4, 5, 6]));
    }

    #[test]
    fn parse_mixed_ignores_garbage() {
        assert_eq!(
            parse_frame_indices("0,5-7,x,10"),
            HashSet::from([0, 5, 6, 7, 10])
        );
    }

    #[test]
    fn config_output_path() {
        let config = ScreenshotConfig::new().with_output("frame_{}.png");
        assert_eq!(config.output_path(42), PathBuf::from("frame_42.png"));
    }

    #[test]
    fn config_should_capture() {
        let config = ScreenshotConfig::new().with_frames([0, 5, 10]);
        assert!(config.should_capture(0));
        assert!(config.should_capture(5));
        assert!(!config.should_capture(3));
        assert!(!ScreenshotConfig::new().should_capture(0));
    }

    #[test]
    fn save_rejects_wrong_pixel_count() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bad.png");
        let result = save_screenshot(vec![0u8; 7], 2, 2, &path);
        assert!(matches!(result, Err(ScreenshotError::InvalidImageData)));
    }

    #[test]
    fn save_writes_png() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("out.png");
        save_screenshot(vec![255u8; 2 * 2 * 4], 2, 2, &path).unwrap();
        assert!(path.exists());
    }
}
