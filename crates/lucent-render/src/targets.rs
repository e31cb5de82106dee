//! Render target attachments.

use ash::vk;
use lucent_gpu::{GpuContext, ImageAllocation, Result, SurfaceProperties};

/// Depth attachment backed by the image pool.
///
/// Rebuilt together with the swapchain; the format comes from the surface
/// properties snapshot so every rebuild uses the same selection.
pub struct DepthTarget {
    pub image: ImageAllocation,
}

impl DepthTarget {
    pub fn new(gpu: &GpuContext, properties: &SurfaceProperties) -> Result<Self> {
        let mut allocator = gpu.allocator().lock();

        let mut image = allocator.create_image(
            properties.depth_format,
            properties.extent,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            "depth_target",
        )?;
        allocator.create_image_view(&mut image, depth_aspect(properties.depth_format))?;

        Ok(Self { image })
    }

    pub fn view(&self) -> vk::ImageView {
        self.image.view
    }

    pub fn format(&self) -> vk::Format {
        self.image.format
    }

    /// Free the depth image.
    ///
    /// # Safety
    /// The image must not be referenced by in-flight GPU work.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        unsafe { gpu.allocator().lock().free_image(&mut self.image) }
    }
}

/// Image aspect for a depth format, including stencil when present.
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_formats_carry_stencil_aspect() {
        assert_eq!(
            depth_aspect(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            depth_aspect(vk::Format::D32_SFLOAT_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
