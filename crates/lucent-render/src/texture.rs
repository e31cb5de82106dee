//! Texture upload and lookup.
//!
//! Texture uploads are staged: pixels land in a host-visible staging buffer,
//! the copy into the sampled image is recorded into a caller-provided command
//! buffer, and the staging buffer is handed back to the caller. The caller
//! owns submission and must free the staging buffer only after the copy has
//! completed on the GPU.

use ash::vk;
use lucent_gpu::{BufferAllocation, BufferClass, GpuContext, GpuError, ResourceId, Result};

/// Access and stage masks for a supported upload-path layout transition.
///
/// Returns `None` for any pair the upload path never records.
pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Option<(
    vk::AccessFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Some((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Some((
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        _ => None,
    }
}

/// Record a layout transition barrier for a single-mip color image.
///
/// Only the transitions the upload path needs are supported.
///
/// # Safety
/// The command buffer must be in the recording state.
pub unsafe fn transition_image_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<()> {
    let (src_access, dst_access, src_stage, dst_stage) =
        transition_masks(old_layout, new_layout).ok_or_else(|| {
            GpuError::InvalidState(format!(
                "unsupported layout transition {old_layout:?} -> {new_layout:?}"
            ))
        })?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
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
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    Ok(())
}

/// Stage pixel data into a new sampled image and register it.
///
/// Records the staging copy and layout transitions into `cmd`, which must
/// be in the recording state. Returns the registered image id (count 1) and
/// the staging buffer; the caller frees the staging buffer once the
/// submitted copy has finished.
///
/// # Safety
/// The command buffer must be in the recording state.
pub unsafe fn allocate_texture(
    gpu: &GpuContext,
    cmd: vk::CommandBuffer,
    pixels: &[u8],
    width: u32,
    height: u32,
    format: vk::Format,
) -> Result<(ResourceId, BufferAllocation)> {
    let extent = vk::Extent2D { width, height };

    let (staging, image) = {
        let mut allocator = gpu.allocator().lock();

        let staging = allocator.create_buffer(
            pixels.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            BufferClass::Staging,
            "texture_staging",
        )?;
        staging.write(pixels)?;
        unsafe {
            staging.flush(
                gpu.device(),
                0,
                pixels.len() as u64,
                gpu.capabilities().non_coherent_atom_size,
            )?;
        }

        let mut image = allocator.create_image(
            format,
            extent,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            "texture",
        )?;
        allocator.create_image_view(&mut image, vk::ImageAspectFlags::COLOR)?;

        (staging, image)
    };

    let device = gpu.device();
    unsafe {
        transition_image_layout(
            device,
            cmd,
            image.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });

        device.cmd_copy_buffer_to_image(
            cmd,
            staging.buffer,
            image.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        transition_image_layout(
            device,
            cmd,
            image.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
    }

    let id = gpu.image_registry().lock().register(image);

    tracing::debug!(id, width, height, ?format, "texture upload recorded");

    Ok((id, staging))
}

/// Descriptor info for a registered sampled image.
pub fn image_descriptor(
    gpu: &GpuContext,
    id: ResourceId,
    sampler: vk::Sampler,
) -> Result<vk::DescriptorImageInfo> {
    let registry = gpu.image_registry().lock();
    let image = registry.get(id)?;

    Ok(vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image.view)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL))
}

/// A registered texture handle.
pub struct Texture {
    id: ResourceId,
    extent: vk::Extent2D,
    format: vk::Format,
}

impl Texture {
    pub fn new(id: ResourceId, extent: vk::Extent2D, format: vk::Format) -> Self {
        Self { id, extent, format }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn descriptor(&self, gpu: &GpuContext, sampler: vk::Sampler) -> Result<vk::DescriptorImageInfo> {
        image_descriptor(gpu, self.id, sampler)
    }

    /// Release this texture's reference, destroying the image when it was
    /// the last one.
    pub fn destroy(self, gpu: &GpuContext) -> Result<()> {
        gpu.release_image(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transitions_are_supported() {
        let (src, dst, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src, vk::AccessFlags::empty());
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);

        assert!(transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .is_some());
    }

    #[test]
    fn reverse_transition_is_rejected() {
        assert!(transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::UNDEFINED,
        )
        .is_none());
    }
}
