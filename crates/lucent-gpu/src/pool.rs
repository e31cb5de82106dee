//! Memory pool descriptors and allocation routing.
//!
//! The allocator carves its allocations into four specialized pools. Each
//! pool is bound to a memory-type index probed with a representative dummy
//! resource before the pool exists, and carries the block-size, alignment,
//! and priority parameters its usage class needs. Routing a request to a
//! pool is driven by an explicit [`BufferClass`] supplied by the caller.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Fixed block size for the generic buffer pool.
pub const BUFFER_POOL_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Fixed block size for the image pool.
pub const IMAGE_POOL_BLOCK_SIZE: u64 = 128 * 1024 * 1024;

/// Blocks pre-reserved for pools with a minimum block count.
pub const MIN_BLOCK_COUNT: u32 = 1;

/// The four allocation pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Short-lived host-visible upload buffers. Grows on demand,
    /// lowest priority.
    Staging,
    /// Descriptor-buffer allocations, host-visible and mapped at creation.
    Descriptor,
    /// Vertex/index/uniform/material data. Pre-reserved blocks, highest
    /// priority, aligned to the minimum uniform-buffer offset alignment.
    Buffer,
    /// All images: textures, depth targets, offscreen attachments.
    Image,
}

/// Usage class a caller attaches to a buffer request.
///
/// Replaces the original identifier-prefix convention with an explicit
/// parameter; the identifier string is diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferClass {
    /// Transient upload source, host-visible.
    Staging,
    /// Backing storage for descriptor buffers.
    Descriptor,
    /// Everything else: packed model data, uniforms, readback targets.
    Generic,
}

/// Which pool serves a buffer of the given class.
#[must_use]
pub const fn route_buffer(class: BufferClass) -> PoolKind {
    match class {
        BufferClass::Staging => PoolKind::Staging,
        BufferClass::Descriptor => PoolKind::Descriptor,
        BufferClass::Generic => PoolKind::Buffer,
    }
}

/// Whether a buffer of this class/usage must be persistently host-mapped.
///
/// Staging and descriptor buffers are always written by the CPU; uniform
/// buffers are re-written every frame by the scene update path.
#[must_use]
pub fn wants_host_mapping(class: BufferClass, usage: vk::BufferUsageFlags) -> bool {
    matches!(class, BufferClass::Staging | BufferClass::Descriptor)
        || usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
}

/// Static parameters of one pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolDesc {
    pub kind: PoolKind,
    /// Memory-type index derived from the probe allocation.
    pub memory_type_index: u32,
    pub location: MemoryLocation,
    /// Fixed block size, zero for grow-on-demand pools.
    pub block_size: u64,
    pub min_block_count: u32,
    /// Minimum alignment applied to every allocation in the pool.
    pub min_alignment: u64,
    /// Relative residency priority, 0.0 (lowest) to 1.0 (highest).
    pub priority: f32,
    /// Linear allocation strategy: freed space is not reused until the
    /// whole block resets.
    pub linear: bool,
}

/// Live accounting for one pool.
#[derive(Debug)]
pub struct PoolState {
    pub desc: PoolDesc,
    pub allocated_bytes: u64,
    pub allocation_count: u32,
}

impl PoolState {
    pub fn new(desc: PoolDesc) -> Self {
        Self {
            desc,
            allocated_bytes: 0,
            allocation_count: 0,
        }
    }

    pub fn record_alloc(&mut self, bytes: u64) {
        self.allocated_bytes += bytes;
        self.allocation_count += 1;
    }

    pub fn record_free(&mut self, bytes: u64) {
        self.allocated_bytes = self.allocated_bytes.saturating_sub(bytes);
        self.allocation_count = self.allocation_count.saturating_sub(1);
    }
}

/// Find a memory-type index satisfying both the resource's type bits and
/// the required property flags.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(index, memory_type)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(index, _)| index as u32)
        .ok_or_else(|| {
            GpuError::AllocationFailed(format!(
                "no memory type matches bits {type_bits:#x} with flags {required:?}"
            ))
        })
}

/// Property flags required by a pool's memory location.
#[must_use]
pub const fn required_property_flags(location: MemoryLocation) -> vk::MemoryPropertyFlags {
    match location {
        MemoryLocation::CpuToGpu | MemoryLocation::GpuToCpu => vk::MemoryPropertyFlags::HOST_VISIBLE,
        _ => vk::MemoryPropertyFlags::DEVICE_LOCAL,
    }
}

/// Probe the memory-type index for buffer allocations with the given usage.
///
/// Creates a 256-byte dummy buffer, reads its memory requirements, and
/// destroys it again. The pools must exist before any real allocation, so
/// the probe cannot reuse a live resource.
///
/// # Safety
/// The device must be valid.
pub unsafe fn probe_buffer_memory_type(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    usage: vk::BufferUsageFlags,
    location: MemoryLocation,
) -> Result<u32> {
    let buffer_info = vk::BufferCreateInfo::default()
        .size(0x100)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    unsafe { device.destroy_buffer(buffer, None) };

    find_memory_type_index(
        memory_properties,
        requirements.memory_type_bits,
        required_property_flags(location),
    )
}

/// Probe the memory-type index for image allocations.
///
/// Uses a 4x4 RGBA8 dummy image as the representative descriptor.
///
/// # Safety
/// The device must be valid.
pub unsafe fn probe_image_memory_type(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
) -> Result<u32> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(vk::Format::R8G8B8A8_SRGB)
        .extent(vk::Extent3D {
            width: 4,
            height: 4,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = unsafe { device.create_image(&image_info, None)? };
    let requirements = unsafe { device.get_image_memory_requirements(image) };
    unsafe { device.destroy_image(image, None) };

    find_memory_type_index(
        memory_properties,
        requirements.memory_type_bits,
        required_property_flags(MemoryLocation::GpuOnly),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_class_routes_to_staging_pool() {
        assert_eq!(route_buffer(BufferClass::Staging), PoolKind::Staging);
    }

    #[test]
    fn descriptor_class_routes_to_descriptor_pool() {
        assert_eq!(route_buffer(BufferClass::Descriptor), PoolKind::Descriptor);
    }

    #[test]
    fn generic_class_routes_to_buffer_pool() {
        assert_eq!(route_buffer(BufferClass::Generic), PoolKind::Buffer);
    }

    #[test]
    fn staging_buffers_are_host_mapped() {
        assert!(wants_host_mapping(
            BufferClass::Staging,
            vk::BufferUsageFlags::TRANSFER_SRC
        ));
    }

    #[test]
    fn uniform_buffers_are_host_mapped() {
        assert!(wants_host_mapping(
            BufferClass::Generic,
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::VERTEX_BUFFER
        ));
    }

    #[test]
    fn plain_vertex_buffers_are_not_host_mapped() {
        assert!(!wants_host_mapping(
            BufferClass::Generic,
            vk::BufferUsageFlags::VERTEX_BUFFER
        ));
    }

    fn memory_properties(types: &[(u32, vk::MemoryPropertyFlags)]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, (heap_index, flags)) in types.iter().enumerate() {
            properties.memory_types[i] = vk::MemoryType {
                property_flags: *flags,
                heap_index: *heap_index,
            };
        }
        properties
    }

    #[test]
    fn memory_type_index_respects_type_bits_and_flags() {
        let properties = memory_properties(&[
            (0, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            (
                1,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
        ]);

        // Both types allowed, host-visible requested: must skip type 0.
        let index = find_memory_type_index(&properties, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE)
            .expect("host-visible type exists");
        assert_eq!(index, 1);

        // Type bits exclude the only matching type.
        assert!(
            find_memory_type_index(&properties, 0b01, vk::MemoryPropertyFlags::HOST_VISIBLE)
                .is_err()
        );
    }

    #[test]
    fn memory_type_probe_failure_is_fatal() {
        let properties = memory_properties(&[(0, vk::MemoryPropertyFlags::DEVICE_LOCAL)]);
        let result =
            find_memory_type_index(&properties, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(result, Err(GpuError::AllocationFailed(_))));
    }

    #[test]
    fn pool_state_accounting_is_symmetric() {
        let mut state = PoolState::new(PoolDesc {
            kind: PoolKind::Staging,
            memory_type_index: 0,
            location: MemoryLocation::CpuToGpu,
            block_size: 0,
            min_block_count: 0,
            min_alignment: 0,
            priority: 0.0,
            linear: true,
        });

        state.record_alloc(1024);
        state.record_alloc(512);
        assert_eq!(state.allocated_bytes, 1536);
        assert_eq!(state.allocation_count, 2);

        state.record_free(512);
        state.record_free(1024);
        assert_eq!(state.allocated_bytes, 0);
        assert_eq!(state.allocation_count, 0);

        // A stray extra free saturates instead of underflowing.
        state.record_free(64);
        assert_eq!(state.allocated_bytes, 0);
        assert_eq!(state.allocation_count, 0);
    }
}
