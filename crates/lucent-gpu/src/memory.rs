//! GPU memory management.
//!
//! [`MemoryAllocator`] owns the native allocator and the four specialized
//! pools. It is externally synchronized: no internal locking, every call
//! must be serialized by the caller ([`crate::context::GpuContext`] wraps
//! it in a mutex and confines use to the render thread).

use crate::alloc::{BufferAllocation, ImageAllocation};
use crate::error::{GpuError, Result};
use crate::pool::{
    self, route_buffer, wants_host_mapping, BufferClass, PoolDesc, PoolKind, PoolState,
    BUFFER_POOL_BLOCK_SIZE, IMAGE_POOL_BLOCK_SIZE, MIN_BLOCK_COUNT,
};
use crate::registry::ResourceRegistry;
use ash::vk;
use gpu_allocator::vulkan::{
    AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocationSizes, MemoryLocation};
use std::fmt::Write as _;
use std::sync::Arc;

/// Pool-aware GPU memory allocator.
pub struct MemoryAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
    staging_pool: PoolState,
    descriptor_pool: PoolState,
    buffer_pool: PoolState,
    image_pool: PoolState,
    min_uniform_offset_alignment: u64,
}

impl MemoryAllocator {
    /// Create the allocator and its four pools.
    ///
    /// Each pool's memory-type index is probed with a representative dummy
    /// resource before the pool is recorded. Any probe or creation failure
    /// is unrecoverable and aborts initialization.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
        min_uniform_offset_alignment: u64,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: cfg!(debug_assertions),
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            // Device-side blocks back the image pool, host-side blocks the
            // buffer pools.
            allocation_sizes: AllocationSizes::new(IMAGE_POOL_BLOCK_SIZE, BUFFER_POOL_BLOCK_SIZE),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let staging_type = unsafe {
            pool::probe_buffer_memory_type(
                &device,
                &memory_properties,
                vk::BufferUsageFlags::TRANSFER_SRC,
                MemoryLocation::CpuToGpu,
            )?
        };
        let descriptor_type = unsafe {
            pool::probe_buffer_memory_type(
                &device,
                &memory_properties,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
            )?
        };
        let buffer_type = unsafe {
            pool::probe_buffer_memory_type(
                &device,
                &memory_properties,
                vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::INDEX_BUFFER
                    | vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
            )?
        };
        let image_type = unsafe { pool::probe_image_memory_type(&device, &memory_properties)? };

        tracing::debug!(
            staging_type,
            descriptor_type,
            buffer_type,
            image_type,
            "memory pools bound"
        );

        Ok(Self {
            allocator: Some(allocator),
            device,
            staging_pool: PoolState::new(PoolDesc {
                kind: PoolKind::Staging,
                memory_type_index: staging_type,
                location: MemoryLocation::CpuToGpu,
                block_size: 0,
                min_block_count: 0,
                min_alignment: 0,
                priority: 0.0,
                linear: true,
            }),
            descriptor_pool: PoolState::new(PoolDesc {
                kind: PoolKind::Descriptor,
                memory_type_index: descriptor_type,
                location: MemoryLocation::CpuToGpu,
                block_size: 0,
                min_block_count: 0,
                min_alignment: 0,
                priority: 1.0,
                linear: true,
            }),
            buffer_pool: PoolState::new(PoolDesc {
                kind: PoolKind::Buffer,
                memory_type_index: buffer_type,
                location: MemoryLocation::CpuToGpu,
                block_size: BUFFER_POOL_BLOCK_SIZE,
                min_block_count: MIN_BLOCK_COUNT,
                min_alignment: min_uniform_offset_alignment,
                priority: 1.0,
                linear: true,
            }),
            image_pool: PoolState::new(PoolDesc {
                kind: PoolKind::Image,
                memory_type_index: image_type,
                location: MemoryLocation::GpuOnly,
                block_size: IMAGE_POOL_BLOCK_SIZE,
                min_block_count: MIN_BLOCK_COUNT,
                min_alignment: 0,
                priority: 1.0,
                linear: true,
            }),
            min_uniform_offset_alignment,
        })
    }

    /// Minimum uniform-buffer offset alignment the buffer pool honors.
    pub fn min_uniform_offset_alignment(&self) -> u64 {
        self.min_uniform_offset_alignment
    }

    fn pool_mut(&mut self, kind: PoolKind) -> &mut PoolState {
        match kind {
            PoolKind::Staging => &mut self.staging_pool,
            PoolKind::Descriptor => &mut self.descriptor_pool,
            PoolKind::Buffer => &mut self.buffer_pool,
            PoolKind::Image => &mut self.image_pool,
        }
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("allocator already shut down".to_string()))
    }

    /// Allocate a buffer from the pool selected by `class`.
    ///
    /// The returned buffer is created, bound, and (when the class or usage
    /// requires CPU visibility) persistently mapped. `name` is attached for
    /// diagnostics only.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        class: BufferClass,
        name: &str,
    ) -> Result<BufferAllocation> {
        let kind = route_buffer(class);
        let desc = self.pool_mut(kind).desc;

        // Host-mapped classes stay in the pool's host-visible memory type;
        // everything else may live device-local.
        let location = if wants_host_mapping(class, usage) {
            desc.location
        } else {
            MemoryLocation::GpuOnly
        };

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };

        let mut requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        requirements.alignment = requirements.alignment.max(desc.min_alignment);

        let allocation = match self.inner()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: desc.linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(GpuError::AllocationFailed(e.to_string()));
            }
        };

        unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        self.pool_mut(kind).record_alloc(allocation.size());

        Ok(BufferAllocation {
            buffer,
            allocation: Some(allocation),
            size,
            pool: kind,
        })
    }

    /// Allocate a uniform buffer with a persistent host mapping.
    pub fn create_uniform_buffers(&mut self, size: u64, name: &str) -> Result<BufferAllocation> {
        self.create_buffer(
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferClass::Generic,
            name,
        )
    }

    /// Free a buffer allocation, resetting the handle.
    ///
    /// # Safety
    /// The buffer must not be referenced by in-flight GPU work.
    pub unsafe fn free_buffer(&mut self, buffer: &mut BufferAllocation) -> Result<()> {
        if !buffer.is_valid() {
            return Ok(());
        }

        let bytes = buffer.allocation_size();
        let kind = buffer.pool;

        let device = self.device.clone();
        unsafe { buffer.destroy(&device, self.inner()?)? };

        self.pool_mut(kind).record_free(bytes);
        Ok(())
    }

    /// Allocate a 2D image from the image pool.
    ///
    /// The image is created in UNDEFINED layout without a view; view
    /// creation is a separate explicit step.
    pub fn create_image(
        &mut self,
        format: vk::Format,
        extent: vk::Extent2D,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> Result<ImageAllocation> {
        let desc = self.image_pool.desc;

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(tiling)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.inner()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: desc.location,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(GpuError::AllocationFailed(e.to_string()));
            }
        };

        unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        self.image_pool.record_alloc(allocation.size());

        Ok(ImageAllocation {
            image,
            allocation: Some(allocation),
            view: vk::ImageView::null(),
            extent,
            format,
        })
    }

    /// Create a view for an allocated image and store it on the handle.
    pub fn create_image_view(
        &self,
        image: &mut ImageAllocation,
        aspect: vk::ImageAspectFlags,
    ) -> Result<()> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        image.view = unsafe { self.device.create_image_view(&view_info, None)? };
        Ok(())
    }

    /// Free an image allocation (view first), resetting the handle.
    ///
    /// # Safety
    /// The image must not be referenced by in-flight GPU work.
    pub unsafe fn free_image(&mut self, image: &mut ImageAllocation) -> Result<()> {
        if !image.is_valid() && image.view == vk::ImageView::null() {
            return Ok(());
        }

        let bytes = image.allocation_size();

        let device = self.device.clone();
        unsafe { image.destroy(&device, self.inner()?)? };

        self.image_pool.record_free(bytes);
        Ok(())
    }

    /// Create a texture sampler using the device's maximum anisotropy.
    pub fn create_sampler(&self, max_anisotropy: f32) -> Result<vk::Sampler> {
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(max_anisotropy)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        let sampler = unsafe { self.device.create_sampler(&sampler_info, None)? };
        Ok(sampler)
    }

    /// Destroy every registered resource, then the pools and the allocator.
    ///
    /// Must only be invoked after the device is idle; earlier invocation
    /// corrupts in-flight frames.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn release_all(
        &mut self,
        buffers: &mut ResourceRegistry<BufferAllocation>,
        images: &mut ResourceRegistry<ImageAllocation>,
    ) -> Result<()> {
        for mut buffer in buffers.drain() {
            unsafe { self.free_buffer(&mut buffer)? };
        }
        for mut image in images.drain() {
            unsafe { self.free_image(&mut image)? };
        }

        self.shutdown();
        Ok(())
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed. Any
    /// remaining allocations are freed and logged as leaks.
    pub fn shutdown(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }

    /// Human-readable allocator state dump for diagnostics.
    pub fn report(&self) -> String {
        let mut out = String::from("memory pools:\n");
        for pool in [
            &self.staging_pool,
            &self.descriptor_pool,
            &self.buffer_pool,
            &self.image_pool,
        ] {
            let _ = writeln!(
                out,
                "  {:?}: {} allocations, {} bytes (memory type {})",
                pool.desc.kind,
                pool.allocation_count,
                pool.allocated_bytes,
                pool.desc.memory_type_index,
            );
        }
        out
    }

    /// Total bytes currently allocated across all pools.
    pub fn allocated_bytes(&self) -> u64 {
        self.staging_pool.allocated_bytes
            + self.descriptor_pool.allocated_bytes
            + self.buffer_pool.allocated_bytes
            + self.image_pool.allocated_bytes
    }
}

impl Drop for MemoryAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
