//! GPU context management.

use crate::alloc::{BufferAllocation, ImageAllocation};
use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::MemoryAllocator;
use crate::registry::ResourceRegistry;
use ash::vk;
use parking_lot::Mutex;
use std::ffi::CStr;
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
///
/// Owns the allocator and the shared-resource registries. The allocator is
/// externally synchronized; the mutex here is the single funnel every
/// allocation call goes through.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<MemoryAllocator>,
    pub(crate) buffers: Mutex<ResourceRegistry<BufferAllocation>>,
    pub(crate) images: Mutex<ResourceRegistry<ImageAllocation>>,

    pub(crate) graphics_queue_family: u32,
    pub(crate) transfer_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) transfer_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    pub fn transfer_queue_family(&self) -> u32 {
        self.transfer_queue_family
    }

    /// Direct access to the memory allocator, for callers that need
    /// fine-grained control over allocation and mapping.
    pub fn allocator(&self) -> &Mutex<MemoryAllocator> {
        &self.allocator
    }

    /// Registry of shared packed buffers, keyed by opaque id.
    pub fn buffer_registry(&self) -> &Mutex<ResourceRegistry<BufferAllocation>> {
        &self.buffers
    }

    /// Registry of shared images, keyed by opaque id.
    pub fn image_registry(&self) -> &Mutex<ResourceRegistry<ImageAllocation>> {
        &self.images
    }

    /// Drop one owner of a registered buffer, destroying it when the
    /// count reaches zero.
    ///
    /// Lock order is allocator, then registry, everywhere both are held.
    pub fn release_buffer(&self, id: crate::registry::ResourceId) -> Result<()> {
        let mut allocator = self.allocator.lock();
        if let Some(mut buffer) = self.buffers.lock().release(id)? {
            unsafe { allocator.free_buffer(&mut buffer)? };
        }
        Ok(())
    }

    /// Drop one owner of a registered image, destroying it when the
    /// count reaches zero.
    ///
    /// Same lock order as [`release_buffer`](Self::release_buffer).
    pub fn release_image(&self, id: crate::registry::ResourceId) -> Result<()> {
        let mut allocator = self.allocator.lock();
        if let Some(mut image) = self.images.lock().release(id)? {
            unsafe { allocator.free_image(&mut image)? };
        }
        Ok(())
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }

    /// Destroy every registered resource, the pools, and the allocator.
    ///
    /// Waits for the device to go idle first; no in-flight GPU work may
    /// reference these resources afterwards.
    pub fn release_memory_resources(&self) -> Result<()> {
        self.wait_idle()?;
        unsafe {
            self.allocator
                .lock()
                .release_all(&mut self.buffers.lock(), &mut self.images.lock())?;
        }
        Ok(())
    }

    /// Human-readable allocator state dump for logging.
    pub fn memory_report(&self) -> String {
        self.allocator.lock().report()
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Registered resources and the allocator must go before the
            // device; remaining allocations are logged as leaks.
            {
                let mut allocator = self.allocator.lock();
                let _ = allocator.release_all(&mut self.buffers.lock(), &mut self.images.lock());
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Lucent".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation) }?;

        let physical_device = unsafe { select_physical_device(&instance) }?;

        let capabilities = unsafe { GpuCapabilities::query(&instance, physical_device) };

        if !capabilities.meets_requirements() {
            return Err(GpuError::NoSuitableDevice);
        }

        tracing::info!("Selected GPU: {}", capabilities.summary());

        let queue_families = unsafe { find_queue_families(&instance, physical_device) }?;

        let (device, graphics_queue, transfer_queue) =
            unsafe { create_device(&instance, physical_device, &queue_families)? };

        let device = Arc::new(device);

        let allocator = unsafe {
            MemoryAllocator::new(
                &instance,
                device.clone(),
                physical_device,
                capabilities.min_uniform_buffer_offset_alignment,
            )
        }?;

        Ok(GpuContext {
            entry,
            instance,
            physical_device,
            device,
            capabilities,
            allocator: Mutex::new(allocator),
            buffers: Mutex::new(ResourceRegistry::new()),
            images: Mutex::new(ResourceRegistry::new()),
            graphics_queue_family: queue_families.graphics,
            transfer_queue_family: queue_families.transfer,
            graphics_queue,
            transfer_queue,
        })
    }
}

/// Queue family indices.
struct QueueFamilyIndices {
    graphics: u32,
    transfer: u32,
}

/// Find queue families for graphics and transfer.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<QueueFamilyIndices> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut graphics_family = None;
    let mut transfer_family = None;

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;

        // Look for a dedicated transfer queue (no graphics)
        if family.queue_flags.contains(vk::QueueFlags::TRANSFER)
            && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && transfer_family.is_none()
        {
            transfer_family = Some(i);
        }

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
            graphics_family = Some(i);
        }
    }

    let graphics = graphics_family.ok_or(GpuError::NoSuitableDevice)?;
    let transfer = transfer_family.unwrap_or(graphics);

    Ok(QueueFamilyIndices { graphics, transfer })
}

/// Required device extensions.
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Create the logical device and retrieve queues.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: &QueueFamilyIndices,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    let mut unique_families = std::collections::HashSet::new();
    unique_families.insert(queue_families.graphics);
    unique_families.insert(queue_families.transfer);

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extensions = required_device_extensions();
    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(features)
        .push_next(&mut vulkan_1_3_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = unsafe {
        instance
            .create_device(physical_device, &device_create_info, None)
            .map_err(GpuError::from)?
    };

    let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
    let transfer_queue = unsafe { device.get_device_queue(queue_families.transfer, 0) };

    Ok((device, graphics_queue, transfer_queue))
}
