//! Buffer and image allocation handles.
//!
//! These are value types pairing a native handle with its allocation token.
//! Both fields are set together at creation and cleared together by
//! `destroy`; a handle is never left half-valid. Destroy is idempotent:
//! calling it on an already-destroyed handle is a no-op.

use crate::error::{GpuError, Result};
use crate::pool::PoolKind;
use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};
use lucent_core::math::{align_down, align_up};

/// Align a mapped-memory range to the device's non-coherent atom size.
///
/// `vkFlushMappedMemoryRanges` and `vkInvalidateMappedMemoryRanges` require
/// the offset to be an atom multiple and the size an atom multiple (or to
/// reach the end of the memory object). The offset rounds down, the end of
/// the range rounds up; the returned range covers the requested one.
pub fn atom_aligned_range(offset: u64, size: u64, atom_size: u64) -> (u64, u64) {
    let start = align_down(offset, atom_size);
    let end = align_up(offset + size, atom_size);
    (start, end - start)
}

/// A GPU buffer with its allocation.
///
/// Host-visible buffers stay persistently mapped for their whole lifetime;
/// `mapped_ptr` returns `None` for device-local buffers and for destroyed
/// handles.
pub struct BufferAllocation {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
    /// Pool this buffer was drawn from, used for free-side accounting.
    pub pool: PoolKind,
}

impl Default for BufferAllocation {
    fn default() -> Self {
        Self {
            buffer: vk::Buffer::null(),
            allocation: None,
            size: 0,
            pool: PoolKind::Buffer,
        }
    }
}

impl BufferAllocation {
    /// Whether the handle still owns a live buffer/allocation pair.
    pub fn is_valid(&self) -> bool {
        self.buffer != vk::Buffer::null() && self.allocation.is_some()
    }

    /// Size of the backing allocation in bytes, zero once destroyed.
    pub fn allocation_size(&self) -> u64 {
        self.allocation.as_ref().map_or(0, Allocation::size)
    }

    /// Host pointer into the mapped allocation, if host-visible.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
    }

    /// Write typed data at the start of the buffer (must be host-visible).
    pub fn write<T: Copy>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, unsafe {
            std::slice::from_raw_parts(data.as_ptr().cast::<u8>(), std::mem::size_of_val(data))
        })
    }

    /// Write raw bytes at the given offset (must be host-visible).
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("buffer not mapped".to_string()))?;

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| GpuError::InvalidState("offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(
                "data range too large for buffer".to_string(),
            ));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }

        Ok(())
    }

    /// Write typed data at the given byte offset (must be host-visible).
    pub fn write_range<T: Copy>(&self, offset: u64, data: &[T]) -> Result<()> {
        self.write_bytes(offset, unsafe {
            std::slice::from_raw_parts(data.as_ptr().cast::<u8>(), std::mem::size_of_val(data))
        })
    }

    /// Flush a byte range of the mapped allocation to the device.
    ///
    /// The range is widened to the non-coherent atom size before it is
    /// handed to the driver.
    ///
    /// # Safety
    /// The device must be valid and the handle alive.
    pub unsafe fn flush(
        &self,
        device: &ash::Device,
        offset: u64,
        size: u64,
        atom_size: u64,
    ) -> Result<()> {
        let Some(allocation) = &self.allocation else {
            return Ok(());
        };

        let (start, size) = atom_aligned_range(allocation.offset() + offset, size, atom_size);
        let range = vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(start)
            .size(size);
        unsafe { device.flush_mapped_memory_ranges(&[range])? };

        Ok(())
    }

    /// Make device writes to a byte range visible to the host.
    ///
    /// Counterpart of [`flush`](Self::flush) for readback buffers; the range
    /// is widened the same way.
    ///
    /// # Safety
    /// The device must be valid and the handle alive.
    pub unsafe fn invalidate(
        &self,
        device: &ash::Device,
        offset: u64,
        size: u64,
        atom_size: u64,
    ) -> Result<()> {
        let Some(allocation) = &self.allocation else {
            return Ok(());
        };

        let (start, size) = atom_aligned_range(allocation.offset() + offset, size, atom_size);
        let range = vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(start)
            .size(size);
        unsafe { device.invalidate_mapped_memory_ranges(&[range])? };

        Ok(())
    }

    /// Destroy the buffer and free its allocation, resetting every field.
    ///
    /// Idempotent: a second call finds nothing to release and returns Ok.
    ///
    /// # Safety
    /// The buffer must not be referenced by in-flight GPU work.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut Allocator) -> Result<()> {
        // Dropping the allocation unmaps it; free returns it to the pool.
        if let Some(allocation) = self.allocation.take() {
            allocator
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
        }

        if self.buffer != vk::Buffer::null() {
            unsafe { device.destroy_buffer(self.buffer, None) };
            self.buffer = vk::Buffer::null();
        }
        self.size = 0;

        Ok(())
    }
}

/// A GPU image with its allocation and optional view.
///
/// The view is destroyed strictly before the image: a view referencing a
/// destroyed image is never retained.
pub struct ImageAllocation {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

impl Default for ImageAllocation {
    fn default() -> Self {
        Self {
            image: vk::Image::null(),
            allocation: None,
            view: vk::ImageView::null(),
            extent: vk::Extent2D::default(),
            format: vk::Format::UNDEFINED,
        }
    }
}

impl ImageAllocation {
    /// Whether the handle still owns a live image/allocation pair.
    pub fn is_valid(&self) -> bool {
        self.image != vk::Image::null() && self.allocation.is_some()
    }

    /// Size of the backing allocation in bytes, zero once destroyed.
    pub fn allocation_size(&self) -> u64 {
        self.allocation.as_ref().map_or(0, Allocation::size)
    }

    /// Destroy the view, then the image and its allocation.
    ///
    /// Idempotent: a second call finds nothing to release and returns Ok.
    ///
    /// # Safety
    /// The image must not be referenced by in-flight GPU work.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut Allocator) -> Result<()> {
        if self.view != vk::ImageView::null() {
            unsafe { device.destroy_image_view(self.view, None) };
            self.view = vk::ImageView::null();
        }

        if let Some(allocation) = self.allocation.take() {
            allocator
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
        }

        if self.image != vk::Image::null() {
            unsafe { device.destroy_image(self.image, None) };
            self.image = vk::Image::null();
        }
        self.extent = vk::Extent2D::default();
        self.format = vk::Format::UNDEFINED;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffer_is_invalid() {
        let buffer = BufferAllocation::default();
        assert!(!buffer.is_valid());
        assert_eq!(buffer.allocation_size(), 0);
        assert!(buffer.mapped_ptr().is_none());
        assert_eq!(buffer.size, 0);
    }

    #[test]
    fn default_image_is_invalid() {
        let image = ImageAllocation::default();
        assert!(!image.is_valid());
        assert_eq!(image.allocation_size(), 0);
        assert_eq!(image.view, vk::ImageView::null());
        assert_eq!(image.format, vk::Format::UNDEFINED);
    }

    #[test]
    fn unmapped_buffer_rejects_writes() {
        let buffer = BufferAllocation::default();
        assert!(buffer.write(&[0u8; 4]).is_err());
        assert!(buffer.write_bytes(16, &[1, 2, 3]).is_err());
    }

    #[test]
    fn mapped_range_widens_to_atom_boundaries() {
        // Offset rounds down, end rounds up; a 64-byte atom is typical.
        assert_eq!(atom_aligned_range(100, 20, 64), (64, 64));
        assert_eq!(atom_aligned_range(100, 30, 64), (64, 128));
        assert_eq!(atom_aligned_range(3392, 64, 64), (3392, 64));
        assert_eq!(atom_aligned_range(0, 1, 256), (0, 256));
    }

    #[test]
    fn atom_aligned_range_covers_the_request() {
        for &(offset, size, atom) in &[(7u64, 3u64, 64u64), (255, 2, 256), (4096, 4096, 128)] {
            let (start, widened) = atom_aligned_range(offset, size, atom);
            assert!(start <= offset);
            assert!(start + widened >= offset + size);
            assert_eq!(start % atom, 0);
            assert_eq!(widened % atom, 0);
        }
    }
}
