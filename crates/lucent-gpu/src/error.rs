//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
///
/// Native API failures during allocator, pool, buffer, or image creation are
/// unrecoverable: they propagate out of initialization and abort it. Stale
/// surface state is never reported through this type; the recovery machine
/// absorbs it.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// No depth format with depth-stencil attachment support.
    #[error("No supported depth format found")]
    NoDepthFormat,

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Registry lookup for an id that was never registered or already
    /// released. This is a caller contract violation, not a runtime
    /// condition to recover from.
    #[error("Resource not found: id {0}")]
    ResourceNotFound(u32),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
