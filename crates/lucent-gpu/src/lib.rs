//! Vulkan abstraction layer for the Lucent engine.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - GPU capability detection
//! - Pooled memory allocation via gpu-allocator
//! - Reference-counted buffer and image registries
//! - Swapchain handling and loss recovery

pub mod alloc;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pool;
pub mod properties;
pub mod recovery;
pub mod registry;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use alloc::{BufferAllocation, ImageAllocation};
pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::{execute_single_time_commands, CommandPool};
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use memory::MemoryAllocator;
pub use pool::{BufferClass, PoolKind};
pub use properties::SurfaceProperties;
pub use recovery::{RecoveryMachine, RecoveryState, SwapchainDependents};
pub use registry::{ResourceId, ResourceRegistry};
pub use surface::SurfaceContext;
pub use swapchain::Swapchain;
pub use sync::{create_fence, create_semaphore};
