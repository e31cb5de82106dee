//! Core types, math, and constants for the Lucent engine.
//!
//! This crate provides the foundational pieces shared by every other crate:
//! - Engine-wide error type
//! - Alignment math used by the memory pools and packed buffer layouts
//! - Timing and synchronization constants

pub mod error;
pub mod math;

pub use error::{Error, Result};

/// Engine-wide constants
pub mod constants {
    use std::time::Duration;

    /// Number of frames the CPU may record ahead of the GPU
    pub const FRAMES_IN_FLIGHT: usize = 2;

    /// Bounded timeout for every fence wait outside full teardown
    pub const FENCE_TIMEOUT_NS: u64 = 5_000_000_000;

    /// Back-off between recovery polls while the surface is unusable
    /// (minimized or zero-area window)
    pub const RECOVERY_BACKOFF: Duration = Duration::from_millis(100);
}
