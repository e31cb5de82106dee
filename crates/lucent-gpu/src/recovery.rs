//! Swapchain/surface recovery state machine.
//!
//! Presentation surfaces go transiently invalid independent of explicit
//! resize events (minimization, display reconfiguration, out-of-date
//! signals from acquire/present). The machine decides once per frame
//! whether the swapchain still matches the surface and, when it does not,
//! drives a synchronized teardown and rebuild of every swapchain-derived
//! resource before steady-state rendering resumes. Draw/present calls are
//! never submitted against a torn-down or mismatched swapchain.

use crate::error::Result;
use crate::properties::SurfaceProperties;
use lucent_core::constants::RECOVERY_BACKOFF;
use std::time::Duration;

/// Recovery machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// Normal per-frame rendering.
    Steady,
    /// The swapchain no longer matches the window; teardown pending.
    Stale,
    /// Teardown done, waiting for a valid surface to rebuild against.
    Recovering,
}

/// Swapchain-dependent resources the machine tears down and rebuilds.
///
/// The frame driver implements this over its real resources; tests drive
/// it with a recording mock to pin the call ordering.
pub trait SwapchainDependents {
    /// Full device-idle wait. The only unbounded wait in the engine;
    /// nothing may be destroyed before it returns.
    fn wait_device_idle(&mut self) -> Result<()>;

    /// Destroy per-frame synchronization primitives.
    fn destroy_sync_objects(&mut self) -> Result<()>;

    /// Destroy swapchain images/views, the depth buffer, and the
    /// swapchain itself. Runs strictly after the sync objects are gone
    /// and strictly before any new surface query.
    fn destroy_swapchain_resources(&mut self) -> Result<()>;

    /// Recompute the surface-properties snapshot.
    fn query_surface_properties(&mut self) -> Result<SurfaceProperties>;

    /// Recreate per-frame synchronization primitives.
    fn create_sync_objects(&mut self) -> Result<()>;

    /// Recreate the swapchain from a valid snapshot.
    fn create_swapchain(&mut self, properties: &SurfaceProperties) -> Result<()>;

    /// Recreate the depth buffer.
    fn create_depth_resources(&mut self, properties: &SurfaceProperties) -> Result<()>;

    /// Recreate remaining per-swapchain-image resources (attachment
    /// state, present semaphores, command buffers).
    fn create_framebuffers(&mut self, properties: &SurfaceProperties) -> Result<()>;
}

/// Per-frame recovery driver.
pub struct RecoveryMachine {
    state: RecoveryState,
    backoff: Duration,
}

impl Default for RecoveryMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryMachine {
    pub fn new() -> Self {
        Self {
            state: RecoveryState::Steady,
            backoff: RECOVERY_BACKOFF,
        }
    }

    /// Override the back-off used while the surface stays unusable.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Signal staleness: an invalid acquired-image index, an out-of-date
    /// present result, or a platform resize invalidating the snapshot.
    /// A recovery already in progress is unaffected.
    pub fn notify_stale(&mut self) {
        if self.state == RecoveryState::Steady {
            tracing::debug!("surface went stale, scheduling swapchain recovery");
            self.state = RecoveryState::Stale;
        }
    }

    /// Per-frame poll. Returns whether the driver may record and present
    /// this frame. Staleness is absorbed here and never surfaces as an
    /// error; only fatal hook failures propagate.
    pub fn poll<D: SwapchainDependents>(&mut self, dependents: &mut D) -> Result<bool> {
        match self.state {
            RecoveryState::Steady => Ok(true),
            RecoveryState::Stale => {
                // Teardown before the new query: sync objects first, then
                // the resources that still reference the old swapchain.
                dependents.wait_device_idle()?;
                dependents.destroy_sync_objects()?;
                dependents.destroy_swapchain_resources()?;
                self.state = RecoveryState::Recovering;
                self.try_rebuild(dependents)?;
                Ok(false)
            }
            RecoveryState::Recovering => {
                self.try_rebuild(dependents)?;
                Ok(false)
            }
        }
    }

    fn try_rebuild<D: SwapchainDependents>(&mut self, dependents: &mut D) -> Result<()> {
        let properties = dependents.query_surface_properties()?;

        if !properties.is_valid() {
            // Zero-area window: wait out the condition instead of
            // busy-spinning, remain in Recovering for the next poll.
            std::thread::sleep(self.backoff);
            return Ok(());
        }

        dependents.create_sync_objects()?;
        dependents.create_swapchain(&properties)?;
        dependents.create_depth_resources(&properties)?;
        dependents.create_framebuffers(&properties)?;

        tracing::debug!(
            width = properties.extent.width,
            height = properties.extent.height,
            "swapchain rebuilt, resuming steady-state rendering"
        );
        self.state = RecoveryState::Steady;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        WaitIdle,
        DestroySync,
        DestroyResources,
        Query,
        CreateSync,
        CreateSwapchain,
        CreateDepth,
        CreateFramebuffers,
    }

    struct MockDependents {
        calls: Vec<Call>,
        valid_extent: vk::Extent2D,
    }

    impl MockDependents {
        fn new(width: u32, height: u32) -> Self {
            Self {
                calls: Vec::new(),
                valid_extent: vk::Extent2D { width, height },
            }
        }

        fn snapshot(&self) -> SurfaceProperties {
            SurfaceProperties {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                format: vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                present_mode: vk::PresentModeKHR::FIFO,
                depth_format: vk::Format::D32_SFLOAT,
                extent: self.valid_extent,
            }
        }
    }

    impl SwapchainDependents for MockDependents {
        fn wait_device_idle(&mut self) -> Result<()> {
            self.calls.push(Call::WaitIdle);
            Ok(())
        }

        fn destroy_sync_objects(&mut self) -> Result<()> {
            self.calls.push(Call::DestroySync);
            Ok(())
        }

        fn destroy_swapchain_resources(&mut self) -> Result<()> {
            self.calls.push(Call::DestroyResources);
            Ok(())
        }

        fn query_surface_properties(&mut self) -> Result<SurfaceProperties> {
            self.calls.push(Call::Query);
            Ok(self.snapshot())
        }

        fn create_sync_objects(&mut self) -> Result<()> {
            self.calls.push(Call::CreateSync);
            Ok(())
        }

        fn create_swapchain(&mut self, _: &SurfaceProperties) -> Result<()> {
            self.calls.push(Call::CreateSwapchain);
            Ok(())
        }

        fn create_depth_resources(&mut self, _: &SurfaceProperties) -> Result<()> {
            self.calls.push(Call::CreateDepth);
            Ok(())
        }

        fn create_framebuffers(&mut self, _: &SurfaceProperties) -> Result<()> {
            self.calls.push(Call::CreateFramebuffers);
            Ok(())
        }
    }

    fn machine() -> RecoveryMachine {
        RecoveryMachine::new().with_backoff(Duration::from_millis(0))
    }

    #[test]
    fn steady_poll_touches_nothing() {
        let mut machine = machine();
        let mut dependents = MockDependents::new(800, 600);

        assert!(machine.poll(&mut dependents).unwrap());
        assert!(dependents.calls.is_empty());
        assert_eq!(machine.state(), RecoveryState::Steady);
    }

    #[test]
    fn stale_signal_triggers_ordered_teardown_and_rebuild() {
        let mut machine = machine();
        let mut dependents = MockDependents::new(800, 600);

        machine.notify_stale();
        assert_eq!(machine.state(), RecoveryState::Stale);

        // The recovery frame does not render.
        assert!(!machine.poll(&mut dependents).unwrap());
        assert_eq!(machine.state(), RecoveryState::Steady);

        // Destruction strictly precedes the new property query, and the
        // rebuild follows the fixed order.
        assert_eq!(
            dependents.calls,
            vec![
                Call::WaitIdle,
                Call::DestroySync,
                Call::DestroyResources,
                Call::Query,
                Call::CreateSync,
                Call::CreateSwapchain,
                Call::CreateDepth,
                Call::CreateFramebuffers,
            ]
        );

        // Next frame renders again.
        assert!(machine.poll(&mut dependents).unwrap());
    }

    #[test]
    fn invalid_surface_backs_off_without_rebuilding() {
        let mut machine = machine();
        let mut dependents = MockDependents::new(0, 0);

        machine.notify_stale();
        assert!(!machine.poll(&mut dependents).unwrap());

        // Torn down, queried, but nothing was created.
        assert_eq!(
            dependents.calls,
            vec![
                Call::WaitIdle,
                Call::DestroySync,
                Call::DestroyResources,
                Call::Query,
            ]
        );
        assert_eq!(machine.state(), RecoveryState::Recovering);

        // Re-polls query again without re-destroying.
        assert!(!machine.poll(&mut dependents).unwrap());
        assert_eq!(dependents.calls.last(), Some(&Call::Query));
        assert_eq!(
            dependents
                .calls
                .iter()
                .filter(|&&c| c == Call::DestroySync)
                .count(),
            1
        );

        // Window restored: rebuild completes on the following poll.
        dependents.valid_extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        assert!(!machine.poll(&mut dependents).unwrap());
        assert_eq!(machine.state(), RecoveryState::Steady);
        assert_eq!(dependents.calls.last(), Some(&Call::CreateFramebuffers));
    }

    #[test]
    fn stale_signal_is_ignored_mid_recovery() {
        let mut machine = machine();
        let mut dependents = MockDependents::new(0, 0);

        machine.notify_stale();
        machine.poll(&mut dependents).unwrap();
        assert_eq!(machine.state(), RecoveryState::Recovering);

        machine.notify_stale();
        assert_eq!(machine.state(), RecoveryState::Recovering);
    }
}
