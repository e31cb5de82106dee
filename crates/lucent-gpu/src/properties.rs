//! Surface/device properties snapshot.
//!
//! A snapshot captures every surface-derived parameter the swapchain and
//! its dependent resources are built from. It is recomputed whenever the
//! platform reports a resize or a present call signals staleness, and it
//! is valid as a whole or not at all: partial validity is not a state the
//! recovery machine ever observes.

use crate::error::{GpuError, Result};
use ash::vk;

/// Depth formats tried in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Capability snapshot describing the current surface.
///
/// The default snapshot is invalid; it only stands in before the first
/// query.
#[derive(Clone, Copy, Default)]
pub struct SurfaceProperties {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub depth_format: vk::Format,
    pub extent: vk::Extent2D,
}

impl SurfaceProperties {
    /// Whether the snapshot can back a swapchain. A zero-area extent
    /// (minimized window) invalidates the whole snapshot.
    pub fn is_valid(&self) -> bool {
        self.extent.width > 0
            && self.extent.height > 0
            && self.format.format != vk::Format::UNDEFINED
            && self.depth_format != vk::Format::UNDEFINED
    }

    /// Assemble a snapshot from queried surface data.
    ///
    /// An empty format list and a missing depth format are unrecoverable
    /// device-configuration errors. A zero-area extent is not: the
    /// snapshot is returned and reports itself invalid so the recovery
    /// machine can back off and re-poll.
    pub fn build(
        capabilities: vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
        depth_features: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
        desired_extent: (u32, u32),
    ) -> Result<Self> {
        let format = select_surface_format(formats)?;
        let present_mode = select_present_mode(present_modes);
        let depth_format = select_depth_format(depth_features)?;
        let extent = compute_extent(&capabilities, desired_extent.0, desired_extent.1);

        Ok(Self {
            capabilities,
            format,
            present_mode,
            depth_format,
            extent,
        })
    }
}

/// Select the surface format: BGRA8 sRGB when available, else the first
/// format the device reports.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    let first = available
        .first()
        .copied()
        .ok_or_else(|| GpuError::SurfaceCreation("no supported surface formats".to_string()))?;

    Ok(available
        .iter()
        .copied()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or(first))
}

/// Select the present mode: MAILBOX when available, else FIFO.
///
/// FIFO is the only mode with a guaranteed hardware fallback, so this
/// never fails.
pub fn select_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Select the first preferred depth format whose optimal tiling supports
/// depth-stencil attachment usage.
///
/// `features` queries the optimal-tiling feature flags for a format. When
/// no candidate qualifies the device cannot host a depth buffer at all,
/// which is fatal.
pub fn select_depth_format(
    features: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
) -> Result<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .into_iter()
        .find(|&format| {
            features(format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(GpuError::NoDepthFormat)
}

/// Resolve the swapchain extent from the capabilities and window size.
pub fn compute_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn surface_format_prefers_bgra8_srgb() {
        let formats = [
            srgb(vk::Format::R8G8B8A8_UNORM),
            srgb(vk::Format::B8G8R8A8_SRGB),
        ];
        let selected = select_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn surface_format_falls_back_to_first() {
        let formats = [
            srgb(vk::Format::R8G8B8A8_UNORM),
            srgb(vk::Format::R8G8B8A8_SRGB),
        ];
        let selected = select_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn empty_format_list_is_an_error() {
        assert!(select_surface_format(&[]).is_err());
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(select_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&modes), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn depth_format_takes_first_supported_candidate() {
        let selected = select_depth_format(|format| {
            if format == vk::Format::D32_SFLOAT_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            }
        })
        .unwrap();
        assert_eq!(selected, vk::Format::D32_SFLOAT_S8_UINT);
    }

    #[test]
    fn depth_format_queries_candidates_in_preference_order() {
        let queried = RefCell::new(Vec::new());
        let selected = select_depth_format(|format| {
            queried.borrow_mut().push(format);
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        })
        .unwrap();

        assert_eq!(selected, vk::Format::D32_SFLOAT);
        assert_eq!(queried.into_inner(), vec![vk::Format::D32_SFLOAT]);
    }

    #[test]
    fn no_depth_format_is_fatal() {
        let result = select_depth_format(|_| vk::FormatFeatureFlags::empty());
        assert!(matches!(result, Err(GpuError::NoDepthFormat)));
    }

    #[test]
    fn extent_uses_current_when_fixed_by_driver() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let extent = compute_extent(&capabilities, 1280, 720);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_clamps_window_size_when_flexible() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = compute_extent(&capabilities, 4000, 50);
        assert_eq!((extent.width, extent.height), (1920, 100));
    }

    #[test]
    fn zero_area_snapshot_is_invalid_as_a_whole() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            ..Default::default()
        };
        let snapshot = SurfaceProperties::build(
            capabilities,
            &[srgb(vk::Format::B8G8R8A8_SRGB)],
            &[vk::PresentModeKHR::FIFO],
            |_| vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            (0, 0),
        )
        .unwrap();

        assert!(!snapshot.is_valid());
    }

    #[test]
    fn populated_snapshot_is_valid() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };
        let snapshot = SurfaceProperties::build(
            capabilities,
            &[srgb(vk::Format::B8G8R8A8_SRGB)],
            &[vk::PresentModeKHR::MAILBOX],
            |_| vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            (1280, 720),
        )
        .unwrap();

        assert!(snapshot.is_valid());
        assert_eq!(snapshot.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(snapshot.depth_format, vk::Format::D32_SFLOAT);
    }
}
