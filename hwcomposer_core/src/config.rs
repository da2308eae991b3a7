// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-display configuration.
//!
//! [`HwcConfig`] replaces process-wide debug/control flags: it is handed to
//! each [`Display`](crate::display::Display) at construction and consulted by
//! the assigner, the static layer cache and the fence ledger. Hardware tuning
//! numbers (Secondary capacity, cache depth, wait budgets) live here rather
//! than in the algorithms.

use core::time::Duration;

/// Tuning for the Secondary (hardware blender) composition path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SecondaryConfig {
    /// Whether the Secondary path may be used at all.
    pub enabled: bool,
    /// Total capacity budget of the Secondary unit, in the same units the
    /// backend reports from [`Capabilities::secondary_cost`].
    ///
    /// [`Capabilities::secondary_cost`]: crate::backend::Capabilities::secondary_cost
    pub capacity: f32,
    /// When set, a Secondary range may never enclose an elevated-priority
    /// layer. Candidates that would do so are sent to Client instead, and a
    /// grouping that still encloses one after merging is abandoned.
    pub restrict_priority_sandwich: bool,
}

impl SecondaryConfig {
    /// Default Secondary tuning: enabled, four unit-cost layers, restricted.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: true,
            capacity: 4.0,
            restrict_priority_sandwich: true,
        }
    }

    /// A configuration with the Secondary path switched off.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds on blocking fence waits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FenceTimeouts {
    /// The first wait lasts this many vsync periods.
    pub nominal_vsync_periods: u32,
    /// Length of the escalated wait after the nominal one times out.
    pub escalation: Duration,
}

impl FenceTimeouts {
    /// Five vsync periods, then twenty seconds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nominal_vsync_periods: 5,
            escalation: Duration::from_secs(20),
        }
    }

    /// Returns the nominal timeout for the given vsync period.
    #[must_use]
    pub fn nominal(&self, vsync_period: Duration) -> Duration {
        vsync_period.saturating_mul(self.nominal_vsync_periods)
    }
}

impl Default for FenceTimeouts {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for one display's frame pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HwcConfig {
    /// Allow `validate`/`present` to reuse the previous assignment when the
    /// skip-validate guard holds.
    pub skip_validate: bool,
    /// Enable the static layer cache on the Client target.
    pub skip_static_layers: bool,
    /// Maximum number of Client members the static layer cache tracks.
    pub static_layer_capacity: usize,
    /// Give YUV layers elevated overlay priority.
    pub elevate_yuv_layers: bool,
    /// Secondary path tuning.
    pub secondary: SecondaryConfig,
    /// Fence wait budgets.
    pub fence_timeouts: FenceTimeouts,
    /// Vsync period used until the first vsync is observed.
    pub default_vsync_period: Duration,
    /// Depth of the buffer cleanup queue.
    pub cleanup_queue_capacity: usize,
}

impl HwcConfig {
    /// Default configuration for a display.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            skip_validate: true,
            skip_static_layers: true,
            static_layer_capacity: 5,
            elevate_yuv_layers: true,
            secondary: SecondaryConfig::new(),
            fence_timeouts: FenceTimeouts::new(),
            // ~60 Hz.
            default_vsync_period: Duration::from_nanos(16_666_667),
            cleanup_queue_capacity: 32,
        }
    }

    /// Configuration for a virtual display: no Secondary path and no
    /// assignment caching.
    #[must_use]
    pub const fn virtual_display() -> Self {
        Self {
            skip_validate: false,
            skip_static_layers: false,
            secondary: SecondaryConfig::disabled(),
            ..Self::new()
        }
    }
}

impl Default for HwcConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_timeout_is_five_vsyncs() {
        let timeouts = FenceTimeouts::new();
        assert_eq!(
            timeouts.nominal(Duration::from_millis(16)),
            Duration::from_millis(80)
        );
    }

    #[test]
    fn virtual_display_disables_caching() {
        let config = HwcConfig::virtual_display();
        assert!(!config.skip_validate);
        assert!(!config.skip_static_layers);
        assert!(!config.secondary.enabled);
        assert_eq!(config.static_layer_capacity, 5);
    }
}
