// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contract with the hardware backend.
//!
//! The core decides *what* each hardware window shows; a backend turns that
//! decision into device programming. Backends provide two pieces:
//!
//! - **Capabilities**: the [`Capabilities`] queries the assigner consults
//!   while classifying layers (overlay and secondary support, secondary cost,
//!   window count, colour-transform support). Restriction tables and their
//!   parsing live behind this trait.
//!
//! - **Commit**: [`HardwareBackend::commit`] receives the finished
//!   [`FrameConfig`] and returns a present fence plus one release fence per
//!   window.
//!
//! # Fence ownership
//!
//! Every descriptor inside a [`FrameConfig`] belongs to the backend once
//! `commit` is called, whether the commit succeeds or fails. Every
//! descriptor inside a [`CommitOutcome`] belongs to the display once
//! `commit` returns.

use kurbo::Rect;
use thiserror::Error;

use crate::composition::{LayerRange, TargetKind};
use crate::display::{ColorTransform, DisplayId};
use crate::fence::{NO_FENCE, RawFence, SyncProvider};
use crate::layer::{
    BlendMode, BufferHandle, Dataspace, Layer, LayerId, LayerTransform, PixelFormat,
};

/// Hardware capability queries used during assignment.
pub trait Capabilities {
    /// Number of hardware overlay windows.
    fn max_windows(&self) -> usize;

    /// Bounds of the active display mode.
    fn display_bounds(&self) -> Rect;

    /// Whether `layer` can be scanned out directly on a window.
    fn supports_overlay(&self, layer: &Layer) -> bool;

    /// Whether the secondary blender can take `layer`.
    fn supports_secondary(&self, layer: &Layer) -> bool {
        _ = layer;
        false
    }

    /// Whether the secondary blender is present and usable this frame.
    fn secondary_available(&self) -> bool {
        true
    }

    /// Capacity `layer` consumes on the secondary blender.
    fn secondary_cost(&self, layer: &Layer) -> f32 {
        _ = layer;
        1.0
    }

    /// Whether the display pipeline can apply `transform` itself.
    fn supports_color_transform(&self, transform: &ColorTransform) -> bool {
        _ = transform;
        false
    }
}

/// Commits frames to the display hardware.
pub trait HardwareBackend: Capabilities + Send {
    /// Programs the hardware with `frame`.
    ///
    /// Takes ownership of every descriptor in `frame` regardless of the
    /// outcome.
    fn commit(&mut self, frame: FrameConfig) -> Result<CommitOutcome, CommitError>;

    /// Asks the backend to capture forensic state after a fatal commit error.
    fn force_panic(&mut self, reason: &str) {
        _ = reason;
    }
}

/// What a window scans out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowContent {
    /// A Device layer's buffer.
    Layer {
        /// The layer.
        layer: LayerId,
        /// Its buffer, `None` for solid color layers.
        buffer: Option<BufferHandle>,
    },
    /// The client target buffer.
    ClientTarget {
        /// The buffer rendered by the host.
        buffer: Option<BufferHandle>,
    },
    /// The secondary blender's output.
    SecondaryTarget,
}

/// One hardware window's configuration.
#[derive(Clone, Debug)]
pub struct WindowConfig {
    /// Window slot.
    pub slot: u32,
    /// What the window scans out.
    pub content: WindowContent,
    /// Source rectangle in buffer coordinates.
    pub source_crop: Rect,
    /// Destination rectangle in display coordinates.
    pub display_frame: Rect,
    /// Blend mode.
    pub blend: BlendMode,
    /// Plane alpha.
    pub plane_alpha: f32,
    /// Source transform.
    pub transform: LayerTransform,
    /// Dataspace tag.
    pub dataspace: Dataspace,
    /// Pixel format.
    pub format: PixelFormat,
    /// Acquire fence the hardware must wait on, owned by the backend.
    pub acquire_fence: RawFence,
    /// The window is byte-identical to the previous frame's and need not be
    /// re-described.
    pub reuse_previous: bool,
}

/// A layer blended by the secondary unit.
#[derive(Clone, Debug)]
pub struct SecondaryMember {
    /// The layer.
    pub layer: LayerId,
    /// Its buffer.
    pub buffer: Option<BufferHandle>,
    /// Source rectangle.
    pub source_crop: Rect,
    /// Destination rectangle.
    pub display_frame: Rect,
    /// Blend mode.
    pub blend: BlendMode,
    /// Plane alpha.
    pub plane_alpha: f32,
    /// Source transform.
    pub transform: LayerTransform,
    /// Acquire fence moved in from the layer, owned by the backend.
    pub acquire_fence: RawFence,
}

/// Description of a composition target for one frame.
#[derive(Clone, Debug)]
pub struct TargetDescriptor {
    /// Which target.
    pub kind: TargetKind,
    /// Its layer range, `None` when empty.
    pub range: Option<LayerRange>,
    /// The overlay window that shows it.
    pub window: Option<u32>,
    /// The previous configuration is reused.
    pub skip: bool,
    /// Member layers the hardware must blend (Secondary only).
    pub members: Vec<SecondaryMember>,
}

impl TargetDescriptor {
    /// An empty descriptor.
    #[must_use]
    pub fn empty(kind: TargetKind) -> Self {
        Self {
            kind,
            range: None,
            window: None,
            skip: false,
            members: Vec::new(),
        }
    }
}

/// Everything the backend needs to program one frame.
#[derive(Clone, Debug)]
pub struct FrameConfig {
    /// Target display.
    pub display: DisplayId,
    /// Frame counter.
    pub frame_index: u64,
    /// One entry per occupied overlay window, in z-order.
    pub windows: Vec<WindowConfig>,
    /// The client composition target.
    pub client_target: TargetDescriptor,
    /// The secondary composition target.
    pub secondary_target: TargetDescriptor,
}

impl FrameConfig {
    /// Iterates every descriptor carried by the frame.
    pub fn fences(&self) -> impl Iterator<Item = RawFence> + '_ {
        self.windows
            .iter()
            .map(|w| w.acquire_fence)
            .chain(
                self.secondary_target
                    .members
                    .iter()
                    .map(|m| m.acquire_fence),
            )
            .filter(|&fd| fd != NO_FENCE)
    }

    /// Closes every descriptor carried by the frame.
    ///
    /// For a frame that is dropped without being committed.
    pub fn close_fences(&self, sync: &dyn SyncProvider) {
        for fd in self.fences() {
            sync.close(fd);
        }
    }
}

/// Result of a successful commit.
#[derive(Clone, Debug)]
pub struct CommitOutcome {
    /// Signals when the frame is on screen.
    pub present_fence: RawFence,
    /// Release fence per window slot.
    pub window_release_fences: Vec<(u32, RawFence)>,
}

/// A failed commit.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    /// The device rejected the configuration.
    #[error("configuration rejected: {0}")]
    Rejected(String),
    /// The device reported an error code.
    #[error("device error {0}")]
    Device(i32),
    /// The commit did not complete in time.
    #[error("commit timed out")]
    Timeout,
}
