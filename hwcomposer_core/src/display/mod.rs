// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Displays and the per-frame state machine.
//!
//! A [`Display`] owns one output's layers, its two composition targets, the
//! hardware unit reservations and the fence ledger. The host drives it
//! through a fixed cycle:
//!
//! ```text
//!                 validate                accept_changes
//!   None ─────────────────► Validated ────────────────────► AcceptedChange
//!    ▲  ▲                    │   ▲                                │
//!    │  │                    │   └────── validate ◄───────┐       │
//!    │  │    present (no pending type changes)            │       │ present
//!    │  │                    ▼                            │       ▼
//!    │  └── commit failure ── present ─────────────────► Presented
//!    │                                                    │
//!    └────────────── power off ◄──────────────────────────┘
//! ```
//!
//! `present` from `Presented` or `None` is accepted only when the
//! skip-validate guard holds, in which case the previous assignment is
//! committed again.
//!
//! [`HwcDisplay`] wraps a display in the locks the host threads need, and
//! [`Hwc`] is the registry of all displays.

mod dump;
mod frame;
mod guard;
mod handle;
mod present;


use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use kurbo::Rect;
use tracing::{debug, info};

use crate::backend::HardwareBackend;
use crate::cleanup::CleanupHandle;
use crate::composition::{AssignSummary, CompositionTarget, ResourceTable, TargetKind};
use crate::config::HwcConfig;
use crate::error::{HwcError, Result};
use crate::fence::{FenceHolder, FenceLedger, RawFence, SyncProvider};
use crate::layer::{
    BlendMode, BufferHandle, Dataspace, HdrMetadata, Layer, LayerChanges, LayerFlags, LayerId,
    LayerSet, LayerTransform, PixelFormat, RequestedComposition,
};
use crate::trace::{TraceSink, Tracer};

pub use dump::{DisplayDump, LayerDump, TargetDump};
pub use guard::ValidateReason;
pub use handle::{Hwc, HwcDisplay};

/// Identifies a display within an [`Hwc`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayId(pub u32);

impl fmt::Debug for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Display({})", self.0)
    }
}

/// What kind of output a display drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayKind {
    /// The built-in panel.
    Primary,
    /// A hot-pluggable output.
    External {
        /// Whether the output is plugged in.
        connected: bool,
    },
    /// An off-screen output written to memory.
    Virtual {
        /// Output width in pixels.
        width: u32,
        /// Output height in pixels.
        height: u32,
    },
}

impl DisplayKind {
    /// Returns `true` for virtual displays.
    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual { .. })
    }

    /// Returns `true` unless this is an unplugged external display.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        !matches!(self, Self::External { connected: false })
    }
}

/// Display power state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PowerMode {
    /// Panel off; frames are not shown.
    Off,
    /// Normal operation.
    #[default]
    On,
    /// Low-power mode that still updates.
    Doze,
    /// Low-power mode with updates frozen.
    DozeSuspend,
}

impl PowerMode {
    /// Returns `true` if frames reach the panel in this mode.
    #[must_use]
    pub const fn shows_frames(self) -> bool {
        matches!(self, Self::On | Self::Doze)
    }
}

/// Where a display is in its validate/present cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FrameState {
    /// Nothing validated; also the state after a failed commit or power-off.
    #[default]
    None,
    /// An assignment is ready for the host to inspect.
    Validated,
    /// The host accepted the assignment.
    AcceptedChange,
    /// The last frame reached the hardware (or was skipped).
    Presented,
}

/// A 4×4 color matrix in row-major order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorTransform(pub [f32; 16]);

impl ColorTransform {
    /// The identity matrix.
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Returns `true` for the identity matrix.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

/// Counts returned by [`Display::validate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidateOutcome {
    /// Layers whose composition type differs from what the host last saw.
    pub type_changes: usize,
    /// Layers with a pending request.
    pub requests: usize,
}

/// A vsync delivered to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VsyncEvent {
    /// The display that produced it.
    pub display: DisplayId,
    /// Timestamp in nanoseconds on the platform's monotonic clock.
    pub timestamp_ns: i64,
    /// Current estimate of the refresh period.
    pub period: Duration,
}

#[derive(Clone, Copy, Debug)]
struct VsyncState {
    enabled: bool,
    period: Duration,
    last_timestamp: Option<i64>,
}

/// One output's composition state.
pub struct Display {
    id: DisplayId,
    kind: DisplayKind,
    config: HwcConfig,
    backend: Box<dyn HardwareBackend>,
    bounds: Rect,
    ledger: FenceLedger,
    layers: LayerSet,
    client: CompositionTarget,
    client_dataspace: Dataspace,
    secondary: CompositionTarget,
    resources: ResourceTable,
    state: FrameState,
    power: PowerMode,
    color_transform: Option<ColorTransform>,
    /// Layer changes accumulated since the last assignment.
    changes: LayerChanges,
    /// Display-level geometry change (color transform, power cycle).
    geometry_changed: bool,
    /// Set after an aborted frame; the next validate must run in full.
    force_validate: bool,
    presented_once: bool,
    bypass_requested: bool,
    frame_index: u64,
    last_assignment: AssignSummary,
    vsync: VsyncState,
    cleanup: Option<CleanupHandle>,
    /// Buffers scanned out by the last successful commit.
    committed_buffers: Vec<BufferHandle>,
    sink: Option<Box<dyn TraceSink + Send>>,
}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("power", &self.power)
            .field("layers", &self.layers.len())
            .field("client", &self.client.range())
            .field("secondary", &self.secondary.range())
            .field("frame_index", &self.frame_index)
            .finish_non_exhaustive()
    }
}

fn tracer(sink: &mut Option<Box<dyn TraceSink + Send>>) -> Tracer<'_> {
    Tracer::from_option(sink.as_deref_mut().map(|s| s as &mut dyn TraceSink))
}

impl Display {
    /// Creates a display.
    ///
    /// `sync` must be the provider the backend creates its fences with.
    #[must_use]
    pub fn new(
        id: DisplayId,
        kind: DisplayKind,
        config: HwcConfig,
        backend: Box<dyn HardwareBackend>,
        sync: Arc<dyn SyncProvider>,
    ) -> Self {
        let bounds = match kind {
            DisplayKind::Virtual { width, height } => {
                Rect::new(0.0, 0.0, f64::from(width), f64::from(height))
            }
            DisplayKind::Primary | DisplayKind::External { .. } => backend.display_bounds(),
        };
        let windows = backend.max_windows();
        Self {
            id,
            kind,
            config,
            backend,
            bounds,
            ledger: FenceLedger::new(sync, config.fence_timeouts),
            layers: LayerSet::new(),
            client: CompositionTarget::new(TargetKind::Client, config.static_layer_capacity),
            client_dataspace: Dataspace::UNKNOWN,
            secondary: CompositionTarget::new(TargetKind::Secondary, config.static_layer_capacity),
            resources: ResourceTable::new(windows, config.secondary.capacity),
            state: FrameState::None,
            power: PowerMode::On,
            color_transform: None,
            changes: LayerChanges::default(),
            geometry_changed: false,
            force_validate: false,
            presented_once: false,
            bypass_requested: false,
            frame_index: 0,
            last_assignment: AssignSummary::default(),
            vsync: VsyncState {
                enabled: false,
                period: config.default_vsync_period,
                last_timestamp: None,
            },
            cleanup: None,
            committed_buffers: Vec::new(),
            sink: None,
        }
    }

    // -- Accessors --

    /// Returns the display's id.
    #[must_use]
    pub fn id(&self) -> DisplayId {
        self.id
    }

    /// Returns the display kind.
    #[must_use]
    pub fn kind(&self) -> DisplayKind {
        self.kind
    }

    /// Returns the frame state.
    #[must_use]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Returns the power mode.
    #[must_use]
    pub fn power_mode(&self) -> PowerMode {
        self.power
    }

    /// Returns the number of frames committed so far.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Returns the display's configuration.
    #[must_use]
    pub fn config(&self) -> &HwcConfig {
        &self.config
    }

    /// Returns the layer set.
    #[must_use]
    pub fn layers(&self) -> &LayerSet {
        &self.layers
    }

    /// Returns a layer by id.
    pub fn layer(&self, id: LayerId) -> Result<&Layer> {
        self.layers.get(id)
    }

    /// Returns the fence ledger.
    #[must_use]
    pub fn ledger(&self) -> &FenceLedger {
        &self.ledger
    }

    /// Returns the client composition target.
    #[must_use]
    pub fn client_target(&self) -> &CompositionTarget {
        &self.client
    }

    /// Returns the secondary composition target.
    #[must_use]
    pub fn secondary_target(&self) -> &CompositionTarget {
        &self.secondary
    }

    /// Returns the hardware unit reservations of the last assignment.
    #[must_use]
    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// Returns the summary of the last assignment pass.
    #[must_use]
    pub fn last_assignment(&self) -> AssignSummary {
        self.last_assignment
    }

    /// Returns the current vsync period estimate.
    #[must_use]
    pub fn vsync_period(&self) -> Duration {
        self.vsync.period
    }

    // -- Collaborators --

    /// Installs the trace sink, replacing any previous one.
    pub fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink + Send>>) {
        self.sink = sink;
    }

    /// Routes retired buffers to a cleanup worker.
    pub fn set_cleanup(&mut self, cleanup: Option<CleanupHandle>) {
        self.cleanup = cleanup;
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.kind.is_connected() {
            Ok(())
        } else {
            Err(HwcError::NotConnected(self.id))
        }
    }

    // -- Layer lifecycle --

    /// Creates a layer on top of the stack.
    ///
    /// Hosts go through [`HwcDisplay::create_layer`], which holds the layer
    /// lock.
    pub(crate) fn create_layer(&mut self) -> LayerId {
        let id = self.layers.create();
        self.drop_pending_assignment();
        debug!(display = ?self.id, layer = ?id, "layer created");
        id
    }

    /// Destroys a layer, closing every fence it still owns.
    pub(crate) fn destroy_layer(&mut self, id: LayerId) -> Result<()> {
        let mut layer = self.layers.destroy(id)?;
        self.ledger.close(&mut layer.acquire_fence);
        self.ledger.close(&mut layer.release_fence);
        self.resources.release(&mut layer);
        for target in [&mut self.client, &mut self.secondary] {
            let (mut gone, kept): (Vec<_>, Vec<_>) = target
                .member_fences
                .drain(..)
                .partition(|(member, _)| *member == id);
            target.member_fences = kept;
            for (_, fence) in &mut gone {
                self.ledger.close(fence);
            }
        }
        self.drop_pending_assignment();
        debug!(display = ?self.id, layer = ?id, "layer destroyed");
        Ok(())
    }

    /// A topology change invalidates an assignment the host has not
    /// presented yet; positions in the target ranges no longer line up.
    fn drop_pending_assignment(&mut self) {
        if matches!(
            self.state,
            FrameState::Validated | FrameState::AcceptedChange
        ) {
            debug!(display = ?self.id, state = ?self.state, "layer stack changed, assignment dropped");
            self.state = FrameState::None;
        }
    }

    // -- Layer properties --

    /// Sets a layer's buffer and takes ownership of its acquire fence.
    ///
    /// On error the fence is not adopted and stays with the caller.
    pub fn set_layer_buffer(
        &mut self,
        id: LayerId,
        buffer: Option<BufferHandle>,
        format: PixelFormat,
        acquire_fence: RawFence,
    ) -> Result<()> {
        if !self.layers.is_alive(id) {
            return Err(HwcError::BadLayer(id));
        }
        let fence = self
            .ledger
            .adopt(acquire_fence, FenceHolder::LayerAcquire(id))?;
        self.layers.set_buffer(id, buffer, format)?;
        let layer = self.layers.get_mut(id)?;
        let mut previous = core::mem::replace(&mut layer.acquire_fence, fence);
        self.ledger.close(&mut previous);
        Ok(())
    }

    /// Sets a layer's source crop.
    pub fn set_layer_source_crop(&mut self, id: LayerId, crop: Rect) -> Result<()> {
        self.layers.set_source_crop(id, crop)
    }

    /// Sets a layer's display frame.
    pub fn set_layer_display_frame(&mut self, id: LayerId, frame: Rect) -> Result<()> {
        self.layers.set_display_frame(id, frame)
    }

    /// Sets a layer's z-order key.
    pub fn set_layer_z_order(&mut self, id: LayerId, z: u32) -> Result<()> {
        self.layers.set_z_order(id, z)
    }

    /// Sets a layer's blend mode.
    pub fn set_layer_blend_mode(&mut self, id: LayerId, blend: BlendMode) -> Result<()> {
        self.layers.set_blend_mode(id, blend)
    }

    /// Sets a layer's plane alpha.
    pub fn set_layer_plane_alpha(&mut self, id: LayerId, alpha: f32) -> Result<()> {
        self.layers.set_plane_alpha(id, alpha)
    }

    /// Sets a layer's source transform.
    pub fn set_layer_transform(&mut self, id: LayerId, transform: LayerTransform) -> Result<()> {
        self.layers.set_transform(id, transform)
    }

    /// Sets a layer's dataspace.
    pub fn set_layer_dataspace(&mut self, id: LayerId, dataspace: Dataspace) -> Result<()> {
        self.layers.set_dataspace(id, dataspace)
    }

    /// Sets the composition type the host asks for.
    pub fn set_layer_composition_type(
        &mut self,
        id: LayerId,
        requested: RequestedComposition,
    ) -> Result<()> {
        self.layers.set_composition_type(id, requested)
    }

    /// Sets a layer's content flags.
    pub fn set_layer_flags(&mut self, id: LayerId, flags: LayerFlags) -> Result<()> {
        self.layers.set_flags(id, flags)
    }

    /// Sets a layer's per-frame HDR metadata.
    pub fn set_layer_hdr_metadata(
        &mut self,
        id: LayerId,
        metadata: Option<HdrMetadata>,
    ) -> Result<()> {
        self.layers.set_hdr_metadata(id, metadata)
    }

    // -- Display properties --

    /// Sets the display-wide color transform. `None` or the identity matrix
    /// clears it.
    pub fn set_color_transform(&mut self, transform: Option<ColorTransform>) {
        let transform = transform.filter(|t| !t.is_identity());
        if transform != self.color_transform {
            self.color_transform = transform;
            self.geometry_changed = true;
        }
    }

    /// Sets the buffer the host rendered the Client layers into, taking
    /// ownership of its acquire fence.
    pub fn set_client_target(
        &mut self,
        buffer: Option<BufferHandle>,
        acquire_fence: RawFence,
        dataspace: Dataspace,
    ) -> Result<()> {
        let fence = self
            .ledger
            .adopt(acquire_fence, FenceHolder::TargetAcquire(TargetKind::Client))?;
        let mut previous = core::mem::replace(&mut self.client.acquire_fence, fence);
        self.ledger.close(&mut previous);
        self.client.buffer = buffer;
        self.client_dataspace = dataspace;
        Ok(())
    }

    fn color_transform_ok(&self) -> bool {
        self.color_transform
            .as_ref()
            .is_none_or(|t| self.backend.supports_color_transform(t))
    }

    // -- Power and vsync --

    /// Changes the power mode.
    ///
    /// Powering off drops the frame state to `None`, resets both targets,
    /// invalidates their caches and closes every fence the display holds.
    pub fn set_power_mode(&mut self, mode: PowerMode) {
        if mode == self.power {
            return;
        }
        info!(display = ?self.id, from = ?self.power, to = ?mode, "power mode change");
        if mode == PowerMode::Off {
            self.reset_outputs();
        }
        self.power = mode;
    }

    /// Marks an external display plugged or unplugged.
    ///
    /// Unplugging resets the display the same way powering off does.
    pub fn set_connected(&mut self, connected: bool) {
        let DisplayKind::External { connected: current } = &mut self.kind else {
            return;
        };
        if *current == connected {
            return;
        }
        *current = connected;
        info!(display = ?self.id, connected, "hotplug");
        if !connected {
            self.reset_outputs();
        }
    }

    /// Closes every fence and forgets every assignment.
    fn reset_outputs(&mut self) {
        for layer in self.layers.iter_mut() {
            self.ledger.close(&mut layer.acquire_fence);
            self.ledger.close(&mut layer.release_fence);
            layer.unit = None;
            layer.request = None;
        }
        self.close_target_fences();
        self.client.reset();
        self.secondary.reset();
        self.client.last_committed_buffer = None;
        self.resources.reset(self.backend.max_windows());
        self.state = FrameState::None;
        self.geometry_changed = true;
        self.force_validate = true;
    }

    fn close_target_fences(&mut self) {
        for target in [&mut self.client, &mut self.secondary] {
            self.ledger.close(&mut target.acquire_fence);
            self.ledger.close(&mut target.release_fence);
            for (_, fence) in &mut target.member_fences {
                self.ledger.close(fence);
            }
            target.member_fences.clear();
        }
    }

    /// Enables or disables vsync delivery.
    pub fn set_vsync_enabled(&mut self, enabled: bool) {
        self.vsync.enabled = enabled;
        if !enabled {
            self.vsync.last_timestamp = None;
        }
    }

    /// Records a hardware vsync and returns the event to forward to the
    /// host, if delivery is enabled.
    ///
    /// Consecutive timestamps refine the period estimate used for fence
    /// wait budgets.
    pub fn on_vsync(&mut self, timestamp_ns: i64) -> Option<VsyncEvent> {
        if !self.vsync.enabled {
            return None;
        }
        if let Some(last) = self.vsync.last_timestamp {
            if let Some(delta) = timestamp_ns
                .checked_sub(last)
                .and_then(|d| u64::try_from(d).ok())
                .filter(|&d| d > 0)
            {
                self.vsync.period = Duration::from_nanos(delta);
            }
        }
        self.vsync.last_timestamp = Some(timestamp_ns);
        Some(VsyncEvent {
            display: self.id,
            timestamp_ns,
            period: self.vsync.period,
        })
    }

    /// Asks the next present to skip the commit.
    ///
    /// Acquire fences are still waited on and closed.
    pub fn request_present_bypass(&mut self) {
        self.bypass_requested = true;
    }

    // -- Release fences --

    /// Hands every pending layer release fence to the caller, who must close
    /// them.
    pub fn take_release_fences(&mut self) -> Vec<(LayerId, RawFence)> {
        let mut fences = Vec::new();
        for layer in self.layers.ordered_mut() {
            if layer.release_fence.is_some() {
                fences.push((layer.id, self.ledger.hand_off(&mut layer.release_fence)));
            }
        }
        fences
    }
}
