// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Point-in-time snapshots of a display for diagnostics.

use core::fmt;

use kurbo::Rect;

use crate::composition::{CacheState, CompositionTarget, LayerRange, UnitId, WindowSource};
use crate::fence::RawFence;
use crate::layer::{
    BufferHandle, Composition, HostComposition, Layer, LayerId, LayerRequest, OverlayPriority,
    PixelFormat, RequestedComposition,
};

use super::{Display, DisplayId, DisplayKind, FrameState, PowerMode};

/// Snapshot of one composition target.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetDump {
    /// Assigned range.
    pub range: Option<LayerRange>,
    /// Reusing the previous configuration.
    pub skip: bool,
    /// Static layer cache state.
    pub cache: CacheState,
    /// Current target buffer.
    pub buffer: Option<BufferHandle>,
    /// The target was reset by the last assignment.
    pub changed: bool,
}

impl TargetDump {
    fn capture(target: &CompositionTarget) -> Self {
        Self {
            range: target.range,
            skip: target.skip,
            cache: target.cache.state(),
            buffer: target.buffer,
            changed: target.changed,
        }
    }
}

/// Snapshot of one layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerDump {
    /// The layer.
    pub id: LayerId,
    /// Index in z-order.
    pub position: usize,
    /// Current buffer.
    pub buffer: Option<BufferHandle>,
    /// Buffer pixel format.
    pub format: PixelFormat,
    /// Source rectangle.
    pub source_crop: Rect,
    /// Destination rectangle.
    pub display_frame: Rect,
    /// Z-order key.
    pub z_order: u32,
    /// What the host asked for.
    pub requested: RequestedComposition,
    /// What the last assignment decided.
    pub validated: Composition,
    /// What the current frame uses.
    pub actual: Composition,
    /// What the host was told.
    pub reported: HostComposition,
    /// Overlay priority.
    pub priority: OverlayPriority,
    /// Bound hardware unit.
    pub unit: Option<UnitId>,
    /// Raw acquire fence.
    pub acquire_fence: RawFence,
    /// Raw release fence.
    pub release_fence: RawFence,
    /// Pending request.
    pub request: Option<LayerRequest>,
}

impl LayerDump {
    fn capture(position: usize, layer: &Layer) -> Self {
        Self {
            id: layer.id,
            position,
            buffer: layer.buffer,
            format: layer.format,
            source_crop: layer.source_crop,
            display_frame: layer.display_frame,
            z_order: layer.z_order,
            requested: layer.requested,
            validated: layer.validated,
            actual: layer.actual,
            reported: layer.reported,
            priority: layer.priority,
            unit: layer.unit,
            acquire_fence: layer.acquire_fence.raw(),
            release_fence: layer.release_fence.raw(),
            request: layer.request,
        }
    }
}

/// Snapshot of a whole display, captured on commit failure or on demand.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayDump {
    /// The display.
    pub display: DisplayId,
    /// Its kind.
    pub kind: DisplayKind,
    /// Power mode.
    pub power: PowerMode,
    /// Frame state.
    pub state: FrameState,
    /// Frame counter.
    pub frame_index: u64,
    /// Client target.
    pub client: TargetDump,
    /// Secondary target.
    pub secondary: TargetDump,
    /// Layers in z-order.
    pub layers: Vec<LayerDump>,
    /// Occupied overlay windows.
    pub windows: Vec<(u32, WindowSource)>,
    /// Open descriptors owned by the display.
    pub outstanding_fences: usize,
    /// Capacity consumed on the secondary blender.
    pub secondary_used: f32,
}

impl fmt::Display for DisplayDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:?} {:?} power={:?} state={:?} frame={}",
            self.display, self.kind, self.power, self.state, self.frame_index
        )?;
        for (name, target) in [("client", &self.client), ("secondary", &self.secondary)] {
            writeln!(
                f,
                "  {name:<9} range={:?} skip={} cache={:?} buffer={:?} changed={}",
                target.range, target.skip, target.cache, target.buffer, target.changed
            )?;
        }
        writeln!(
            f,
            "  fences open={} secondary used={}",
            self.outstanding_fences, self.secondary_used
        )?;
        for (slot, source) in &self.windows {
            writeln!(f, "  window {slot}: {source:?}")?;
        }
        for l in &self.layers {
            writeln!(
                f,
                "  #{} {:?} z={} buf={:?} {:?} req={:?} val={:?} act={:?} rep={:?} prio={:?} unit={:?} acq={} rel={} request={:?}",
                l.position,
                l.id,
                l.z_order,
                l.buffer,
                l.format,
                l.requested,
                l.validated,
                l.actual,
                l.reported,
                l.priority,
                l.unit,
                l.acquire_fence,
                l.release_fence,
                l.request
            )?;
        }
        Ok(())
    }
}

impl Display {
    /// Captures the display's current state.
    #[must_use]
    pub fn dump(&self) -> DisplayDump {
        DisplayDump {
            display: self.id,
            kind: self.kind,
            power: self.power,
            state: self.state,
            frame_index: self.frame_index,
            client: TargetDump::capture(&self.client),
            secondary: TargetDump::capture(&self.secondary),
            layers: self
                .layers
                .ordered()
                .enumerate()
                .map(|(position, layer)| LayerDump::capture(position, layer))
                .collect(),
            windows: self.resources.windows().collect(),
            outstanding_fences: self.ledger.outstanding(),
            secondary_used: self.resources.secondary_used(),
        }
    }
}
