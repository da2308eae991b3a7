// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena storage for a display's layers, in stable z-order.

use kurbo::Rect;
use understory_dirty::{Channel, CycleHandling, DirtyTracker};

use crate::dirty;
use crate::error::{HwcError, Result};

use super::entry::Layer;
use super::id::{BufferHandle, LayerId};
use super::props::{
    BlendMode, Dataspace, HdrMetadata, LayerFlags, LayerTransform, PixelFormat,
    RequestedComposition,
};

/// Changes drained from a [`LayerSet`] by [`take_changes`](LayerSet::take_changes).
///
/// Entries are raw slot indices; a destroyed layer only shows up in
/// [`removed`](Self::removed).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerChanges {
    /// Layers with a classification- or window-affecting change.
    pub geometry: Vec<u32>,
    /// Layers with new buffer content or metadata.
    pub content: Vec<u32>,
    /// Layers created since the last drain.
    pub added: Vec<u32>,
    /// Layers destroyed since the last drain.
    pub removed: Vec<u32>,
}

impl LayerChanges {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
            && self.content.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
    }

    /// Returns `true` if the changes invalidate the previous assignment.
    #[must_use]
    pub fn geometry_changed(&self) -> bool {
        !self.geometry.is_empty() || !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Folds a later drain into this one.
    pub fn merge(&mut self, later: Self) {
        fn extend_unique(into: &mut Vec<u32>, from: Vec<u32>) {
            for idx in from {
                if !into.contains(&idx) {
                    into.push(idx);
                }
            }
        }
        extend_unique(&mut self.geometry, later.geometry);
        extend_unique(&mut self.content, later.content);
        extend_unique(&mut self.added, later.added);
        extend_unique(&mut self.removed, later.removed);
    }

    /// Clears all change lists.
    pub fn clear(&mut self) {
        self.geometry.clear();
        self.content.clear();
        self.added.clear();
        self.removed.clear();
    }
}

/// The layers of one display.
///
/// Layers live in an arena addressed by [`LayerId`]. Destroyed slots are
/// recycled through a free list and generation counters reject stale
/// handles. The z-order (ascending `z_order`, ties broken by slot index) is
/// rebuilt whenever membership or a z-order key changes, so positions are
/// stable between mutations.
#[derive(Debug)]
pub struct LayerSet {
    slots: Vec<Option<Layer>>,
    generation: Vec<u32>,
    free_list: Vec<u32>,
    order: Vec<u32>,
    dirty: DirtyTracker<u32>,
    pending_added: Vec<u32>,
    pending_removed: Vec<u32>,
}

impl Default for LayerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerSet {
    /// Creates an empty layer set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
            order: Vec::new(),
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
        }
    }

    // -- Allocation API --

    /// Creates a new layer and returns its handle.
    ///
    /// The layer starts with no buffer, empty rectangles, full alpha and a
    /// requested type of Device.
    pub fn create(&mut self) -> LayerId {
        let idx = if let Some(idx) = self.free_list.pop() {
            // Reuse a freed slot.
            self.generation[idx as usize] += 1;
            idx
        } else {
            let idx = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            self.slots.push(None);
            self.generation.push(0);
            idx
        };
        let id = LayerId {
            idx,
            generation: self.generation[idx as usize],
        };
        self.slots[idx as usize] = Some(Layer::new(id));

        self.pending_added.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);
        self.rebuild_order();
        id
    }

    /// Destroys a layer and returns its record.
    ///
    /// The caller is responsible for the fences and unit binding still held
    /// by the returned layer.
    pub fn destroy(&mut self, id: LayerId) -> Result<Layer> {
        self.check(id)?;
        let idx = id.idx;
        let Some(layer) = self.slots[idx as usize].take() else {
            return Err(HwcError::BadLayer(id));
        };

        // Drop pending marks for the slot before recording the removal.
        self.dirty.remove_key(idx);

        self.free_list.push(idx);
        self.pending_added.retain(|&a| a != idx);
        self.pending_removed.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);
        self.rebuild_order();
        Ok(layer)
    }

    /// Returns whether the given handle refers to a live layer.
    #[must_use]
    pub fn is_alive(&self, id: LayerId) -> bool {
        self.check(id).is_ok()
    }

    fn check(&self, id: LayerId) -> Result<()> {
        let idx = id.idx as usize;
        if idx < self.slots.len()
            && self.generation[idx] == id.generation
            && self.slots[idx].is_some()
        {
            Ok(())
        } else {
            Err(HwcError::BadLayer(id))
        }
    }

    /// Returns the number of live layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the set has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // -- Access --

    /// Returns the layer behind a handle.
    pub fn get(&self, id: LayerId) -> Result<&Layer> {
        self.check(id)?;
        self.slots[id.idx as usize]
            .as_ref()
            .ok_or(HwcError::BadLayer(id))
    }

    /// Returns the layer behind a handle for internal mutation. Nothing is
    /// marked dirty.
    pub(crate) fn get_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.check(id)?;
        self.slots[id.idx as usize]
            .as_mut()
            .ok_or(HwcError::BadLayer(id))
    }

    /// Returns the layer at a z-order position.
    #[must_use]
    pub fn at(&self, position: usize) -> Option<&Layer> {
        let idx = *self.order.get(position)?;
        self.slots[idx as usize].as_ref()
    }

    /// Returns the z-order position of a layer.
    #[must_use]
    pub fn position(&self, id: LayerId) -> Option<usize> {
        if !self.is_alive(id) {
            return None;
        }
        self.order.iter().position(|&idx| idx == id.idx)
    }

    /// Iterates the layers bottom to top.
    pub fn ordered(&self) -> impl Iterator<Item = &Layer> + '_ {
        self.order
            .iter()
            .filter_map(|&idx| self.slots[idx as usize].as_ref())
    }

    /// Returns mutable references to the layers, bottom to top.
    pub(crate) fn ordered_mut(&mut self) -> Vec<&mut Layer> {
        let mut by_slot: Vec<Option<&mut Layer>> =
            self.slots.iter_mut().map(Option::as_mut).collect();
        self.order
            .iter()
            .filter_map(|&idx| by_slot[idx as usize].take())
            .collect()
    }

    /// Iterates the layers mutably in slot order.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Layer> + '_ {
        self.slots.iter_mut().flatten()
    }

    // -- Property setters (mark dirty on change) --

    fn update<T: PartialEq>(
        &mut self,
        id: LayerId,
        channel: Channel,
        value: T,
        field: impl FnOnce(&mut Layer) -> &mut T,
    ) -> Result<bool> {
        let slot = field(self.get_mut(id)?);
        if *slot == value {
            return Ok(false);
        }
        *slot = value;
        self.dirty.mark(id.idx, channel);
        Ok(true)
    }

    /// Sets the buffer and its pixel format.
    ///
    /// A new buffer of the same format is a content change. Changing the
    /// format, or gaining or losing a buffer, is a geometry change.
    pub fn set_buffer(
        &mut self,
        id: LayerId,
        buffer: Option<BufferHandle>,
        format: PixelFormat,
    ) -> Result<()> {
        let layer = self.get_mut(id)?;
        let presence_changed = layer.buffer.is_some() != buffer.is_some();
        let format_changed = layer.format != format;
        let buffer_changed = layer.buffer != buffer;
        layer.buffer = buffer;
        layer.format = format;
        if presence_changed || format_changed {
            self.dirty.mark(id.idx, dirty::GEOMETRY);
        } else if buffer_changed {
            self.dirty.mark(id.idx, dirty::CONTENT);
        }
        Ok(())
    }

    /// Sets the source crop.
    pub fn set_source_crop(&mut self, id: LayerId, crop: Rect) -> Result<()> {
        if !crop.is_finite() {
            return Err(HwcError::BadParameter("source crop must be finite"));
        }
        self.update(id, dirty::GEOMETRY, crop, |l| &mut l.source_crop)
            .map(drop)
    }

    /// Sets the destination rectangle.
    pub fn set_display_frame(&mut self, id: LayerId, frame: Rect) -> Result<()> {
        if !frame.is_finite() {
            return Err(HwcError::BadParameter("display frame must be finite"));
        }
        self.update(id, dirty::GEOMETRY, frame, |l| &mut l.display_frame)
            .map(drop)
    }

    /// Sets the z-order key. Layers are ordered by ascending key.
    pub fn set_z_order(&mut self, id: LayerId, z: u32) -> Result<()> {
        if self.update(id, dirty::GEOMETRY, z, |l| &mut l.z_order)? {
            self.rebuild_order();
        }
        Ok(())
    }

    /// Sets the blend mode.
    pub fn set_blend_mode(&mut self, id: LayerId, blend: BlendMode) -> Result<()> {
        self.update(id, dirty::GEOMETRY, blend, |l| &mut l.blend)
            .map(drop)
    }

    /// Sets the plane alpha. Values outside `0.0..=1.0` are rejected.
    pub fn set_plane_alpha(&mut self, id: LayerId, alpha: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(HwcError::BadParameter("plane alpha must be within 0..=1"));
        }
        self.update(id, dirty::GEOMETRY, alpha, |l| &mut l.plane_alpha)
            .map(drop)
    }

    /// Sets the source transform.
    pub fn set_transform(&mut self, id: LayerId, transform: LayerTransform) -> Result<()> {
        self.update(id, dirty::GEOMETRY, transform, |l| &mut l.transform)
            .map(drop)
    }

    /// Sets the dataspace tag.
    pub fn set_dataspace(&mut self, id: LayerId, dataspace: Dataspace) -> Result<()> {
        self.update(id, dirty::GEOMETRY, dataspace, |l| &mut l.dataspace)
            .map(drop)
    }

    /// Sets the content flags.
    pub fn set_flags(&mut self, id: LayerId, flags: LayerFlags) -> Result<()> {
        self.update(id, dirty::GEOMETRY, flags, |l| &mut l.flags)
            .map(drop)
    }

    /// Sets the per-frame HDR metadata.
    pub fn set_hdr_metadata(&mut self, id: LayerId, metadata: Option<HdrMetadata>) -> Result<()> {
        self.update(id, dirty::CONTENT, metadata, |l| &mut l.hdr_metadata)
            .map(drop)
    }

    /// Sets the composition type requested by the host.
    ///
    /// The host has now observed this type, whatever the last report was.
    pub fn set_composition_type(
        &mut self,
        id: LayerId,
        requested: RequestedComposition,
    ) -> Result<()> {
        self.update(id, dirty::GEOMETRY, requested, |l| &mut l.requested)?;
        self.get_mut(id)?.host_observed = requested.into();
        Ok(())
    }

    // -- Change tracking --

    /// Drains every dirty channel.
    pub fn take_changes(&mut self) -> LayerChanges {
        let slots = &self.slots;
        let live = |idx: &u32| slots.get(*idx as usize).is_some_and(Option::is_some);
        let mut changes = LayerChanges {
            geometry: self
                .dirty
                .drain(dirty::GEOMETRY)
                .deterministic()
                .run()
                .filter(live)
                .collect(),
            content: self
                .dirty
                .drain(dirty::CONTENT)
                .deterministic()
                .run()
                .filter(live)
                .collect(),
            ..LayerChanges::default()
        };

        // Topology is carried by the lifecycle lists.
        let _: Vec<u32> = self
            .dirty
            .drain(dirty::TOPOLOGY)
            .deterministic()
            .run()
            .collect();

        core::mem::swap(&mut self.pending_added, &mut changes.added);
        core::mem::swap(&mut self.pending_removed, &mut changes.removed);
        changes
    }

    fn rebuild_order(&mut self) {
        self.order.clear();
        self.order
            .extend(self.slots.iter().flatten().map(|layer| layer.id.idx));
        let slots = &self.slots;
        self.order.sort_by_key(|&idx| {
            let z = slots[idx as usize].as_ref().map_or(0, |l| l.z_order);
            (z, idx)
        });
    }
}
