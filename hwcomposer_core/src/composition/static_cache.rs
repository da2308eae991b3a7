// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Skip-static-layers cache for a composition target.
//!
//! The cache holds a snapshot of the target's member layers as they were at
//! the last assignment. When the next assignment produces a member list that
//! matches the snapshot field for field, the target is skip-eligible: its
//! previous window configuration can be reused verbatim and nothing needs to
//! be rendered into it again.
//!
//! ```text
//!   Uninitialized ──observe──► Armed ──observe (equal)──► SkipEligible
//!         ▲                      │                           │
//!         └──── invalidate ──────┴─── observe (mismatch) ────┘  (re-arms)
//! ```
//!
//! Floating-point fields are compared bit for bit, so `0.0` and `-0.0`
//! differ and no epsilon is applied.

use kurbo::Rect;

use crate::layer::{
    BlendMode, BufferHandle, Dataspace, Layer, LayerId, LayerTransform, PixelFormat,
};

/// Cache state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheState {
    /// No snapshot.
    #[default]
    Uninitialized,
    /// A snapshot was captured; the next matching frame becomes eligible.
    Armed,
    /// The current members match the snapshot.
    SkipEligible,
}

/// Bitwise image of a rectangle.
type RectBits = [u64; 4];

fn rect_bits(r: Rect) -> RectBits {
    [r.x0.to_bits(), r.y0.to_bits(), r.x1.to_bits(), r.y1.to_bits()]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MemberSnapshot {
    layer: LayerId,
    buffer: Option<BufferHandle>,
    source_crop: RectBits,
    display_frame: RectBits,
    blend: BlendMode,
    transform: LayerTransform,
    plane_alpha: u32,
    dataspace: Dataspace,
    format: PixelFormat,
    z_order: u32,
}

impl MemberSnapshot {
    fn capture(layer: &Layer) -> Self {
        Self {
            layer: layer.id,
            buffer: layer.buffer,
            source_crop: rect_bits(layer.source_crop),
            display_frame: rect_bits(layer.display_frame),
            blend: layer.blend,
            transform: layer.transform,
            plane_alpha: layer.plane_alpha.to_bits(),
            dataspace: layer.dataspace,
            format: layer.format,
            z_order: layer.z_order,
        }
    }
}

/// Snapshot cache over a target's member layers.
#[derive(Clone, Debug)]
pub struct StaticLayerCache {
    capacity: usize,
    state: CacheState,
    snapshot: Vec<MemberSnapshot>,
}

impl StaticLayerCache {
    /// Creates an uninitialized cache tracking at most `capacity` members.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: CacheState::Uninitialized,
            snapshot: Vec::with_capacity(capacity),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Returns the number of members in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    /// Returns `true` if no snapshot is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Drops the snapshot.
    pub fn invalidate(&mut self) {
        self.state = CacheState::Uninitialized;
        self.snapshot.clear();
    }

    /// Compares the current members against the snapshot and advances the
    /// state machine. Returns `true` if the target is skip-eligible.
    ///
    /// An empty member list or one longer than the capacity invalidates the
    /// cache. A mismatch drops the old snapshot and arms with the new one.
    pub fn observe<'a>(&mut self, members: impl IntoIterator<Item = &'a Layer>) -> bool {
        let current: Vec<MemberSnapshot> = members
            .into_iter()
            .map(MemberSnapshot::capture)
            .take(self.capacity + 1)
            .collect();
        if current.is_empty() || current.len() > self.capacity {
            self.invalidate();
            return false;
        }

        match self.state {
            CacheState::Armed | CacheState::SkipEligible if current == self.snapshot => {
                self.state = CacheState::SkipEligible;
                true
            }
            _ => {
                self.snapshot = current;
                self.state = CacheState::Armed;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(idx: u32, buffer: u64) -> Layer {
        let mut layer = Layer::new(LayerId {
            idx,
            generation: 0,
        });
        layer.buffer = Some(BufferHandle(buffer));
        layer.display_frame = Rect::new(0.0, 0.0, 100.0, 100.0);
        layer.source_crop = Rect::new(0.0, 0.0, 100.0, 100.0);
        layer
    }

    #[test]
    fn arms_then_becomes_eligible() {
        let mut cache = StaticLayerCache::new(5);
        let layers = [layer(0, 1), layer(1, 2)];
        assert!(!cache.observe(&layers));
        assert_eq!(cache.state(), CacheState::Armed);
        assert_eq!(cache.len(), 2);
        assert!(cache.observe(&layers));
        assert_eq!(cache.state(), CacheState::SkipEligible);
        assert!(cache.observe(&layers), "stays eligible while unchanged");
    }

    #[test]
    fn mismatch_rearms() {
        let mut cache = StaticLayerCache::new(5);
        let mut layers = [layer(0, 1), layer(1, 2)];
        cache.observe(&layers);
        cache.observe(&layers);
        layers[1].buffer = Some(BufferHandle(3));
        assert!(!cache.observe(&layers));
        assert_eq!(cache.state(), CacheState::Armed);
        assert!(cache.observe(&layers));
    }

    #[test]
    fn member_count_change_is_a_mismatch() {
        let mut cache = StaticLayerCache::new(5);
        let layers = [layer(0, 1), layer(1, 2)];
        cache.observe(&layers);
        assert!(!cache.observe(&layers[..1]));
    }

    #[test]
    fn float_fields_compare_bitwise() {
        let mut cache = StaticLayerCache::new(5);
        let mut layers = [layer(0, 1)];
        layers[0].display_frame = Rect::new(0.0, 0.0, 10.0, 10.0);
        cache.observe(&layers);
        layers[0].display_frame = Rect::new(-0.0, 0.0, 10.0, 10.0);
        assert!(!cache.observe(&layers), "-0.0 and 0.0 differ bitwise");

        layers[0].plane_alpha = 0.5;
        cache.observe(&layers);
        layers[0].plane_alpha = 0.5 + f32::EPSILON;
        assert!(!cache.observe(&layers));
    }

    #[test]
    fn over_capacity_invalidates() {
        let mut cache = StaticLayerCache::new(2);
        let layers = [layer(0, 1), layer(1, 2), layer(2, 3)];
        assert!(!cache.observe(&layers));
        assert_eq!(cache.state(), CacheState::Uninitialized);
        assert!(cache.is_empty());
    }

    #[test]
    fn empty_members_invalidate() {
        let mut cache = StaticLayerCache::new(5);
        cache.observe(&[layer(0, 1)]);
        assert!(!cache.observe(core::iter::empty::<&Layer>()));
        assert_eq!(cache.state(), CacheState::Uninitialized);
    }

    #[test]
    fn invalidate_resets() {
        let mut cache = StaticLayerCache::new(5);
        let layers = [layer(0, 1)];
        cache.observe(&layers);
        cache.invalidate();
        assert!(!cache.observe(&layers), "must arm again first");
    }
}
