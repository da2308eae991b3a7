// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Composition targets and their layer ranges.

use core::fmt;

use crate::fence::Fence;
use crate::layer::{BufferHandle, LayerId};

use super::static_cache::StaticLayerCache;

/// Which composition target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetKind {
    /// Rendered by the host (GPU/software) into one shared buffer.
    Client,
    /// Blended by the secondary hardware unit into its own buffer.
    Secondary,
}

/// An inclusive span of z-order positions.
///
/// Invariant: `first <= last`. An empty target has no range at all
/// (`Option<LayerRange>::None`), never an inverted one.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerRange {
    /// Lowest position in the range.
    pub first: usize,
    /// Highest position in the range.
    pub last: usize,
}

impl LayerRange {
    /// A range containing one position.
    #[must_use]
    pub const fn single(position: usize) -> Self {
        Self {
            first: position,
            last: position,
        }
    }

    /// Returns the smallest range containing both `self` and `position`.
    #[must_use]
    pub fn extended(self, position: usize) -> Self {
        Self {
            first: self.first.min(position),
            last: self.last.max(position),
        }
    }

    /// Returns `true` if `position` lies within the range, bounds included.
    #[must_use]
    pub const fn contains(&self, position: usize) -> bool {
        self.first <= position && position <= self.last
    }

    /// Returns `true` if `position` lies strictly between the bounds.
    #[must_use]
    pub const fn encloses(&self, position: usize) -> bool {
        self.first < position && position < self.last
    }

    /// Positions strictly between the bounds.
    pub fn interior(&self) -> core::ops::Range<usize> {
        (self.first + 1)..self.last
    }

    /// Returns `true` if the two ranges share a position.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    /// Number of positions covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.last - self.first + 1
    }

    /// Returns `true` if the range is well formed for `count` layers.
    #[must_use]
    pub const fn is_valid_for(&self, count: usize) -> bool {
        self.first <= self.last && self.last < count
    }
}

impl fmt::Debug for LayerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.first, self.last)
    }
}

/// One of a display's two composition targets.
#[derive(Debug)]
pub struct CompositionTarget {
    pub(crate) kind: TargetKind,
    pub(crate) range: Option<LayerRange>,
    /// Buffer for the current frame.
    pub(crate) buffer: Option<BufferHandle>,
    /// Buffer scanned out by the last successful commit.
    pub(crate) last_committed_buffer: Option<BufferHandle>,
    pub(crate) acquire_fence: Fence,
    pub(crate) release_fence: Fence,
    /// Member acquire fences moved in during present.
    pub(crate) member_fences: Vec<(LayerId, Fence)>,
    /// Reuse the previous window configuration for this target.
    pub(crate) skip: bool,
    pub(crate) cache: StaticLayerCache,
    /// Raised when the range had to be reset because it was inconsistent.
    pub(crate) changed: bool,
}

impl CompositionTarget {
    /// Creates an empty target.
    #[must_use]
    pub fn new(kind: TargetKind, cache_capacity: usize) -> Self {
        Self {
            kind,
            range: None,
            buffer: None,
            last_committed_buffer: None,
            acquire_fence: Fence::NONE,
            release_fence: Fence::NONE,
            member_fences: Vec::new(),
            skip: false,
            cache: StaticLayerCache::new(cache_capacity),
            changed: false,
        }
    }

    /// Returns which target this is.
    #[must_use]
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Returns `true` if any layer is assigned to this target.
    #[must_use]
    pub fn has_layers(&self) -> bool {
        self.range.is_some()
    }

    /// Returns the assigned range, if any.
    #[must_use]
    pub fn range(&self) -> Option<LayerRange> {
        self.range
    }

    /// Returns whether the previous window configuration is reused.
    #[must_use]
    pub fn skip(&self) -> bool {
        self.skip
    }

    /// Returns whether the last assignment had to reset this target.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Returns the static layer cache.
    #[must_use]
    pub fn cache(&self) -> &StaticLayerCache {
        &self.cache
    }

    /// Returns the target buffer for the current frame.
    #[must_use]
    pub fn buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }

    /// Adds a position to the range and returns the new range.
    pub(crate) fn extend(&mut self, position: usize) -> LayerRange {
        let range = self
            .range
            .map_or(LayerRange::single(position), |r| r.extended(position));
        self.range = Some(range);
        range
    }

    /// Empties the range for a new assignment pass.
    pub(crate) fn clear_range(&mut self) {
        self.range = None;
        self.skip = false;
    }

    /// Resets the target after an inconsistency or an aborted frame.
    ///
    /// Fences are left alone; the caller closes them through the ledger.
    pub(crate) fn reset(&mut self) {
        self.clear_range();
        self.changed = true;
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_grows_both_ways() {
        let mut target = CompositionTarget::new(TargetKind::Client, 5);
        assert!(!target.has_layers());
        assert_eq!(target.extend(3), LayerRange::single(3));
        assert_eq!(target.extend(1), LayerRange { first: 1, last: 3 });
        assert_eq!(target.extend(6), LayerRange { first: 1, last: 6 });
        assert_eq!(target.extend(4), LayerRange { first: 1, last: 6 });
    }

    #[test]
    fn range_predicates() {
        let r = LayerRange { first: 2, last: 5 };
        assert!(r.contains(2) && r.contains(5));
        assert!(!r.encloses(2) && r.encloses(3) && !r.encloses(5));
        assert_eq!(r.interior(), 3..5);
        assert_eq!(r.len(), 4);
        assert!(r.overlaps(&LayerRange::single(5)));
        assert!(!r.overlaps(&LayerRange { first: 6, last: 9 }));
        assert!(r.is_valid_for(6));
        assert!(!r.is_valid_for(5));
        assert!(!LayerRange { first: 4, last: 1 }.is_valid_for(10));
    }

    #[test]
    fn reset_raises_changed() {
        let mut target = CompositionTarget::new(TargetKind::Secondary, 5);
        target.extend(0);
        target.skip = true;
        target.reset();
        assert!(!target.has_layers());
        assert!(!target.skip());
        assert!(target.changed());
    }

    #[test]
    fn range_debug() {
        assert_eq!(format!("{:?}", LayerRange { first: 1, last: 2 }), "[1, 2]");
    }
}
