// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants.
//!
//! The layer set records host mutations in per-channel dirty sets (via
//! [`understory_dirty`]). Layers are independent of one another, so every
//! channel is local-only: no dependency edges, no propagation.
//!
//! - [`GEOMETRY`] covers everything that can change a layer's classification
//!   or its window description: crop, frame, z-order, transform, blend,
//!   plane alpha, dataspace, pixel format, flags and requested composition
//!   type. Any geometry change forces a full validate and invalidates the
//!   static layer caches.
//! - [`CONTENT`] covers a new buffer of the same format and per-frame HDR
//!   metadata. Content changes alone do not force a validate.
//! - [`TOPOLOGY`] is marked on layer creation and destruction.
//!
//! [`LayerSet::take_changes`](crate::layer::LayerSet::take_changes) drains
//! all channels into a [`LayerChanges`](crate::layer::LayerChanges) record.

use understory_dirty::Channel;

/// Classification- or window-affecting property changed.
pub const GEOMETRY: Channel = Channel::new(0);

/// Buffer content or per-frame metadata changed.
pub const CONTENT: Channel = Channel::new(1);

/// A layer was created or destroyed.
pub const TOPOLOGY: Channel = Channel::new(2);
