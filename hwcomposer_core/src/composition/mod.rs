// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Composition targets, hardware unit reservations and type assignment.
//!
//! A display has two [`CompositionTarget`]s. The **Client** target is a
//! buffer the host renders its Client layers into; the **Secondary** target
//! is blended by a secondary hardware unit. Each target owns a contiguous
//! [`LayerRange`] of z-order positions, and the two ranges never overlap.
//!
//! The assigner in this module fills both ranges during validate, and the
//! [`ResourceTable`] records which hardware window or unit each layer and
//! target occupies. The Client target additionally carries a
//! [`StaticLayerCache`] that lets an unchanged frame reuse its previous
//! window configuration.

mod assign;
mod resource;
mod static_cache;
mod target;

pub(crate) use assign::{Assigner, StaticClass, classify};
pub use assign::AssignSummary;
pub use resource::{ResourceTable, UnitId, WindowSource};
pub use static_cache::{CacheState, StaticLayerCache};
pub use target::{CompositionTarget, LayerRange, TargetKind};
