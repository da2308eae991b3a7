// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-display layer storage.
//!
//! [`LayerSet`] owns a display's [`Layer`] records in an arena with
//! generational [`LayerId`] handles and keeps them in a stable z-order.
//! Host mutations go through its setters, which mark the
//! [dirty channels](crate::dirty) only when a value actually changes.

mod entry;
mod id;
mod props;
mod set;

pub use entry::Layer;
pub use id::{BufferHandle, LayerId};
pub use props::{
    BlendMode, Composition, Dataspace, HdrMetadata, HostComposition, LayerFlags, LayerRequest,
    LayerTransform, OverlayPriority, PixelFormat, RequestedComposition,
};
pub use set::{LayerChanges, LayerSet};
