// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-layer record.

use kurbo::Rect;

use crate::composition::UnitId;
use crate::fence::Fence;

use super::id::{BufferHandle, LayerId};
use super::props::{
    BlendMode, Composition, Dataspace, HdrMetadata, HostComposition, LayerFlags, LayerRequest,
    LayerTransform, OverlayPriority, PixelFormat, RequestedComposition,
};

/// One layer of a display.
///
/// Host-set properties are written through [`LayerSet`](super::LayerSet)
/// setters so that changes reach the dirty channels. The composition fields
/// are written by the assigner during validate, and the fence slots by the
/// display under the ledger's rules.
#[derive(Debug)]
pub struct Layer {
    pub(crate) id: LayerId,

    // -- Host-set properties --
    pub(crate) buffer: Option<BufferHandle>,
    pub(crate) format: PixelFormat,
    pub(crate) source_crop: Rect,
    pub(crate) display_frame: Rect,
    pub(crate) z_order: u32,
    pub(crate) blend: BlendMode,
    pub(crate) plane_alpha: f32,
    pub(crate) transform: LayerTransform,
    pub(crate) dataspace: Dataspace,
    pub(crate) flags: LayerFlags,
    pub(crate) hdr_metadata: Option<HdrMetadata>,
    pub(crate) requested: RequestedComposition,

    // -- Validation state --
    pub(crate) priority: OverlayPriority,
    pub(crate) validated: Composition,
    pub(crate) actual: Composition,
    /// Type reported to the host by the last validate.
    pub(crate) reported: HostComposition,
    /// Type the host last observed (its own request, or an accepted report).
    pub(crate) host_observed: HostComposition,
    pub(crate) unit: Option<UnitId>,
    pub(crate) request: Option<LayerRequest>,

    // -- Fences --
    pub(crate) acquire_fence: Fence,
    pub(crate) release_fence: Fence,
}

impl Layer {
    pub(crate) fn new(id: LayerId) -> Self {
        Self {
            id,
            buffer: None,
            format: PixelFormat::default(),
            source_crop: Rect::ZERO,
            display_frame: Rect::ZERO,
            z_order: 0,
            blend: BlendMode::default(),
            plane_alpha: 1.0,
            transform: LayerTransform::Identity,
            dataspace: Dataspace::UNKNOWN,
            flags: LayerFlags::default(),
            hdr_metadata: None,
            requested: RequestedComposition::Device,
            priority: OverlayPriority::Normal,
            validated: Composition::Device,
            actual: Composition::Device,
            reported: HostComposition::Device,
            host_observed: HostComposition::Device,
            unit: None,
            request: None,
            acquire_fence: Fence::NONE,
            release_fence: Fence::NONE,
        }
    }

    /// Returns the layer's handle.
    #[inline]
    #[must_use]
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Returns the current buffer, if any.
    #[must_use]
    pub fn buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }

    /// Returns the pixel format of the current buffer.
    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Returns the source crop in buffer coordinates.
    #[must_use]
    pub fn source_crop(&self) -> Rect {
        self.source_crop
    }

    /// Returns the destination rectangle in display coordinates.
    #[must_use]
    pub fn display_frame(&self) -> Rect {
        self.display_frame
    }

    /// Returns the z-order key.
    #[must_use]
    pub fn z_order(&self) -> u32 {
        self.z_order
    }

    /// Returns the blend mode.
    #[must_use]
    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    /// Returns the plane alpha in `0.0..=1.0`.
    #[must_use]
    pub fn plane_alpha(&self) -> f32 {
        self.plane_alpha
    }

    /// Returns the source transform.
    #[must_use]
    pub fn transform(&self) -> LayerTransform {
        self.transform
    }

    /// Returns the dataspace tag.
    #[must_use]
    pub fn dataspace(&self) -> Dataspace {
        self.dataspace
    }

    /// Returns the content flags.
    #[must_use]
    pub fn flags(&self) -> LayerFlags {
        self.flags
    }

    /// Returns the per-frame HDR metadata, if set.
    #[must_use]
    pub fn hdr_metadata(&self) -> Option<HdrMetadata> {
        self.hdr_metadata
    }

    /// Returns the composition type requested by the host.
    #[must_use]
    pub fn requested(&self) -> RequestedComposition {
        self.requested
    }

    /// Returns the overlay priority assigned during validate.
    #[must_use]
    pub fn priority(&self) -> OverlayPriority {
        self.priority
    }

    /// Returns the composition path assigned by the last validate.
    #[must_use]
    pub fn validated(&self) -> Composition {
        self.validated
    }

    /// Returns the composition path confirmed by the last accept.
    #[must_use]
    pub fn actual(&self) -> Composition {
        self.actual
    }

    /// Returns the type reported to the host by the last validate.
    #[must_use]
    pub fn reported(&self) -> HostComposition {
        self.reported
    }

    /// Returns the hardware unit this layer is bound to.
    #[must_use]
    pub fn unit(&self) -> Option<UnitId> {
        self.unit
    }

    /// Returns the pending request for this layer, if any.
    #[must_use]
    pub fn request(&self) -> Option<LayerRequest> {
        self.request
    }

    /// Returns the acquire fence slot.
    #[must_use]
    pub fn acquire_fence(&self) -> &Fence {
        &self.acquire_fence
    }

    /// Returns the release fence slot.
    #[must_use]
    pub fn release_fence(&self) -> &Fence {
        &self.release_fence
    }

    /// Returns `true` if the reported type differs from what the host last
    /// observed.
    pub(crate) fn type_changed(&self) -> bool {
        self.reported != self.host_observed
    }
}
