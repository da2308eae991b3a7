// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Guards evaluated once per validate and present call.

use crate::backend::Capabilities;
use crate::composition::{StaticClass, classify};
use crate::layer::{Composition, Layer};
use crate::trace::PresentSkip;

use super::{DisplayKind, PowerMode};

/// Why validate had to run a full assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidateReason {
    /// Skipping is disabled by configuration.
    Disabled,
    /// Nothing has been presented on this display yet.
    FirstFrame,
    /// A previous frame was aborted, or the display was reset.
    ForcedRevalidation,
    /// Layers were added, removed or changed geometry.
    GeometryChanged,
    /// The client target has members.
    ClientTargetInUse,
    /// A layer needs a path the previous assignment did not give it.
    ClientLayer,
    /// The Secondary members no longer fit the blender's capacity.
    SecondaryOverBudget,
    /// A layer carries a pending request.
    PendingRequest,
}

/// Result of the skip-validate guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ValidateGuard {
    /// Reuse the previous assignment.
    Skip,
    /// Run the assigner.
    Run(ValidateReason),
}

/// Display-level inputs to the skip-validate guard.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GuardFacts {
    pub(crate) enabled: bool,
    pub(crate) presented_once: bool,
    pub(crate) force_validate: bool,
    pub(crate) geometry_changed: bool,
    pub(crate) client_in_use: bool,
    pub(crate) color_transform_ok: bool,
    pub(crate) secondary_capacity: f32,
}

impl ValidateGuard {
    /// Evaluates the guard. Reasons are checked in declaration order and
    /// the first one that applies is returned.
    pub(crate) fn evaluate<'l, C: Capabilities + ?Sized>(
        facts: GuardFacts,
        layers: impl IntoIterator<Item = &'l Layer>,
        caps: &C,
    ) -> Self {
        let reason = if !facts.enabled {
            ValidateReason::Disabled
        } else if !facts.presented_once {
            ValidateReason::FirstFrame
        } else if facts.force_validate {
            ValidateReason::ForcedRevalidation
        } else if facts.geometry_changed {
            ValidateReason::GeometryChanged
        } else if facts.client_in_use {
            ValidateReason::ClientTargetInUse
        } else {
            let mut needs_path = false;
            let mut pending_request = false;
            let mut secondary_cost = 0.0;
            for layer in layers {
                if layer.validated == Composition::Secondary {
                    secondary_cost += caps.secondary_cost(layer);
                }
                needs_path |= match classify(layer, caps, facts.color_transform_ok) {
                    StaticClass::Client => true,
                    StaticClass::Reassign => {
                        layer.validated != Composition::Secondary
                            || !caps.secondary_available()
                            || !caps.supports_secondary(layer)
                    }
                    StaticClass::Device => layer.validated != Composition::Device,
                };
                pending_request |= layer.request.is_some();
            }
            if needs_path {
                ValidateReason::ClientLayer
            } else if secondary_cost > facts.secondary_capacity {
                ValidateReason::SecondaryOverBudget
            } else if pending_request {
                ValidateReason::PendingRequest
            } else {
                return Self::Skip;
            }
        };
        Self::Run(reason)
    }
}

/// Result of the present-skip guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PresentGuard {
    /// Build and commit the frame.
    Commit,
    /// Skip the commit, closing every acquire fence.
    Skip(PresentSkip),
}

impl PresentGuard {
    pub(crate) fn evaluate(
        kind: DisplayKind,
        power: PowerMode,
        bypass: bool,
        layer_count: usize,
    ) -> Self {
        if !power.shows_frames() {
            Self::Skip(PresentSkip::PoweredOff)
        } else if bypass {
            Self::Skip(PresentSkip::Bypass)
        } else if layer_count == 0 && !kind.is_virtual() {
            Self::Skip(PresentSkip::NoLayers)
        } else {
            Self::Commit
        }
    }
}
