// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Validate and accept.

use tracing::debug;

use crate::composition::Assigner;
use crate::error::{HwcError, Result};
use crate::layer::{HostComposition, LayerId, LayerRequest};
use crate::trace::ValidateEvent;

use super::guard::{GuardFacts, ValidateGuard, ValidateReason};
use super::{Display, FrameState, ValidateOutcome, tracer};

impl Display {
    /// Decides a composition type for every layer.
    ///
    /// Runs the assigner unless the skip-validate guard holds, in which case
    /// the previous assignment stands. Either way the display ends up
    /// `Validated` and the returned counts describe what the host must
    /// inspect before accepting.
    pub fn validate(&mut self) -> Result<ValidateOutcome> {
        self.ensure_connected()?;
        self.collect_changes();

        let reason = match self.validate_guard() {
            ValidateGuard::Skip => {
                self.changes.clear();
                None
            }
            ValidateGuard::Run(reason) => {
                self.assign(reason);
                Some(reason)
            }
        };
        self.state = FrameState::Validated;

        let outcome = ValidateOutcome {
            type_changes: self.layers.ordered().filter(|l| l.type_changed()).count(),
            requests: self
                .layers
                .ordered()
                .filter(|l| l.request.is_some())
                .count(),
        };
        let summary = self.last_assignment;
        tracer(&mut self.sink).validate(&ValidateEvent {
            display: self.id,
            frame_index: self.frame_index,
            reason,
            client: summary.client,
            secondary: summary.secondary,
            client_skip: summary.client_skip,
            degraded: summary.degraded,
            demotions: summary.demotions,
            type_changes: outcome.type_changes,
            requests: outcome.requests,
        });
        debug!(
            display = ?self.id,
            frame = self.frame_index,
            ?reason,
            type_changes = outcome.type_changes,
            requests = outcome.requests,
            "validated"
        );
        Ok(outcome)
    }

    /// Accepts the types reported by the last validate.
    ///
    /// Only legal in `Validated`; otherwise returns
    /// [`HwcError::NotValidated`] and changes nothing.
    pub fn accept_changes(&mut self) -> Result<()> {
        if self.state != FrameState::Validated {
            return Err(HwcError::NotValidated);
        }
        self.accept();
        Ok(())
    }

    /// Layers whose reported type differs from what the host last observed.
    #[must_use]
    pub fn changed_composition_types(&self) -> Vec<(LayerId, HostComposition)> {
        self.layers
            .ordered()
            .filter(|l| l.type_changed())
            .map(|l| (l.id, l.reported))
            .collect()
    }

    /// Layers with a pending request.
    #[must_use]
    pub fn display_requests(&self) -> Vec<(LayerId, LayerRequest)> {
        self.layers
            .ordered()
            .filter_map(|l| l.request.map(|r| (l.id, r)))
            .collect()
    }

    // -- Internals shared with present --

    pub(super) fn accept(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.actual = layer.validated;
            layer.host_observed = layer.reported;
        }
        self.state = FrameState::AcceptedChange;
    }

    pub(super) fn has_pending_type_changes(&self) -> bool {
        self.layers.ordered().any(|l| l.type_changed())
    }

    pub(super) fn collect_changes(&mut self) {
        let changes = self.layers.take_changes();
        self.changes.merge(changes);
    }

    pub(super) fn validate_guard(&self) -> ValidateGuard {
        let facts = GuardFacts {
            enabled: self.config.skip_validate,
            presented_once: self.presented_once,
            force_validate: self.force_validate,
            geometry_changed: self.geometry_changed || self.changes.geometry_changed(),
            client_in_use: self.client.has_layers(),
            color_transform_ok: self.color_transform_ok(),
            secondary_capacity: self.config.secondary.capacity,
        };
        ValidateGuard::evaluate(facts, self.layers.ordered(), &*self.backend)
    }

    fn assign(&mut self, reason: ValidateReason) {
        if self.geometry_changed || self.changes.geometry_changed() || self.force_validate {
            self.client.cache.invalidate();
            self.secondary.cache.invalidate();
        }

        let color_transform_ok = self.color_transform_ok();
        let mut layers = self.layers.ordered_mut();
        let summary = Assigner::new(
            &*self.backend,
            &self.config,
            color_transform_ok,
            &mut layers,
            &mut self.client,
            &mut self.secondary,
            &mut self.resources,
        )
        .run();

        self.last_assignment = summary;
        self.changes.clear();
        self.geometry_changed = false;
        self.force_validate = false;
        debug!(
            display = ?self.id,
            ?reason,
            client = ?summary.client,
            secondary = ?summary.secondary,
            demotions = summary.demotions,
            degraded = summary.degraded,
            client_skip = summary.client_skip,
            "assignment"
        );
    }
}
