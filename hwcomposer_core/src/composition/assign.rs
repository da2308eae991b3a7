// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Composition type assignment.
//!
//! Given the display's layers in z-order, the [`Assigner`] decides for each
//! layer whether it is scanned out on its own window (Device), blended by the
//! secondary unit (Secondary), or rendered by the host into the client
//! target (Client). It then binds hardware windows and decides whether the
//! client target can reuse its previous configuration.
//!
//! # Passes
//!
//! 1. **Reset**: drop every binding, empty both targets, recompute priority.
//! 2. **Classify**: walk the layers bottom to top. Layers the hardware cannot
//!    take go to Client; layers only the secondary unit can take go to
//!    Secondary. Each addition re-applies the sandwich rule: every layer
//!    between a target's first and last member joins that target unless it
//!    carries elevated priority.
//! 3. **Nesting**: the two target ranges must be disjoint. Secondary members
//!    inside the client bounds move to Client; when the secondary range
//!    straddles the client range, the side with the smaller index delta is
//!    absorbed into Client.
//! 4. **Priority restriction**: a secondary range still enclosing an elevated
//!    layer is abandoned wholesale.
//! 5. **Window budget**: demote Device layers nearest the client range until
//!    the windows fit.
//! 6. **Range check**: an out-of-bounds range resets its target and the
//!    frame degrades to all-Client.
//! 7. **Windows**: bind overlay windows in z-order, one per Device layer and
//!    one per non-empty target at its first member.
//! 8. **Requests** and **static cache**: compute clear-client-target requests
//!    and let the cache decide whether the client target is skipped.
//!
//! Elevated layers may remain Device inside either range; every other layer
//! inside a range belongs to that range's target.

use kurbo::Rect;
use tracing::{debug, trace, warn};

use crate::backend::Capabilities;
use crate::config::HwcConfig;
use crate::layer::{
    Composition, HostComposition, Layer, LayerRequest, OverlayPriority, RequestedComposition,
};

use super::resource::ResourceTable;
use super::target::{CompositionTarget, LayerRange, TargetKind};

/// Where a layer goes before any range merging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StaticClass {
    /// The host must render it.
    Client,
    /// No overlay can take it; try the secondary unit.
    Reassign,
    /// An overlay can take it.
    Device,
}

/// Classifies one layer against the hardware capabilities.
pub(crate) fn classify<C: Capabilities + ?Sized>(
    layer: &Layer,
    caps: &C,
    color_transform_ok: bool,
) -> StaticClass {
    if layer.requested == RequestedComposition::Client || !color_transform_ok {
        return StaticClass::Client;
    }
    if layer.buffer.is_none() && layer.requested != RequestedComposition::SolidColor {
        return StaticClass::Client;
    }
    if layer.flags.protected || !caps.supports_overlay(layer) {
        return StaticClass::Reassign;
    }
    StaticClass::Device
}

/// Overlay priority for `layer` under `config`.
pub(crate) fn priority_for(layer: &Layer, config: &HwcConfig) -> OverlayPriority {
    if config.elevate_yuv_layers && layer.buffer.is_some() && layer.format.is_yuv() {
        OverlayPriority::Elevated
    } else {
        OverlayPriority::Normal
    }
}

/// Outcome of one assignment pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssignSummary {
    /// Client target range.
    pub client: Option<LayerRange>,
    /// Secondary target range.
    pub secondary: Option<LayerRange>,
    /// Layers moved to Client by the sandwich, nesting or budget rules.
    pub demotions: u32,
    /// The frame fell back to all-Client after an inconsistency.
    pub degraded: bool,
    /// The client target reuses its previous configuration.
    pub client_skip: bool,
}

/// One assignment pass over a display's layers.
///
/// `layers` must be in z-order (position 0 at the bottom).
pub(crate) struct Assigner<'a, 'l, C: Capabilities + ?Sized> {
    caps: &'a C,
    config: &'a HwcConfig,
    color_transform_ok: bool,
    layers: &'a mut [&'l mut Layer],
    client: &'a mut CompositionTarget,
    secondary: &'a mut CompositionTarget,
    resources: &'a mut ResourceTable,
    demotions: u32,
}

impl<C: Capabilities + ?Sized> core::fmt::Debug for Assigner<'_, '_, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Assigner")
            .field("layers", &self.layers.len())
            .field("client", &self.client.range)
            .field("secondary", &self.secondary.range)
            .field("demotions", &self.demotions)
            .finish_non_exhaustive()
    }
}

impl<'a, 'l, C: Capabilities + ?Sized> Assigner<'a, 'l, C> {
    pub(crate) fn new(
        caps: &'a C,
        config: &'a HwcConfig,
        color_transform_ok: bool,
        layers: &'a mut [&'l mut Layer],
        client: &'a mut CompositionTarget,
        secondary: &'a mut CompositionTarget,
        resources: &'a mut ResourceTable,
    ) -> Self {
        Self {
            caps,
            config,
            color_transform_ok,
            layers,
            client,
            secondary,
            resources,
            demotions: 0,
        }
    }

    /// Runs every pass and returns the summary.
    pub(crate) fn run(mut self) -> AssignSummary {
        self.begin();
        self.classify_all();
        self.resolve_nesting();
        self.enforce_priority_restriction();
        self.enforce_window_budget();

        let degraded = !self.check_ranges() || !self.assign_windows();
        if degraded {
            self.degrade();
        }

        self.apply_static_cache();
        if !self.client.skip {
            self.compute_requests();
        }
        self.report_types();

        AssignSummary {
            client: self.client.range,
            secondary: self.secondary.range,
            demotions: self.demotions,
            degraded,
            client_skip: self.client.skip,
        }
    }

    // ------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------

    fn begin(&mut self) {
        self.resources.reset(self.caps.max_windows());
        for layer in self.layers.iter_mut() {
            layer.unit = None;
            layer.request = None;
            layer.validated = Composition::Device;
            layer.priority = priority_for(layer, self.config);
        }
        for target in [&mut *self.client, &mut *self.secondary] {
            target.clear_range();
            target.changed = false;
        }
    }

    fn classify_all(&mut self) {
        for position in 0..self.layers.len() {
            match classify(&*self.layers[position], self.caps, self.color_transform_ok) {
                StaticClass::Client => self.add_client(position),
                StaticClass::Reassign => self.add_secondary(position),
                StaticClass::Device => {}
            }
        }
    }

    /// Makes the two target ranges disjoint.
    pub(crate) fn resolve_nesting(&mut self) {
        loop {
            let (Some(client), Some(secondary)) = (self.client.range, self.secondary.range)
            else {
                return;
            };
            if !client.overlaps(&secondary) {
                return;
            }

            let inside: Vec<usize> = (client.first..=client.last)
                .filter(|&j| self.layers[j].validated == Composition::Secondary)
                .collect();
            if !inside.is_empty() {
                for position in inside {
                    self.demotions += 1;
                    self.add_client(position);
                }
                continue;
            }

            // The secondary range straddles the client range.
            let below = client.first.saturating_sub(secondary.first);
            let above = secondary.last.saturating_sub(client.last);
            let absorb = if below > 0 && (above == 0 || below <= above) {
                secondary.first
            } else {
                secondary.last
            };
            debug!(
                ?client,
                ?secondary,
                below,
                above,
                absorb,
                "secondary range straddles client range"
            );
            self.demotions += 1;
            self.add_client(absorb);
        }
    }

    fn enforce_priority_restriction(&mut self) {
        if !self.config.secondary.restrict_priority_sandwich {
            return;
        }
        let Some(range) = self.secondary.range else {
            return;
        };
        if self.encloses_elevated(range) {
            debug!(?range, "secondary range encloses an elevated layer, abandoning");
            self.abandon_secondary();
        }
    }

    fn enforce_window_budget(&mut self) {
        let budget = self.caps.max_windows();
        while self.windows_needed() > budget {
            if let Some(victim) = self.budget_victim() {
                debug!(
                    position = victim,
                    needed = self.windows_needed(),
                    budget,
                    "window budget exceeded, demoting layer"
                );
                self.demotions += 1;
                self.add_client(victim);
                self.resolve_nesting();
            } else if self.secondary.has_layers() {
                debug!(budget, "window budget exceeded, abandoning secondary target");
                self.abandon_secondary();
            } else {
                warn!(budget, "no window left for the client target");
                break;
            }
        }
    }

    /// Returns `false` and resets the offending target if a range is out of
    /// bounds or names a unit the hardware lacks.
    pub(crate) fn check_ranges(&mut self) -> bool {
        let count = self.layers.len();
        let secondary_missing = !self.caps.secondary_available();
        let mut ok = true;
        for target in [&mut *self.client, &mut *self.secondary] {
            let Some(range) = target.range else {
                continue;
            };
            let unit_missing = target.kind == TargetKind::Secondary && secondary_missing;
            if !range.is_valid_for(count) || unit_missing {
                warn!(
                    kind = ?target.kind,
                    ?range,
                    count,
                    unit_missing,
                    "inconsistent composition range, resetting target"
                );
                target.reset();
                ok = false;
            }
        }
        ok
    }

    fn assign_windows(&mut self) -> bool {
        let client_first = self.client.range.map(|r| r.first);
        let secondary_first = self.secondary.range.map(|r| r.first);
        for position in 0..self.layers.len() {
            let validated = self.layers[position].validated;
            let bound = match validated {
                Composition::Device => self
                    .resources
                    .bind_overlay(&mut *self.layers[position])
                    .is_some(),
                Composition::Client if client_first == Some(position) => {
                    self.resources.bind_target(TargetKind::Client).is_some()
                }
                Composition::Secondary if secondary_first == Some(position) => {
                    self.resources.bind_target(TargetKind::Secondary).is_some()
                }
                Composition::Client | Composition::Secondary => true,
            };
            if !bound {
                warn!(position, "ran out of hardware windows during assignment");
                return false;
            }
        }
        true
    }

    /// Falls back to composing every layer on the client target.
    pub(crate) fn degrade(&mut self) {
        let count = self.layers.len();
        warn!(count, "composing every layer on the client target");
        self.resources.reset(self.caps.max_windows());
        for layer in self.layers.iter_mut() {
            layer.unit = None;
            layer.validated = Composition::Client;
        }
        self.secondary.clear_range();
        self.client.range = count.checked_sub(1).map(|last| LayerRange { first: 0, last });
        self.client.changed = true;
        self.client.cache.invalidate();
        if self.client.has_layers() && self.resources.bind_target(TargetKind::Client).is_none() {
            warn!("no hardware window for the client target");
        }
    }

    fn apply_static_cache(&mut self) {
        let range = match self.client.range {
            Some(range) if self.config.skip_static_layers => range,
            _ => {
                self.client.cache.invalidate();
                return;
            }
        };
        let layers = &*self.layers;
        let eligible = self.client.cache.observe(
            (range.first..=range.last)
                .map(move |j| &*layers[j])
                .filter(|l| l.validated == Composition::Client),
        );
        self.client.skip = eligible && self.client.last_committed_buffer.is_some();
        if self.client.skip {
            debug!(?range, "client target unchanged, reusing previous configuration");
        }
    }

    fn compute_requests(&mut self) {
        let Some(client) = self.client.range else {
            return;
        };
        let member_frames: Vec<Rect> = (client.first..=client.last)
            .filter(|&j| self.layers[j].validated == Composition::Client)
            .map(|j| self.layers[j].display_frame)
            .collect();
        for layer in self.layers[..client.first].iter_mut() {
            if member_frames
                .iter()
                .any(|&frame| frame.intersect(layer.display_frame).area() > 0.0)
            {
                trace!(layer = ?layer.id, "clear client target beneath hardware layer");
                layer.request = Some(LayerRequest::ClearClientTarget);
            }
        }
    }

    fn report_types(&mut self) {
        let skip = self.client.skip;
        for layer in self.layers.iter_mut() {
            layer.reported = match layer.validated {
                Composition::Client if skip => HostComposition::Device,
                other => other.host_visible(),
            };
        }
    }

    // ------------------------------------------------------------------
    // Range maintenance
    // ------------------------------------------------------------------

    /// Moves the layer at `position` to Client and re-applies the sandwich
    /// rule over the widened client range.
    pub(crate) fn add_client(&mut self, position: usize) {
        let mut secondary_lost = self.layers[position].validated == Composition::Secondary;
        self.resources.release(&mut *self.layers[position]);
        self.layers[position].validated = Composition::Client;

        let range = self.client.extend(position);
        for j in range.interior() {
            let layer = &mut *self.layers[j];
            if layer.validated == Composition::Client || layer.priority == OverlayPriority::Elevated
            {
                continue;
            }
            secondary_lost |= layer.validated == Composition::Secondary;
            self.resources.release(layer);
            layer.validated = Composition::Client;
            self.demotions += 1;
            trace!(layer = ?layer.id, position = j, "sandwiched into client target");
        }

        if secondary_lost {
            self.recompute_secondary();
        }
    }

    /// Tries to put the layer at `position` on the secondary unit, falling
    /// back to Client.
    pub(crate) fn add_secondary(&mut self, position: usize) {
        if !self.secondary_usable(position) {
            self.add_client(position);
            return;
        }
        let candidate = self
            .secondary
            .range
            .map_or(LayerRange::single(position), |r| r.extended(position));
        if self.config.secondary.restrict_priority_sandwich && self.encloses_elevated(candidate) {
            debug!(
                position,
                ?candidate,
                "secondary range would enclose an elevated layer"
            );
            self.add_client(position);
            return;
        }
        let cost = self.caps.secondary_cost(&*self.layers[position]);
        if !self.resources.bind_secondary(&mut *self.layers[position], cost) {
            self.add_client(position);
            return;
        }
        self.layers[position].validated = Composition::Secondary;
        self.secondary.range = Some(candidate);

        for j in candidate.interior() {
            let layer = &*self.layers[j];
            if layer.validated != Composition::Device || layer.priority == OverlayPriority::Elevated
            {
                continue;
            }
            if self.secondary_usable(j) {
                let cost = self.caps.secondary_cost(layer);
                if self.resources.bind_secondary(&mut *self.layers[j], cost) {
                    self.layers[j].validated = Composition::Secondary;
                    continue;
                }
            }
            self.demotions += 1;
            self.add_client(j);
        }
        self.recompute_secondary();
    }

    fn recompute_secondary(&mut self) {
        self.secondary.range = self
            .layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.validated == Composition::Secondary)
            .fold(None, |range: Option<LayerRange>, (j, _)| {
                Some(range.map_or(LayerRange::single(j), |r| r.extended(j)))
            });
    }

    fn abandon_secondary(&mut self) {
        let members: Vec<usize> = (0..self.layers.len())
            .filter(|&j| self.layers[j].validated == Composition::Secondary)
            .collect();
        for position in members {
            self.demotions += 1;
            self.add_client(position);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn secondary_usable(&self, position: usize) -> bool {
        self.config.secondary.enabled
            && self.caps.secondary_available()
            && self.caps.supports_secondary(&*self.layers[position])
    }

    fn encloses_elevated(&self, range: LayerRange) -> bool {
        range.interior().any(|j| {
            let layer = &*self.layers[j];
            layer.priority == OverlayPriority::Elevated
                && layer.validated != Composition::Secondary
        })
    }

    fn windows_needed(&self) -> usize {
        let devices = self
            .layers
            .iter()
            .filter(|l| l.validated == Composition::Device)
            .count();
        devices + usize::from(self.client.has_layers()) + usize::from(self.secondary.has_layers())
    }

    /// The Device layer to demote when the windows do not fit: the one
    /// nearest the client range (lower position on a tie), or the topmost
    /// when there is no client range. Normal-priority layers go first.
    fn budget_victim(&self) -> Option<usize> {
        let pick = |normal_only: bool| {
            let candidates = (0..self.layers.len()).filter(move |&j| {
                let layer = &*self.layers[j];
                layer.validated == Composition::Device
                    && (!normal_only || layer.priority == OverlayPriority::Normal)
            });
            match self.client.range {
                Some(client) => candidates.min_by_key(|&j| (distance(client, j), j)),
                None => candidates.max(),
            }
        };
        pick(true).or_else(|| pick(false))
    }
}

fn distance(range: LayerRange, position: usize) -> usize {
    if position < range.first {
        range.first - position
    } else {
        position.saturating_sub(range.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{UnitId, WindowSource};
    use crate::layer::{BufferHandle, LayerFlags, LayerId, PixelFormat};

    /// Capabilities keyed by buffer handle.
    #[derive(Debug)]
    struct TestCaps {
        windows: usize,
        no_overlay: Vec<u64>,
        no_secondary: Vec<u64>,
        secondary: bool,
        secondary_available: bool,
        cost: f32,
    }

    impl Default for TestCaps {
        fn default() -> Self {
            Self {
                windows: 8,
                no_overlay: Vec::new(),
                no_secondary: Vec::new(),
                secondary: true,
                secondary_available: true,
                cost: 1.0,
            }
        }
    }

    fn handle(layer: &Layer) -> u64 {
        layer.buffer.map_or(u64::MAX, |b| b.0)
    }

    impl Capabilities for TestCaps {
        fn max_windows(&self) -> usize {
            self.windows
        }

        fn display_bounds(&self) -> Rect {
            Rect::new(0.0, 0.0, 1000.0, 1000.0)
        }

        fn supports_overlay(&self, layer: &Layer) -> bool {
            !self.no_overlay.contains(&handle(layer))
        }

        fn supports_secondary(&self, layer: &Layer) -> bool {
            self.secondary && !self.no_secondary.contains(&handle(layer))
        }

        fn secondary_available(&self) -> bool {
            self.secondary_available
        }

        fn secondary_cost(&self, _layer: &Layer) -> f32 {
            self.cost
        }
    }

    struct Fixture {
        caps: TestCaps,
        config: HwcConfig,
        layers: Vec<Layer>,
        client: CompositionTarget,
        secondary: CompositionTarget,
        resources: ResourceTable,
    }

    impl Fixture {
        fn new(count: u32) -> Self {
            let layers = (0..count)
                .map(|idx| {
                    let mut layer = Layer::new(LayerId { idx, generation: 0 });
                    layer.buffer = Some(BufferHandle(u64::from(idx)));
                    layer.z_order = idx;
                    let offset = f64::from(idx) * 200.0;
                    layer.display_frame = Rect::new(offset, 0.0, offset + 100.0, 100.0);
                    layer.source_crop = Rect::new(0.0, 0.0, 100.0, 100.0);
                    layer
                })
                .collect();
            let config = HwcConfig::new();
            Self {
                caps: TestCaps::default(),
                config,
                layers,
                client: CompositionTarget::new(TargetKind::Client, config.static_layer_capacity),
                secondary: CompositionTarget::new(TargetKind::Secondary, 0),
                resources: ResourceTable::new(8, config.secondary.capacity),
            }
        }

        fn protect(&mut self, positions: &[usize]) {
            for &p in positions {
                self.layers[p].flags = LayerFlags {
                    protected: true,
                    ..LayerFlags::default()
                };
            }
        }

        fn request_client(&mut self, positions: &[usize]) {
            for &p in positions {
                self.layers[p].requested = RequestedComposition::Client;
            }
        }

        fn with<R>(&mut self, f: impl FnOnce(&mut Assigner<'_, '_, TestCaps>) -> R) -> R {
            let mut refs: Vec<&mut Layer> = self.layers.iter_mut().collect();
            let mut assigner = Assigner::new(
                &self.caps,
                &self.config,
                true,
                &mut refs,
                &mut self.client,
                &mut self.secondary,
                &mut self.resources,
            );
            f(&mut assigner)
        }

        fn run(&mut self) -> AssignSummary {
            self.run_with_transform(true)
        }

        fn run_with_transform(&mut self, color_transform_ok: bool) -> AssignSummary {
            let mut refs: Vec<&mut Layer> = self.layers.iter_mut().collect();
            Assigner::new(
                &self.caps,
                &self.config,
                color_transform_ok,
                &mut refs,
                &mut self.client,
                &mut self.secondary,
                &mut self.resources,
            )
            .run()
        }

        fn types(&self) -> Vec<Composition> {
            self.layers.iter().map(|l| l.validated).collect()
        }
    }

    use crate::layer::Composition::{Client as C, Device as D, Secondary as S};

    fn range(first: usize, last: usize) -> Option<LayerRange> {
        Some(LayerRange { first, last })
    }

    #[test]
    fn everything_on_overlays_when_supported() {
        let mut fx = Fixture::new(4);
        let summary = fx.run();
        assert_eq!(fx.types(), vec![D, D, D, D]);
        assert_eq!(summary.client, None);
        assert_eq!(summary.secondary, None);
        assert_eq!(fx.resources.windows().count(), 4);
        assert!(fx.layers.iter().all(|l| l.request.is_none()));
    }

    #[test]
    fn protected_layer_without_secondary_goes_client() {
        let mut fx = Fixture::new(5);
        fx.protect(&[2]);
        fx.caps.no_secondary = vec![2];
        let summary = fx.run();
        assert_eq!(fx.types(), vec![D, D, C, D, D]);
        assert_eq!(summary.client, range(2, 2));
        assert_eq!(summary.secondary, None);
        assert_eq!(fx.layers[2].reported, HostComposition::Client);
    }

    #[test]
    fn client_merge_sandwiches_layers_between() {
        let mut fx = Fixture::new(5);
        fx.request_client(&[1, 3]);
        let summary = fx.run();
        assert_eq!(fx.types(), vec![D, C, C, C, D]);
        assert_eq!(summary.client, range(1, 3));
        assert_eq!(summary.demotions, 1);
    }

    #[test]
    fn elevated_layer_survives_sandwich() {
        let mut fx = Fixture::new(5);
        fx.layers[2].format = PixelFormat::Nv12;
        fx.request_client(&[1, 3]);
        fx.run();
        assert_eq!(fx.types(), vec![D, C, D, C, D]);
        assert_eq!(fx.layers[2].priority, OverlayPriority::Elevated);
        assert!(matches!(fx.layers[2].unit, Some(UnitId::Overlay(_))));
    }

    #[test]
    fn demoting_a_secondary_member_recomputes_its_range() {
        let mut fx = Fixture::new(5);
        fx.protect(&[1, 2, 3, 4]);
        let summary = fx.run();
        assert_eq!(fx.types(), vec![D, S, S, S, S]);
        assert_eq!(summary.secondary, range(1, 4));

        fx.with(|a| a.add_client(2));
        assert_eq!(fx.types(), vec![D, S, C, S, S]);
        assert_eq!(fx.client.range, range(2, 2));
        assert_eq!(fx.secondary.range, range(1, 4));
        assert_eq!(fx.layers[2].unit, None);
        let mut members: Vec<_> = fx.resources.secondary_members().collect();
        members.sort();
        assert_eq!(
            members,
            vec![fx.layers[1].id, fx.layers[3].id, fx.layers[4].id]
        );
    }

    #[test]
    fn nesting_absorbs_smaller_side() {
        let mut fx = Fixture::new(5);
        fx.protect(&[1, 2, 3, 4]);
        fx.caps.no_secondary = vec![2];
        let summary = fx.run();
        assert_eq!(fx.types(), vec![D, C, C, S, S]);
        assert_eq!(summary.client, range(1, 2));
        assert_eq!(summary.secondary, range(3, 4));
    }

    #[test]
    fn nesting_tie_absorbs_lower_side() {
        let mut fx = Fixture::new(5);
        fx.protect(&[0, 4]);
        fx.request_client(&[2]);
        let summary = fx.run();
        assert_eq!(fx.types(), vec![C, C, C, S, S]);
        assert_eq!(summary.client, range(0, 2));
        assert_eq!(summary.secondary, range(3, 4));
    }

    #[test]
    fn secondary_budget_exhaustion_falls_back_to_client() {
        let mut fx = Fixture::new(2);
        fx.protect(&[0, 1]);
        fx.resources = ResourceTable::new(8, 1.0);
        let summary = fx.run();
        assert_eq!(fx.types(), vec![S, C]);
        assert_eq!(summary.secondary, range(0, 0));
        assert_eq!(summary.client, range(1, 1));
    }

    #[test]
    fn disabled_secondary_sends_reassigned_layers_to_client() {
        let mut fx = Fixture::new(3);
        fx.protect(&[1]);
        fx.config.secondary = crate::config::SecondaryConfig::disabled();
        fx.run();
        assert_eq!(fx.types(), vec![D, C, D]);
    }

    #[test]
    fn restricted_secondary_never_encloses_elevated_layer() {
        let mut fx = Fixture::new(3);
        fx.protect(&[0, 2]);
        fx.layers[1].format = PixelFormat::P010;
        let summary = fx.run();
        assert_eq!(fx.types(), vec![S, D, C]);
        assert_eq!(summary.secondary, range(0, 0));

        let mut fx = Fixture::new(3);
        fx.protect(&[0, 2]);
        fx.layers[1].format = PixelFormat::P010;
        fx.config.secondary.restrict_priority_sandwich = false;
        let summary = fx.run();
        assert_eq!(fx.types(), vec![S, D, S]);
        assert_eq!(summary.secondary, range(0, 2));
    }

    #[test]
    fn window_budget_demotes_nearest_to_client() {
        let mut fx = Fixture::new(5);
        fx.caps.windows = 3;
        fx.request_client(&[2]);
        let summary = fx.run();
        assert_eq!(fx.types(), vec![C, C, C, D, D]);
        assert_eq!(summary.client, range(0, 2));
        assert_eq!(fx.resources.windows().count(), 3);
    }

    #[test]
    fn window_budget_without_client_demotes_topmost() {
        let mut fx = Fixture::new(3);
        fx.caps.windows = 2;
        let summary = fx.run();
        assert_eq!(fx.types(), vec![D, C, C]);
        assert_eq!(summary.client, range(1, 2));
    }

    #[test]
    fn window_budget_abandons_secondary_last() {
        let mut fx = Fixture::new(2);
        fx.caps.windows = 1;
        fx.protect(&[0]);
        fx.request_client(&[1]);
        let summary = fx.run();
        assert_eq!(fx.types(), vec![C, C]);
        assert_eq!(summary.secondary, None);
        assert_eq!(fx.resources.windows().count(), 1);
    }

    #[test]
    fn out_of_bounds_range_degrades_to_client() {
        let mut fx = Fixture::new(4);
        fx.run();
        fx.with(|a| {
            a.client.range = range(3, 9);
            assert!(!a.check_ranges());
            a.degrade();
        });
        assert_eq!(fx.types(), vec![C, C, C, C]);
        assert_eq!(fx.client.range, range(0, 3));
        assert!(fx.client.changed());
        assert_eq!(fx.secondary.range, None);
        assert_eq!(
            fx.resources.target_window(TargetKind::Client),
            Some(0)
        );
    }

    #[test]
    fn missing_secondary_unit_degrades() {
        let mut fx = Fixture::new(3);
        fx.protect(&[1]);
        fx.run();
        fx.caps.secondary_available = false;
        fx.with(|a| {
            a.secondary.range = range(1, 1);
            assert!(!a.check_ranges());
        });
        assert!(fx.secondary.changed());
        assert_eq!(fx.secondary.range, None);
    }

    #[test]
    fn windows_bound_in_z_order() {
        let mut fx = Fixture::new(4);
        fx.request_client(&[1, 2]);
        fx.run();
        let windows: Vec<_> = fx.resources.windows().collect();
        assert_eq!(
            windows,
            vec![
                (0, WindowSource::Layer(fx.layers[0].id)),
                (1, WindowSource::Target(TargetKind::Client)),
                (2, WindowSource::Layer(fx.layers[3].id)),
            ]
        );
    }

    #[test]
    fn clear_requests_for_overlapping_layers_below_client() {
        let mut fx = Fixture::new(3);
        fx.request_client(&[2]);
        fx.layers[2].display_frame = Rect::new(50.0, 50.0, 150.0, 150.0);
        fx.layers[0].display_frame = Rect::new(0.0, 0.0, 100.0, 100.0);
        fx.layers[1].display_frame = Rect::new(500.0, 500.0, 600.0, 600.0);
        fx.run();
        assert_eq!(fx.layers[0].request, Some(LayerRequest::ClearClientTarget));
        assert_eq!(fx.layers[1].request, None);
        assert_eq!(fx.layers[2].request, None);
    }

    #[test]
    fn unchanged_client_members_skip() {
        let mut fx = Fixture::new(3);
        fx.request_client(&[1]);
        let first = fx.run();
        assert!(!first.client_skip);

        // Nothing committed yet: eligible but not skipped.
        let second = fx.run();
        assert!(!second.client_skip);

        fx.client.last_committed_buffer = Some(BufferHandle(99));
        let third = fx.run();
        assert!(third.client_skip);
        assert_eq!(fx.layers[1].validated, C);
        assert_eq!(fx.layers[1].reported, HostComposition::Device);

        fx.layers[1].buffer = Some(BufferHandle(42));
        let fourth = fx.run();
        assert!(!fourth.client_skip);
        assert_eq!(fx.layers[1].reported, HostComposition::Client);
    }

    #[test]
    fn unsupported_color_transform_sends_everything_to_client() {
        let mut fx = Fixture::new(3);
        let summary = fx.run_with_transform(false);
        assert_eq!(fx.types(), vec![C, C, C]);
        assert_eq!(summary.client, range(0, 2));
    }

    #[test]
    fn bufferless_layers_go_client_unless_solid_color() {
        let mut fx = Fixture::new(3);
        fx.layers[0].buffer = None;
        fx.layers[2].buffer = None;
        fx.layers[2].requested = RequestedComposition::SolidColor;
        fx.run();
        assert_eq!(fx.types(), vec![C, D, D]);
    }

    /// Small deterministic generator for the partition sweep.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (self.0 >> 33) % bound
        }
    }

    #[test]
    fn partition_holds_across_random_stacks() {
        let mut rng = Lcg(0x5eed);
        for _ in 0..500 {
            let count = 1 + rng.next(10) as u32;
            let mut fx = Fixture::new(count);
            fx.caps.windows = 1 + rng.next(6) as usize;
            fx.config.secondary.restrict_priority_sandwich = rng.next(2) == 0;
            fx.resources = ResourceTable::new(8, rng.next(5) as f32);
            for p in 0..count as usize {
                match rng.next(6) {
                    0 => fx.request_client(&[p]),
                    1 => fx.protect(&[p]),
                    2 => fx.caps.no_overlay.push(p as u64),
                    3 => fx.layers[p].format = PixelFormat::Nv21,
                    _ => {}
                }
                if rng.next(3) == 0 {
                    fx.caps.no_secondary.push(p as u64);
                }
            }

            let summary = fx.run();
            let client = summary.client;
            let secondary = summary.secondary;
            if let (Some(c), Some(s)) = (client, secondary) {
                assert!(!c.overlaps(&s), "{c:?} overlaps {s:?}");
            }
            for (p, layer) in fx.layers.iter().enumerate() {
                let in_client = client.is_some_and(|r| r.contains(p));
                let in_secondary = secondary.is_some_and(|r| r.contains(p));
                match layer.validated {
                    C => assert!(in_client && layer.unit.is_none()),
                    S => assert!(in_secondary && layer.unit == Some(UnitId::Secondary)),
                    D => {
                        assert!(matches!(layer.unit, Some(UnitId::Overlay(_))));
                        if in_client || in_secondary {
                            assert_eq!(layer.priority, OverlayPriority::Elevated);
                        }
                        if in_secondary {
                            assert!(!fx.config.secondary.restrict_priority_sandwich);
                        }
                    }
                }
            }
            assert!(fx.resources.windows().count() <= fx.caps.windows);
            assert!(fx.resources.secondary_used() <= fx.config.secondary.capacity);
        }
    }
}
