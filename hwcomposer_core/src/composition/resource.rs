// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hardware unit reservations.
//!
//! Bindings are non-owning in both directions: a [`Layer`] records the
//! [`UnitId`] it is bound to, and the [`ResourceTable`] records layer ids
//! (or target kinds) per unit. Every bind releases the previous binding
//! first, so a layer is never bound to two units at once.

use tracing::trace;

use crate::layer::{Layer, LayerId};

use super::target::TargetKind;

/// A hardware unit a layer can be bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitId {
    /// An overlay window, by slot.
    Overlay(u32),
    /// The secondary blender.
    Secondary,
}

/// What an overlay window scans out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WindowSource {
    /// A Device layer.
    Layer(LayerId),
    /// A composition target.
    Target(TargetKind),
}

/// Overlay window slots and the secondary blender's capacity budget.
#[derive(Debug)]
pub struct ResourceTable {
    overlays: Vec<Option<WindowSource>>,
    secondary_members: Vec<(LayerId, f32)>,
    secondary_capacity: f32,
    secondary_used: f32,
}

impl ResourceTable {
    /// Creates a table with `windows` overlay slots and the given secondary
    /// capacity.
    #[must_use]
    pub fn new(windows: usize, secondary_capacity: f32) -> Self {
        Self {
            overlays: vec![None; windows],
            secondary_members: Vec::new(),
            secondary_capacity,
            secondary_used: 0.0,
        }
    }

    /// Drops every reservation and resizes the overlay slots.
    ///
    /// Layers' back-references must be cleared by the caller.
    pub fn reset(&mut self, windows: usize) {
        self.overlays.clear();
        self.overlays.resize(windows, None);
        self.secondary_members.clear();
        self.secondary_used = 0.0;
    }

    /// Number of overlay slots.
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.overlays.len()
    }

    /// Returns `true` if `cost` fits in the remaining secondary budget.
    #[must_use]
    pub fn fits(&self, cost: f32) -> bool {
        cost <= self.secondary_capacity - self.secondary_used
    }

    /// Capacity consumed by the current secondary members.
    #[must_use]
    pub fn secondary_used(&self) -> f32 {
        self.secondary_used
    }

    /// Layers bound to the secondary blender.
    pub fn secondary_members(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.secondary_members.iter().map(|&(id, _)| id)
    }

    /// Returns what an overlay slot scans out.
    #[must_use]
    pub fn overlay(&self, slot: u32) -> Option<WindowSource> {
        self.overlays.get(slot as usize).copied().flatten()
    }

    /// Iterates the occupied overlay slots.
    pub fn windows(&self) -> impl Iterator<Item = (u32, WindowSource)> + '_ {
        self.overlays.iter().enumerate().filter_map(|(slot, source)| {
            let slot = u32::try_from(slot).ok()?;
            source.map(|s| (slot, s))
        })
    }

    /// Returns the slot a target is bound to.
    #[must_use]
    pub fn target_window(&self, kind: TargetKind) -> Option<u32> {
        self.windows()
            .find(|&(_, source)| source == WindowSource::Target(kind))
            .map(|(slot, _)| slot)
    }

    /// Releases whatever unit `layer` is bound to.
    pub fn release(&mut self, layer: &mut Layer) {
        match layer.unit.take() {
            Some(UnitId::Overlay(slot)) => {
                if let Some(entry) = self.overlays.get_mut(slot as usize) {
                    *entry = None;
                }
            }
            Some(UnitId::Secondary) => {
                if let Some(pos) = self
                    .secondary_members
                    .iter()
                    .position(|&(id, _)| id == layer.id)
                {
                    let (_, cost) = self.secondary_members.swap_remove(pos);
                    self.secondary_used = (self.secondary_used - cost).max(0.0);
                }
            }
            None => {}
        }
    }

    /// Binds `layer` to the secondary blender if `cost` fits.
    ///
    /// The previous binding is released first in either case.
    pub fn bind_secondary(&mut self, layer: &mut Layer, cost: f32) -> bool {
        self.release(layer);
        if !self.fits(cost) {
            trace!(layer = ?layer.id, cost, used = self.secondary_used, "secondary budget exhausted");
            return false;
        }
        self.secondary_members.push((layer.id, cost));
        self.secondary_used += cost;
        layer.unit = Some(UnitId::Secondary);
        true
    }

    /// Binds `layer` to the first free overlay window.
    pub fn bind_overlay(&mut self, layer: &mut Layer) -> Option<u32> {
        self.release(layer);
        let slot = self.claim(WindowSource::Layer(layer.id))?;
        layer.unit = Some(UnitId::Overlay(slot));
        Some(slot)
    }

    /// Binds a composition target to the first free overlay window.
    pub fn bind_target(&mut self, kind: TargetKind) -> Option<u32> {
        self.release_target(kind);
        self.claim(WindowSource::Target(kind))
    }

    /// Releases a target's overlay window.
    pub fn release_target(&mut self, kind: TargetKind) {
        for entry in &mut self.overlays {
            if *entry == Some(WindowSource::Target(kind)) {
                *entry = None;
            }
        }
    }

    fn claim(&mut self, source: WindowSource) -> Option<u32> {
        let slot = self.overlays.iter().position(Option::is_none)?;
        self.overlays[slot] = Some(source);
        u32::try_from(slot).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(idx: u32) -> Layer {
        Layer::new(LayerId {
            idx,
            generation: 0,
        })
    }

    #[test]
    fn secondary_budget() {
        let mut table = ResourceTable::new(4, 2.0);
        let mut a = layer(0);
        let mut b = layer(1);
        let mut c = layer(2);
        assert!(table.bind_secondary(&mut a, 1.0));
        assert!(table.bind_secondary(&mut b, 1.0));
        assert!(!table.bind_secondary(&mut c, 0.5), "budget is spent");
        assert_eq!(c.unit, None);
        assert_eq!(table.secondary_used(), 2.0);

        table.release(&mut a);
        assert_eq!(a.unit, None);
        assert!(table.fits(1.0));
        assert_eq!(table.secondary_members().collect::<Vec<_>>(), vec![b.id]);
    }

    #[test]
    fn rebinding_releases_first() {
        let mut table = ResourceTable::new(2, 1.0);
        let mut a = layer(0);
        assert_eq!(table.bind_overlay(&mut a), Some(0));
        assert!(table.bind_secondary(&mut a, 1.0));
        assert_eq!(a.unit, Some(UnitId::Secondary));
        assert_eq!(table.overlay(0), None, "overlay slot was released");
        assert_eq!(table.bind_overlay(&mut a), Some(0));
        assert_eq!(table.secondary_used(), 0.0);
    }

    #[test]
    fn overlay_slots_run_out() {
        let mut table = ResourceTable::new(2, 0.0);
        let mut a = layer(0);
        let mut b = layer(1);
        assert_eq!(table.bind_target(TargetKind::Client), Some(0));
        assert_eq!(table.bind_overlay(&mut a), Some(1));
        assert_eq!(table.bind_overlay(&mut b), None);
        assert_eq!(b.unit, None);
        assert_eq!(table.target_window(TargetKind::Client), Some(0));
        assert_eq!(
            table.windows().collect::<Vec<_>>(),
            vec![
                (0, WindowSource::Target(TargetKind::Client)),
                (1, WindowSource::Layer(a.id)),
            ]
        );
    }

    #[test]
    fn reset_clears_everything() {
        let mut table = ResourceTable::new(2, 1.0);
        let mut a = layer(0);
        table.bind_secondary(&mut a, 1.0);
        table.bind_target(TargetKind::Secondary);
        table.reset(3);
        assert_eq!(table.window_count(), 3);
        assert_eq!(table.windows().count(), 0);
        assert_eq!(table.secondary_used(), 0.0);
    }
}
