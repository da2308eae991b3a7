// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ownership ledger for open fence descriptors.

use core::time::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, warn};

use crate::config::FenceTimeouts;

use super::{Fence, FenceError, FenceHolder, NO_FENCE, RawFence, SyncProvider, WaitStatus};

/// Tracks which holder owns every open descriptor of one display.
///
/// Every descriptor that enters the display (from the host or from the
/// backend) is [adopted](Self::adopt), and every descriptor that leaves it is
/// either [closed](Self::close) or [handed off](Self::hand_off) to a
/// collaborator that assumes the obligation to close it. A descriptor the
/// ledger does not know about is never closed through it, so a stale copy of
/// a value cannot close somebody else's descriptor.
pub struct FenceLedger {
    sync: Arc<dyn SyncProvider>,
    owners: BTreeMap<RawFence, FenceHolder>,
    timeouts: FenceTimeouts,
}

impl core::fmt::Debug for FenceLedger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FenceLedger")
            .field("owners", &self.owners)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl FenceLedger {
    /// Creates an empty ledger over the given sync provider.
    #[must_use]
    pub fn new(sync: Arc<dyn SyncProvider>, timeouts: FenceTimeouts) -> Self {
        Self {
            sync,
            owners: BTreeMap::new(),
            timeouts,
        }
    }

    /// Returns the underlying sync provider.
    #[must_use]
    pub fn sync(&self) -> &dyn SyncProvider {
        &*self.sync
    }

    /// Takes ownership of a descriptor received from outside the display.
    ///
    /// Negative values yield [`Fence::NONE`]. A descriptor that is already
    /// tracked is refused and stays with the caller.
    pub fn adopt(&mut self, raw: RawFence, holder: FenceHolder) -> Result<Fence, FenceError> {
        let fence = Fence::from_raw(raw);
        if fence.is_none() {
            return Ok(fence);
        }
        if let Some(&existing) = self.owners.get(&raw) {
            return Err(FenceError::AlreadyOwned {
                fence: raw,
                holder: existing,
            });
        }
        self.owners.insert(raw, holder);
        Ok(fence)
    }

    /// Moves a fence to a new holder. The source slot becomes none.
    pub fn transfer(&mut self, from: &mut Fence, to: FenceHolder) -> Result<Fence, FenceError> {
        if from.is_none() {
            return Ok(Fence::NONE);
        }
        let Some(owner) = self.owners.get_mut(&from.raw()) else {
            return Err(FenceError::Untracked(from.raw()));
        };
        *owner = to;
        Ok(from.take())
    }

    /// Creates a second descriptor for the same sync object, owned by
    /// `holder`. Both copies must be closed independently.
    pub fn duplicate(&mut self, fence: &Fence, holder: FenceHolder) -> Result<Fence, FenceError> {
        if fence.is_none() {
            return Ok(Fence::NONE);
        }
        if !self.owners.contains_key(&fence.raw()) {
            return Err(FenceError::Untracked(fence.raw()));
        }
        let dup = self.sync.dup(fence.raw())?;
        self.adopt(dup, holder)
    }

    /// Closes the fence in `slot` and sets it to none.
    ///
    /// Closing an empty slot does nothing. An untracked descriptor is left
    /// open and reported; closing it here could close a descriptor that was
    /// already closed or belongs to someone else.
    pub fn close(&mut self, slot: &mut Fence) {
        let fence = slot.take();
        if fence.is_none() {
            return;
        }
        if self.owners.remove(&fence.raw()).is_some() {
            self.sync.close(fence.raw());
        } else {
            error!(fence = fence.raw(), "refusing to close untracked fence");
        }
    }

    /// Gives the fence in `slot` to a collaborator that will close it.
    ///
    /// Returns the raw descriptor, or [`NO_FENCE`] if the slot was empty.
    pub fn hand_off(&mut self, slot: &mut Fence) -> RawFence {
        let fence = slot.take();
        if fence.is_some() && self.owners.remove(&fence.raw()).is_none() {
            warn!(fence = fence.raw(), "handing off untracked fence");
        }
        fence.raw()
    }

    /// Duplicates the fence for a collaborator that will close the copy.
    ///
    /// The original stays owned by its current holder.
    pub fn hand_off_duplicate(&self, fence: &Fence) -> Result<RawFence, FenceError> {
        if fence.is_none() {
            return Ok(NO_FENCE);
        }
        if !self.owners.contains_key(&fence.raw()) {
            return Err(FenceError::Untracked(fence.raw()));
        }
        self.sync.dup(fence.raw())
    }

    /// Waits for the fence to signal.
    ///
    /// The first wait lasts the nominal number of vsync periods. If that
    /// times out the wait escalates once; a second timeout is logged as a
    /// correctness violation and reported as [`WaitStatus::TimedOut`]. Waits
    /// never block indefinitely.
    pub fn wait(&self, fence: &Fence, vsync_period: Duration) -> WaitStatus {
        if fence.is_none() {
            return WaitStatus::Signaled;
        }
        let nominal = self.timeouts.nominal(vsync_period);
        match self.sync.wait(fence.raw(), nominal) {
            WaitStatus::TimedOut => {}
            status => return status,
        }
        warn!(
            fence = fence.raw(),
            waited_ms = nominal.as_millis(),
            "fence wait timed out, escalating"
        );
        let status = self.sync.wait(fence.raw(), self.timeouts.escalation);
        if status == WaitStatus::TimedOut {
            error!(
                fence = fence.raw(),
                holder = ?self.owners.get(&fence.raw()),
                "fence never signaled within the escalated timeout"
            );
        }
        status
    }

    /// Returns the holder that owns `raw`, if it is tracked.
    #[must_use]
    pub fn holder(&self, raw: RawFence) -> Option<FenceHolder> {
        self.owners.get(&raw).copied()
    }

    /// Returns the number of open descriptors owned by this display.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.owners.len()
    }

    /// Returns the number of open descriptors whose holder does not match
    /// `exclude`.
    #[must_use]
    pub fn outstanding_except(&self, exclude: impl Fn(&FenceHolder) -> bool) -> usize {
        self.owners.values().filter(|h| !exclude(h)).count()
    }
}
