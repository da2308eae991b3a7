// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Synchronization fences and their ownership ledger.
//!
//! A fence is an integer descriptor naming a kernel (or software) sync
//! object, or the sentinel [`NO_FENCE`]. Two kinds flow through a frame:
//!
//! - **acquire** fences are signaled by the producer of a buffer and must be
//!   waited on before the buffer is read;
//! - **release** fences are signaled by the consumer once it is done reading
//!   and are returned to the producer.
//!
//! At any instant a descriptor has exactly one owner. [`Fence`] is therefore
//! a move-only handle: it is not `Clone`, and moving it out of a slot with
//! [`Fence::take`] leaves [`Fence::NONE`] behind. Creating a second
//! descriptor for the same sync object goes through
//! [`FenceLedger::duplicate`], after which both holders close their copy
//! independently.
//!
//! The [`FenceLedger`] records which logical [`FenceHolder`] owns each open
//! descriptor. It is the only component that calls [`SyncProvider::close`],
//! which is how double closes are ruled out.

mod ledger;
mod software;

use core::fmt;
use core::time::Duration;

use thiserror::Error;

use crate::composition::TargetKind;
use crate::layer::LayerId;

pub use ledger::FenceLedger;
pub use software::SoftwareSync;

/// A raw fence descriptor as exchanged with the host and the hardware.
pub type RawFence = i32;

/// The "no fence" sentinel.
pub const NO_FENCE: RawFence = -1;

/// An owned fence descriptor, or none.
#[derive(PartialEq, Eq, Hash)]
pub struct Fence(RawFence);

impl Fence {
    /// The empty fence.
    pub const NONE: Self = Self(NO_FENCE);

    /// Wraps a raw descriptor. Any negative value becomes [`Fence::NONE`].
    pub(crate) const fn from_raw(raw: RawFence) -> Self {
        if raw < 0 { Self::NONE } else { Self(raw) }
    }

    /// Returns the raw descriptor (or [`NO_FENCE`]).
    #[inline]
    #[must_use]
    pub const fn raw(&self) -> RawFence {
        self.0
    }

    /// Returns `true` if this slot holds no descriptor.
    #[inline]
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.0 < 0
    }

    /// Returns `true` if this slot holds a descriptor.
    #[inline]
    #[must_use]
    pub const fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Moves the descriptor out, leaving [`Fence::NONE`] in its place.
    #[inline]
    pub(crate) fn take(&mut self) -> Self {
        core::mem::replace(self, Self::NONE)
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("Fence(none)")
        } else {
            write!(f, "Fence({})", self.0)
        }
    }
}

/// The logical owner of an open fence descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FenceHolder {
    /// A layer's acquire fence, received from the host with its buffer.
    LayerAcquire(LayerId),
    /// A layer's release fence, waiting to be collected by the host.
    LayerRelease(LayerId),
    /// A composition target's acquire fence.
    TargetAcquire(TargetKind),
    /// A composition target's release fence.
    TargetRelease(TargetKind),
    /// A member layer's acquire fence moved into a composition target.
    TargetMember(TargetKind, LayerId),
    /// The frame's present fence, in transit to the host.
    Present,
}

/// Outcome of a bounded wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    /// The fence signaled within the timeout.
    Signaled,
    /// The timeout elapsed first.
    TimedOut,
    /// The descriptor does not name an open fence.
    Invalid,
}

/// Errors raised by fence bookkeeping.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FenceError {
    /// The descriptor is not open in the sync provider.
    #[error("fence {0} is not open")]
    NotOpen(RawFence),
    /// The sync provider could not duplicate the descriptor.
    #[error("failed to duplicate fence {0}")]
    Dup(RawFence),
    /// The descriptor is already owned by another holder.
    #[error("fence {fence} is already owned by {holder:?}")]
    AlreadyOwned {
        /// The descriptor.
        fence: RawFence,
        /// Its current owner.
        holder: FenceHolder,
    },
    /// The descriptor was never adopted by this ledger.
    #[error("fence {0} is not tracked by this ledger")]
    Untracked(RawFence),
}

/// Access to the platform's sync objects.
///
/// Implementations wrap kernel sync files on device and [`SoftwareSync`] in
/// tests and on virtual displays. All methods take `&self`; implementations
/// are shared between the display and its backend.
pub trait SyncProvider: Send + Sync {
    /// Creates a new descriptor referencing the same sync object.
    fn dup(&self, fence: RawFence) -> Result<RawFence, FenceError>;

    /// Closes a descriptor.
    fn close(&self, fence: RawFence);

    /// Blocks until the fence signals or `timeout` elapses.
    fn wait(&self, fence: RawFence, timeout: Duration) -> WaitStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_raw_values_are_none() {
        assert!(Fence::from_raw(-1).is_none());
        assert!(Fence::from_raw(-7).is_none());
        assert_eq!(Fence::from_raw(-7).raw(), NO_FENCE);
        assert!(Fence::from_raw(0).is_some());
    }

    #[test]
    fn take_leaves_none_behind() {
        let mut slot = Fence::from_raw(12);
        let moved = slot.take();
        assert_eq!(moved.raw(), 12);
        assert!(slot.is_none());
    }

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", Fence::NONE), "Fence(none)");
        assert_eq!(format!("{:?}", Fence::from_raw(3)), "Fence(3)");
    }
}
