// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory sync objects.

use core::time::Duration;
use std::collections::HashMap;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use super::{FenceError, RawFence, SyncProvider, WaitStatus};

/// First descriptor handed out, clear of the standard streams.
const FIRST_DESCRIPTOR: RawFence = 100;

#[derive(Clone, Copy, Debug)]
struct SyncPoint {
    signaled: bool,
    /// Open descriptors naming this point.
    refs: usize,
}

#[derive(Debug)]
struct State {
    next_descriptor: RawFence,
    next_point: u64,
    /// Open descriptor → sync point.
    open: HashMap<RawFence, u64>,
    /// Live sync points. A point is dropped with its last descriptor.
    points: HashMap<u64, SyncPoint>,
    double_closes: usize,
    waits: usize,
}

impl State {
    /// Current status of `fence`; `TimedOut` stands for "not yet signaled".
    fn status(&self, fence: RawFence) -> WaitStatus {
        match self.open.get(&fence).and_then(|p| self.points.get(p)) {
            Some(point) if point.signaled => WaitStatus::Signaled,
            Some(_) => WaitStatus::TimedOut,
            None => WaitStatus::Invalid,
        }
    }
}

/// A [`SyncProvider`] backed by signalable in-memory sync points.
///
/// Each created fence names a new sync point; [`dup`](SyncProvider::dup)
/// hands out another descriptor for the same point, so signaling reaches
/// every copy. Used for virtual displays and as the test double for kernel
/// sync files. Closing an unknown descriptor is counted instead of being
/// silently ignored so that tests can assert no double close happened.
#[derive(Debug)]
pub struct SoftwareSync {
    state: Mutex<State>,
    signaled: Condvar,
}

impl Default for SoftwareSync {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareSync {
    /// Creates a provider with no open descriptors.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_descriptor: FIRST_DESCRIPTOR,
                next_point: 0,
                open: HashMap::new(),
                points: HashMap::new(),
                double_closes: 0,
                waits: 0,
            }),
            signaled: Condvar::new(),
        }
    }

    fn create(&self, signaled: bool) -> RawFence {
        let mut state = self.state.lock();
        let point = state.next_point;
        state.next_point += 1;
        state.points.insert(point, SyncPoint { signaled, refs: 1 });
        let fd = state.next_descriptor;
        state.next_descriptor += 1;
        state.open.insert(fd, point);
        fd
    }

    /// Creates an unsignaled fence.
    pub fn create_fence(&self) -> RawFence {
        self.create(false)
    }

    /// Creates a fence that is already signaled.
    pub fn create_signaled_fence(&self) -> RawFence {
        self.create(true)
    }

    /// Signals the sync point behind `fence`, waking every waiter.
    ///
    /// Returns `false` if the descriptor is not open.
    pub fn signal(&self, fence: RawFence) -> bool {
        let mut state = self.state.lock();
        let Some(&point) = state.open.get(&fence) else {
            return false;
        };
        if let Some(p) = state.points.get_mut(&point) {
            p.signaled = true;
        }
        self.signaled.notify_all();
        true
    }

    /// Returns whether `fence` is an open descriptor.
    #[must_use]
    pub fn is_open(&self, fence: RawFence) -> bool {
        self.state.lock().open.contains_key(&fence)
    }

    /// Returns the number of open descriptors.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().open.len()
    }

    /// Returns the number of live sync points.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.state.lock().points.len()
    }

    /// Returns how many times an already-closed descriptor was closed.
    #[must_use]
    pub fn double_close_count(&self) -> usize {
        self.state.lock().double_closes
    }

    /// Returns how many waits have been started.
    #[must_use]
    pub fn wait_count(&self) -> usize {
        self.state.lock().waits
    }
}

impl SyncProvider for SoftwareSync {
    fn dup(&self, fence: RawFence) -> Result<RawFence, FenceError> {
        let mut state = self.state.lock();
        let Some(&point) = state.open.get(&fence) else {
            return Err(FenceError::NotOpen(fence));
        };
        let fd = state.next_descriptor;
        state.next_descriptor += 1;
        state.open.insert(fd, point);
        if let Some(p) = state.points.get_mut(&point) {
            p.refs += 1;
        }
        Ok(fd)
    }

    fn close(&self, fence: RawFence) {
        let mut state = self.state.lock();
        let Some(point) = state.open.remove(&fence) else {
            state.double_closes += 1;
            warn!(fence, "close of a descriptor that is not open");
            return;
        };
        if let Some(p) = state.points.get_mut(&point) {
            p.refs -= 1;
            if p.refs == 0 {
                state.points.remove(&point);
            }
        }
    }

    fn wait(&self, fence: RawFence, timeout: Duration) -> WaitStatus {
        // An unrepresentable deadline waits until the fence signals.
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        state.waits += 1;
        loop {
            let status = state.status(fence);
            if status != WaitStatus::TimedOut {
                return status;
            }
            match deadline {
                Some(deadline) => {
                    if self.signaled.wait_until(&mut state, deadline).timed_out() {
                        return state.status(fence);
                    }
                }
                None => self.signaled.wait(&mut state),
            }
        }
    }
}
