// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deferred release of retired buffers.
//!
//! After a successful commit, buffers that were on screen in the previous
//! frame but not in this one are no longer referenced by the hardware. Their
//! release can be slow (unmapping, returning to an allocator), so present
//! only enqueues them and a dedicated worker thread hands them to a
//! [`BufferReleaser`].
//!
//! The queue is bounded. A full queue makes present block until the worker
//! catches up rather than drop a release.

use std::io;
use std::thread;

use crossbeam_channel::{self as channel, TrySendError};
use tracing::{debug, warn};

use crate::display::DisplayId;
use crate::layer::BufferHandle;

/// Returns retired buffers to their owner.
pub trait BufferReleaser: Send + 'static {
    /// Releases one buffer that `display` no longer scans out.
    fn release(&mut self, display: DisplayId, buffer: BufferHandle);
}

impl<F> BufferReleaser for F
where
    F: FnMut(DisplayId, BufferHandle) + Send + 'static,
{
    fn release(&mut self, display: DisplayId, buffer: BufferHandle) {
        self(display, buffer);
    }
}

#[derive(Debug)]
enum CleanupJob {
    Release {
        display: DisplayId,
        buffer: BufferHandle,
    },
    Shutdown,
}

/// Cloneable submission side of the cleanup queue.
#[derive(Clone, Debug)]
pub struct CleanupHandle {
    tx: channel::Sender<CleanupJob>,
}

impl CleanupHandle {
    /// Queues `buffer` for release.
    ///
    /// Blocks while the queue is full. Returns `false` if the worker has
    /// stopped, in which case the buffer was not queued.
    pub fn submit(&self, display: DisplayId, buffer: BufferHandle) -> bool {
        // `tracing` macros shadow a local named `display`; log it via another binding.
        let display_id = display;
        let job = CleanupJob::Release { display, buffer };
        let queued = match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!(display = ?display_id, ?buffer, "cleanup queue full, waiting for the worker");
                self.tx.send(job).is_ok()
            }
            Err(TrySendError::Disconnected(_)) => false,
        };
        if !queued {
            warn!(display = ?display_id, ?buffer, "cleanup worker stopped, buffer not released");
        }
        queued
    }
}

/// The cleanup worker thread.
///
/// Dropping the worker shuts it down after draining everything already
/// queued.
#[derive(Debug)]
pub struct CleanupWorker {
    tx: channel::Sender<CleanupJob>,
    thread: Option<thread::JoinHandle<usize>>,
}

impl CleanupWorker {
    /// Spawns the worker with a queue of `capacity` jobs.
    pub fn spawn(releaser: impl BufferReleaser, capacity: usize) -> io::Result<Self> {
        let (tx, rx) = channel::bounded(capacity.max(1));
        let thread = thread::Builder::new()
            .name("hwc-cleanup".to_string())
            .spawn(move || run_worker(rx, releaser))?;
        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    /// Returns a submission handle.
    #[must_use]
    pub fn handle(&self) -> CleanupHandle {
        CleanupHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stops the worker after it drains the queue and returns how many
    /// buffers it released.
    pub fn shutdown(mut self) -> usize {
        self.stop()
    }

    fn stop(&mut self) -> usize {
        let Some(thread) = self.thread.take() else {
            return 0;
        };
        if self.tx.send(CleanupJob::Shutdown).is_err() {
            warn!("cleanup worker exited before shutdown was requested");
        }
        match thread.join() {
            Ok(released) => released,
            Err(_) => {
                warn!("cleanup worker panicked");
                0
            }
        }
    }
}

impl Drop for CleanupWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(rx: channel::Receiver<CleanupJob>, mut releaser: impl BufferReleaser) -> usize {
    let mut released = 0;
    while let Ok(job) = rx.recv() {
        match job {
            CleanupJob::Release { display, buffer } => {
                releaser.release(display, buffer);
                released += 1;
            }
            CleanupJob::Shutdown => break,
        }
    }
    // Jobs queued behind the shutdown request are still released.
    for job in rx.try_iter() {
        if let CleanupJob::Release { display, buffer } = job {
            releaser.release(display, buffer);
            released += 1;
        }
    }
    debug!(released, "cleanup worker exiting");
    released
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn releases_in_order_then_shuts_down() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let worker = CleanupWorker::spawn(
            move |display: DisplayId, buffer: BufferHandle| sink.lock().push((display, buffer)),
            4,
        )
        .unwrap();

        let handle = worker.handle();
        for b in 1..=6 {
            handle.submit(DisplayId(0), BufferHandle(b));
        }
        assert_eq!(worker.shutdown(), 6);
        let seen = seen.lock();
        assert_eq!(
            seen.iter().map(|&(_, b)| b.0).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5, 6]
        );
    }

    #[test]
    fn submit_after_shutdown_is_dropped() {
        let worker = CleanupWorker::spawn(|_: DisplayId, _: BufferHandle| {}, 1).unwrap();
        let handle = worker.handle();
        assert_eq!(worker.shutdown(), 0);
        // The worker's receiver is gone; this must not block or panic.
        assert!(
            !handle.submit(DisplayId(1), BufferHandle(7)),
            "a stopped worker refuses jobs"
        );
    }

    #[test]
    fn jobs_queued_behind_shutdown_are_released() {
        let (gate_tx, gate_rx) = channel::bounded::<()>(0);
        let worker = CleanupWorker::spawn(
            move |_: DisplayId, buffer: BufferHandle| {
                if buffer.0 == 1 {
                    gate_rx.recv().ok();
                }
            },
            4,
        )
        .unwrap();
        let handle = worker.handle();

        assert!(handle.submit(DisplayId(0), BufferHandle(1)));
        // Wait for the worker to pick up the first job and block on the gate.
        while !handle.tx.is_empty() {
            thread::yield_now();
        }
        let stopper = thread::spawn(move || worker.shutdown());
        while handle.tx.len() != 1 {
            thread::yield_now();
        }
        assert!(handle.submit(DisplayId(0), BufferHandle(2)));
        gate_tx.send(()).unwrap();
        assert_eq!(stopper.join().unwrap(), 2);
    }

    #[test]
    fn drop_joins_the_worker() {
        let seen = Arc::new(Mutex::new(0_usize));
        let sink = Arc::clone(&seen);
        {
            let worker =
                CleanupWorker::spawn(move |_: DisplayId, _: BufferHandle| *sink.lock() += 1, 2)
                    .unwrap();
            worker.handle().submit(DisplayId(0), BufferHandle(1));
        }
        assert_eq!(*seen.lock(), 1);
    }
}
