// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame instrumentation.
//!
//! A [`TraceSink`] receives one event per validate and per present, plus a
//! full [`DisplayDump`] whenever a commit fails. All methods default to
//! no-ops, so a sink only implements the events it cares about.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. With the `trace`
//! feature **off**, every `Tracer` method compiles to nothing; with it **on**,
//! each method performs one `Option` branch before dispatching.
//!
//! Structured log lines through `tracing` are emitted regardless of this
//! feature; sinks are for consumers that want typed per-frame records.

use crate::backend::CommitError;
use crate::composition::LayerRange;
use crate::display::{DisplayDump, DisplayId, ValidateReason};
use crate::fence::RawFence;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Why present did not commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentSkip {
    /// The display has no layers.
    NoLayers,
    /// The display is powered off.
    PoweredOff,
    /// The host asked to bypass this frame.
    Bypass,
}

/// How a present call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentOutcome {
    /// The frame was committed to the hardware.
    Committed,
    /// The frame was skipped; every acquire fence was waited on and closed.
    Skipped(PresentSkip),
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted at the end of every validate call.
#[derive(Clone, Copy, Debug)]
pub struct ValidateEvent {
    /// The display.
    pub display: DisplayId,
    /// Frame counter.
    pub frame_index: u64,
    /// Why assignment ran, or `None` when the previous assignment was reused.
    pub reason: Option<ValidateReason>,
    /// Client target range.
    pub client: Option<LayerRange>,
    /// Secondary target range.
    pub secondary: Option<LayerRange>,
    /// The client target reuses its previous configuration.
    pub client_skip: bool,
    /// The frame fell back to all-Client.
    pub degraded: bool,
    /// Layers demoted to Client by the merge rules.
    pub demotions: u32,
    /// Layers whose reported type differs from what the host last saw.
    pub type_changes: usize,
    /// Layers with a pending request.
    pub requests: usize,
}

impl ValidateEvent {
    /// Returns `true` if validate reused the previous assignment.
    #[must_use]
    pub fn skipped(&self) -> bool {
        self.reason.is_none()
    }
}

/// Emitted at the end of every present call that did not fail.
#[derive(Clone, Copy, Debug)]
pub struct PresentEvent {
    /// The display.
    pub display: DisplayId,
    /// Frame counter of the presented frame.
    pub frame_index: u64,
    /// Committed or skipped.
    pub outcome: PresentOutcome,
    /// Number of hardware windows programmed.
    pub windows: usize,
    /// Present fence handed to the host, or [`NO_FENCE`](crate::fence::NO_FENCE).
    pub present_fence: RawFence,
}

/// Emitted when the backend rejects a commit.
#[derive(Clone, Copy, Debug)]
pub struct CommitFailedEvent<'a> {
    /// The display.
    pub display: DisplayId,
    /// Frame counter of the failed frame.
    pub frame_index: u64,
    /// The backend's error.
    pub error: &'a CommitError,
    /// Display state at the time of failure.
    pub dump: &'a DisplayDump,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives per-frame events from a display.
///
/// All methods have default no-op implementations.
pub trait TraceSink {
    /// Called at the end of validate.
    fn on_validate(&mut self, e: &ValidateEvent) {
        _ = e;
    }

    /// Called at the end of present.
    fn on_present(&mut self, e: &PresentEvent) {
        _ = e;
    }

    /// Called when a commit fails, with a full state dump.
    fn on_commit_failed(&mut self, e: &CommitFailedEvent<'_>) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer over an optional sink.
    #[inline]
    #[must_use]
    pub fn from_option(sink: Option<&'a mut dyn TraceSink>) -> Self {
        match sink {
            Some(sink) => Self::new(sink),
            None => Self::none(),
        }
    }

    /// Emits a [`ValidateEvent`].
    #[inline]
    pub fn validate(&mut self, e: &ValidateEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_validate(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PresentEvent`].
    #[inline]
    pub fn present(&mut self, e: &PresentEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_present(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CommitFailedEvent`].
    #[inline]
    pub fn commit_failed(&mut self, e: &CommitFailedEvent<'_>) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_commit_failed(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        validates: usize,
        presents: usize,
    }

    impl TraceSink for Counting {
        fn on_validate(&mut self, _e: &ValidateEvent) {
            self.validates += 1;
        }

        fn on_present(&mut self, _e: &PresentEvent) {
            self.presents += 1;
        }
    }

    fn validate_event() -> ValidateEvent {
        ValidateEvent {
            display: DisplayId(0),
            frame_index: 3,
            reason: None,
            client: None,
            secondary: None,
            client_skip: false,
            degraded: false,
            demotions: 0,
            type_changes: 0,
            requests: 0,
        }
    }

    #[test]
    fn none_discards() {
        let mut tracer = Tracer::none();
        tracer.validate(&validate_event());
    }

    #[test]
    fn skipped_follows_reason() {
        let mut e = validate_event();
        assert!(e.skipped());
        e.reason = Some(ValidateReason::FirstFrame);
        assert!(!e.skipped());
    }

    #[cfg(feature = "trace")]
    #[test]
    fn dispatches_when_enabled() {
        let mut sink = Counting::default();
        {
            let mut tracer = Tracer::new(&mut sink);
            tracer.validate(&validate_event());
            tracer.present(&PresentEvent {
                display: DisplayId(0),
                frame_index: 3,
                outcome: PresentOutcome::Skipped(PresentSkip::NoLayers),
                windows: 0,
                present_fence: crate::fence::NO_FENCE,
            });
        }
        assert_eq!(sink.validates, 1);
        assert_eq!(sink.presents, 1);
    }

    #[cfg(not(feature = "trace"))]
    #[test]
    fn compiled_out_without_feature() {
        let mut sink = Counting::default();
        {
            let mut tracer = Tracer::new(&mut sink);
            tracer.validate(&validate_event());
        }
        assert_eq!(sink.validates, 0);
        assert_eq!(sink.presents, 0);
    }
}
