// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). A failed
//! commit additionally writes the full display dump, indented under the
//! event line.

use std::io::{self, Write};

use hwcomposer_core::composition::LayerRange;
use hwcomposer_core::trace::{
    CommitFailedEvent, PresentEvent, PresentOutcome, TraceSink, ValidateEvent,
};
use tracing::warn;

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the destination, consuming the sink.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn range(r: Option<LayerRange>) -> String {
    r.map_or_else(|| "-".to_owned(), |r| format!("{r:?}"))
}

impl<W: Write> PrettyPrintSink<W> {
    fn write_validate(&mut self, e: &ValidateEvent) -> io::Result<()> {
        let reason = match e.reason {
            Some(reason) => format!("{reason:?}"),
            None => "skipped".to_owned(),
        };
        let mut flags = String::new();
        if e.client_skip {
            flags.push_str(" client-skip");
        }
        if e.degraded {
            flags.push_str(" DEGRADED");
        }
        writeln!(
            self.writer,
            "[validate] {:?} frame={} reason={reason} client={} secondary={} \
             demotions={} changes={} requests={}{flags}",
            e.display,
            e.frame_index,
            range(e.client),
            range(e.secondary),
            e.demotions,
            e.type_changes,
            e.requests,
        )
    }

    fn write_present(&mut self, e: &PresentEvent) -> io::Result<()> {
        let outcome = match e.outcome {
            PresentOutcome::Committed => "committed".to_owned(),
            PresentOutcome::Skipped(why) => format!("skipped({why:?})"),
        };
        writeln!(
            self.writer,
            "[present] {:?} frame={} {outcome} windows={} fence={}",
            e.display, e.frame_index, e.windows, e.present_fence,
        )
    }

    fn write_commit_failed(&mut self, e: &CommitFailedEvent<'_>) -> io::Result<()> {
        writeln!(
            self.writer,
            "[commit-failed] {:?} frame={} error={}",
            e.display, e.frame_index, e.error,
        )?;
        for line in e.dump.to_string().lines() {
            writeln!(self.writer, "    {line}")?;
        }
        Ok(())
    }
}

fn report(result: io::Result<()>) {
    if let Err(err) = result {
        warn!(%err, "trace output failed");
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_validate(&mut self, e: &ValidateEvent) {
        report(self.write_validate(e));
    }

    fn on_present(&mut self, e: &PresentEvent) {
        report(self.write_present(e));
    }

    fn on_commit_failed(&mut self, e: &CommitFailedEvent<'_>) {
        report(self.write_commit_failed(e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwcomposer_core::backend::CommitError;
    use hwcomposer_core::composition::{CacheState, TargetKind, WindowSource};
    use hwcomposer_core::display::{
        DisplayDump, DisplayId, DisplayKind, FrameState, PowerMode, TargetDump, ValidateReason,
    };
    use hwcomposer_core::trace::PresentSkip;

    #[test]
    fn pretty_print_validate() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_validate(&ValidateEvent {
            display: DisplayId(1),
            frame_index: 7,
            reason: Some(ValidateReason::GeometryChanged),
            client: Some(LayerRange { first: 1, last: 3 }),
            secondary: None,
            client_skip: false,
            degraded: true,
            demotions: 2,
            type_changes: 3,
            requests: 0,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.starts_with("[validate]"), "got: {output}");
        assert!(output.contains("frame=7"), "got: {output}");
        assert!(output.contains("client=[1, 3]"), "got: {output}");
        assert!(output.contains("secondary=-"), "got: {output}");
        assert!(output.contains("DEGRADED"), "got: {output}");
    }

    #[test]
    fn pretty_print_skipped_present() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_present(&PresentEvent {
            display: DisplayId(0),
            frame_index: 2,
            outcome: PresentOutcome::Skipped(PresentSkip::Bypass),
            windows: 0,
            present_fence: -1,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.contains("skipped(Bypass)"), "got: {output}");
        assert!(output.contains("fence=-1"), "got: {output}");
    }

    /// Fails every write and counts the attempts.
    #[derive(Default)]
    struct Broken {
        attempts: usize,
    }

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_stop_the_event() {
        let target = TargetDump {
            range: None,
            skip: false,
            cache: CacheState::Uninitialized,
            buffer: None,
            changed: false,
        };
        let dump = DisplayDump {
            display: DisplayId(0),
            kind: DisplayKind::Primary,
            power: PowerMode::On,
            state: FrameState::AcceptedChange,
            frame_index: 9,
            client: target.clone(),
            secondary: target,
            layers: Vec::new(),
            windows: vec![(0, WindowSource::Target(TargetKind::Client))],
            outstanding_fences: 0,
            secondary_used: 0.0,
        };
        let mut sink = PrettyPrintSink::with_writer(Broken::default());
        sink.on_commit_failed(&CommitFailedEvent {
            display: dump.display,
            frame_index: 9,
            error: &CommitError::Timeout,
            dump: &dump,
        });
        assert_eq!(
            sink.into_writer().attempts,
            1,
            "the dump lines are not attempted after the header fails"
        );
    }
}
