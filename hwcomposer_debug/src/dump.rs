// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON export of display dumps.
//!
//! [`to_json`] converts a [`DisplayDump`] into a [`serde_json::Value`];
//! [`write`] serializes it to a writer. [`JsonDumpSink`] is a [`TraceSink`]
//! that writes one dump per failed commit, so post-mortem tooling can load
//! the exact state the backend rejected.

use std::io::{self, Write};

use serde_json::{Value, json};

use hwcomposer_core::composition::{LayerRange, WindowSource};
use hwcomposer_core::display::{DisplayDump, LayerDump, TargetDump};
use hwcomposer_core::trace::{CommitFailedEvent, TraceSink};
use kurbo::Rect;

fn range(r: Option<LayerRange>) -> Value {
    match r {
        Some(r) => json!([r.first, r.last]),
        None => Value::Null,
    }
}

fn rect(r: Rect) -> Value {
    json!([r.x0, r.y0, r.x1, r.y1])
}

fn target(t: &TargetDump) -> Value {
    json!({
        "range": range(t.range),
        "skip": t.skip,
        "cache": format!("{:?}", t.cache),
        "buffer": t.buffer.map(|b| b.0),
        "changed": t.changed,
    })
}

fn layer(l: &LayerDump) -> Value {
    json!({
        "id": format!("{:?}", l.id),
        "position": l.position,
        "buffer": l.buffer.map(|b| b.0),
        "format": format!("{:?}", l.format),
        "source_crop": rect(l.source_crop),
        "display_frame": rect(l.display_frame),
        "z_order": l.z_order,
        "requested": format!("{:?}", l.requested),
        "validated": format!("{:?}", l.validated),
        "actual": format!("{:?}", l.actual),
        "reported": format!("{:?}", l.reported),
        "priority": format!("{:?}", l.priority),
        "unit": l.unit.map(|u| format!("{u:?}")),
        "acquire_fence": l.acquire_fence,
        "release_fence": l.release_fence,
        "request": l.request.map(|r| format!("{r:?}")),
    })
}

fn window(slot: u32, source: WindowSource) -> Value {
    let source = match source {
        WindowSource::Layer(id) => format!("{id:?}"),
        WindowSource::Target(kind) => format!("{kind:?}"),
    };
    json!({ "slot": slot, "source": source })
}

/// Converts a dump into a JSON object.
///
/// Enum-valued fields are rendered with their `Debug` names; rectangles are
/// `[x0, y0, x1, y1]` arrays and ranges are `[first, last]` or `null`.
#[must_use]
pub fn to_json(dump: &DisplayDump) -> Value {
    json!({
        "display": dump.display.0,
        "kind": format!("{:?}", dump.kind),
        "power": format!("{:?}", dump.power),
        "state": format!("{:?}", dump.state),
        "frame_index": dump.frame_index,
        "client": target(&dump.client),
        "secondary": target(&dump.secondary),
        "layers": dump.layers.iter().map(layer).collect::<Vec<_>>(),
        "windows": dump
            .windows
            .iter()
            .map(|&(slot, source)| window(slot, source))
            .collect::<Vec<_>>(),
        "outstanding_fences": dump.outstanding_fences,
        "secondary_used": dump.secondary_used,
    })
}

/// Writes a dump as pretty-printed JSON.
pub fn write(dump: &DisplayDump, writer: &mut dyn Write) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, &to_json(dump))?;
    writeln!(writer)
}

/// Writes a JSON dump for every failed commit.
///
/// Each record is an object with `frame_index`, `error` and `dump` keys,
/// followed by a newline.
pub struct JsonDumpSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
    written: usize,
}

impl<W: Write> std::fmt::Debug for JsonDumpSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonDumpSink")
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}

impl JsonDumpSink {
    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self::with_writer(writer)
    }
}

impl<W: Write> JsonDumpSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of dumps written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Returns the destination, consuming the sink.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<W: Write> TraceSink for JsonDumpSink<W> {
    fn on_commit_failed(&mut self, e: &CommitFailedEvent<'_>) {
        let record = json!({
            "frame_index": e.frame_index,
            "error": e.error.to_string(),
            "dump": to_json(e.dump),
        });
        let result = serde_json::to_writer(&mut self.writer, &record)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(self.writer));
        match result {
            Ok(()) => self.written += 1,
            Err(err) => tracing::warn!(display = e.dump.display.0, %err, "failed to write dump"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwcomposer_core::backend::CommitError;
    use hwcomposer_core::composition::{CacheState, TargetKind};
    use hwcomposer_core::display::{DisplayId, DisplayKind, FrameState, PowerMode};
    use hwcomposer_core::layer::BufferHandle;

    fn empty_target() -> TargetDump {
        TargetDump {
            range: None,
            skip: false,
            cache: CacheState::Uninitialized,
            buffer: None,
            changed: false,
        }
    }

    fn sample() -> DisplayDump {
        DisplayDump {
            display: DisplayId(2),
            kind: DisplayKind::Primary,
            power: PowerMode::On,
            state: FrameState::Validated,
            frame_index: 41,
            client: TargetDump {
                range: Some(LayerRange { first: 1, last: 2 }),
                skip: true,
                cache: CacheState::SkipEligible,
                buffer: Some(BufferHandle(0x10)),
                changed: false,
            },
            secondary: empty_target(),
            layers: Vec::new(),
            windows: vec![(0, WindowSource::Target(TargetKind::Client))],
            outstanding_fences: 3,
            secondary_used: 0.0,
        }
    }

    #[test]
    fn dump_fields_are_exported() {
        let value = to_json(&sample());
        assert_eq!(value["display"], 2);
        assert_eq!(value["state"], "Validated");
        assert_eq!(value["frame_index"], 41);
        assert_eq!(value["client"]["range"], json!([1, 2]));
        assert_eq!(value["client"]["cache"], "SkipEligible");
        assert_eq!(value["client"]["buffer"], 16);
        assert!(value["secondary"]["range"].is_null(), "empty range is null");
        assert_eq!(value["windows"][0]["source"], "Client");
        assert_eq!(value["outstanding_fences"], 3);
    }

    #[test]
    fn written_dump_parses_back() {
        let mut out = Vec::new();
        write(&sample(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, to_json(&sample()));
    }

    #[test]
    fn sink_writes_one_record_per_failure() {
        let dump = sample();
        let error = CommitError::Device(-22);
        let mut sink = JsonDumpSink::with_writer(Vec::<u8>::new());
        for frame_index in [41, 42] {
            sink.on_commit_failed(&CommitFailedEvent {
                display: dump.display,
                frame_index,
                error: &error,
                dump: &dump,
            });
        }
        assert_eq!(sink.written(), 2);

        let text = String::from_utf8(sink.into_writer()).unwrap();
        let records: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2, "got: {text}");
        assert_eq!(records[1]["frame_index"], 42);
        assert_eq!(records[0]["error"], "device error -22");
        assert_eq!(records[0]["dump"]["display"], 2);
    }
}
