// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pretty-printing, JSON dumps and log setup for hwcomposer diagnostics.
//!
//! This crate provides [`TraceSink`](hwcomposer_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output,
//!   with the full display dump on commit failure.
//! - [`dump::JsonDumpSink`]: one JSON record per failed commit, built by
//!   [`dump::to_json`].
//! - [`logging`]: installs a `tracing` subscriber filtered by `RUST_LOG`.
//!
//! Both sinks are `Send` with their default writer, so they can be installed
//! directly on a display:
//!
//! ```no_run
//! # fn install(display: &mut hwcomposer_core::display::Display) {
//! use hwcomposer_debug::pretty::PrettyPrintSink;
//!
//! display.set_trace_sink(Some(Box::new(PrettyPrintSink::stderr())));
//! # }
//! ```

pub mod dump;
pub mod logging;
pub mod pretty;
