// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame decision core of a display composition HAL.
//!
//! `hwcomposer_core` decides, for every frame, which layers the display
//! hardware scans out directly, which ones a secondary blending unit merges,
//! and which ones the window-system host must render itself. It drives the
//! validate → accept → present cycle the host expects and keeps strict
//! ownership of every synchronization fence that passes through a frame.
//!
//! # Architecture
//!
//! ```text
//!   Host setters ──► LayerSet (dirty channels)
//!                        │
//!                        ▼
//!   validate() ──► ValidateGuard ──► Assigner ──► targets + ResourceTable
//!                                                      │
//!                 ┌────────────────────────────────────┘
//!                 ▼
//!   accept_changes() ──► present() ──► FrameConfig ──► HardwareBackend
//!                                                          │
//!                 ┌────────────────────────────────────────┘
//!                 ▼
//!   CommitOutcome ──► FenceLedger ──► release fences / present fence
//!                          │
//!                          └──► CleanupWorker (retired buffers)
//! ```
//!
//! **[`layer`]**: Arena of layers with generational handles, kept in
//! z-order. Setters mark the GEOMETRY or CONTENT channel only on change.
//!
//! **[`dirty`]**: Channel constants for `understory_dirty`.
//!
//! **[`composition`]**: The two composition targets, the hardware unit
//! reservations, the static layer cache and the assigner.
//!
//! **[`display`]**: The per-display state machine, the validate and present
//! guards, diagnostic dumps, and the thread-safe [`Hwc`](display::Hwc)
//! registry.
//!
//! **[`fence`]**: Move-only fence handles, the per-display
//! [`FenceLedger`](fence::FenceLedger) and an in-memory sync provider.
//!
//! **[`backend`]**: The [`HardwareBackend`](backend::HardwareBackend) and
//! [`Capabilities`](backend::Capabilities) traits and the frame records
//! exchanged with them.
//!
//! **[`cleanup`]**: Bounded queue and worker thread for retired buffers.
//!
//! **[`config`]**: Per-display tuning.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! per-frame instrumentation, with a [`Tracer`](trace::Tracer) wrapper that
//! compiles away when the feature is off.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one
//!   branch per call site).

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod backend;
pub mod cleanup;
pub mod composition;
pub mod config;
pub mod dirty;
pub mod display;
pub mod error;
pub mod fence;
pub mod layer;
pub mod trace;

#[cfg(test)]
mod testing;
