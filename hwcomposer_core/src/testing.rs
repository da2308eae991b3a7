// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test doubles shared by the crate's unit tests.

use std::sync::Arc;

use kurbo::Rect;
use parking_lot::Mutex;

use crate::backend::{Capabilities, CommitError, CommitOutcome, FrameConfig, HardwareBackend};
use crate::config::HwcConfig;
use crate::display::{ColorTransform, Display, DisplayId, DisplayKind};
use crate::fence::{RawFence, SoftwareSync};
use crate::layer::{Layer, LayerFlags, LayerId, PixelFormat};

/// Knobs and recordings of a [`MockBackend`], shared with the test.
#[derive(Debug)]
pub(crate) struct MockState {
    pub(crate) max_windows: usize,
    pub(crate) secondary: bool,
    /// Buffer ids that cannot be scanned out directly.
    pub(crate) no_overlay: Vec<u64>,
    /// Buffer ids the secondary blender rejects.
    pub(crate) no_secondary: Vec<u64>,
    pub(crate) color_transform: bool,
    pub(crate) fail_next_commit: Option<CommitError>,
    /// Return release fences that never signal.
    pub(crate) unsignaled_releases: bool,
    /// Return the first window's release fence as the present fence too.
    pub(crate) present_aliases_release: bool,
    pub(crate) commits: Vec<FrameConfig>,
    pub(crate) panics: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            max_windows: 4,
            secondary: true,
            no_overlay: Vec::new(),
            no_secondary: Vec::new(),
            color_transform: false,
            fail_next_commit: None,
            unsignaled_releases: false,
            present_aliases_release: false,
            commits: Vec::new(),
            panics: Vec::new(),
        }
    }
}

/// A backend that records frames and answers with software fences.
///
/// Every descriptor in a committed frame is closed immediately, the way a
/// driver would after importing it.
#[derive(Debug)]
pub(crate) struct MockBackend {
    pub(crate) state: Arc<Mutex<MockState>>,
    pub(crate) sync: Arc<SoftwareSync>,
}

fn buffer_id(layer: &Layer) -> u64 {
    layer.buffer.map_or(u64::MAX, |b| b.0)
}

impl Capabilities for MockBackend {
    fn max_windows(&self) -> usize {
        self.state.lock().max_windows
    }

    fn display_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, 1080.0, 1920.0)
    }

    fn supports_overlay(&self, layer: &Layer) -> bool {
        !self.state.lock().no_overlay.contains(&buffer_id(layer))
    }

    fn supports_secondary(&self, layer: &Layer) -> bool {
        let state = self.state.lock();
        state.secondary && !state.no_secondary.contains(&buffer_id(layer))
    }

    fn secondary_available(&self) -> bool {
        self.state.lock().secondary
    }

    fn supports_color_transform(&self, _transform: &ColorTransform) -> bool {
        self.state.lock().color_transform
    }
}

impl HardwareBackend for MockBackend {
    fn commit(&mut self, frame: FrameConfig) -> Result<CommitOutcome, CommitError> {
        frame.close_fences(&*self.sync);
        let mut state = self.state.lock();
        let slots: Vec<u32> = frame.windows.iter().map(|w| w.slot).collect();
        state.commits.push(frame);
        if let Some(err) = state.fail_next_commit.take() {
            return Err(err);
        }
        let release = |sync: &SoftwareSync| {
            if state.unsignaled_releases {
                sync.create_fence()
            } else {
                sync.create_signaled_fence()
            }
        };
        let window_release_fences: Vec<(u32, RawFence)> = slots
            .into_iter()
            .map(|slot| (slot, release(&self.sync)))
            .collect();
        let present_fence = match window_release_fences.first() {
            Some(&(_, fence)) if state.present_aliases_release => fence,
            _ => self.sync.create_signaled_fence(),
        };
        Ok(CommitOutcome {
            present_fence,
            window_release_fences,
        })
    }

    fn force_panic(&mut self, reason: &str) {
        self.state.lock().panics.push(reason.to_owned());
    }
}

/// A display wired to a [`MockBackend`].
#[derive(Debug)]
pub(crate) struct Rig {
    pub(crate) display: Display,
    pub(crate) sync: Arc<SoftwareSync>,
    pub(crate) backend: Arc<Mutex<MockState>>,
}

impl Rig {
    pub(crate) fn new() -> Self {
        Self::with(DisplayKind::Primary, HwcConfig::new(), MockState::default())
    }

    pub(crate) fn with(kind: DisplayKind, config: HwcConfig, state: MockState) -> Self {
        let sync = Arc::new(SoftwareSync::new());
        let backend = Arc::new(Mutex::new(state));
        let display = Display::new(
            DisplayId(0),
            kind,
            config,
            Box::new(MockBackend {
                state: Arc::clone(&backend),
                sync: Arc::clone(&sync),
            }),
            sync.clone(),
        );
        Self {
            display,
            sync,
            backend,
        }
    }

    /// Creates a layer with buffer `buffer`, z-order `z` and a signaled
    /// acquire fence. Frames are laid out side by side.
    pub(crate) fn layer(&mut self, buffer: u64, z: u32) -> LayerId {
        let id = self.display.create_layer();
        self.buffer(id, buffer);
        let x = f64::from(z) * 100.0;
        self.display
            .set_layer_display_frame(id, Rect::new(x, 0.0, x + 90.0, 90.0))
            .unwrap();
        self.display
            .set_layer_source_crop(id, Rect::new(0.0, 0.0, 90.0, 90.0))
            .unwrap();
        self.display.set_layer_z_order(id, z).unwrap();
        id
    }

    /// Queues a new buffer on `id` with a signaled acquire fence.
    pub(crate) fn buffer(&mut self, id: LayerId, buffer: u64) -> RawFence {
        let fence = self.sync.create_signaled_fence();
        self.display
            .set_layer_buffer(
                id,
                Some(crate::layer::BufferHandle(buffer)),
                PixelFormat::Rgba8888,
                fence,
            )
            .unwrap();
        fence
    }

    pub(crate) fn protect(&mut self, id: LayerId) {
        self.display
            .set_layer_flags(
                id,
                LayerFlags {
                    protected: true,
                    ..LayerFlags::default()
                },
            )
            .unwrap();
    }

    /// Supplies a client target buffer with a signaled acquire fence.
    pub(crate) fn client_target(&mut self, buffer: u64) {
        let fence = self.sync.create_signaled_fence();
        self.display
            .set_client_target(
                Some(crate::layer::BufferHandle(buffer)),
                fence,
                crate::layer::Dataspace::UNKNOWN,
            )
            .unwrap();
    }

    /// Runs validate, accept and present, then closes the present fence and
    /// every release fence the way a host would.
    pub(crate) fn frame(&mut self) -> RawFence {
        self.display.validate().unwrap();
        self.display.accept_changes().unwrap();
        let present = self.display.present().unwrap();
        self.host_close(present);
        present
    }

    /// Closes a fence handed to the host, plus all pending release fences.
    pub(crate) fn host_close(&mut self, present: RawFence) {
        use crate::fence::{NO_FENCE, SyncProvider};
        if present != NO_FENCE {
            self.sync.close(present);
        }
        for (_, fence) in self.display.take_release_fences() {
            self.sync.close(fence);
        }
    }

    pub(crate) fn commits(&self) -> usize {
        self.backend.lock().commits.len()
    }

    pub(crate) fn last_commit(&self) -> FrameConfig {
        self.backend
            .lock()
            .commits
            .last()
            .cloned()
            .expect("at least one commit")
    }
}
