// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Present: frame construction, commit and fence reconciliation.
//!
//! Fence flow for one committed frame:
//!
//! - Device windows get a duplicate of their layer's acquire fence; the
//!   original is closed once the commit returns.
//! - Secondary members' acquire fences move into the secondary target and
//!   are handed to the backend inside the target descriptor.
//! - Client members' acquire fences are closed; the host already waited on
//!   them while rendering the client target.
//! - Release fences returned per window go to the layer (or target) on that
//!   window. Secondary members each get a duplicate of the secondary
//!   target's release fence, after which the target copies are closed.
//! - The present fence is handed to the caller.
//!
//! A failed commit or a failed frame build closes everything the display
//! still owns.

use tracing::{debug, error, warn};

use crate::backend::{
    CommitError, CommitOutcome, FrameConfig, SecondaryMember, TargetDescriptor, WindowConfig,
    WindowContent,
};
use crate::composition::{TargetKind, WindowSource};
use crate::error::{HwcError, Result};
use crate::fence::{Fence, FenceError, FenceHolder, NO_FENCE, RawFence};
use crate::layer::{BlendMode, BufferHandle, Composition, LayerTransform, PixelFormat};
use crate::trace::{CommitFailedEvent, PresentEvent, PresentOutcome, PresentSkip};

use super::guard::{PresentGuard, ValidateGuard};
use super::{Display, FrameState, tracer};

impl Display {
    /// Commits the accepted assignment to the hardware.
    ///
    /// Returns the present fence, which the caller must close, or
    /// [`NO_FENCE`] when the frame was skipped. A failed commit aborts the
    /// frame, closes every fence the display owns and returns
    /// [`HwcError::CommitFailed`].
    pub fn present(&mut self) -> Result<RawFence> {
        self.ensure_connected()?;
        let guard = PresentGuard::evaluate(
            self.kind,
            self.power,
            self.bypass_requested,
            self.layers.len(),
        );
        if guard == PresentGuard::Skip(PresentSkip::PoweredOff) {
            return Ok(self.skip_frame(PresentSkip::PoweredOff));
        }

        self.check_sequence()?;
        match guard {
            PresentGuard::Skip(reason) => Ok(self.skip_frame(reason)),
            PresentGuard::Commit => self.commit_frame(),
        }
    }

    /// Enforces validate → accept → present ordering.
    fn check_sequence(&mut self) -> Result<()> {
        match self.state {
            FrameState::AcceptedChange => Ok(()),
            FrameState::Validated if !self.has_pending_type_changes() => {
                self.accept();
                Ok(())
            }
            FrameState::Validated => Err(HwcError::NotValidated),
            FrameState::Presented | FrameState::None => {
                self.collect_changes();
                if self.validate_guard() == ValidateGuard::Skip {
                    Ok(())
                } else {
                    Err(HwcError::NotValidated)
                }
            }
        }
    }

    /// Finishes a frame without touching the hardware.
    fn skip_frame(&mut self, reason: PresentSkip) -> RawFence {
        let period = self.vsync.period;
        for layer in self.layers.iter_mut() {
            self.ledger.wait(&layer.acquire_fence, period);
            self.ledger.close(&mut layer.acquire_fence);
            self.ledger.close(&mut layer.release_fence);
        }
        self.ledger.wait(&self.client.acquire_fence, period);
        self.close_target_fences();

        self.bypass_requested = false;
        self.state = if reason == PresentSkip::PoweredOff {
            FrameState::None
        } else {
            FrameState::Presented
        };
        tracer(&mut self.sink).present(&PresentEvent {
            display: self.id,
            frame_index: self.frame_index,
            outcome: PresentOutcome::Skipped(reason),
            windows: 0,
            present_fence: NO_FENCE,
        });
        debug!(display = ?self.id, ?reason, "present skipped");
        NO_FENCE
    }

    fn commit_frame(&mut self) -> Result<RawFence> {
        let mut frame = FrameConfig {
            display: self.id,
            frame_index: self.frame_index,
            windows: Vec::new(),
            client_target: TargetDescriptor::empty(TargetKind::Client),
            secondary_target: TargetDescriptor::empty(TargetKind::Secondary),
        };
        if let Err(err) = self.fill_frame(&mut frame) {
            warn!(display = ?self.id, %err, "frame construction failed, aborting");
            frame.close_fences(self.ledger.sync());
            self.abort_frame();
            return Err(err);
        }

        // Member fences leave the display with the descriptor.
        for (member, (_, mut fence)) in frame
            .secondary_target
            .members
            .iter_mut()
            .zip(self.secondary.member_fences.drain(..))
        {
            member.acquire_fence = self.ledger.hand_off(&mut fence);
        }

        let committed = scanned_out(&frame);
        let windows = frame.windows.len();
        let client_buffer = frame.windows.iter().find_map(|w| match w.content {
            WindowContent::ClientTarget { buffer } => Some(buffer),
            _ => None,
        });

        match self.backend.commit(frame) {
            Ok(outcome) => Ok(self.finish_commit(outcome, committed, client_buffer, windows)),
            Err(err) => Err(self.fail_commit(err)),
        }
    }

    fn fill_frame(&mut self, frame: &mut FrameConfig) -> Result<()> {
        let windows: Vec<(u32, WindowSource)> = self.resources.windows().collect();
        for (slot, source) in windows {
            let window = match source {
                WindowSource::Layer(id) => {
                    let layer = self.layers.get(id)?;
                    WindowConfig {
                        slot,
                        content: WindowContent::Layer {
                            layer: id,
                            buffer: layer.buffer,
                        },
                        source_crop: layer.source_crop,
                        display_frame: layer.display_frame,
                        blend: layer.blend,
                        plane_alpha: layer.plane_alpha,
                        transform: layer.transform,
                        dataspace: layer.dataspace,
                        format: layer.format,
                        acquire_fence: self.ledger.hand_off_duplicate(&layer.acquire_fence)?,
                        reuse_previous: false,
                    }
                }
                WindowSource::Target(TargetKind::Client) => self.client_window(slot)?,
                WindowSource::Target(TargetKind::Secondary) => WindowConfig {
                    slot,
                    content: WindowContent::SecondaryTarget,
                    source_crop: self.bounds,
                    display_frame: self.bounds,
                    blend: BlendMode::Premultiplied,
                    plane_alpha: 1.0,
                    transform: LayerTransform::Identity,
                    dataspace: self.client_dataspace,
                    format: PixelFormat::Rgba8888,
                    acquire_fence: NO_FENCE,
                    reuse_previous: false,
                },
            };
            frame.windows.push(window);
        }

        frame.client_target = TargetDescriptor {
            kind: TargetKind::Client,
            range: self.client.range,
            window: self.resources.target_window(TargetKind::Client),
            skip: self.client.skip,
            members: Vec::new(),
        };

        let mut members = Vec::new();
        for layer in self.layers.ordered_mut() {
            if layer.actual != Composition::Secondary {
                continue;
            }
            let fence = self.ledger.transfer(
                &mut layer.acquire_fence,
                FenceHolder::TargetMember(TargetKind::Secondary, layer.id),
            )?;
            self.secondary.member_fences.push((layer.id, fence));
            members.push(SecondaryMember {
                layer: layer.id,
                buffer: layer.buffer,
                source_crop: layer.source_crop,
                display_frame: layer.display_frame,
                blend: layer.blend,
                plane_alpha: layer.plane_alpha,
                transform: layer.transform,
                acquire_fence: NO_FENCE,
            });
        }
        frame.secondary_target = TargetDescriptor {
            kind: TargetKind::Secondary,
            range: self.secondary.range,
            window: self.resources.target_window(TargetKind::Secondary),
            skip: false,
            members,
        };
        Ok(())
    }

    fn client_window(&mut self, slot: u32) -> Result<WindowConfig> {
        let (buffer, acquire_fence, reuse_previous) = if self.client.skip {
            // The previous client buffer stays on screen. A buffer the host
            // rendered anyway is not needed.
            self.ledger.wait(&self.client.acquire_fence, self.vsync.period);
            self.ledger.close(&mut self.client.acquire_fence);
            (self.client.last_committed_buffer, NO_FENCE, true)
        } else {
            let fence = self.ledger.hand_off_duplicate(&self.client.acquire_fence)?;
            (self.client.buffer, fence, false)
        };
        Ok(WindowConfig {
            slot,
            content: WindowContent::ClientTarget { buffer },
            source_crop: self.bounds,
            display_frame: self.bounds,
            blend: BlendMode::Premultiplied,
            plane_alpha: 1.0,
            transform: LayerTransform::Identity,
            dataspace: self.client_dataspace,
            format: PixelFormat::Rgba8888,
            acquire_fence,
            reuse_previous,
        })
    }

    fn finish_commit(
        &mut self,
        outcome: CommitOutcome,
        committed: Vec<BufferHandle>,
        client_buffer: Option<Option<BufferHandle>>,
        windows: usize,
    ) -> RawFence {
        for (slot, raw) in outcome.window_release_fences {
            match self.resources.overlay(slot) {
                Some(WindowSource::Layer(id)) => {
                    let fence = self.adopt_or_drop(raw, FenceHolder::LayerRelease(id));
                    if let Ok(layer) = self.layers.get_mut(id) {
                        let mut previous = core::mem::replace(&mut layer.release_fence, fence);
                        self.ledger.close(&mut previous);
                    }
                }
                Some(WindowSource::Target(kind)) => {
                    let fence = self.adopt_or_drop(raw, FenceHolder::TargetRelease(kind));
                    let target = match kind {
                        TargetKind::Client => &mut self.client,
                        TargetKind::Secondary => &mut self.secondary,
                    };
                    let mut previous = core::mem::replace(&mut target.release_fence, fence);
                    self.ledger.close(&mut previous);
                }
                None => {
                    warn!(display = ?self.id, slot, fence = raw, "release fence for an unused window");
                    if raw != NO_FENCE {
                        self.ledger.sync().close(raw);
                    }
                }
            }
        }

        // Secondary members share the target's release fence.
        for layer in self.layers.iter_mut() {
            if layer.actual != Composition::Secondary {
                continue;
            }
            match self
                .ledger
                .duplicate(&self.secondary.release_fence, FenceHolder::LayerRelease(layer.id))
            {
                Ok(fence) => {
                    let mut previous = core::mem::replace(&mut layer.release_fence, fence);
                    self.ledger.close(&mut previous);
                }
                Err(err) => {
                    warn!(layer = ?layer.id, %err, "could not share the secondary release fence");
                }
            }
            self.ledger.close(&mut layer.acquire_fence);
        }
        self.ledger.close(&mut self.client.release_fence);
        self.ledger.close(&mut self.secondary.release_fence);

        // Device originals and Client members' acquire fences.
        for layer in self.layers.iter_mut() {
            self.ledger.close(&mut layer.acquire_fence);
        }
        self.ledger.close(&mut self.client.acquire_fence);

        let mut present = self.adopt_or_drop(outcome.present_fence, FenceHolder::Present);
        let present_fence = self.ledger.hand_off(&mut present);

        self.retire_buffers(committed);
        if let Some(buffer) = client_buffer {
            self.client.last_committed_buffer = buffer;
        }

        let frame_index = self.frame_index;
        self.state = FrameState::Presented;
        self.presented_once = true;
        self.frame_index += 1;

        tracer(&mut self.sink).present(&PresentEvent {
            display: self.id,
            frame_index,
            outcome: PresentOutcome::Committed,
            windows,
            present_fence,
        });
        debug!(display = ?self.id, frame = frame_index, windows, present_fence, "frame committed");
        present_fence
    }

    /// Sends buffers that left the screen to the cleanup worker.
    fn retire_buffers(&mut self, committed: Vec<BufferHandle>) {
        let previous = core::mem::replace(&mut self.committed_buffers, committed);
        let Some(cleanup) = &self.cleanup else {
            return;
        };
        for buffer in previous {
            if !self.committed_buffers.contains(&buffer) && !cleanup.submit(self.id, buffer) {
                warn!(display = ?self.id, "cleanup worker stopped, detaching it");
                self.cleanup = None;
                return;
            }
        }
    }

    fn fail_commit(&mut self, err: CommitError) -> HwcError {
        let dump = self.dump();
        tracer(&mut self.sink).commit_failed(&CommitFailedEvent {
            display: self.id,
            frame_index: self.frame_index,
            error: &err,
            dump: &dump,
        });
        error!(display = ?self.id, frame = self.frame_index, %err, "commit failed, frame aborted\n{dump}");
        self.abort_frame();
        self.backend.force_panic(&err.to_string());
        HwcError::CommitFailed(err)
    }

    /// Closes every fence the display owns and forces the next validate to
    /// run in full.
    fn abort_frame(&mut self) {
        for layer in self.layers.iter_mut() {
            self.ledger.close(&mut layer.acquire_fence);
            self.ledger.close(&mut layer.release_fence);
            layer.unit = None;
        }
        self.close_target_fences();
        self.client.reset();
        self.secondary.reset();
        self.resources.reset(self.backend.max_windows());
        self.state = FrameState::None;
        self.force_validate = true;
    }

    /// Adopts a descriptor returned by the backend.
    ///
    /// A descriptor the display already owns stays with its tracked owner,
    /// which closes it exactly once. Any other refused descriptor is closed
    /// here.
    fn adopt_or_drop(&mut self, raw: RawFence, holder: FenceHolder) -> Fence {
        match self.ledger.adopt(raw, holder) {
            Ok(fence) => fence,
            Err(FenceError::AlreadyOwned { fence, holder: owner }) => {
                error!(
                    display = ?self.id,
                    fence,
                    ?owner,
                    ?holder,
                    "backend returned a fence the display already owns, keeping the current owner"
                );
                Fence::NONE
            }
            Err(err) => {
                error!(display = ?self.id, %err, ?holder, "backend returned an unusable fence, closing it");
                if raw != NO_FENCE {
                    self.ledger.sync().close(raw);
                }
                Fence::NONE
            }
        }
    }
}

/// Buffers a frame puts on screen.
fn scanned_out(frame: &FrameConfig) -> Vec<BufferHandle> {
    let mut buffers: Vec<BufferHandle> = frame
        .windows
        .iter()
        .filter_map(|w| match w.content {
            WindowContent::Layer { buffer, .. } | WindowContent::ClientTarget { buffer } => buffer,
            WindowContent::SecondaryTarget => None,
        })
        .chain(
            frame
                .secondary_target
                .members
                .iter()
                .filter_map(|m| m.buffer),
        )
        .collect();
    buffers.sort_unstable_by_key(|b| b.0);
    buffers.dedup();
    buffers
}
