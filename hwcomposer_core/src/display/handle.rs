// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Thread-safe display handles and the display registry.
//!
//! Host threads call into a display concurrently: the composer thread runs
//! validate and present while binder threads set layer properties and the
//! vsync thread reports timestamps. Two locks serialize this:
//!
//! - the **layer lock** is held across operations that change the layer
//!   topology or read it as a whole (create, destroy, validate, present);
//! - the **frame lock** guards the [`Display`] itself and is taken for every
//!   call, always after the layer lock when both are needed.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::cleanup::{BufferReleaser, CleanupWorker};
use crate::config::HwcConfig;
use crate::error::{HwcError, Result};
use crate::fence::RawFence;
use crate::layer::LayerId;

use super::{Display, DisplayId, PowerMode, ValidateOutcome, VsyncEvent};

/// A [`Display`] shared between host threads.
pub struct HwcDisplay {
    id: DisplayId,
    layer_lock: Mutex<()>,
    frame: Mutex<Display>,
}

impl core::fmt::Debug for HwcDisplay {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HwcDisplay")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl HwcDisplay {
    /// Wraps a display.
    #[must_use]
    pub fn new(display: Display) -> Self {
        Self {
            id: display.id(),
            layer_lock: Mutex::new(()),
            frame: Mutex::new(display),
        }
    }

    /// Returns the display's id.
    #[must_use]
    pub fn id(&self) -> DisplayId {
        self.id
    }

    /// Creates a layer.
    pub fn create_layer(&self) -> LayerId {
        let _layers = self.layer_lock.lock();
        self.frame.lock().create_layer()
    }

    /// Destroys a layer.
    pub fn destroy_layer(&self, id: LayerId) -> Result<()> {
        let _layers = self.layer_lock.lock();
        self.frame.lock().destroy_layer(id)
    }

    /// Runs [`Display::validate`].
    pub fn validate(&self) -> Result<ValidateOutcome> {
        let _layers = self.layer_lock.lock();
        self.frame.lock().validate()
    }

    /// Runs [`Display::accept_changes`].
    pub fn accept_changes(&self) -> Result<()> {
        self.frame.lock().accept_changes()
    }

    /// Runs [`Display::present`].
    pub fn present(&self) -> Result<RawFence> {
        let _layers = self.layer_lock.lock();
        self.frame.lock().present()
    }

    /// Runs `f` with exclusive access to the display.
    ///
    /// For property setters and queries. The layer topology only changes
    /// through [`create_layer`](Self::create_layer) and
    /// [`destroy_layer`](Self::destroy_layer), which hold the layer lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut Display) -> R) -> R {
        f(&mut self.frame.lock())
    }

    /// Runs `f` with shared access to the display.
    pub fn inspect<R>(&self, f: impl FnOnce(&Display) -> R) -> R {
        f(&self.frame.lock())
    }
}

type VsyncCallback = Arc<dyn Fn(VsyncEvent) + Send + Sync>;

/// Registry of every display plus the process-wide collaborators.
#[derive(Default)]
pub struct Hwc {
    displays: RwLock<BTreeMap<DisplayId, Arc<HwcDisplay>>>,
    vsync_callback: RwLock<Option<VsyncCallback>>,
    cleanup: Mutex<Option<CleanupWorker>>,
}

impl core::fmt::Debug for Hwc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hwc")
            .field("displays", &self.displays.read().keys().collect::<Vec<_>>())
            .field("cleanup", &self.cleanup.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Hwc {
    /// Creates an empty registry without a cleanup worker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry whose displays hand retired buffers to
    /// `releaser` on a worker thread, queueing up to
    /// [`HwcConfig::cleanup_queue_capacity`] buffers.
    pub fn with_cleanup(releaser: impl BufferReleaser, config: &HwcConfig) -> io::Result<Self> {
        let worker = CleanupWorker::spawn(releaser, config.cleanup_queue_capacity)?;
        Ok(Self {
            cleanup: Mutex::new(Some(worker)),
            ..Self::default()
        })
    }

    /// Registers a display, replacing any display with the same id.
    pub fn add_display(&self, mut display: Display) -> Arc<HwcDisplay> {
        if let Some(worker) = self.cleanup.lock().as_ref() {
            display.set_cleanup(Some(worker.handle()));
        }
        let id = display.id();
        let handle = Arc::new(HwcDisplay::new(display));
        self.displays.write().insert(id, Arc::clone(&handle));
        info!(display = ?id, "display added");
        handle
    }

    /// Looks up a display.
    pub fn display(&self, id: DisplayId) -> Result<Arc<HwcDisplay>> {
        self.displays
            .read()
            .get(&id)
            .cloned()
            .ok_or(HwcError::BadDisplay(id))
    }

    /// Ids of every registered display.
    #[must_use]
    pub fn display_ids(&self) -> Vec<DisplayId> {
        self.displays.read().keys().copied().collect()
    }

    /// Unregisters a display, powering it off first so every fence it owns
    /// is closed.
    pub fn remove_display(&self, id: DisplayId) -> Result<()> {
        let handle = self
            .displays
            .write()
            .remove(&id)
            .ok_or(HwcError::BadDisplay(id))?;
        handle.with(|d| d.set_power_mode(PowerMode::Off));
        info!(display = ?id, "display removed");
        Ok(())
    }

    /// Installs the callback that receives vsync events.
    pub fn register_vsync_callback(&self, callback: impl Fn(VsyncEvent) + Send + Sync + 'static) {
        *self.vsync_callback.write() = Some(Arc::new(callback));
    }

    /// Reports a hardware vsync on `id`.
    ///
    /// The callback runs without any registry or display lock held.
    pub fn on_vsync(&self, id: DisplayId, timestamp_ns: i64) -> Result<()> {
        let display = self.display(id)?;
        let Some(event) = display.with(|d| d.on_vsync(timestamp_ns)) else {
            return Ok(());
        };
        let callback = self.vsync_callback.read().clone();
        if let Some(callback) = callback {
            callback(event);
        }
        Ok(())
    }

    /// Reports a hotplug event on an external display.
    pub fn hotplug(&self, id: DisplayId, connected: bool) -> Result<()> {
        self.display(id)?.with(|d| d.set_connected(connected));
        Ok(())
    }

    /// Stops the cleanup worker after it drains its queue and returns how
    /// many buffers it released.
    pub fn shutdown(&self) -> usize {
        let worker = self.cleanup.lock().take();
        worker.map_or(0, CleanupWorker::shutdown)
    }
}
