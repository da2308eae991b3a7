// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types surfaced to the window-system host.
//!
//! Only reference and sequencing problems reach the caller as errors.
//! Classification problems (range inconsistencies, Secondary capacity
//! exhaustion) are recovered inside the assigner by falling back to Client
//! composition and never show up here. A failed hardware commit is the one
//! error that aborts a frame in progress.

use thiserror::Error;

use crate::backend::CommitError;
use crate::display::DisplayId;
use crate::fence::FenceError;
use crate::layer::LayerId;

/// Errors returned by display and layer operations.
#[derive(Debug, Error)]
pub enum HwcError {
    /// The display handle does not name a registered display.
    #[error("unknown display {0:?}")]
    BadDisplay(DisplayId),
    /// The display exists but is not plugged in.
    #[error("display {0:?} is not connected")]
    NotConnected(DisplayId),
    /// The layer handle is stale or never existed on this display.
    #[error("unknown layer {0:?}")]
    BadLayer(LayerId),
    /// `accept_changes` or `present` was called out of state-machine order.
    #[error("display changes have not been validated")]
    NotValidated,
    /// A parameter was rejected before any state was touched.
    #[error("invalid parameter: {0}")]
    BadParameter(&'static str),
    /// A fence could not be adopted, duplicated or handed off.
    #[error(transparent)]
    Fence(#[from] FenceError),
    /// The hardware commit failed and the frame was aborted.
    #[error("frame commit failed")]
    CommitFailed(#[source] CommitError),
}

impl HwcError {
    /// Returns `true` for errors that aborted an in-progress frame.
    #[must_use]
    pub fn aborted_frame(&self) -> bool {
        matches!(self, Self::CommitFailed(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = HwcError> = core::result::Result<T, E>;
