// Copyright 2026 the hwcomposer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `tracing` subscriber setup for binaries and test harnesses.
//!
//! `hwcomposer_core` logs through `tracing` under the `hwcomposer_core`
//! target. These helpers install a stderr `fmt` subscriber filtered by
//! `RUST_LOG`, falling back to [`DEFAULT_DIRECTIVES`].

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVES: &str = "hwcomposer_core=info,warn";

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Builds the filter: `RUST_LOG` if it parses, else `default`.
#[must_use]
pub fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Installs the global subscriber.
pub fn try_init() -> Result<(), InitError> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(DEFAULT_DIRECTIVES))
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
}

/// Installs the global subscriber, ignoring an existing one.
pub fn init() {
    if try_init().is_err() {
        tracing::debug!("subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_rejected() {
        init();
        assert!(try_init().is_err(), "a global subscriber is already set");
    }

    #[test]
    fn default_directives_parse() {
        assert!(
            EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok(),
            "bad directives: {DEFAULT_DIRECTIVES}"
        );
    }
}
