//! Runtime Configuration
//!
//! The tracking engine has a single tunable: how many levels of nested
//! effect execution get the marker-bit fast path before runs fall back to
//! a full unsubscribe/resubscribe. Configuration is per thread, matching
//! the thread-local dependency graph.

use std::cell::Cell;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReactiveError, Result};

/// Largest marker-bit depth that fits in a `u32` bitmask.
///
/// Bit 0 is never used; depth `n` owns bit `1 << n`.
pub const MAX_MARKER_BITS: u32 = 30;

thread_local! {
    static CONFIG: Cell<ReactiveConfig> = const { Cell::new(ReactiveConfig::new()) };
}

/// Tunables for the tracking engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReactiveConfig {
    /// Nesting depth up to which dependency diffing uses marker bits.
    ///
    /// Deeper runs clear all subscriptions up front instead. `0` disables
    /// the marker-bit path entirely.
    pub max_marker_bits: u32,
}

impl ReactiveConfig {
    /// The default configuration.
    pub const fn new() -> Self {
        Self {
            max_marker_bits: MAX_MARKER_BITS,
        }
    }

    /// Parse a configuration from JSON.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every field is within its supported range.
    pub fn validate(&self) -> Result<()> {
        if self.max_marker_bits > MAX_MARKER_BITS {
            return Err(ReactiveError::InvalidMarkerBits {
                requested: self.max_marker_bits,
                max: MAX_MARKER_BITS,
            });
        }
        Ok(())
    }
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a configuration for the current thread.
///
/// Should be called before any effect runs; changing the marker-bit depth
/// while effects are mid-run leaves their markers unbalanced.
pub fn configure(config: ReactiveConfig) -> Result<()> {
    config.validate()?;
    debug!(max_marker_bits = config.max_marker_bits, "reactive config installed");
    CONFIG.with(|cell| cell.set(config));
    Ok(())
}

/// The configuration active on the current thread.
pub fn current_config() -> ReactiveConfig {
    CONFIG.with(Cell::get)
}
