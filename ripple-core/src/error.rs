//! Error types for the reactive core.
//!
//! Most failure modes in the tracking engine are not errors at all: a
//! recursive re-entry is skipped, a trigger on an untracked target is a
//! no-op, and empty dependency sets are left in place. The variants below
//! cover the remaining contract violations that callers can act on.

use thiserror::Error;

/// Errors returned by the reactive core.
#[derive(Error, Debug)]
pub enum ReactiveError {
    /// A write was attempted on a computed value created without a setter.
    #[error("write operation failed: computed value is readonly")]
    ReadonlyComputed,

    /// A scope-bound operation was called while no effect scope was active.
    #[error("no active effect scope to associate with")]
    NoActiveScope,

    /// The requested marker-bit depth does not fit in the dependency bitmasks.
    #[error("max_marker_bits must be at most {max}, got {requested}")]
    InvalidMarkerBits {
        /// Depth that was requested.
        requested: u32,
        /// Largest supported depth.
        max: u32,
    },

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// Result type for reactive core operations.
pub type Result<T> = std::result::Result<T, ReactiveError>;
