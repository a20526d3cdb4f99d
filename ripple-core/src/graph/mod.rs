//! Dependency Graph
//!
//! This module implements the graph that connects observable locations
//! to the effects that read them.
//!
//! # Overview
//!
//! The graph has two levels:
//!
//! - A per-thread map from target identity to that target's keys
//! - For each (target, key), a [`Dep`] listing the subscribed effects
//!
//! Effects point back at their deps, so membership stays bidirectional:
//! an effect is in a dep exactly when the dep is in the effect's list.
//!
//! # Design Decisions
//!
//! 1. Nodes are created lazily by [`track`] and never pruned while their
//!    target lives. Dropping a target removes its node.
//!
//! 2. Target shape (plain, sequence, map-like) is passed in as a
//!    [`TargetKind`] rather than discovered at runtime.
//!
//! 3. Deps hold effects weakly, so the graph never keeps an effect (or
//!    anything its body captured) alive.

pub(crate) mod dep;
mod scheduler;
mod target;
pub(crate) mod target_map;

pub use dep::Dep;
pub use scheduler::JobQueue;
pub use target::{PropKey, Target, TargetId, TargetKind};
pub use target_map::{
    dep_count_for, has_deps, track, track_effects, trigger, trigger_effects, TrackOpType,
    TriggerOpType,
};
