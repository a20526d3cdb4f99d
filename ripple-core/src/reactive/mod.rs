//! Reactive Primitives
//!
//! This module implements effects, computeds, and the tracking context
//! that connects them to the dependency graph.
//!
//! # Concepts
//!
//! ## Effects
//!
//! An Effect is a computation that re-runs whenever a location it read
//! during its latest run is written. Dependencies are discovered by
//! observing reads, never declared.
//!
//! ## Computeds
//!
//! A Computed is a cached derived value backed by an effect. Upstream
//! changes only mark it dirty; it recomputes on the next read.
//!
//! ## Effect Scopes
//!
//! An Effect Scope collects the effects created while it is active so
//! they can be stopped together.
//!
//! # Implementation Notes
//!
//! The tracking context is thread-local. Each effect run swaps itself in
//! as the active effect through a drop guard, so nesting and panics
//! restore the enclosing effect correctly.

pub(crate) mod context;
mod computed;
mod effect;
mod scope;
mod subscriber;

pub use computed::{computed, computed_with_setter, Computed, ComputedState};
pub use context::{
    active_effect, effect_track_depth, enable_tracking, is_tracking, pause_tracking,
    reset_tracking, should_track, untracked, ReactiveContext,
};
pub use effect::{
    effect, stop, EffectOptions, EffectRunner, ReactiveEffect, Scheduler, WeakEffect,
};
pub use scope::{current_scope, on_scope_dispose, EffectScope};
pub use subscriber::EffectId;
