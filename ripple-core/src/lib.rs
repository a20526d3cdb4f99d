//! Ripple Core
//!
//! This crate provides the dependency-tracking core of the Ripple
//! fine-grained reactivity runtime. It implements:
//!
//! - Effects that re-run when the data they read changes
//! - A per-location dependency graph populated by intercepted reads
//! - Write propagation aware of plain, sequence and map-like targets
//! - Lazily recomputed, cached derived values (computeds)
//!
//! The crate does not decide which data is reactive. An interception
//! layer wraps objects, hands out a [`Target`] per object, and calls
//! [`track`] on every read and [`trigger`] after every write.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Effects, computeds, scopes, and the tracking context
//! - `graph`: Dependency sets, the target map, and the job queue
//! - `config`: Per-thread tunables
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use ripple_core::{effect, track, trigger, EffectOptions, PropKey, Target, TrackOpType, TriggerOpType};
//!
//! let state = Target::plain();
//! let a = Rc::new(Cell::new(1));
//! let x = Rc::new(Cell::new(0));
//!
//! let _runner = {
//!     let (state, a, x) = (state.clone(), a.clone(), x.clone());
//!     effect(
//!         move || {
//!             track(&state, TrackOpType::Get, "a");
//!             x.set(a.get());
//!         },
//!         EffectOptions::default(),
//!     )
//! };
//! assert_eq!(x.get(), 1);
//!
//! a.set(2);
//! trigger(&state, TriggerOpType::Set, Some(&PropKey::from("a")), None, None);
//! assert_eq!(x.get(), 2);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{configure, current_config, ReactiveConfig};
pub use error::{ReactiveError, Result};
pub use graph::{
    track, trigger, Dep, JobQueue, PropKey, Target, TargetKind, TrackOpType, TriggerOpType,
};
pub use reactive::{
    computed, computed_with_setter, effect, enable_tracking, pause_tracking, reset_tracking, stop,
    untracked, Computed, EffectOptions, EffectRunner, EffectScope, ReactiveEffect,
};
