//! Tracking Context
//!
//! The tracking context records which effect is currently running, so
//! that `track` knows whom to subscribe.
//!
//! # Implementation
//!
//! The context is thread-local: the dependency graph is single-threaded
//! and reentrant, never concurrent. It holds:
//!
//! - the active effect, swapped in and out by [`ReactiveContext`] guards
//!   around every effect run;
//! - the `should_track` flag, with a stack of saved values so nested
//!   [`pause_tracking`]/[`enable_tracking`]/[`reset_tracking`] scopes
//!   compose;
//! - the effect nesting depth, which selects the marker bit used for
//!   dependency diffing;
//! - the active effect scope, which collects newly created effects.

use std::cell::{Cell, RefCell};

use super::effect::ReactiveEffect;
use super::scope::EffectScope;
use crate::config;

struct TrackingContext {
    active_effect: RefCell<Option<ReactiveEffect>>,
    should_track: Cell<bool>,
    track_stack: RefCell<Vec<bool>>,
    depth: Cell<u32>,
    active_scope: RefCell<Option<EffectScope>>,
}

impl TrackingContext {
    const fn new() -> Self {
        Self {
            active_effect: RefCell::new(None),
            should_track: Cell::new(true),
            track_stack: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            active_scope: RefCell::new(None),
        }
    }
}

thread_local! {
    static CONTEXT: TrackingContext = const { TrackingContext::new() };
}

/// Guard that makes an effect the active one until dropped.
///
/// Restores the previous active effect, `should_track` flag and nesting
/// depth on drop, including while unwinding from a panicking effect body.
pub struct ReactiveContext {
    previous: Option<ReactiveEffect>,
    last_should_track: bool,
}

impl ReactiveContext {
    /// Enter a new tracking context for `effect`.
    ///
    /// Tracking is enabled inside, even if the caller had paused it.
    pub fn enter(effect: &ReactiveEffect) -> Self {
        CONTEXT.with(|ctx| {
            let previous = ctx.active_effect.replace(Some(effect.clone()));
            let last_should_track = ctx.should_track.replace(true);
            ctx.depth.set(ctx.depth.get() + 1);
            Self {
                previous,
                last_should_track,
            }
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let replaced = CONTEXT.with(|ctx| {
            ctx.depth.set(ctx.depth.get().saturating_sub(1));
            ctx.should_track.set(self.last_should_track);
            ctx.active_effect.replace(previous)
        });
        drop(replaced);
    }
}

/// The effect currently running, if any.
pub fn active_effect() -> Option<ReactiveEffect> {
    CONTEXT.with(|ctx| ctx.active_effect.borrow().clone())
}

/// Whether `effect` is the effect currently running.
pub fn is_active_effect(effect: &ReactiveEffect) -> bool {
    CONTEXT.with(|ctx| ctx.active_effect.borrow().as_ref() == Some(effect))
}

/// Whether tracking is globally enabled.
pub fn should_track() -> bool {
    CONTEXT.with(|ctx| ctx.should_track.get())
}

/// Whether a read right now would be recorded.
pub fn is_tracking() -> bool {
    CONTEXT.with(|ctx| ctx.should_track.get() && ctx.active_effect.borrow().is_some())
}

/// Current effect nesting depth; 0 outside any effect.
pub fn effect_track_depth() -> u32 {
    CONTEXT.with(|ctx| ctx.depth.get())
}

/// The marker bit owned by the current depth.
///
/// `None` when the depth exceeds the configured limit, in which case
/// dependency diffing falls back to full cleanup and membership checks.
pub(crate) fn marker_bit() -> Option<u32> {
    let depth = effect_track_depth();
    (depth <= config::current_config().max_marker_bits).then(|| 1 << depth)
}

/// Suspend tracking until the matching [`reset_tracking`].
pub fn pause_tracking() {
    push_should_track(false);
}

/// Force tracking on until the matching [`reset_tracking`].
pub fn enable_tracking() {
    push_should_track(true);
}

/// Restore the tracking state saved by the last pause or enable.
///
/// With nothing saved, tracking is re-enabled.
pub fn reset_tracking() {
    CONTEXT.with(|ctx| {
        let last = ctx.track_stack.borrow_mut().pop();
        ctx.should_track.set(last.unwrap_or(true));
    });
}

fn push_should_track(value: bool) {
    CONTEXT.with(|ctx| {
        ctx.track_stack.borrow_mut().push(ctx.should_track.get());
        ctx.should_track.set(value);
    });
}

/// Run `f` with tracking paused.
///
/// Tracking is reset on every exit path, including panics.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct Reset;

    impl Drop for Reset {
        fn drop(&mut self) {
            reset_tracking();
        }
    }

    pause_tracking();
    let _reset = Reset;
    f()
}

/// The effect scope currently collecting new effects, if any.
pub(crate) fn active_scope() -> Option<EffectScope> {
    CONTEXT.with(|ctx| ctx.active_scope.borrow().clone())
}

/// Swap the active effect scope, returning the previous one.
pub(crate) fn replace_active_scope(scope: Option<EffectScope>) -> Option<EffectScope> {
    CONTEXT.with(|ctx| ctx.active_scope.replace(scope))
}
