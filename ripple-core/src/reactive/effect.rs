//! Effect Implementation
//!
//! An Effect is a re-runnable computation whose dependencies are whatever
//! it read during its latest run.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately (unless lazy)
//!    to establish initial dependencies.
//!
//! 2. While the body runs, the effect is the active effect, so every
//!    tracked read anywhere below it subscribes it to that location.
//!
//! 3. When a dependency changes, the effect's scheduler is called, or the
//!    effect re-runs if it has none.
//!
//! 4. On every run, subscriptions not renewed by that run are dropped, so
//!    abandoned branches stop triggering the effect.
//!
//! # Nesting
//!
//! Effects may run inside other effects. Each run saves the previously
//! active effect as its `parent` and restores it on exit, so reads made
//! after an inner effect finishes still attribute to the outer one. An
//! effect that is already somewhere on the parent chain never re-enters.
//!
//! # Stopping
//!
//! A stopped effect is unsubscribed everywhere and never tracks again.
//! Stopping an effect from inside its own run is deferred until the run
//! returns.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, trace};

use super::context::{self, ReactiveContext};
use super::scope::{self, EffectScope};
use super::subscriber::EffectId;
use crate::graph::dep::{self, Dep};

/// Replacement for re-running an effect when it is invalidated.
///
/// Receives the invalidated effect; typically queues it somewhere.
pub type Scheduler = Rc<dyn Fn(&ReactiveEffect)>;

type DepList = SmallVec<[Weak<Dep>; 4]>;

struct EffectInner {
    id: EffectId,
    body: Box<dyn Fn()>,
    scheduler: Option<Scheduler>,
    active: Cell<bool>,
    running: Cell<bool>,
    defer_stop: Cell<bool>,
    allow_recurse: Cell<bool>,
    computed: Cell<bool>,
    parent: RefCell<Option<ReactiveEffect>>,
    deps: RefCell<DepList>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().iter().filter_map(Weak::upgrade) {
            dep.remove(self.id);
        }

        // Dropping a live effect stops it
        if self.active.replace(false) {
            if let Some(hook) = self.on_stop.get_mut().take() {
                hook();
            }
            debug!(effect = %self.id, "effect dropped while active");
        }
    }
}

/// A re-runnable computation that tracks what it reads.
///
/// Clones share state. Dependency sets hold effects weakly, so an effect
/// stays subscribed only while a handle to it (a runner, a scope, or a
/// computed) is alive. Dropping the last handle of an active effect stops
/// it.
#[derive(Clone)]
pub struct ReactiveEffect {
    inner: Rc<EffectInner>,
}

impl ReactiveEffect {
    /// Create a new effect without running it.
    ///
    /// The effect is recorded in `scope`, or in the active effect scope if
    /// `scope` is `None`.
    pub fn new<F>(body: F, scheduler: Option<Scheduler>, scope: Option<&EffectScope>) -> Self
    where
        F: Fn() + 'static,
    {
        let effect = Self {
            inner: Rc::new(EffectInner {
                id: EffectId::new(),
                body: Box::new(body),
                scheduler,
                active: Cell::new(true),
                running: Cell::new(false),
                defer_stop: Cell::new(false),
                allow_recurse: Cell::new(false),
                computed: Cell::new(false),
                parent: RefCell::new(None),
                deps: RefCell::new(SmallVec::new()),
                on_stop: RefCell::new(None),
            }),
        };
        scope::record_effect_scope(&effect, scope);
        effect
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Whether the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Whether the effect's body is currently executing.
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Whether this effect may be re-triggered by its own writes.
    pub fn allow_recurse(&self) -> bool {
        self.inner.allow_recurse.get()
    }

    /// Allow or forbid re-triggering by the effect's own writes.
    pub fn set_allow_recurse(&self, allow: bool) {
        self.inner.allow_recurse.set(allow);
    }

    /// Whether this effect backs a computed value.
    pub fn is_computed(&self) -> bool {
        self.inner.computed.get()
    }

    /// Register a hook to call once when the effect is stopped.
    pub fn on_stop<F>(&self, hook: F)
    where
        F: FnOnce() + 'static,
    {
        *self.inner.on_stop.borrow_mut() = Some(Box::new(hook));
    }

    /// Number of dependency sets the effect is subscribed to.
    pub fn dep_count(&self) -> usize {
        self.inner
            .deps
            .borrow()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }

    /// Downgrade to a handle that does not keep the effect alive.
    pub fn downgrade(&self) -> WeakEffect {
        WeakEffect {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Run the effect's body, tracking everything it reads.
    ///
    /// Returns without running if the effect is already on the chain of
    /// running effects. A stopped effect still runs its body, but with
    /// tracking paused.
    pub fn run(&self) {
        if !self.is_active() {
            context::untracked(|| (self.inner.body)());
            return;
        }

        let mut parent = context::active_effect();
        while let Some(effect) = parent {
            if effect == *self {
                trace!(effect = %self.id(), "skipping recursive run");
                return;
            }
            parent = effect.parent();
        }

        *self.inner.parent.borrow_mut() = context::active_effect();
        let context = ReactiveContext::enter(self);
        let marker = context::marker_bit();
        let _guard = RunGuard {
            effect: self,
            marker,
            context: Some(context),
        };

        trace!(effect = %self.id(), depth = context::effect_track_depth(), "run");
        match marker {
            Some(bit) => dep::init_dep_markers(self, bit),
            None => {
                debug!(
                    effect = %self.id(),
                    depth = context::effect_track_depth(),
                    "nesting exceeds marker bits, clearing dependencies"
                );
                dep::cleanup_effect(self);
            }
        }

        self.inner.running.set(true);
        (self.inner.body)();
    }

    /// Stop the effect.
    ///
    /// Unsubscribes it from every dependency set, calls the on-stop hook,
    /// and marks it inactive. Idempotent. When called while the effect is
    /// running, takes effect as soon as the run finishes.
    pub fn stop(&self) {
        if self.is_running() {
            self.inner.defer_stop.set(true);
            return;
        }
        if !self.inner.active.replace(false) {
            return;
        }

        dep::cleanup_effect(self);
        let hook = self.inner.on_stop.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
        debug!(effect = %self.id(), "effect stopped");
    }

    /// Respond to an invalidation: schedule if possible, else re-run.
    pub(crate) fn notify(&self) {
        match &self.inner.scheduler {
            Some(scheduler) => scheduler(self),
            None => self.run(),
        }
    }

    /// Mark the effect as backing a computed value.
    pub(crate) fn mark_computed(&self) {
        self.inner.computed.set(true);
    }

    /// Mark the effect inactive without touching its subscriptions.
    pub(crate) fn deactivate(&self) {
        self.inner.active.set(false);
    }

    fn parent(&self) -> Option<ReactiveEffect> {
        self.inner.parent.borrow().clone()
    }

    pub(crate) fn push_dep(&self, dep: Weak<Dep>) {
        self.inner.deps.borrow_mut().push(dep);
    }

    pub(crate) fn with_deps<R>(&self, f: impl FnOnce(&DepList) -> R) -> R {
        f(&self.inner.deps.borrow())
    }

    pub(crate) fn with_deps_mut<R>(&self, f: impl FnOnce(&mut DepList) -> R) -> R {
        f(&mut self.inner.deps.borrow_mut())
    }

    pub(crate) fn take_deps(&self) -> DepList {
        std::mem::take(&mut *self.inner.deps.borrow_mut())
    }
}

/// Restores everything a run changed, on every exit path.
struct RunGuard<'a> {
    effect: &'a ReactiveEffect,
    marker: Option<u32>,
    context: Option<ReactiveContext>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(bit) = self.marker {
            dep::finalize_dep_markers(self.effect, bit);
        }
        self.effect.inner.running.set(false);
        drop(self.context.take());
        let parent = self.effect.inner.parent.borrow_mut().take();
        drop(parent);

        if self.effect.inner.defer_stop.replace(false) {
            self.effect.stop();
        }
    }
}

impl PartialEq for ReactiveEffect {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ReactiveEffect {}

impl Hash for ReactiveEffect {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("computed", &self.is_computed())
            .field("dep_count", &self.dep_count())
            .finish()
    }
}

/// Weak effect handle.
///
/// Used to break ownership between dependency sets and their effects.
#[derive(Clone)]
pub struct WeakEffect {
    inner: Weak<EffectInner>,
}

impl WeakEffect {
    /// Upgrade to a strong handle, if the effect still exists.
    pub fn upgrade(&self) -> Option<ReactiveEffect> {
        self.inner.upgrade().map(|inner| ReactiveEffect { inner })
    }
}

impl fmt::Debug for WeakEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEffect").finish_non_exhaustive()
    }
}

/// Options for [`effect`].
#[derive(Default)]
pub struct EffectOptions {
    /// Skip the initial run; the caller runs the effect when ready.
    pub lazy: bool,

    /// Called instead of re-running when the effect is invalidated.
    pub scheduler: Option<Scheduler>,

    /// Let the effect's own writes re-trigger it through its scheduler.
    pub allow_recurse: bool,

    /// Called once when the effect is stopped.
    pub on_stop: Option<Box<dyn FnOnce()>>,

    /// Scope to record the effect in instead of the active one.
    pub scope: Option<EffectScope>,
}

impl EffectOptions {
    /// Skip the initial run.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Use `scheduler` instead of re-running on invalidation.
    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&ReactiveEffect) + 'static,
    {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    /// Allow the effect's own writes to re-trigger it.
    pub fn allow_recurse(mut self) -> Self {
        self.allow_recurse = true;
        self
    }

    /// Call `hook` once when the effect is stopped.
    pub fn on_stop<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.on_stop = Some(Box::new(hook));
        self
    }

    /// Record the effect in `scope`.
    pub fn scope(mut self, scope: &EffectScope) -> Self {
        self.scope = Some(scope.clone());
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .field("allow_recurse", &self.allow_recurse)
            .field("on_stop", &self.on_stop.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`effect`].
///
/// Keeps the effect alive. Dropping the last runner, with no scope or
/// other handle holding the effect, stops it: it is unsubscribed and its
/// on-stop hook runs.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use = "dropping the runner stops the effect"]
pub struct EffectRunner {
    effect: ReactiveEffect,
}

impl EffectRunner {
    /// Run the effect now.
    pub fn run(&self) {
        self.effect.run();
    }

    /// Stop the effect.
    pub fn stop(&self) {
        self.effect.stop();
    }

    /// The underlying effect.
    pub fn effect(&self) -> &ReactiveEffect {
        &self.effect
    }
}

/// Create an effect running `body` and, unless lazy, run it once.
///
/// # Example
///
/// ```rust,ignore
/// let state = Target::plain();
///
/// let runner = effect(
///     move || {
///         track(&state, TrackOpType::Get, "count");
///         println!("count changed");
///     },
///     EffectOptions::default(),
/// );
/// ```
#[must_use = "dropping the runner stops the effect"]
pub fn effect<F>(body: F, options: EffectOptions) -> EffectRunner
where
    F: Fn() + 'static,
{
    let effect = ReactiveEffect::new(body, options.scheduler, options.scope.as_ref());
    effect.set_allow_recurse(options.allow_recurse);
    if let Some(hook) = options.on_stop {
        effect.on_stop(hook);
    }

    if !options.lazy {
        effect.run();
    }

    EffectRunner { effect }
}

/// Stop the effect behind `runner`.
pub fn stop(runner: &EffectRunner) {
    runner.stop();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
