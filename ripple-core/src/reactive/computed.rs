//! Computed Implementation
//!
//! A Computed is a cached derived value that recomputes lazily.
//!
//! # How Computeds Work
//!
//! 1. Construction wraps the getter in an effect but does not run it. The
//!    computed starts dirty.
//!
//! 2. Reading the value subscribes the reader to the computed's own
//!    dependency set, then recomputes if dirty and caches the result.
//!
//! 3. When something the getter read changes, the effect's scheduler does
//!    not recompute. It marks the computed dirty and notifies the
//!    computed's own subscribers, once per clean-to-dirty transition.
//!
//! 4. The next read recomputes, exactly once.
//!
//! This is push-invalidate, pull-recompute: a computed nobody reads never
//! runs its getter, however often its inputs change.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use super::effect::{ReactiveEffect, Scheduler};
use crate::error::{ReactiveError, Result};
use crate::graph::dep::Dep;
use crate::graph::target_map::{track_effects, trigger_effects};

/// Dirty state for a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// The computed must recompute on the next read.
    Dirty,
}

struct ComputedInner<T> {
    dep: Rc<Dep>,
    effect: ReactiveEffect,
    getter: Box<dyn Fn() -> T>,
    setter: Option<Box<dyn Fn(T)>>,
    value: RefCell<Option<Rc<T>>>,
    dirty: Cell<bool>,
    cacheable: bool,
}

impl<T: 'static> ComputedInner<T> {
    fn recompute(&self) {
        let value = (self.getter)();
        *self.value.borrow_mut() = Some(Rc::new(value));
    }

    fn invalidate(&self) {
        if !self.dirty.replace(true) {
            trace!(effect = %self.effect.id(), "computed invalidated");
            trigger_effects(&self.dep);
        }
    }
}

/// A cached, lazily recomputed derived value.
///
/// Clones share the same cache and dependencies.
///
/// # Example
///
/// ```rust,ignore
/// let doubled = computed(move || {
///     track(&state, TrackOpType::Get, "count");
///     count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 2);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: 'static> Computed<T> {
    /// Create a read-only computed from `getter`.
    ///
    /// The getter does not run until the first read.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None, true)
    }

    /// Create a writable computed. Writes go straight to `setter`.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(Box::new(getter), Some(Box::new(setter)), true)
    }

    /// Create a computed that never caches.
    ///
    /// Every read runs the getter in the reader's own tracking context, so
    /// the reader depends directly on whatever the getter reads.
    pub fn uncached<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None, false)
    }

    fn build(getter: Box<dyn Fn() -> T>, setter: Option<Box<dyn Fn(T)>>, cacheable: bool) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let body = {
                let weak = weak.clone();
                move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.recompute();
                    }
                }
            };
            let scheduler: Scheduler = {
                let weak = weak.clone();
                Rc::new(move |_: &ReactiveEffect| {
                    if let Some(inner) = weak.upgrade() {
                        inner.invalidate();
                    }
                })
            };

            let effect = ReactiveEffect::new(body, Some(scheduler), None);
            effect.mark_computed();
            if !cacheable {
                effect.deactivate();
            }

            ComputedInner {
                dep: Dep::new(),
                effect,
                getter,
                setter,
                value: RefCell::new(None),
                dirty: Cell::new(true),
                cacheable,
            }
        });

        Self { inner }
    }

    /// Read the value through `f`, recomputing first if necessary.
    ///
    /// The running effect, if any, becomes a dependent of this computed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let inner = &self.inner;
        track_effects(&inner.dep);

        if !inner.cacheable {
            inner.recompute();
        } else if inner.dirty.replace(false) {
            // A panicking getter leaves the computed dirty
            struct StayDirty<'a>(&'a Cell<bool>);

            impl Drop for StayDirty<'_> {
                fn drop(&mut self) {
                    if std::thread::panicking() {
                        self.0.set(true);
                    }
                }
            }

            let _stay_dirty = StayDirty(&inner.dirty);
            inner.effect.run();
        }

        // `f` may write upstream and recompute, so hold no borrow while it runs
        let value = inner
            .value
            .borrow()
            .clone()
            .expect("computed value read during its own first evaluation");
        f(&value)
    }

    /// Write through the setter.
    ///
    /// Does not mark the computed dirty; only the getter's dependencies do.
    pub fn set(&self, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                warn!(effect = %self.inner.effect.id(), "write to readonly computed");
                Err(ReactiveError::ReadonlyComputed)
            }
        }
    }

    /// Get the current dirty state.
    pub fn state(&self) -> ComputedState {
        match self.inner.dirty.get() {
            true => ComputedState::Dirty,
            false => ComputedState::Clean,
        }
    }

    /// Whether a value has been computed at least once.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Whether reads reuse the cached value.
    pub fn is_cacheable(&self) -> bool {
        self.inner.cacheable
    }

    /// Whether a setter was supplied.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Number of effects reading this computed.
    pub fn dependent_count(&self) -> usize {
        self.inner.dep.len()
    }

    /// The effect backing this computed.
    pub fn effect(&self) -> &ReactiveEffect {
        &self.inner.effect
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("effect", &self.inner.effect.id())
            .field("state", &self.state())
            .field("value", &self.inner.value.borrow())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

/// Create a read-only computed from `getter`.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(getter)
}

/// Create a writable computed from a getter and a setter.
pub fn computed_with_setter<T, F, S>(getter: F, setter: S) -> Computed<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
    S: Fn(T) + 'static,
{
    Computed::with_setter(getter, setter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
