//! Effect Scopes
//!
//! An effect scope collects the effects (and computeds) created while it
//! is active so they can be stopped together. Scopes nest: a scope
//! created inside another one is stopped with it, unless it was created
//! detached.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use super::context;
use super::effect::ReactiveEffect;
use crate::error::{ReactiveError, Result};

struct ScopeInner {
    active: Cell<bool>,
    effects: RefCell<Vec<ReactiveEffect>>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    scopes: RefCell<Vec<EffectScope>>,
    parent: Option<Weak<ScopeInner>>,
}

/// A group of effects that are stopped together.
///
/// The scope keeps every recorded effect alive until it is stopped.
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

impl EffectScope {
    /// Create a scope owned by the active scope, if any.
    pub fn new() -> Self {
        let parent = context::active_scope();
        let scope = Self::with_parent(parent.as_ref().map(|parent| Rc::downgrade(&parent.inner)));
        if let Some(parent) = parent {
            parent.inner.scopes.borrow_mut().push(scope.clone());
        }
        scope
    }

    /// Create a scope that is not stopped with the active scope.
    pub fn detached() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Weak<ScopeInner>>) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                active: Cell::new(true),
                effects: RefCell::new(Vec::new()),
                cleanups: RefCell::new(Vec::new()),
                scopes: RefCell::new(Vec::new()),
                parent,
            }),
        }
    }

    /// Whether the scope has not been stopped.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of effects recorded in this scope.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    /// Run `f` with this scope active.
    ///
    /// Returns `None` without running `f` if the scope was stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            warn!("cannot run an inactive effect scope");
            return None;
        }

        struct Restore(Option<EffectScope>);

        impl Drop for Restore {
            fn drop(&mut self) {
                context::replace_active_scope(self.0.take());
            }
        }

        let _restore = Restore(context::replace_active_scope(Some(self.clone())));
        Some(f())
    }

    /// Stop every effect, run every cleanup, and stop every child scope.
    ///
    /// Idempotent. A stopped child scope also detaches from its parent.
    pub fn stop(&self) {
        self.stop_inner(false);
    }

    fn stop_inner(&self, from_parent: bool) {
        if !self.inner.active.replace(false) {
            return;
        }

        let effects = std::mem::take(&mut *self.inner.effects.borrow_mut());
        for effect in &effects {
            effect.stop();
        }

        let cleanups = std::mem::take(&mut *self.inner.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }

        let scopes = std::mem::take(&mut *self.inner.scopes.borrow_mut());
        for scope in &scopes {
            scope.stop_inner(true);
        }

        if !from_parent {
            if let Some(parent) = self.inner.parent.as_ref().and_then(Weak::upgrade) {
                parent
                    .scopes
                    .borrow_mut()
                    .retain(|scope| !Rc::ptr_eq(&scope.inner, &self.inner));
            }
        }

        debug!(effects = effects.len(), children = scopes.len(), "effect scope stopped");
    }

    fn record(&self, effect: &ReactiveEffect) {
        if self.is_active() {
            self.inner.effects.borrow_mut().push(effect.clone());
        }
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for EffectScope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for EffectScope {}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.is_active())
            .field("effects", &self.effect_count())
            .field("children", &self.inner.scopes.borrow().len())
            .finish()
    }
}

/// Record `effect` in `scope`, or in the active scope when `scope` is `None`.
pub(crate) fn record_effect_scope(effect: &ReactiveEffect, scope: Option<&EffectScope>) {
    match scope {
        Some(scope) => scope.record(effect),
        None => {
            if let Some(scope) = context::active_scope() {
                scope.record(effect);
            }
        }
    }
}

/// The scope currently collecting effects, if any.
pub fn current_scope() -> Option<EffectScope> {
    context::active_scope()
}

/// Register `cleanup` to run when the active scope is stopped.
pub fn on_scope_dispose<F>(cleanup: F) -> Result<()>
where
    F: FnOnce() + 'static,
{
    let Some(scope) = context::active_scope() else {
        warn!("on_scope_dispose called without an active effect scope");
        return Err(ReactiveError::NoActiveScope);
    };
    scope.inner.cleanups.borrow_mut().push(Box::new(cleanup));
    Ok(())
}
