//! Dependency Sets
//!
//! A [`Dep`] holds the effects subscribed to one observable location.
//!
//! # Marker Bits
//!
//! Re-running an effect must leave it subscribed to exactly the locations
//! it read during that run. Rather than unsubscribing from everything and
//! resubscribing, each dep carries two bitmasks, `was_tracked` and
//! `new_tracked`, with one bit per effect nesting depth:
//!
//! 1. Before the body runs, every dep the effect already belongs to gets
//!    the depth's bit set in `was_tracked`.
//! 2. Each read sets the bit in `new_tracked`. A dep that was already
//!    tracked needs no graph mutation; a new one is subscribed.
//! 3. After the body, deps with the `was_tracked` bit but without the
//!    `new_tracked` bit are unsubscribed, and both bits are cleared.
//!
//! Repeated reads of the same location within a run cost one bit test.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::reactive::{EffectId, ReactiveEffect, WeakEffect};

/// The set of effects subscribed to one observable location.
///
/// Effects are kept in subscription order, which is the order `trigger`
/// notifies them in. Membership is weak: a dep never keeps an effect
/// alive, and a dropped effect removes itself from every dep it was in.
#[derive(Default)]
pub struct Dep {
    effects: RefCell<IndexMap<EffectId, WeakEffect>>,
    was_tracked: Cell<u32>,
    new_tracked: Cell<u32>,
}

impl Dep {
    /// Create a new, empty dependency set.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Number of subscribed effects.
    pub fn len(&self) -> usize {
        self.effects.borrow().len()
    }

    /// Whether no effect is subscribed.
    pub fn is_empty(&self) -> bool {
        self.effects.borrow().is_empty()
    }

    /// Whether `effect` is subscribed.
    pub fn contains(&self, effect: &ReactiveEffect) -> bool {
        self.effects.borrow().contains_key(&effect.id())
    }

    /// Snapshot of the subscribed effects, in subscription order.
    ///
    /// Notifying effects can change membership, so callers iterate a copy.
    pub fn effects(&self) -> Vec<ReactiveEffect> {
        self.effects
            .borrow()
            .values()
            .filter_map(WeakEffect::upgrade)
            .collect()
    }

    pub(crate) fn insert(&self, effect: &ReactiveEffect) -> bool {
        let mut effects = self.effects.borrow_mut();
        if effects.contains_key(&effect.id()) {
            return false;
        }
        effects.insert(effect.id(), effect.downgrade());
        true
    }

    pub(crate) fn remove(&self, id: EffectId) -> bool {
        self.effects.borrow_mut().shift_remove(&id).is_some()
    }

    pub(crate) fn was_tracked(&self, bit: u32) -> bool {
        self.was_tracked.get() & bit != 0
    }

    pub(crate) fn new_tracked(&self, bit: u32) -> bool {
        self.new_tracked.get() & bit != 0
    }

    pub(crate) fn mark_new_tracked(&self, bit: u32) {
        self.new_tracked.set(self.new_tracked.get() | bit);
    }

    fn mark_was_tracked(&self, bit: u32) {
        self.was_tracked.set(self.was_tracked.get() | bit);
    }

    fn clear_markers(&self, bit: u32) {
        self.was_tracked.set(self.was_tracked.get() & !bit);
        self.new_tracked.set(self.new_tracked.get() & !bit);
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("len", &self.len())
            .field("was_tracked", &format_args!("{:#b}", self.was_tracked.get()))
            .field("new_tracked", &format_args!("{:#b}", self.new_tracked.get()))
            .finish()
    }
}

/// Mark every dep `effect` currently belongs to as tracked at `bit`.
pub(crate) fn init_dep_markers(effect: &ReactiveEffect, bit: u32) {
    effect.with_deps(|deps| {
        for dep in deps.iter().filter_map(Weak::upgrade) {
            dep.mark_was_tracked(bit);
        }
    });
}

/// Drop subscriptions the last run at `bit` did not renew.
///
/// Compacts the effect's dependency list to the deps it still belongs to.
/// Deps whose target has been dropped are discarded as well.
pub(crate) fn finalize_dep_markers(effect: &ReactiveEffect, bit: u32) {
    effect.with_deps_mut(|deps| {
        deps.retain(|weak| {
            let Some(dep) = weak.upgrade() else {
                return false;
            };
            let keep = !(dep.was_tracked(bit) && !dep.new_tracked(bit));
            if !keep {
                dep.remove(effect.id());
            }
            dep.clear_markers(bit);
            keep
        });
    });
}

/// Unsubscribe `effect` from every dep and clear its dependency list.
pub(crate) fn cleanup_effect(effect: &ReactiveEffect) {
    let deps = effect.take_deps();
    for dep in deps.iter().filter_map(Weak::upgrade) {
        dep.remove(effect.id());
    }
}
