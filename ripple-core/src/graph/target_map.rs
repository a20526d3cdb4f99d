//! Global Dependency Graph
//!
//! The target map connects observable locations to the effects that read
//! them. It is the only place `track` and `trigger` meet.
//!
//! # How It Works
//!
//! 1. The interception layer calls [`track`] on every intercepted read.
//!    If an effect is running and tracking is enabled, the dep for
//!    (target, key) is created on demand and the effect subscribes to it.
//!
//! 2. The interception layer calls [`trigger`] after every structural
//!    write. The change kind and the target's shape decide which deps
//!    are affected; their effects are collected, de-duplicated, and
//!    notified.
//!
//! 3. Notifying an effect means calling its scheduler if it has one and
//!    running it otherwise. Computed-backed effects are notified before
//!    plain effects so derived values are marked dirty before anything
//!    that reads them re-runs.
//!
//! # Lifetime
//!
//! The map is keyed by [`TargetId`] and never owns a target. A target's
//! node is removed when the target is dropped; deps that become empty
//! while the target lives stay in place.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::trace;

use super::dep::Dep;
use super::target::{PropKey, Target, TargetId, TargetKind};
use crate::reactive::{context, ReactiveEffect};

type KeyToDepMap = IndexMap<PropKey, Rc<Dep>>;

thread_local! {
    static TARGET_MAP: RefCell<HashMap<TargetId, KeyToDepMap>> = RefCell::new(HashMap::new());
}

/// The kind of read being tracked.
///
/// Only used for diagnostics; every kind subscribes the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOpType {
    /// A property value was read.
    Get,
    /// A property's presence was checked.
    Has,
    /// The target's entries or keys were enumerated.
    Iterate,
}

/// The structural change a write made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOpType {
    /// An existing property's value was replaced.
    Set,
    /// A new property was added.
    Add,
    /// A property was removed.
    Delete,
    /// Every property was removed.
    Clear,
}

/// Record that the running effect read `key` on `target`.
///
/// A no-op unless an effect is running and tracking is enabled.
pub fn track(target: &Target, op: TrackOpType, key: impl Into<PropKey>) {
    if !context::is_tracking() {
        return;
    }

    let key = key.into();
    trace!(target_id = target.id().raw(), %key, ?op, "track");

    let dep = TARGET_MAP.with(|map| {
        map.borrow_mut()
            .entry(target.id())
            .or_default()
            .entry(key)
            .or_insert_with(Dep::new)
            .clone()
    });
    track_effects(&dep);
}

/// Subscribe the running effect to `dep`.
///
/// Used directly by values that own their dep, like computeds.
pub fn track_effects(dep: &Rc<Dep>) {
    if !context::should_track() {
        return;
    }
    let Some(effect) = context::active_effect() else {
        return;
    };

    let should_track = match context::marker_bit() {
        Some(bit) => {
            if dep.new_tracked(bit) {
                false
            } else {
                dep.mark_new_tracked(bit);
                !dep.was_tracked(bit)
            }
        }
        None => !dep.contains(&effect),
    };

    if should_track {
        dep.insert(&effect);
        effect.push_dep(Rc::downgrade(dep));
    }
}

/// Propagate a write on `key` of `target` to every dependent effect.
///
/// `key` is ignored for [`TriggerOpType::Clear`]. `new_value` carries the
/// new length for a sequence `length` write. A `Set` whose new and old
/// values are both given and equal changes nothing and notifies nobody.
pub fn trigger(
    target: &Target,
    op: TriggerOpType,
    key: Option<&PropKey>,
    new_value: Option<&Value>,
    old_value: Option<&Value>,
) {
    if op == TriggerOpType::Set {
        if let (Some(new), Some(old)) = (new_value, old_value) {
            if new == old {
                return;
            }
        }
    }

    let Some(deps) = TARGET_MAP.with(|map| {
        map.borrow()
            .get(&target.id())
            .map(|deps_map| affected_deps(deps_map, target.kind(), op, key, new_value))
    }) else {
        return;
    };

    trace!(
        target_id = target.id().raw(),
        key = key.map(tracing::field::display),
        ?op,
        deps = deps.len(),
        "trigger"
    );

    let mut effects = IndexSet::new();
    for dep in &deps {
        effects.extend(dep.effects());
    }
    notify_effects(effects.iter());
}

/// Notify every effect subscribed to `dep`.
pub fn trigger_effects(dep: &Dep) {
    let effects = dep.effects();
    notify_effects(effects.iter());
}

/// Number of effects subscribed to (target, key), if the dep exists.
pub fn dep_count_for(target: &Target, key: &PropKey) -> Option<usize> {
    TARGET_MAP.with(|map| {
        map.borrow()
            .get(&target.id())
            .and_then(|deps_map| deps_map.get(key))
            .map(|dep| dep.len())
    })
}

/// Whether any location of `target` has ever been tracked.
pub fn has_deps(target: &Target) -> bool {
    TARGET_MAP.with(|map| map.borrow().contains_key(&target.id()))
}

/// Remove a dropped target's node from the graph.
pub(crate) fn forget_target(id: TargetId) {
    // The map may already be gone during thread teardown, or borrowed if a
    // target is dropped from inside a map operation; either way skip it.
    let removed = TARGET_MAP
        .try_with(|map| map.try_borrow_mut().ok().and_then(|mut map| map.remove(&id)))
        .ok()
        .flatten();
    drop(removed);
}

/// Resolve which deps a write affects.
fn affected_deps(
    deps_map: &KeyToDepMap,
    kind: TargetKind,
    op: TriggerOpType,
    key: Option<&PropKey>,
    new_value: Option<&Value>,
) -> SmallVec<[Rc<Dep>; 4]> {
    let mut deps = SmallVec::new();

    if op == TriggerOpType::Clear {
        deps.extend(deps_map.values().cloned());
        return deps;
    }

    if kind == TargetKind::Sequence && key == Some(&PropKey::Length) {
        let new_length = new_value
            .and_then(Value::as_u64)
            .and_then(|length| usize::try_from(length).ok())
            .unwrap_or(0);
        for (key, dep) in deps_map {
            match key {
                PropKey::Length => deps.push(dep.clone()),
                PropKey::Index(index) if *index >= new_length => deps.push(dep.clone()),
                _ => {}
            }
        }
        return deps;
    }

    let mut push = |key: &PropKey| {
        if let Some(dep) = deps_map.get(key) {
            deps.push(dep.clone());
        }
    };

    if let Some(key) = key {
        push(key);
    }

    match op {
        TriggerOpType::Add => {
            if kind != TargetKind::Sequence {
                push(&PropKey::Iterate);
                if kind == TargetKind::MapLike {
                    push(&PropKey::MapKeyIterate);
                }
            } else if key.is_some_and(PropKey::is_integer) {
                // New index means the length changed
                push(&PropKey::Length);
            }
        }
        TriggerOpType::Delete => {
            if kind != TargetKind::Sequence {
                push(&PropKey::Iterate);
                if kind == TargetKind::MapLike {
                    push(&PropKey::MapKeyIterate);
                }
            }
        }
        TriggerOpType::Set => {
            if kind == TargetKind::MapLike {
                push(&PropKey::Iterate);
            }
        }
        TriggerOpType::Clear => {}
    }

    deps
}

/// Notify computed-backed effects first, then the rest.
fn notify_effects<'a>(effects: impl Iterator<Item = &'a ReactiveEffect> + Clone) {
    for effect in effects.clone().filter(|effect| effect.is_computed()) {
        notify_effect(effect);
    }
    for effect in effects.filter(|effect| !effect.is_computed()) {
        notify_effect(effect);
    }
}

fn notify_effect(effect: &ReactiveEffect) {
    // Stopped by an effect notified earlier in the same trigger
    if !effect.is_active() {
        return;
    }
    // An effect never re-triggers itself unless it opts in
    if context::is_active_effect(effect) && !effect.allow_recurse() {
        return;
    }
    effect.notify();
}
