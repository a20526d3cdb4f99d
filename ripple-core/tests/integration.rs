//! Integration Tests for the Tracking Core
//!
//! These tests drive effects and computeds through `track`/`trigger` the
//! way an interception layer would, and check the dependency graph that
//! results.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde_json::json;

use ripple_core::graph::dep_count_for;
use ripple_core::reactive::{active_effect, effect_track_depth, should_track};
use ripple_core::{
    computed, configure, effect, pause_tracking, reset_tracking, stop, track, trigger,
    EffectOptions, EffectRunner, EffectScope, PropKey, ReactiveConfig, Target, TrackOpType,
    TriggerOpType,
};

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

fn bump(counter: &Cell<u32>) {
    counter.set(counter.get() + 1);
}

fn read(target: &Target, key: &str) {
    track(target, TrackOpType::Get, key);
}

fn write(target: &Target, key: &str) {
    trigger(target, TriggerOpType::Set, Some(&PropKey::from(key)), None, None);
}

fn subscribers(target: &Target, key: &str) -> usize {
    dep_count_for(target, &PropKey::from(key)).unwrap_or(0)
}

/// Scenario: effect copies `a` into `x`; a changed write re-runs it, a
/// same-value write does not.
#[test]
fn effect_copies_value_and_ignores_same_value_writes() {
    let state = Target::plain();
    let a = Rc::new(Cell::new(1));
    let x = Rc::new(Cell::new(0));
    let runs = counter();

    let _runner = {
        let (state, a, x, runs) = (state.clone(), a.clone(), x.clone(), runs.clone());
        effect(
            move || {
                bump(&runs);
                read(&state, "a");
                x.set(a.get());
            },
            EffectOptions::default(),
        )
    };
    assert_eq!(x.get(), 1);

    a.set(2);
    trigger(&state, TriggerOpType::Set, Some(&PropKey::from("a")), Some(&json!(2)), Some(&json!(1)));
    assert_eq!(x.get(), 2);
    assert_eq!(runs.get(), 2);

    trigger(&state, TriggerOpType::Set, Some(&PropKey::from("a")), Some(&json!(2)), Some(&json!(2)));
    assert_eq!(runs.get(), 2);
}

/// An effect ends each run subscribed to exactly what that run read.
#[test]
fn abandoned_branch_is_unsubscribed() {
    let state = Target::plain();
    let flag = Rc::new(Cell::new(true));
    let runs = counter();

    let runner = {
        let (state, flag, runs) = (state.clone(), flag.clone(), runs.clone());
        effect(
            move || {
                bump(&runs);
                read(&state, "flag");
                if flag.get() {
                    read(&state, "yes");
                } else {
                    read(&state, "no");
                }
            },
            EffectOptions::default(),
        )
    };
    assert_eq!(runner.effect().dep_count(), 2);
    assert_eq!(subscribers(&state, "yes"), 1);

    flag.set(false);
    write(&state, "flag");
    assert_eq!(runs.get(), 2);
    assert_eq!(subscribers(&state, "yes"), 0);
    assert_eq!(subscribers(&state, "no"), 1);
    assert_eq!(runner.effect().dep_count(), 2);

    // The abandoned branch no longer triggers
    write(&state, "yes");
    assert_eq!(runs.get(), 2);

    write(&state, "no");
    assert_eq!(runs.get(), 3);
}

/// Repeated reads within one run subscribe once.
#[test]
fn repeated_reads_subscribe_once() {
    let state = Target::plain();
    let runner = {
        let state = state.clone();
        effect(
            move || {
                for _ in 0..100 {
                    read(&state, "a");
                }
            },
            EffectOptions::default(),
        )
    };

    assert_eq!(runner.effect().dep_count(), 1);
    assert_eq!(subscribers(&state, "a"), 1);

    write(&state, "a");
    assert_eq!(runner.effect().dep_count(), 1);
}

/// Reads inside an inner effect attribute to it alone; reads around it
/// attribute to the outer effect.
#[test]
fn nested_effects_isolate_their_reads() {
    let state = Target::plain();
    let outer_runs = counter();
    let inner_runs = counter();
    let inner_slot: Rc<RefCell<Option<EffectRunner>>> = Rc::new(RefCell::new(None));

    let _outer = {
        let (state, outer_runs, inner_runs, inner_slot) =
            (state.clone(), outer_runs.clone(), inner_runs.clone(), inner_slot.clone());
        effect(
            move || {
                bump(&outer_runs);
                read(&state, "before");

                let inner = {
                    let (state, inner_runs) = (state.clone(), inner_runs.clone());
                    effect(
                        move || {
                            bump(&inner_runs);
                            read(&state, "inner");
                        },
                        EffectOptions::default(),
                    )
                };
                // Replacing the previous inner effect drops it
                *inner_slot.borrow_mut() = Some(inner);

                read(&state, "after");
            },
            EffectOptions::default(),
        )
    };
    assert_eq!((outer_runs.get(), inner_runs.get()), (1, 1));

    write(&state, "inner");
    assert_eq!((outer_runs.get(), inner_runs.get()), (1, 2));

    write(&state, "before");
    assert_eq!((outer_runs.get(), inner_runs.get()), (2, 3));

    write(&state, "after");
    assert_eq!((outer_runs.get(), inner_runs.get()), (3, 4));

    // Only the latest inner effect is subscribed
    assert_eq!(subscribers(&state, "inner"), 1);
    assert!(active_effect().is_none());
}

/// An effect writing what it reads runs once per external trigger.
#[test]
fn self_write_does_not_loop() {
    let state = Target::plain();
    let value = Rc::new(Cell::new(0));
    let runs = counter();

    let _runner = {
        let (state, value, runs) = (state.clone(), value.clone(), runs.clone());
        effect(
            move || {
                bump(&runs);
                read(&state, "n");
                value.set(value.get() + 1);
                write(&state, "n");
            },
            EffectOptions::default(),
        )
    };
    assert_eq!(runs.get(), 1);

    write(&state, "n");
    assert_eq!(runs.get(), 2);
    assert_eq!(value.get(), 2);
}

/// Two effects writing each other's inputs settle instead of recursing.
#[test]
fn mutual_writes_do_not_loop() {
    let state = Target::plain();
    let a_runs = counter();
    let b_runs = counter();

    let _b = {
        let (state, b_runs) = (state.clone(), b_runs.clone());
        effect(
            move || {
                bump(&b_runs);
                read(&state, "x");
                write(&state, "y");
            },
            EffectOptions::default(),
        )
    };
    let _a = {
        let (state, a_runs) = (state.clone(), a_runs.clone());
        effect(
            move || {
                bump(&a_runs);
                read(&state, "y");
                write(&state, "x");
            },
            EffectOptions::default(),
        )
    };

    // Creating A wrote x, which re-ran B; B's write to y found A on the
    // chain of running effects and was skipped.
    assert_eq!((a_runs.get(), b_runs.get()), (1, 2));
}

/// Allowing recursion lets a scheduled effect re-enter a bounded number
/// of times.
#[test]
fn allow_recurse_permits_bounded_reentry() {
    let state = Target::plain();
    let count = Rc::new(Cell::new(0));
    let pending: Rc<RefCell<Vec<ripple_core::ReactiveEffect>>> = Rc::new(RefCell::new(Vec::new()));

    let _runner = {
        let (state, count) = (state.clone(), count.clone());
        let pending = pending.clone();
        effect(
            move || {
                read(&state, "count");
                if count.get() < 5 {
                    count.set(count.get() + 1);
                    write(&state, "count");
                }
            },
            EffectOptions::default()
                .allow_recurse()
                .scheduler(move |effect| pending.borrow_mut().push(effect.clone())),
        )
    };

    loop {
        let next = pending.borrow_mut().pop();
        let Some(effect) = next else {
            break;
        };
        effect.run();
    }
    assert_eq!(count.get(), 5);
}

/// Stopping twice is the same as stopping once.
#[test]
fn stop_is_idempotent() {
    let state = Target::plain();
    let runs = counter();
    let stops = counter();

    let runner = {
        let (state, runs, stops) = (state.clone(), runs.clone(), stops.clone());
        effect(
            move || {
                bump(&runs);
                read(&state, "a");
                read(&state, "b");
            },
            EffectOptions::default().on_stop(move || bump(&stops)),
        )
    };

    stop(&runner);
    stop(&runner);
    assert_eq!(stops.get(), 1);
    assert_eq!(subscribers(&state, "a"), 0);
    assert_eq!(subscribers(&state, "b"), 0);

    write(&state, "a");
    assert_eq!(runs.get(), 1);
}

/// The getter runs on first read, never on construction, and once per
/// upstream change.
#[test]
fn computed_is_lazy_and_cached() {
    let state = Target::plain();
    let source = Rc::new(Cell::new(2));
    let calls = counter();

    let squared = {
        let (state, source, calls) = (state.clone(), source.clone(), calls.clone());
        computed(move || {
            bump(&calls);
            read(&state, "n");
            source.get() * source.get()
        })
    };
    assert_eq!(calls.get(), 0);

    assert_eq!(squared.get(), 4);
    assert_eq!(calls.get(), 1);

    assert_eq!(squared.get(), 4);
    assert_eq!(squared.get(), 4);
    assert_eq!(calls.get(), 1);

    source.set(3);
    write(&state, "n");
    assert_eq!(calls.get(), 1);
    assert_eq!(squared.get(), 9);
    assert_eq!(calls.get(), 2);
}

/// Computeds are invalidated before plain effects run, so an effect that
/// reads both a source and a computed over it never sees them disagree.
#[test]
fn effects_never_observe_stale_computeds() {
    let state = Target::plain();
    let source = Rc::new(Cell::new(1));

    let doubled = {
        let (state, source) = (state.clone(), source.clone());
        computed(move || {
            read(&state, "n");
            source.get() * 2
        })
    };

    let observed = Rc::new(RefCell::new(Vec::new()));
    let _runner = {
        let (state, source, doubled, observed) =
            (state.clone(), source.clone(), doubled.clone(), observed.clone());
        effect(
            move || {
                read(&state, "n");
                observed.borrow_mut().push((source.get(), doubled.get()));
            },
            EffectOptions::default(),
        )
    };

    source.set(4);
    write(&state, "n");

    let observed = observed.borrow();
    assert!(observed.len() >= 2);
    assert!(observed.iter().all(|(n, twice)| *twice == n * 2));
    assert_eq!(observed.last(), Some(&(4, 8)));
}

/// Shrinking a sequence invalidates reads of indices past the new end,
/// even if those indices were never written.
#[test]
fn shrinking_length_invalidates_out_of_range_reads() {
    let list = Target::sequence();
    let runs = counter();

    let _runner = {
        let (list, runs) = (list.clone(), runs.clone());
        effect(
            move || {
                bump(&runs);
                track(&list, TrackOpType::Get, 5usize);
            },
            EffectOptions::default(),
        )
    };

    trigger(&list, TriggerOpType::Set, Some(&PropKey::Length), Some(&json!(1)), Some(&json!(3)));
    assert_eq!(runs.get(), 2);
}

/// Pushing onto a sequence re-runs effects that read its length.
#[test]
fn appending_to_sequence_invalidates_length() {
    let list = Target::sequence();
    let runs = counter();

    let _runner = {
        let (list, runs) = (list.clone(), runs.clone());
        effect(
            move || {
                bump(&runs);
                track(&list, TrackOpType::Get, "length");
            },
            EffectOptions::default(),
        )
    };

    trigger(&list, TriggerOpType::Add, Some(&PropKey::from("3")), Some(&json!("x")), None);
    assert_eq!(runs.get(), 2);
}

/// Reads inside a paused section do not subscribe.
#[test]
fn paused_reads_are_not_tracked() {
    let state = Target::plain();
    let runner = {
        let state = state.clone();
        effect(
            move || {
                read(&state, "tracked");
                pause_tracking();
                read(&state, "hidden");
                reset_tracking();
            },
            EffectOptions::default(),
        )
    };

    assert_eq!(runner.effect().dep_count(), 1);
    assert_eq!(subscribers(&state, "hidden"), 0);
    assert!(should_track());
}

/// A panicking effect body leaves the tracking context intact.
#[test]
fn panicking_effect_restores_context() {
    let state = Target::plain();
    let fail = Rc::new(Cell::new(false));

    let _failing = {
        let (state, fail) = (state.clone(), fail.clone());
        effect(
            move || {
                read(&state, "a");
                if fail.get() {
                    panic!("effect body failed");
                }
            },
            EffectOptions::default(),
        )
    };

    fail.set(true);
    let result = panic::catch_unwind(AssertUnwindSafe(|| write(&state, "a")));
    assert!(result.is_err());

    assert!(active_effect().is_none());
    assert!(should_track());
    assert_eq!(effect_track_depth(), 0);

    // Unrelated effects still track normally
    let runs = counter();
    let _other = {
        let (state, runs) = (state.clone(), runs.clone());
        effect(
            move || {
                bump(&runs);
                read(&state, "b");
            },
            EffectOptions::default(),
        )
    };
    write(&state, "b");
    assert_eq!(runs.get(), 2);
}

/// With no marker bits every run falls back to full cleanup, with the
/// same observable behaviour at any nesting depth.
#[test]
fn deep_nesting_falls_back_to_full_cleanup() {
    configure(ReactiveConfig { max_marker_bits: 0 }).unwrap();

    let state = Target::plain();
    let flag = Rc::new(Cell::new(true));
    let inner_slot: Rc<RefCell<Option<EffectRunner>>> = Rc::new(RefCell::new(None));

    let _outer = {
        let (state, flag, inner_slot) = (state.clone(), flag.clone(), inner_slot.clone());
        effect(
            move || {
                read(&state, "outer");
                let inner = {
                    let (state, flag) = (state.clone(), flag.clone());
                    effect(
                        move || {
                            read(&state, "flag");
                            read(&state, "flag");
                            if flag.get() {
                                read(&state, "yes");
                            } else {
                                read(&state, "no");
                            }
                        },
                        EffectOptions::default(),
                    )
                };
                *inner_slot.borrow_mut() = Some(inner);
            },
            EffectOptions::default(),
        )
    };

    let inner = inner_slot.borrow().clone().unwrap();
    assert_eq!(inner.effect().dep_count(), 2);
    assert_eq!(subscribers(&state, "flag"), 1);

    flag.set(false);
    write(&state, "flag");
    assert_eq!(subscribers(&state, "yes"), 0);
    assert_eq!(subscribers(&state, "no"), 1);
    assert_eq!(inner.effect().dep_count(), 2);
}

/// With one marker bit, top-level runs diff with markers while nested runs
/// fall back to full cleanup. Both kinds share deps and stay exact.
#[test]
fn marker_and_fallback_depths_share_deps() {
    configure(ReactiveConfig { max_marker_bits: 1 }).unwrap();

    let state = Target::plain();
    let outer_flag = Rc::new(Cell::new(true));
    let inner_flag = Rc::new(Cell::new(true));
    let outer_runs = counter();
    let inner_runs = counter();

    let inner = {
        let (state, inner_flag, inner_runs) =
            (state.clone(), inner_flag.clone(), inner_runs.clone());
        effect(
            move || {
                bump(&inner_runs);
                read(&state, "shared");
                read(&state, "inner_flag");
                if inner_flag.get() {
                    read(&state, "inner_yes");
                } else {
                    read(&state, "inner_no");
                }
            },
            EffectOptions::default().lazy(),
        )
    };

    // The outer effect re-runs the inner one, so the inner one runs at depth 2
    let outer = {
        let (state, outer_flag, outer_runs, inner) =
            (state.clone(), outer_flag.clone(), outer_runs.clone(), inner.clone());
        effect(
            move || {
                bump(&outer_runs);
                read(&state, "shared");
                read(&state, "outer_flag");
                if outer_flag.get() {
                    read(&state, "outer_yes");
                } else {
                    read(&state, "outer_no");
                }
                inner.run();
                read(&state, "shared");
            },
            EffectOptions::default(),
        )
    };
    assert_eq!((outer_runs.get(), inner_runs.get()), (1, 1));
    assert_eq!(subscribers(&state, "shared"), 2);
    assert_eq!(outer.effect().dep_count(), 3);
    assert_eq!(inner.effect().dep_count(), 3);

    // Nested re-run of the inner effect switches its branch
    inner_flag.set(false);
    write(&state, "outer_flag");
    assert_eq!((outer_runs.get(), inner_runs.get()), (2, 2));
    assert_eq!(subscribers(&state, "inner_yes"), 0);
    assert_eq!(subscribers(&state, "inner_no"), 1);
    assert_eq!(subscribers(&state, "shared"), 2);
    assert_eq!(outer.effect().dep_count(), 3);
    assert_eq!(inner.effect().dep_count(), 3);

    // Outer switches its branch at depth 1, re-running the inner one nested;
    // the inner one is then notified again at depth 1
    outer_flag.set(false);
    write(&state, "shared");
    assert_eq!((outer_runs.get(), inner_runs.get()), (3, 4));
    assert_eq!(subscribers(&state, "outer_yes"), 0);
    assert_eq!(subscribers(&state, "outer_no"), 1);
    assert_eq!(subscribers(&state, "shared"), 2);
    assert_eq!(outer.effect().dep_count(), 3);
    assert_eq!(inner.effect().dep_count(), 3);

    // Top-level re-run of the inner effect switches back with markers
    inner_flag.set(true);
    write(&state, "inner_flag");
    assert_eq!((outer_runs.get(), inner_runs.get()), (3, 5));
    assert_eq!(subscribers(&state, "inner_yes"), 1);
    assert_eq!(subscribers(&state, "inner_no"), 0);
    assert_eq!(subscribers(&state, "shared"), 2);
    assert_eq!(inner.effect().dep_count(), 3);
    assert_eq!(outer.effect().dep_count(), 3);
}

/// Stopping a scope stops every effect created while it was running.
#[test]
fn scope_stop_releases_its_effects() {
    let state = Target::plain();
    let runs = counter();
    let scope = EffectScope::new();

    scope.run(|| {
        for key in ["a", "b"] {
            let (state, runs) = (state.clone(), runs.clone());
            // Scopes hold their effects, so the runners can be dropped
            let _ = effect(
                move || {
                    bump(&runs);
                    read(&state, key);
                },
                EffectOptions::default(),
            );
        }
    });
    assert_eq!(scope.effect_count(), 2);
    assert_eq!(runs.get(), 2);

    write(&state, "a");
    assert_eq!(runs.get(), 3);

    scope.stop();
    assert!(!scope.is_active());
    write(&state, "a");
    write(&state, "b");
    assert_eq!(runs.get(), 3);
    assert_eq!(subscribers(&state, "a"), 0);
}
