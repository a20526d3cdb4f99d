//! Job Queue
//!
//! A batching scheduler callers can plug into effects. Instead of
//! re-running as soon as a dependency changes, an effect using
//! [`JobQueue::scheduler`] is queued; [`JobQueue::flush`] later runs every
//! queued effect once.
//!
//! # Ordering
//!
//! Queued effects run in ascending [`EffectId`] order. IDs follow creation
//! order, so an outer effect runs before the effects created in its body.
//! An effect queued again while the flush is in progress (for example, an
//! `allow_recurse` effect writing to its own dependency) runs again in the
//! same flush.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::reactive::{EffectId, ReactiveEffect, Scheduler, WeakEffect};

#[derive(Default)]
struct QueueInner {
    jobs: RefCell<BTreeMap<EffectId, WeakEffect>>,
    flushing: Cell<bool>,
}

/// A queue of invalidated effects waiting to be run.
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct JobQueue {
    inner: Rc<QueueInner>,
}

impl JobQueue {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler that queues the invalidated effect here.
    ///
    /// The scheduler holds the queue weakly; once every queue handle is
    /// dropped, invalidations are discarded.
    pub fn scheduler(&self) -> Scheduler {
        let queue: Weak<QueueInner> = Rc::downgrade(&self.inner);
        Rc::new(move |effect: &ReactiveEffect| {
            if let Some(inner) = queue.upgrade() {
                JobQueue { inner }.push(effect);
            }
        })
    }

    /// Queue `effect`. Returns `false` if it was already queued.
    pub fn push(&self, effect: &ReactiveEffect) -> bool {
        let mut jobs = self.inner.jobs.borrow_mut();
        if jobs.contains_key(&effect.id()) {
            return false;
        }
        trace!(effect = %effect.id(), "job queued");
        jobs.insert(effect.id(), effect.downgrade());
        true
    }

    /// Number of queued effects.
    pub fn len(&self) -> usize {
        self.inner.jobs.borrow().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.jobs.borrow().is_empty()
    }

    /// Run every queued effect, returning how many ran.
    ///
    /// Stopped and dropped effects are skipped. A flush started from
    /// inside a running flush does nothing; the outer flush picks up
    /// whatever was queued.
    pub fn flush(&self) -> usize {
        if self.inner.flushing.replace(true) {
            return 0;
        }

        struct Done<'a>(&'a Cell<bool>);

        impl Drop for Done<'_> {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }

        let _done = Done(&self.inner.flushing);
        let mut ran = 0;
        loop {
            let next = self.inner.jobs.borrow_mut().pop_first();
            let Some((_, job)) = next else {
                break;
            };
            let Some(effect) = job.upgrade() else {
                continue;
            };
            if effect.is_active() {
                effect.run();
                ran += 1;
            }
        }

        trace!(ran, "job queue flushed");
        ran
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("len", &self.len())
            .field("flushing", &self.inner.flushing.get())
            .finish()
    }
}
