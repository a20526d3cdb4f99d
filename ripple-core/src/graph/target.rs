//! Observable Targets
//!
//! An observable location is the pair (target, key). This module defines
//! both halves: [`Target`], the identity token the interception layer
//! hands out for each reactive object, and [`PropKey`], the key space
//! within one target.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::target_map;

/// Unique identifier for a target in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The structural shape of a target.
///
/// `trigger` uses this to decide which synthetic keys a structural write
/// invalidates, in place of inspecting the object at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// An ordinary keyed object.
    Plain,

    /// An indexable sequence with a `length`.
    Sequence,

    /// A map-like collection whose keys can be iterated on their own.
    MapLike,
}

/// Identity token for one observed object.
///
/// Clones share identity. The dependency graph refers to a target only by
/// its [`TargetId`], and when the last clone is dropped the target's node
/// is removed from the graph along with every dependency set it held.
#[derive(Clone)]
pub struct Target {
    inner: Rc<TargetInner>,
}

struct TargetInner {
    id: TargetId,
    kind: TargetKind,
}

impl Target {
    /// Create a new target of the given kind.
    pub fn new(kind: TargetKind) -> Self {
        Self {
            inner: Rc::new(TargetInner {
                id: TargetId::new(),
                kind,
            }),
        }
    }

    /// Create a new plain object target.
    pub fn plain() -> Self {
        Self::new(TargetKind::Plain)
    }

    /// Create a new sequence target.
    pub fn sequence() -> Self {
        Self::new(TargetKind::Sequence)
    }

    /// Create a new map-like collection target.
    pub fn map_like() -> Self {
        Self::new(TargetKind::MapLike)
    }

    /// Get the target's ID.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Get the target's kind.
    pub fn kind(&self) -> TargetKind {
        self.inner.kind
    }
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        target_map::forget_target(self.id);
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Target {}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

/// A property key within a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    /// An ordinary named property.
    Named(Rc<str>),

    /// An integer index into a sequence.
    Index(usize),

    /// The `length` of a sequence.
    Length,

    /// Synthetic key: the target's entries were enumerated.
    Iterate,

    /// Synthetic key: a map-like target's keys were enumerated.
    MapKeyIterate,
}

impl PropKey {
    /// Whether this key addresses an integer index.
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Index(_))
    }
}

impl From<&str> for PropKey {
    /// `"length"` maps to [`PropKey::Length`] and canonical non-negative
    /// integers (no sign, no leading zeros) map to [`PropKey::Index`].
    fn from(key: &str) -> Self {
        if key == "length" {
            return Self::Length;
        }
        match key.parse::<usize>() {
            Ok(index) if index.to_string() == key => Self::Index(index),
            _ => Self::Named(Rc::from(key)),
        }
    }
}

impl From<String> for PropKey {
    fn from(key: String) -> Self {
        Self::from(key.as_str())
    }
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
            Self::Length => f.write_str("length"),
            Self::Iterate => f.write_str("<iterate>"),
            Self::MapKeyIterate => f.write_str("<map-key-iterate>"),
        }
    }
}
