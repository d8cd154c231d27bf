//! Path Tracking
//!
//! Runtime observation of a validated path on one root instance.
//!
//! # How it works
//!
//! A `PathTracker` owns one `Tracker` per path segment. Part 0 reads from
//! the root; part `i` reads from whatever part `i - 1` currently yields.
//! Each part subscribes to its own source's change notifications, filtered
//! to its attribute name.
//!
//! When a part's source announces a change, the part re-reads its value and
//! rebinds the next part, which rebinds the one after it, and so on until a
//! part's source stays the same. If anything moved, the tracker raises a
//! single `PathChanged`.
//!
//! ```text
//!   root ──next──► a ──next──► b ──is_true──► bool
//!   part 0         part 1      part 2
//! ```
//!
//! Replacing `root.next` rebinds parts 1 and 2 and raises once. Flipping
//! `b.is_true` raises once without rebinding anything.
//!
//! # Null handling
//!
//! Detaching a part to a null source while its previous value was already
//! null is suppressed: nothing observable changed. Rebinding a part to the
//! source it already has is a no-op.
//!
//! # Ownership
//!
//! Parts hold weak handles to their sources, and handlers hold a weak handle
//! to the chain. A tracker never keeps the observed graph alive, and the
//! graph never keeps a dropped tracker alive.

mod chain;
mod part;

pub use chain::PathTracker;
pub use part::Tracker;

use std::fmt;

use crate::object::{same_object, AttributeChanged, ObjectRef, Value};

/// The terminal segment's current source and the value read from it.
#[derive(Clone, Default)]
pub struct SourceAndValue {
    pub source: Option<ObjectRef>,
    pub value: Option<Value>,
}

impl SourceAndValue {
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

impl PartialEq for SourceAndValue {
    fn eq(&self, other: &Self) -> bool {
        same_object(self.source.as_ref(), other.source.as_ref()) && self.value == other.value
    }
}

impl fmt::Debug for SourceAndValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceAndValue")
            .field("source", &self.source.as_ref().map(|source| source.type_key()))
            .field("value", &self.value)
            .finish()
    }
}

/// Raised once per observable change of the path's value.
#[derive(Debug, Clone)]
pub struct PathChanged {
    /// Position of the part whose source raised the notification.
    pub origin: usize,
    /// The object that raised it, if still alive.
    pub sender: Option<ObjectRef>,
    pub attribute: AttributeChanged,
    pub source_and_value: SourceAndValue,
}
