//! The tracker chain and its owning handle.
//!
//! Parts live in one indexed array; the part after `i` is always `i + 1`.
//! Subscription handlers hold a `Weak` to the shared chain plus their part
//! index, so dropping the `PathTracker` is enough to silence every handler.
//!
//! # Locking
//!
//! Each part has its own reentrant gate. A transition holds the gate of the
//! part it started on while it rebinds downstream parts and reads the
//! terminal value. Gates are only ever waited on in increasing index order,
//! and no gate is held while handlers run, so handlers may query or dispose
//! the tracker while other threads keep mutating the graph.
//!
//! Outward events go through a chain-wide reentrant delivery lock. It keeps
//! deliveries from overlapping and lets `dispose` wait for the one in flight,
//! so no handler runs after `dispose` returns. A handler that blocks until
//! another thread's change to the same chain has been delivered deadlocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;

use super::part::{Tracker, Transition};
use super::{PathChanged, SourceAndValue};
use crate::config::TrackingConfig;
use crate::error::{Error, Result};
use crate::object::{AttributeChanged, Event, Object, ObjectRef, Subscription, TypeRegistry, Value};
use crate::path::NotifyingPath;

pub(crate) struct ChainShared {
    me: Weak<ChainShared>,
    path: Arc<NotifyingPath>,
    root: Weak<dyn Object>,
    parts: Vec<Tracker>,
    changed: Event<PathChanged>,
    delivery: ReentrantMutex<()>,
    disposed: AtomicBool,
    config: TrackingConfig,
}

impl ChainShared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Rebind part `index` and propagate downstream while its value moves.
    fn set_source(&self, index: usize, new: Option<ObjectRef>) -> Transition {
        if self.is_disposed() {
            return Transition::Unchanged;
        }
        let Some(part) = self.parts.get(index) else {
            return Transition::Unchanged;
        };

        let _gate = part.lock();
        let (transition, value) =
            part.rebind(new.as_ref(), &self.me, self.config.suppress_null_transitions);
        if transition != Transition::Unchanged && index + 1 < self.parts.len() {
            self.set_source(index + 1, value.and_then(Value::into_object));
        }
        transition
    }

    pub(crate) fn on_attribute_changed(
        &self,
        index: usize,
        generation: u64,
        sender: &Weak<dyn Object>,
        attribute: &AttributeChanged,
    ) {
        if self.is_disposed() {
            return;
        }
        let Some(part) = self.parts.get(index) else {
            return;
        };

        let gate = part.lock();
        if !part.is_current(generation) {
            tracing::trace!(part = index, %attribute, "ignoring event from a replaced source");
            return;
        }

        let sender = sender.upgrade();
        let value = part.refresh_value();
        let changed = if index + 1 == self.parts.len() {
            true
        } else {
            self.set_source(index + 1, value.and_then(Value::into_object)) == Transition::Changed
        };
        if !changed || self.is_disposed() {
            return;
        }

        let suspect = sender.is_none() || self.parts.iter().any(Tracker::source_is_dead);
        let terminal = self.terminal();
        drop(gate);

        let source_and_value = if suspect && self.config.refresh_on_suspect_events {
            tracing::debug!(path = %self.path.text(), part = index, "stale source observed; refreshing from root");
            self.refresh()
        } else {
            terminal
        };

        let _delivery = self.delivery.lock();
        if self.is_disposed() {
            return;
        }
        tracing::trace!(path = %self.path.text(), part = index, %attribute, "path value changed");
        self.changed.raise(&PathChanged {
            origin: index,
            sender,
            attribute: attribute.clone(),
            source_and_value,
        });
    }

    /// Walk from the root, re-synchronizing every part.
    fn refresh(&self) -> SourceAndValue {
        if self.is_disposed() {
            return SourceAndValue::default();
        }

        let mut source = self.root.upgrade();
        let mut result = SourceAndValue::default();
        for part in &self.parts {
            let _gate = part.lock();
            let (_, value) =
                part.rebind(source.as_ref(), &self.me, self.config.suppress_null_transitions);
            result = SourceAndValue {
                source: source.take(),
                value,
            };
            source = result.value.clone().and_then(Value::into_object);
        }
        result
    }

    fn terminal(&self) -> SourceAndValue {
        match self.parts.last() {
            Some(part) => {
                let source = part.source();
                let value = source.as_ref().and_then(|_| part.value());
                SourceAndValue { source, value }
            }
            None => SourceAndValue::default(),
        }
    }

    fn dispose(&self) {
        let _delivery = self.delivery.lock();
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for part in &self.parts {
            part.dispose();
        }
        self.changed.clear();
        tracing::debug!(path = %self.path.text(), "disposed path tracker");
    }
}

/// Live tracking of one validated path on one root instance.
///
/// Dropping the tracker disposes it.
pub struct PathTracker {
    shared: Arc<ChainShared>,
}

impl PathTracker {
    pub fn new(root: &ObjectRef, path: Arc<NotifyingPath>) -> Result<Self> {
        Self::with_config(root, path, TrackingConfig::default())
    }

    /// Build the chain for `root`.
    ///
    /// Whether the terminal segment may be plain comes from `path`; the
    /// other flags come from `config`.
    pub fn with_config(
        root: &ObjectRef,
        path: Arc<NotifyingPath>,
        config: TrackingConfig,
    ) -> Result<Self> {
        let actual = root.type_key();
        let expected = path.root_type();
        if !TypeRegistry::is_assignable(&actual, &expected) {
            return Err(Error::InvalidCast {
                expected: expected.name().to_string(),
                found: actual.name().to_string(),
                attribute: path
                    .segments()
                    .first()
                    .map(|segment| segment.accessor().name().to_string())
                    .unwrap_or_default(),
            });
        }

        let last = path.len().saturating_sub(1);
        let allow_plain_terminal = !path.requires_notifying_terminal();
        let parts = path
            .segments()
            .iter()
            .map(|segment| {
                let position = segment.position();
                Tracker::new(
                    position,
                    Arc::clone(segment.accessor()),
                    allow_plain_terminal && position == last,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let shared = Arc::new_cyclic(|me| ChainShared {
            me: Weak::clone(me),
            root: Arc::downgrade(root),
            parts,
            changed: Event::new(),
            delivery: ReentrantMutex::new(()),
            disposed: AtomicBool::new(false),
            config,
            path,
        });

        shared.set_source(0, Some(Arc::clone(root)));
        shared.refresh();
        tracing::debug!(path = %shared.path.text(), parts = shared.parts.len(), "created path tracker");

        Ok(Self { shared })
    }

    /// Listen for changes of the value at the end of the path.
    #[must_use = "dropping the subscription detaches the handler immediately"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&PathChanged) + Send + Sync + 'static,
    {
        self.shared.changed.subscribe(handler)
    }

    /// Re-walk the chain from the root and return the terminal source and
    /// value.
    pub fn source_and_value(&self) -> SourceAndValue {
        self.shared.refresh()
    }

    pub fn current_value(&self) -> Option<Value> {
        self.source_and_value().value
    }

    pub fn path(&self) -> &Arc<NotifyingPath> {
        &self.shared.path
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.shared.config
    }

    pub fn parts(&self) -> &[Tracker] {
        &self.shared.parts
    }

    pub fn part(&self, position: usize) -> Option<&Tracker> {
        self.shared.parts.get(position)
    }

    /// Release every subscription. Safe to call repeatedly and from any
    /// thread.
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }
}

impl Drop for PathTracker {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl std::fmt::Debug for PathTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathTracker")
            .field("path", &self.shared.path.text())
            .field("parts", &self.shared.parts)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Link, Shape, Walker};
    use crate::path::Path;
    use std::sync::atomic::AtomicI32;

    fn counter(tracker: &PathTracker) -> (Arc<AtomicI32>, Subscription) {
        let count = Arc::new(AtomicI32::new(0));
        let c = count.clone();
        let subscription = tracker.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, subscription)
    }

    #[test]
    fn construction_binds_every_part() {
        let root = Link::new(false);
        let next = Link::new(true);
        root.set_next(Some(next.clone()));

        let tracker = Path::<Link>::parse("x => x.next.is_true").unwrap().track(&root).unwrap();
        assert_eq!(tracker.parts().len(), 2);
        assert!(tracker.part(0).unwrap().is_subscribed());
        assert!(tracker.part(1).unwrap().is_subscribed());
        assert_eq!(root.listener_count(), 1);
        assert_eq!(next.listener_count(), 1);
        assert_eq!(tracker.current_value(), Some(Value::Bool(true)));
    }

    #[test]
    fn terminal_changes_carry_the_new_value() {
        let root = Link::new(false);
        let next = Link::new(false);
        root.set_next(Some(next.clone()));

        let tracker = Path::<Link>::parse("x => x.next.is_true").unwrap().track(&root).unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = seen.clone();
        let _subscription = tracker.subscribe(move |change| {
            s.lock().push((change.origin, change.source_and_value.value.clone()));
        });

        next.set_is_true(true);
        assert_eq!(*seen.lock(), vec![(1, Some(Value::Bool(true)))]);
    }

    #[test]
    fn unrelated_attributes_are_filtered() {
        let root = Link::new(false);
        root.set_next(Some(Link::new(false)));
        let tracker = Path::<Link>::parse("x => x.next.is_true").unwrap().track(&root).unwrap();
        let (count, _subscription) = counter(&tracker);

        root.set_is_true(true);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn the_all_sentinel_reaches_every_part() {
        let root = Link::new(false);
        let next = Link::new(false);
        root.set_next(Some(next.clone()));
        let tracker = Path::<Link>::parse("x => x.next.is_true").unwrap().track(&root).unwrap();
        let (count, _subscription) = counter(&tracker);

        // Same source after re-read: nothing moves downstream.
        root.notifier.raise_all();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        next.notifier.raise("");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn interface_segments_follow_the_implementor() {
        let shape = Shape::new();
        let walker = Walker::new("ada");
        shape.set_named(Some(walker.clone()));

        let tracker = Path::<Shape>::parse("x => x.named.name").unwrap().track(&shape).unwrap();
        assert_eq!(tracker.current_value(), Some(Value::from("ada")));

        let (count, _subscription) = counter(&tracker);
        walker.set_name("grace");
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.current_value(), Some(Value::from("grace")));
    }

    #[test]
    fn wrong_root_type_is_an_invalid_cast() {
        let path = Path::<Link>::parse("x => x.next").unwrap();
        let shape: ObjectRef = Shape::new();
        let err = PathTracker::new(&shape, Arc::clone(path.notifying_path())).unwrap_err();
        assert!(matches!(err, Error::InvalidCast { ref expected, ref found, .. } if expected == "Link" && found == "Shape"));
    }

    #[test]
    fn dispose_is_idempotent_and_detaches() {
        let root = Link::new(false);
        let tracker = Path::<Link>::parse("x => x.next.is_true").unwrap().track(&root).unwrap();
        let (count, _subscription) = counter(&tracker);

        tracker.dispose();
        tracker.dispose();
        assert!(tracker.is_disposed());
        assert_eq!(root.listener_count(), 0);

        root.set_next(Some(Link::new(true)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.source_and_value(), SourceAndValue::default());
    }

    #[test]
    fn dropping_the_tracker_detaches() {
        let root = Link::new(false);
        {
            let _tracker = Path::<Link>::parse("x => x.next").unwrap().track(&root).unwrap();
            assert_eq!(root.listener_count(), 1);
        }
        assert_eq!(root.listener_count(), 0);
    }

    #[test]
    fn source_and_value_resynchronizes_the_chain() {
        let root = Link::new(false);
        let tracker = Path::<Link>::parse("x => x.next.is_true").unwrap().track(&root).unwrap();

        // Written without raising, so the chain does not know yet.
        *root.next.write() = Some(Link::new(true));
        assert!(tracker.part(1).unwrap().source().is_none());

        let current = tracker.source_and_value();
        assert_eq!(current.value, Some(Value::Bool(true)));
        assert!(tracker.part(1).unwrap().is_subscribed());
    }
}
