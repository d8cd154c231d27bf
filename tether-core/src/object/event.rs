//! Synchronous multicast events.
//!
//! An `Event<E>` keeps an ordered set of handlers. Subscribing returns a
//! `Subscription` guard; dropping the guard detaches the handler. The guard
//! only holds a weak reference to the handler set, so it never keeps the
//! object that owns the event alive.
//!
//! `raise` invokes a snapshot of the handlers taken under a short read lock.
//! Handlers may therefore subscribe or unsubscribe (themselves included)
//! without deadlocking, at the cost that a handler detached concurrently with
//! a raise can still observe that one in-flight event.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

/// Handle of one attached handler. Unique across all events in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

static NEXT_HANDLER: AtomicU64 = AtomicU64::new(1);

impl SubscriberId {
    fn next() -> Self {
        Self(NEXT_HANDLER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Handlers<E> {
    map: RwLock<IndexMap<SubscriberId, Handler<E>>>,
}

/// Type-erased detach hook so `Subscription` does not carry `E`.
trait Detach: Send + Sync {
    fn detach(&self, id: SubscriberId);
}

impl<E: 'static> Detach for Handlers<E> {
    fn detach(&self, id: SubscriberId) {
        self.map.write().shift_remove(&id);
    }
}

/// A multicast event carrying payloads of type `E`.
pub struct Event<E> {
    handlers: Arc<Handlers<E>>,
}

impl<E: 'static> Event<E> {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Handlers {
                map: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Register a handler. It stays attached until the returned guard drops.
    #[must_use = "dropping the subscription detaches the handler immediately"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriberId::next();
        self.handlers.map.write().insert(id, Arc::new(handler));

        let weak: Weak<Handlers<E>> = Arc::downgrade(&self.handlers);
        Subscription {
            id,
            source: Some(weak as Weak<dyn Detach>),
        }
    }

    /// Invoke every handler attached at the time of the call, in
    /// subscription order.
    pub fn raise(&self, event: &E) {
        let snapshot: SmallVec<[Handler<E>; 4]> =
            self.handlers.map.read().values().cloned().collect();
        for handler in snapshot {
            handler(event);
        }
    }

    /// Detach every handler.
    pub fn clear(&self) {
        self.handlers.map.write().clear();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.map.read().len()
    }
}

impl<E: 'static> Default for Event<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Event<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("handler_count", &self.handlers.map.read().len())
            .finish()
    }
}

/// Guard for an attached handler.
pub struct Subscription {
    id: SubscriberId,
    source: Option<Weak<dyn Detach>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Detach now. Equivalent to dropping the guard.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(handlers) = self.source.take().and_then(|weak| weak.upgrade()) {
            handlers.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn handlers_on_different_events_never_share_an_id() {
        let first = Event::<()>::new();
        let second = Event::<()>::new();

        let a = first.subscribe(|_| {});
        let b = first.subscribe(|_| {});
        let c = second.subscribe(|_| {});

        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert!(a.id().get() < b.id().get());

        // Detaching `c` must leave `first` untouched.
        c.unsubscribe();
        assert_eq!(first.handler_count(), 2);
        assert_eq!(second.handler_count(), 0);
    }

    #[test]
    fn raise_reaches_every_handler() {
        let event = Event::<i32>::new();
        let total = Arc::new(AtomicI32::new(0));

        let t1 = total.clone();
        let _a = event.subscribe(move |v| {
            t1.fetch_add(*v, Ordering::SeqCst);
        });
        let t2 = total.clone();
        let _b = event.subscribe(move |v| {
            t2.fetch_add(*v * 10, Ordering::SeqCst);
        });

        event.raise(&2);
        assert_eq!(total.load(Ordering::SeqCst), 22);
    }

    #[test]
    fn dropping_subscription_detaches() {
        let event = Event::<()>::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let sub = event.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        event.raise(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drop(sub);
        assert_eq!(event.handler_count(), 0);
        event.raise(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_outliving_event_is_harmless() {
        let event = Event::<()>::new();
        let sub = event.subscribe(|_| {});
        drop(event);
        sub.unsubscribe();
    }

    #[test]
    fn handler_can_subscribe_during_raise() {
        let event = Arc::new(Event::<()>::new());
        let late = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let event_clone = event.clone();
        let late_clone = late.clone();
        let _sub = event.subscribe(move |_| {
            late_clone.lock().push(event_clone.subscribe(|_| {}));
        });

        event.raise(&());
        assert_eq!(event.handler_count(), 2);
    }
}
