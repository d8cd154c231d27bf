//! One tracked segment.
//!
//! A `Tracker` mirrors one path segment for one root instance. It holds a
//! weak handle to its current source and a subscription to that source's
//! change notifications, and the two are always replaced together under the
//! part's gate.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use super::chain::ChainShared;
use crate::error::{Error, Result};
use crate::object::{AttributeChanged, Object, ObjectRef, Subscription, Value};
use crate::path::{Accessor, AccessorKind};

/// Outcome of rebinding a part to a new source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Same source as before; nothing happened.
    Unchanged,
    /// Detached to null from a source whose value was already null.
    Suppressed,
    Changed,
}

pub(crate) struct PartState {
    source: Option<Weak<dyn Object>>,
    subscription: Option<Subscription>,
    /// Bumped on every rebind; handlers carry the value they were created
    /// with and are ignored once it is stale.
    generation: u64,
    /// Whether the last read through this part produced a value. Used when
    /// the source has already been dropped and cannot be read again.
    had_value: bool,
    disposed: bool,
}

/// Runtime state of one path segment.
pub struct Tracker {
    position: usize,
    accessor: Arc<Accessor>,
    gate: ReentrantMutex<RefCell<PartState>>,
}

impl Tracker {
    pub(crate) fn new(position: usize, accessor: Arc<Accessor>, allow_plain: bool) -> Result<Self> {
        let declaring = accessor.declaring_type();
        let reason = if declaring.is_value_type() {
            Some("declared on a value type")
        } else if !accessor.supports_change_notification() && !allow_plain {
            Some("the declaring type does not support change notification")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(Error::InvalidTracker {
                position: position + 1,
                type_name: declaring.name().to_string(),
                attribute: accessor.name().to_string(),
                reason: reason.to_string(),
            });
        }

        Ok(Self {
            position,
            accessor,
            gate: ReentrantMutex::new(RefCell::new(PartState {
                source: None,
                subscription: None,
                generation: 0,
                had_value: false,
                disposed: false,
            })),
        })
    }

    /// 0-based position in the chain.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn accessor(&self) -> &Arc<Accessor> {
        &self.accessor
    }

    /// The current source, if set and still alive.
    pub fn source(&self) -> Option<ObjectRef> {
        let gate = self.gate.lock();
        let state = gate.borrow();
        state.source.as_ref().and_then(Weak::upgrade)
    }

    /// Read the attribute from the current source.
    pub fn value(&self) -> Option<Value> {
        self.source().and_then(|source| self.read(source.as_ref()))
    }

    pub fn is_subscribed(&self) -> bool {
        self.gate.lock().borrow().subscription.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.gate.lock().borrow().disposed
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<PartState>> {
        self.gate.lock()
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        let gate = self.gate.lock();
        let state = gate.borrow();
        !state.disposed && state.generation == generation
    }

    /// Whether the source was set and has since been dropped.
    ///
    /// A part busy on another thread is reported as alive.
    pub(crate) fn source_is_dead(&self) -> bool {
        match self.gate.try_lock() {
            Some(gate) => {
                let state = gate.borrow();
                state.source.as_ref().is_some_and(|weak| weak.strong_count() == 0)
            }
            None => false,
        }
    }

    /// Re-read the value after the source announced a change.
    pub(crate) fn refresh_value(&self) -> Option<Value> {
        let gate = self.gate.lock();
        let value = self.value();
        gate.borrow_mut().had_value = value.is_some();
        value
    }

    fn read(&self, source: &dyn Object) -> Option<Value> {
        match self.accessor.read(source) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(part = self.position, accessor = %self.accessor, %err, "attribute read failed");
                debug_assert!(false, "{err}");
                None
            }
        }
    }

    /// Point this part at `new`, replacing the subscription.
    ///
    /// Returns the transition and the value now read through this part.
    pub(crate) fn rebind(
        &self,
        new: Option<&ObjectRef>,
        chain: &Weak<ChainShared>,
        suppress_null: bool,
    ) -> (Transition, Option<Value>) {
        let gate = self.gate.lock();

        let (old_source, had_value) = {
            let state = gate.borrow();
            if state.disposed {
                return (Transition::Unchanged, None);
            }
            (state.source.clone(), state.had_value)
        };

        let old_alive = old_source.as_ref().and_then(Weak::upgrade);
        let unchanged = match (&old_source, new) {
            (None, None) => true,
            (Some(_), Some(new)) => old_alive
                .as_ref()
                .is_some_and(|old| std::ptr::addr_eq(Arc::as_ptr(old), Arc::as_ptr(new))),
            _ => false,
        };
        if unchanged {
            return (Transition::Unchanged, self.value());
        }

        let old_had_value = match &old_alive {
            Some(old) => self.read(old.as_ref()).is_some(),
            None => had_value,
        };

        let (stale, generation) = {
            let mut state = gate.borrow_mut();
            state.generation += 1;
            state.source = new.map(Arc::downgrade);
            (state.subscription.take(), state.generation)
        };
        drop(stale);

        if let Some(source) = new {
            self.subscribe(source, generation, chain, &gate);
        }

        let value = new.and_then(|source| self.read(source.as_ref()));
        gate.borrow_mut().had_value = value.is_some();

        tracing::trace!(
            part = self.position,
            accessor = %self.accessor,
            attached = new.is_some(),
            generation,
            "rebound tracker"
        );

        let transition = if suppress_null && new.is_none() && !old_had_value {
            Transition::Suppressed
        } else {
            Transition::Changed
        };
        (transition, value)
    }

    fn subscribe(
        &self,
        source: &ObjectRef,
        generation: u64,
        chain: &Weak<ChainShared>,
        gate: &RefCell<PartState>,
    ) {
        if self.accessor.kind() != AccessorKind::Notifying {
            return;
        }

        let Some(notifier) = source.change_notifier() else {
            tracing::warn!(
                part = self.position,
                type_name = source.type_key().name(),
                "notifying type returned no change notifier; changes will be missed"
            );
            return;
        };

        let position = self.position;
        let sender = Arc::downgrade(source);
        let chain = Weak::clone(chain);
        let subscription = notifier.subscribe_attribute(self.accessor.name(), move |event: &AttributeChanged| {
            if let Some(chain) = chain.upgrade() {
                chain.on_attribute_changed(position, generation, &sender, event);
            }
        });
        gate.borrow_mut().subscription = Some(subscription);
    }

    /// Release the subscription and forget the source. Idempotent.
    pub(crate) fn dispose(&self) {
        let gate = self.gate.lock();
        let stale = {
            let mut state = gate.borrow_mut();
            state.disposed = true;
            state.source = None;
            state.had_value = false;
            state.subscription.take()
        };
        drop(stale);
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("position", &self.position)
            .field("accessor", &self.accessor.to_string())
            .field("subscribed", &self.is_subscribed())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
