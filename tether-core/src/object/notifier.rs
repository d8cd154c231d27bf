//! Change notification.
//!
//! A type that declares itself `notifying()` embeds a `ChangeNotifier` and
//! returns it from `Reflect::change_notifier`. Setters raise an
//! `AttributeChanged` carrying the attribute name; an empty or absent name
//! means every attribute may have changed.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::event::{Event, Subscription};

/// Payload of a change notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeChanged {
    name: Option<Arc<str>>,
}

impl AttributeChanged {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let name: Arc<str> = name.into();
        if name.is_empty() {
            Self::all()
        } else {
            Self { name: Some(name) }
        }
    }

    /// The "all attributes may have changed" sentinel.
    pub fn all() -> Self {
        Self { name: None }
    }

    /// The changed attribute, or `None` for the sentinel.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_all(&self) -> bool {
        self.name.is_none()
    }

    /// Whether a listener interested in `attribute` should react.
    pub fn affects(&self, attribute: &str) -> bool {
        match &self.name {
            Some(name) => name.as_ref() == attribute,
            None => true,
        }
    }
}

impl fmt::Display for AttributeChanged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => f.write_str("*"),
        }
    }
}

/// The change-notification capability of an observable object.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    changed: Event<AttributeChanged>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to every notification.
    #[must_use = "dropping the subscription detaches the handler immediately"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AttributeChanged) + Send + Sync + 'static,
    {
        self.changed.subscribe(handler)
    }

    /// Listen to notifications for `attribute` and to the "all" sentinel.
    #[must_use = "dropping the subscription detaches the handler immediately"]
    pub fn subscribe_attribute<F>(&self, attribute: &str, handler: F) -> Subscription
    where
        F: Fn(&AttributeChanged) + Send + Sync + 'static,
    {
        let attribute: Arc<str> = Arc::from(attribute);
        self.changed.subscribe(move |event| {
            if event.affects(&attribute) {
                handler(event);
            }
        })
    }

    pub fn raise(&self, attribute: &str) {
        self.changed.raise(&AttributeChanged::new(attribute));
    }

    pub fn raise_all(&self) {
        self.changed.raise(&AttributeChanged::all());
    }

    /// Store `value` into `slot` and raise `attribute`.
    ///
    /// The write lock is released before listeners run, so listeners may read
    /// the slot back.
    pub fn set_and_raise<T>(&self, slot: &RwLock<T>, value: T, attribute: &str) {
        *slot.write() = value;
        self.raise(attribute);
    }

    pub fn listener_count(&self) -> usize {
        self.changed.handler_count()
    }
}
