//! Observable Object Model
//!
//! The minimal runtime type surface the path engine needs: type descriptions
//! with named attributes, a closed set of attribute values, and the
//! change-notification capability objects use to announce that an attribute
//! changed.
//!
//! # Concepts
//!
//! ## Types
//!
//! A `Reflect` type describes its attributes once. The description is cached
//! in the `TypeRegistry` and drives path compilation: each attribute carries
//! the static type of its value, which is where the next path segment is
//! resolved.
//!
//! ## Notification
//!
//! A type declared `notifying()` owns a `ChangeNotifier`. Setters raise an
//! `AttributeChanged` with the attribute name, or the "all" sentinel when
//! anything may have changed.
//!
//! ## Ownership
//!
//! Observers hold `Weak` handles to observed instances and detach through
//! `Subscription` guards that do not keep the instance alive. Keeping the
//! observed graph alive is the caller's job.

mod event;
mod notifier;
mod types;
mod value;

pub use event::{Event, SubscriberId, Subscription};
pub use notifier::{AttributeChanged, ChangeNotifier};
pub use types::{
    AttributeDef, Object, ObjectRef, Reflect, TypeBuilder, TypeInfo, TypeKey, TypeKind,
    TypeRegistry,
};
pub use value::{same_object, AttributeValue, Value};

pub(crate) use types::{AttributeAccess, Getter};
