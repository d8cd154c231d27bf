//! Observable types shared by the unit tests.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::object::{ChangeNotifier, ObjectRef, Reflect, TypeBuilder};

/// A notifying linked node.
pub(crate) struct Link {
    pub(crate) next: RwLock<Option<Arc<Link>>>,
    pub(crate) is_true: RwLock<bool>,
    pub(crate) notifier: ChangeNotifier,
}

impl Link {
    pub(crate) fn new(is_true: bool) -> Arc<Self> {
        Arc::new(Self {
            next: RwLock::new(None),
            is_true: RwLock::new(is_true),
            notifier: ChangeNotifier::new(),
        })
    }

    pub(crate) fn set_next(&self, next: Option<Arc<Link>>) {
        self.notifier.set_and_raise(&self.next, next, "next");
    }

    pub(crate) fn set_is_true(&self, value: bool) {
        self.notifier.set_and_raise(&self.is_true, value, "is_true");
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.notifier.listener_count()
    }
}

impl Reflect for Link {
    fn describe(ty: TypeBuilder<Self>) -> TypeBuilder<Self> {
        ty.notifying()
            .attribute("next", |link: &Link| link.next.read().clone())
            .attribute("is_true", |link: &Link| *link.is_true.read())
            .write_only::<String>("secret")
    }

    fn notifier(&self) -> Option<&ChangeNotifier> {
        Some(&self.notifier)
    }
}

/// A reference type without change notification.
pub(crate) struct Plain {
    flag: bool,
}

impl Plain {
    pub(crate) fn new(flag: bool) -> Arc<Self> {
        Arc::new(Self { flag })
    }
}

impl Reflect for Plain {
    fn describe(ty: TypeBuilder<Self>) -> TypeBuilder<Self> {
        ty.attribute("flag", |plain: &Plain| plain.flag)
    }
}

/// A value type.
pub(crate) struct Point {
    x: f64,
    owner: Option<Arc<Plain>>,
}

impl Reflect for Point {
    fn describe(ty: TypeBuilder<Self>) -> TypeBuilder<Self> {
        ty.value_type()
            .attribute("x", |point: &Point| point.x)
            .attribute("owner", |point: &Point| point.owner.clone())
    }
}

/// An interface with one abstract attribute.
pub(crate) struct NamedThing;

impl Reflect for NamedThing {
    fn describe(ty: TypeBuilder<Self>) -> TypeBuilder<Self> {
        ty.interface().notifying().abstract_attribute::<String>("name")
    }
}

pub(crate) struct Walker {
    name: RwLock<String>,
    notifier: ChangeNotifier,
}

impl Walker {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: RwLock::new(name.to_string()),
            notifier: ChangeNotifier::new(),
        })
    }

    pub(crate) fn set_name(&self, name: &str) {
        self.notifier.set_and_raise(&self.name, name.to_string(), "name");
    }
}

impl Reflect for Walker {
    fn describe(ty: TypeBuilder<Self>) -> TypeBuilder<Self> {
        ty.notifying()
            .implements::<NamedThing>()
            .attribute("name", |walker: &Walker| walker.name.read().clone())
    }

    fn notifier(&self) -> Option<&ChangeNotifier> {
        Some(&self.notifier)
    }
}

/// A notifying root whose attributes lead into every other fixture.
pub(crate) struct Shape {
    origin: RwLock<Arc<Point>>,
    plain: RwLock<Option<Arc<Plain>>>,
    named: RwLock<Option<ObjectRef>>,
    notifier: ChangeNotifier,
}

impl Shape {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: RwLock::new(Arc::new(Point {
                x: 0.0,
                owner: Some(Plain::new(true)),
            })),
            plain: RwLock::new(Some(Plain::new(false))),
            named: RwLock::new(None),
            notifier: ChangeNotifier::new(),
        })
    }

    pub(crate) fn set_named(&self, named: Option<Arc<Walker>>) {
        let named = named.map(|walker| walker as ObjectRef);
        self.notifier.set_and_raise(&self.named, named, "named");
    }
}

impl Reflect for Shape {
    fn describe(ty: TypeBuilder<Self>) -> TypeBuilder<Self> {
        ty.notifying()
            .attribute("origin", |shape: &Shape| shape.origin.read().clone())
            .attribute("plain", |shape: &Shape| shape.plain.read().clone())
            .object_attribute::<NamedThing, _>("named", |shape: &Shape| shape.named.read().clone())
    }

    fn notifier(&self) -> Option<&ChangeNotifier> {
        Some(&self.notifier)
    }
}
