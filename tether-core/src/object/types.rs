//! Runtime type descriptions.
//!
//! Rust has no reflection, so every observable type describes itself once
//! through `Reflect::describe`. Descriptions are built lazily the first time
//! a `TypeKey` is resolved and then live in the process-wide `TypeRegistry`
//! for the rest of the process. The registry is append-only; the number of
//! entries is bounded by the program's static type surface.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use indexmap::IndexMap;
use smallvec::SmallVec;

use super::notifier::ChangeNotifier;
use super::value::{AttributeValue, Value};

/// Shared, type-erased handle to an observed instance.
pub type ObjectRef = Arc<dyn Object>;

/// Type-erased view of an instance. Implemented for every `Reflect` type.
pub trait Object: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Key of the instance's concrete type.
    fn type_key(&self) -> TypeKey;

    fn change_notifier(&self) -> Option<&ChangeNotifier>;
}

/// A type whose attributes can appear in a path.
///
/// # Example
///
/// ```rust,ignore
/// struct Node {
///     next: RwLock<Option<Arc<Node>>>,
///     notifier: ChangeNotifier,
/// }
///
/// impl Reflect for Node {
///     fn describe(ty: TypeBuilder<Self>) -> TypeBuilder<Self> {
///         ty.notifying()
///             .attribute("next", |node: &Node| node.next.read().clone())
///     }
///
///     fn notifier(&self) -> Option<&ChangeNotifier> {
///         Some(&self.notifier)
///     }
/// }
/// ```
pub trait Reflect: Any + Send + Sync + Sized {
    fn describe(ty: TypeBuilder<Self>) -> TypeBuilder<Self>;

    /// The instance's notifier. Types declared `notifying()` must return one.
    fn notifier(&self) -> Option<&ChangeNotifier> {
        None
    }
}

impl<T: Reflect> Object for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_key(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn change_notifier(&self) -> Option<&ChangeNotifier> {
        Reflect::notifier(self)
    }
}

impl dyn Object {
    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Reflect>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl fmt::Debug for dyn Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.type_key(), self as *const Self as *const ())
    }
}

/// Identity of a type that can appear in a path.
///
/// Equality and hashing use the `TypeId` only.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    describe: fn() -> TypeInfo,
}

impl TypeKey {
    pub fn of<T: Reflect>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_name(std::any::type_name::<T>()),
            describe: describe_reflect::<T>,
        }
    }

    /// Key for a leaf type such as `bool` or `String`.
    pub fn primitive<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_name(std::any::type_name::<T>()),
            describe: describe_primitive::<T>,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolve the full description through the registry.
    pub fn info(&self) -> Arc<TypeInfo> {
        TypeRegistry::resolve(self)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn short_name(full: &'static str) -> &'static str {
    if full.contains('<') {
        return full;
    }
    full.rsplit("::").next().unwrap_or(full)
}

fn describe_reflect<T: Reflect>() -> TypeInfo {
    T::describe(TypeBuilder::new()).build()
}

fn describe_primitive<T: Any>() -> TypeInfo {
    TypeInfo {
        key: TypeKey::primitive::<T>(),
        kind: TypeKind::Value,
        notifying: false,
        attributes: IndexMap::new(),
        interfaces: SmallVec::new(),
    }
}

/// How instances of a type are held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Shared by reference; replacements are observable.
    Reference,
    /// Copied on read. Includes every primitive.
    Value,
    /// Abstract attribute surface implemented by concrete types.
    Interface,
}

/// Reads an attribute from an instance of the declaring type.
///
/// The outer `None` signals that the instance was of another type.
pub(crate) type Getter = Arc<dyn Fn(&dyn Any) -> Option<Option<Value>> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum AttributeAccess {
    Read(Getter),
    WriteOnly,
    Abstract,
}

/// One declared attribute.
#[derive(Clone)]
pub struct AttributeDef {
    name: Arc<str>,
    value_type: TypeKey,
    access: AttributeAccess,
}

impl AttributeDef {
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Static type of the attribute's value.
    pub fn value_type(&self) -> TypeKey {
        self.value_type
    }

    pub fn is_readable(&self) -> bool {
        !matches!(self.access, AttributeAccess::WriteOnly)
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.access, AttributeAccess::Abstract)
    }

    pub(crate) fn access(&self) -> &AttributeAccess {
        &self.access
    }
}

impl fmt::Debug for AttributeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDef")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("readable", &self.is_readable())
            .field("abstract", &self.is_abstract())
            .finish()
    }
}

/// Description of a type: its kind, capabilities and attributes.
#[derive(Debug)]
pub struct TypeInfo {
    key: TypeKey,
    kind: TypeKind,
    notifying: bool,
    attributes: IndexMap<Arc<str>, AttributeDef>,
    interfaces: SmallVec<[TypeKey; 2]>,
}

impl TypeInfo {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_value_type(&self) -> bool {
        self.kind == TypeKind::Value
    }

    pub fn supports_change_notification(&self) -> bool {
        self.notifying
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.get(name)
    }

    /// Declared attributes in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.values()
    }

    pub fn implements(&self, interface: &TypeKey) -> bool {
        self.interfaces.contains(interface)
    }
}

/// Fluent description of a `Reflect` type.
pub struct TypeBuilder<T> {
    kind: TypeKind,
    notifying: bool,
    attributes: IndexMap<Arc<str>, AttributeDef>,
    interfaces: SmallVec<[TypeKey; 2]>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Reflect> TypeBuilder<T> {
    fn new() -> Self {
        Self {
            kind: TypeKind::Reference,
            notifying: false,
            attributes: IndexMap::new(),
            interfaces: SmallVec::new(),
            _marker: PhantomData,
        }
    }

    /// Instances raise attribute-changed events through `Reflect::notifier`.
    pub fn notifying(mut self) -> Self {
        self.notifying = true;
        self
    }

    /// Instances are copied when read through an attribute.
    pub fn value_type(mut self) -> Self {
        self.kind = TypeKind::Value;
        self
    }

    /// The type only declares abstract attributes for implementors.
    pub fn interface(mut self) -> Self {
        self.kind = TypeKind::Interface;
        self
    }

    pub fn implements<I: Reflect>(mut self) -> Self {
        self.interfaces.push(TypeKey::of::<I>());
        self
    }

    /// Declare a readable attribute.
    pub fn attribute<V, F>(self, name: &str, getter: F) -> Self
    where
        V: AttributeValue,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        let getter: Getter = Arc::new(move |instance: &dyn Any| {
            instance
                .downcast_ref::<T>()
                .map(|instance| getter(instance).into_value())
        });
        self.declare::<V>(name, AttributeAccess::Read(getter))
    }

    /// Declare an attribute whose static type is `I` (typically an
    /// interface) while the getter hands out type-erased instances.
    pub fn object_attribute<I, F>(mut self, name: &str, getter: F) -> Self
    where
        I: Reflect,
        F: Fn(&T) -> Option<ObjectRef> + Send + Sync + 'static,
    {
        let getter: Getter = Arc::new(move |instance: &dyn Any| {
            instance
                .downcast_ref::<T>()
                .map(|instance| getter(instance).map(Value::Object))
        });
        let name: Arc<str> = Arc::from(name);
        self.attributes.insert(
            name.clone(),
            AttributeDef {
                name,
                value_type: TypeKey::of::<I>(),
                access: AttributeAccess::Read(getter),
            },
        );
        self
    }

    /// Declare an attribute that can be set but never read.
    pub fn write_only<V: AttributeValue>(self, name: &str) -> Self {
        self.declare::<V>(name, AttributeAccess::WriteOnly)
    }

    /// Declare an attribute whose reads resolve to the implementing type.
    pub fn abstract_attribute<V: AttributeValue>(self, name: &str) -> Self {
        self.declare::<V>(name, AttributeAccess::Abstract)
    }

    fn declare<V: AttributeValue>(mut self, name: &str, access: AttributeAccess) -> Self {
        let name: Arc<str> = Arc::from(name);
        self.attributes.insert(
            name.clone(),
            AttributeDef {
                name,
                value_type: V::value_type(),
                access,
            },
        );
        self
    }

    fn build(self) -> TypeInfo {
        TypeInfo {
            key: TypeKey::of::<T>(),
            kind: self.kind,
            notifying: self.notifying,
            attributes: self.attributes,
            interfaces: self.interfaces,
        }
    }
}

/// The process-wide registry of type descriptions.
pub struct TypeRegistry;

static TYPES: OnceLock<DashMap<TypeId, Arc<TypeInfo>>> = OnceLock::new();

fn types() -> &'static DashMap<TypeId, Arc<TypeInfo>> {
    TYPES.get_or_init(DashMap::new)
}

impl TypeRegistry {
    /// Get the description for `key`, building it on first use.
    pub fn resolve(key: &TypeKey) -> Arc<TypeInfo> {
        if let Some(info) = types().get(&key.id) {
            return Arc::clone(info.value());
        }

        // Built outside the map so a describe fn never runs under a shard lock.
        let built = Arc::new((key.describe)());
        tracing::trace!(type_name = key.name, "registered type description");
        Arc::clone(types().entry(key.id).or_insert(built).value())
    }

    /// Whether an instance of `actual` can stand where `declared` is expected.
    pub fn is_assignable(actual: &TypeKey, declared: &TypeKey) -> bool {
        actual == declared || Self::resolve(actual).implements(declared)
    }

    pub fn registered_count() -> usize {
        types().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Link, NamedThing, Point, Walker};

    #[test]
    fn resolve_returns_the_same_description() {
        let first = TypeRegistry::resolve(&TypeKey::of::<Link>());
        let second = TypeKey::of::<Link>().info();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn description_reflects_builder_flags() {
        let link = TypeKey::of::<Link>().info();
        assert_eq!(link.kind(), TypeKind::Reference);
        assert!(link.supports_change_notification());
        assert_eq!(
            link.attributes().map(|a| a.name().as_ref()).collect::<Vec<_>>(),
            vec!["next", "is_true", "secret"]
        );
        assert!(!link.attribute("secret").unwrap().is_readable());

        let point = TypeKey::of::<Point>().info();
        assert!(point.is_value_type());
        assert!(!point.supports_change_notification());
    }

    #[test]
    fn primitives_are_value_types_without_attributes() {
        let info = TypeKey::primitive::<bool>().info();
        assert!(info.is_value_type());
        assert_eq!(info.attributes().count(), 0);
        assert_eq!(info.name(), "bool");
    }

    #[test]
    fn interfaces_are_assignable_from_implementors() {
        let walker = TypeKey::of::<Walker>();
        let named = TypeKey::of::<NamedThing>();
        assert!(TypeRegistry::is_assignable(&walker, &named));
        assert!(!TypeRegistry::is_assignable(&TypeKey::of::<Link>(), &named));
        assert_eq!(named.info().kind(), TypeKind::Interface);
    }

    #[test]
    fn short_names_drop_module_paths() {
        assert_eq!(TypeKey::of::<Link>().name(), "Link");
        assert_eq!(short_name("alloc::string::String"), "String");
    }

    #[test]
    fn downcast_through_dyn_object() {
        let object: ObjectRef = Link::new(true);
        assert!(object.is::<Link>());
        assert!(object.downcast_ref::<Point>().is_none());
        assert!(object.downcast_ref::<Link>().is_some());
    }
}
