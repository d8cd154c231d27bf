//! Attribute accessors and the process-wide accessor cache.
//!
//! An `Accessor` is the resolved, reusable read function for one
//! (declaring type, attribute name) pair. Accessors are created on first use
//! and cached for the life of the process. The cache is append-only: entries
//! are bounded by the number of distinct attributes in the program, so it is
//! never evicted. Identity is stable, which lets compiled paths compare
//! accessors with `Arc::ptr_eq` instead of structurally.

use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::object::{
    AttributeAccess, Getter, Object, TypeInfo, TypeKey, TypeKind, TypeRegistry, Value,
};

/// Whether reads through an accessor can be observed for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    /// The declaring type never notifies; values are copied on read.
    Plain,
    /// The declaring type raises attribute-changed events.
    Notifying,
}

/// A cached read function for one attribute of one type.
pub struct Accessor {
    declaring: Arc<TypeInfo>,
    name: Arc<str>,
    value_type: TypeKey,
    kind: AccessorKind,
    /// `None` for attributes declared on an interface; reads resolve to the
    /// implementing type's accessor.
    getter: Option<Getter>,
}

impl Accessor {
    /// Shorthand for `AccessorCache::get_or_create`.
    pub fn get_or_create(declaring: &TypeKey, name: &str) -> Result<Arc<Accessor>> {
        AccessorCache::get_or_create(declaring, name)
    }

    fn create(declaring: &TypeKey, name: &str) -> Result<Accessor> {
        let info = declaring.info();
        let invalid = |reason: &str| Error::InvalidAttribute {
            type_name: info.name().to_string(),
            attribute: name.to_string(),
            reason: reason.to_string(),
        };

        let attribute = info
            .attribute(name)
            .ok_or_else(|| invalid("no such attribute"))?;

        let getter = match attribute.access() {
            AttributeAccess::Read(getter) => Some(Arc::clone(getter)),
            AttributeAccess::WriteOnly => return Err(invalid("attribute is write-only")),
            AttributeAccess::Abstract if info.kind() == TypeKind::Interface => None,
            AttributeAccess::Abstract => {
                return Err(invalid("abstract attribute declared on a concrete type"))
            }
        };

        let name = Arc::clone(attribute.name());
        let value_type = attribute.value_type();
        let kind = if info.supports_change_notification() && !info.is_value_type() {
            AccessorKind::Notifying
        } else {
            AccessorKind::Plain
        };

        Ok(Accessor {
            name,
            value_type,
            kind,
            getter,
            declaring: info,
        })
    }

    pub fn declaring_type(&self) -> &Arc<TypeInfo> {
        &self.declaring
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static type of the values this accessor returns.
    pub fn value_type(&self) -> TypeKey {
        self.value_type
    }

    pub fn kind(&self) -> AccessorKind {
        self.kind
    }

    /// Always true: write-only attributes never produce an accessor.
    pub fn can_read(&self) -> bool {
        true
    }

    pub fn supports_change_notification(&self) -> bool {
        self.kind == AccessorKind::Notifying
    }

    /// Read the attribute from `instance`.
    ///
    /// Instances of a type implementing the declaring interface are read
    /// through their own accessor. Anything else is an `InvalidCast`.
    pub fn read(&self, instance: &dyn Object) -> Result<Option<Value>> {
        let actual = instance.type_key();
        let declared = self.declaring.key();

        if actual == declared {
            if let Some(value) = self.getter.as_ref().and_then(|getter| getter(instance.as_any())) {
                return Ok(value);
            }
        } else if TypeRegistry::is_assignable(&actual, &declared) {
            let derived = AccessorCache::get_or_create(&actual, &self.name)
                .map_err(|_| self.cast_error(&actual))?;
            if derived.getter.is_some() {
                return derived.read(instance);
            }
        }

        Err(self.cast_error(&actual))
    }

    fn cast_error(&self, actual: &TypeKey) -> Error {
        Error::InvalidCast {
            expected: self.declaring.name().to_string(),
            found: actual.name().to_string(),
            attribute: self.name.to_string(),
        }
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("declaring", &self.declaring.name())
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring.name(), self.name)
    }
}

/// The process-wide accessor cache.
pub struct AccessorCache;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AccessorKey {
    declaring: TypeId,
    name: Arc<str>,
}

static ACCESSORS: OnceLock<DashMap<AccessorKey, Arc<Accessor>>> = OnceLock::new();

fn accessors() -> &'static DashMap<AccessorKey, Arc<Accessor>> {
    ACCESSORS.get_or_init(DashMap::new)
}

impl AccessorCache {
    /// Resolve `name` on `declaring`, returning the cached accessor when one
    /// exists. Concurrent first resolutions race benignly: the first insert
    /// wins and every caller receives that instance.
    pub fn get_or_create(declaring: &TypeKey, name: &str) -> Result<Arc<Accessor>> {
        let key = AccessorKey {
            declaring: declaring.id(),
            name: Arc::from(name),
        };
        if let Some(existing) = accessors().get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        let created = Arc::new(Accessor::create(declaring, name)?);
        tracing::debug!(accessor = %created, kind = ?created.kind, "created attribute accessor");
        Ok(Arc::clone(accessors().entry(key).or_insert(created).value()))
    }

    pub fn cached_count() -> usize {
        accessors().len()
    }
}
