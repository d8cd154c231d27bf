//! Attribute values.

use std::fmt;
use std::sync::Arc;

use super::types::{Object, ObjectRef, Reflect, TypeKey};

/// A value read through an attribute.
///
/// Null or absent values are represented by `Option<Value>::None` at the call
/// site; there is no null variant.
#[derive(Clone)]
pub enum Value {
    Object(ObjectRef),
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
}

impl Value {
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Downcast an object value to its concrete type.
    pub fn downcast<T: Reflect>(&self) -> Option<Arc<T>> {
        self.as_object()
            .and_then(|object| object.clone().into_any().downcast::<T>().ok())
    }
}

/// Reference identity over optional objects. Two absent objects are equal.
pub fn same_object(a: Option<&ObjectRef>, b: Option<&ObjectRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        (None, None) => true,
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => same_object(Some(a), Some(b)),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Object(object) => write!(f, "Object({}@{:p})", object.type_key().name(), Arc::as_ptr(object)),
            Value::Bool(value) => write!(f, "Bool({value})"),
            Value::Int(value) => write!(f, "Int({value})"),
            Value::Float(value) => write!(f, "Float({value})"),
            Value::Str(value) => write!(f, "Str({value:?})"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

/// A Rust type that a getter may return.
///
/// Provides the static type used to resolve the next path segment at compile
/// time and the runtime conversion into a `Value`.
pub trait AttributeValue: Send + Sync + 'static {
    fn value_type() -> TypeKey;

    fn into_value(self) -> Option<Value>;
}

macro_rules! primitive_attribute {
    ($($ty:ty => $variant:ident as $repr:ty),* $(,)?) => {
        $(
            impl AttributeValue for $ty {
                fn value_type() -> TypeKey {
                    TypeKey::primitive::<$ty>()
                }

                fn into_value(self) -> Option<Value> {
                    Some(Value::$variant(<$repr>::from(self)))
                }
            }
        )*
    };
}

primitive_attribute! {
    bool => Bool as bool,
    i32 => Int as i64,
    i64 => Int as i64,
    u32 => Int as i64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl AttributeValue for String {
    fn value_type() -> TypeKey {
        TypeKey::primitive::<String>()
    }

    fn into_value(self) -> Option<Value> {
        Some(Value::Str(Arc::from(self)))
    }
}

impl AttributeValue for Arc<str> {
    fn value_type() -> TypeKey {
        TypeKey::primitive::<String>()
    }

    fn into_value(self) -> Option<Value> {
        Some(Value::Str(self))
    }
}

impl<T: Reflect> AttributeValue for Arc<T> {
    fn value_type() -> TypeKey {
        TypeKey::of::<T>()
    }

    fn into_value(self) -> Option<Value> {
        let object: Arc<dyn Object> = self;
        Some(Value::Object(object))
    }
}

impl<V: AttributeValue> AttributeValue for Option<V> {
    fn value_type() -> TypeKey {
        V::value_type()
    }

    fn into_value(self) -> Option<Value> {
        self.and_then(V::into_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Link;

    #[test]
    fn object_equality_is_identity() {
        let a = Link::new(false);
        let b = Link::new(false);

        let va = Arc::clone(&a).into_value().unwrap();
        let va_again = a.into_value().unwrap();
        let vb = b.into_value().unwrap();

        assert_eq!(va, va_again);
        assert_ne!(va, vb);
    }

    #[test]
    fn optional_values_flatten_to_absent() {
        assert_eq!(None::<bool>.into_value(), None);
        assert_eq!(Some(3_i32).into_value(), Some(Value::Int(3)));
        assert_eq!(<Option<u32>>::value_type(), TypeKey::primitive::<u32>());
    }

    #[test]
    fn downcast_recovers_the_concrete_type() {
        let link = Link::new(true);
        let value = Arc::clone(&link).into_value().unwrap();

        let back = value.downcast::<Link>().unwrap();
        assert!(Arc::ptr_eq(&back, &link));
        assert!(Value::Bool(true).downcast::<Link>().is_none());
    }

    #[test]
    fn same_object_treats_two_absents_as_equal() {
        assert!(same_object(None, None));
        let object: ObjectRef = Link::new(false);
        assert!(!same_object(Some(&object), None));
    }
}
