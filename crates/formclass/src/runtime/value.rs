//! Dynamic values carried in slots and generic-call arguments.
//!
//! Every [`Value`] has a class name, which is what slot type checks and
//! dispatch look at. Primitive values are vectors, so a value also has a
//! length (`character(0)` and `character(1)` are both of class `character`).
//!
//! Host objects that live outside the class system are bridged through
//! [`ForeignObject`]: the object supplies its class tag and the tag is
//! resolved against the runtime's class graph like any other class name.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::runtime::Instance;

/// Class names of the built-in primitive kinds.
///
/// These classes are registered in every runtime, sealed, and cannot be
/// redefined.
pub mod builtin {
    /// Class of [`Value::Null`](super::Value::Null).
    pub const NULL: &str = "NULL";
    /// Logical vectors.
    pub const LOGICAL: &str = "logical";
    /// Floating point vectors.
    pub const NUMERIC: &str = "numeric";
    /// Integer vectors; extends `numeric`.
    pub const INTEGER: &str = "integer";
    /// String vectors.
    pub const CHARACTER: &str = "character";
    /// Heterogeneous lists.
    pub const LIST: &str = "list";

    /// Every primitive kind, parents before children.
    pub const ALL: [&str; 6] = [NULL, LOGICAL, NUMERIC, INTEGER, CHARACTER, LIST];
}

/// A host value bridged into the class graph.
///
/// The runtime never looks inside a foreign object; it only asks for the
/// class tag. The tag must name a class defined in the runtime (usually a
/// virtual one, see [`ClassDef::foreign`](crate::runtime::ClassDef::foreign)).
pub trait ForeignObject: Any + Send + Sync + fmt::Debug {
    /// Returns the class name this object dispatches as.
    fn class_tag(&self) -> &str;

    /// Upcast for downcasting back to the concrete host type.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a [`ForeignObject`].
///
/// Equality is identity: two handles are equal when they point at the same
/// object.
#[derive(Clone, Debug)]
pub struct ForeignRef(Arc<dyn ForeignObject>);

impl ForeignRef {
    /// Wraps a host object.
    pub fn new(object: impl ForeignObject) -> Self {
        Self(Arc::new(object))
    }

    /// Returns the bridged object.
    #[must_use]
    pub fn get(&self) -> &dyn ForeignObject {
        self.0.as_ref()
    }

    /// Downcasts to the concrete host type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl PartialEq for ForeignRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

/// A runtime value.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// The empty value, class `NULL`.
    #[default]
    Null,
    /// Logical vector.
    Logical(Vec<bool>),
    /// Integer vector.
    Integer(Vec<i64>),
    /// Numeric (floating point) vector.
    Numeric(Vec<f64>),
    /// Character vector.
    Character(Vec<String>),
    /// List of arbitrary values.
    List(Vec<Value>),
    /// Instance of a user-defined class.
    Object(Instance),
    /// Host object bridged in by class tag.
    Foreign(ForeignRef),
}

impl Value {
    /// Length-one logical vector.
    #[must_use]
    pub fn logical(value: bool) -> Self {
        Value::Logical(vec![value])
    }

    /// Length-one integer vector.
    #[must_use]
    pub fn integer(value: i64) -> Self {
        Value::Integer(vec![value])
    }

    /// Length-one numeric vector.
    #[must_use]
    pub fn numeric(value: f64) -> Self {
        Value::Numeric(vec![value])
    }

    /// Length-one character vector.
    pub fn character(value: impl Into<String>) -> Self {
        Value::Character(vec![value.into()])
    }

    /// Wraps a host object.
    pub fn foreign(object: impl ForeignObject) -> Self {
        Value::Foreign(ForeignRef::new(object))
    }

    /// Returns the class this value dispatches as.
    #[must_use]
    pub fn class_name(&self) -> &str {
        match self {
            Value::Null => builtin::NULL,
            Value::Logical(_) => builtin::LOGICAL,
            Value::Integer(_) => builtin::INTEGER,
            Value::Numeric(_) => builtin::NUMERIC,
            Value::Character(_) => builtin::CHARACTER,
            Value::List(_) => builtin::LIST,
            Value::Object(instance) => instance.class_name(),
            Value::Foreign(object) => object.get().class_tag(),
        }
    }

    /// Vector length; objects and foreign values have length one.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Logical(v) => v.len(),
            Value::Integer(v) => v.len(),
            Value::Numeric(v) => v.len(),
            Value::Character(v) => v.len(),
            Value::List(v) => v.len(),
            Value::Object(_) | Value::Foreign(_) => 1,
        }
    }

    /// Returns `true` if [`len`](Self::len) is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the instance if this value is an object.
    #[must_use]
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Object(instance) => Some(instance),
            _ => None,
        }
    }

    /// First element of a numeric or integer vector, as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) => v.first().copied(),
            Value::Integer(v) => v.first().map(|&i| i as f64),
            _ => None,
        }
    }

    /// First element of a character vector.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Character(v) => v.first().map(String::as_str),
            _ => None,
        }
    }

    /// Empty value of a primitive kind, or `None` for other class names.
    pub(crate) fn empty_of(kind: &str) -> Option<Self> {
        let value = match kind {
            builtin::NULL => Value::Null,
            builtin::LOGICAL => Value::Logical(Vec::new()),
            builtin::NUMERIC => Value::Numeric(Vec::new()),
            builtin::INTEGER => Value::Integer(Vec::new()),
            builtin::CHARACTER => Value::Character(Vec::new()),
            builtin::LIST => Value::List(Vec::new()),
            _ => return None,
        };
        Some(value)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Value::Object(instance)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::logical(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::numeric(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::character(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::character(value)
    }
}
