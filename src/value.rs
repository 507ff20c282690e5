//! The in-memory nested value model.
//!
//! A [`Dict`] maps string keys to [`Value`]s. Values are scalars, sequences,
//! nested dicts, fixed-shape [`Array`]s, or user objects implementing
//! [`Storable`]. Sequences and objects are resolved into storable shapes by
//! [`crate::normalize`] before they reach the container.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::array::Array;

/// A nested mapping from string keys to values.
pub type Dict = BTreeMap<String, Value>;

/// Capabilities a user object can expose to the store.
///
/// The store checks them in a fixed order: [`is_opaque`](Storable::is_opaque)
/// first, then [`as_dict`](Storable::as_dict), then
/// [`as_array`](Storable::as_array). An object exposing none of them is kept
/// as-is by normalization and rejected by the writer.
///
/// ```rust
/// use nestore::{Array, Storable, Value};
///
/// #[derive(Debug)]
/// struct Trace { samples: Vec<f64> }
///
/// impl Storable for Trace {
///     fn type_name(&self) -> &str { "Trace" }
///     fn as_array(&self) -> Option<Array> { Some(Array::from(self.samples.clone())) }
/// }
///
/// let v = Value::object(Trace { samples: vec![0.5, 1.5] });
/// assert_eq!(v.type_name(), "Trace");
/// ```
pub trait Storable: fmt::Debug + Send + Sync {
    /// Name reported by summaries and error messages.
    fn type_name(&self) -> &str;

    /// Opaque objects are exempt from normalization.
    fn is_opaque(&self) -> bool {
        false
    }

    /// Decomposes the object into a mapping.
    fn as_dict(&self) -> Option<Dict> {
        None
    }

    /// Converts the object into an array.
    fn as_array(&self) -> Option<Array> {
        None
    }
}

/// A dynamically typed nested value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value. Writing `None` under a key deletes that key.
    #[default]
    None,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Float scalar.
    Float(f64),
    /// Text scalar.
    Str(String),
    /// Byte-string scalar. Read back as text.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Ordered, fixed-length sequence.
    Tuple(Vec<Value>),
    /// Unordered collection; element order is whatever the caller supplied.
    Set(Vec<Value>),
    /// Nested mapping.
    Dict(Dict),
    /// Fixed-shape array.
    Array(Array),
    /// A user object resolved through [`Storable`].
    Object(Arc<dyn Storable>),
}

impl Value {
    /// Wraps a user object.
    pub fn object<S: Storable + 'static>(obj: S) -> Self {
        Self::Object(Arc::new(obj))
    }

    /// Builds a `Value::Dict` from key/value pairs.
    pub fn dict<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Dict(dict(pairs))
    }

    /// Type name used by summaries.
    pub fn type_name(&self) -> &str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Set(_) => "set",
            Self::Dict(_) => "dict",
            Self::Array(_) => "ndarray",
            Self::Object(obj) => obj.type_name(),
        }
    }

    /// True for `Value::None`.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Borrows the nested mapping.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Consumes the value, returning the nested mapping.
    pub fn into_dict(self) -> Option<Dict> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Borrows the array.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Integer scalar (booleans count as integers).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Float scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Builds a [`Dict`] from key/value pairs.
///
/// ```rust
/// let d = nestore::dict([("x", vec![1i64, 2, 3])]);
/// assert!(d.contains_key("x"));
/// ```
pub fn dict<K, V, I>(pairs: I) -> Dict
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

// Objects compare by identity; there is no structural equality for them.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::List(a), Self::List(b))
            | (Self::Tuple(a), Self::Tuple(b))
            | (Self::Set(a), Self::Set(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Dict> for Value {
    fn from(v: Dict) -> Self {
        Self::Dict(v)
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Self::Array(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::None, Into::into)
    }
}

impl From<Arc<dyn Storable>> for Value {
    fn from(v: Arc<dyn Storable>) -> Self {
        Self::Object(v)
    }
}
