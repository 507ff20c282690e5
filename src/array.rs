//! Fixed-shape, homogeneously typed arrays.
//!
//! An [`Array`] is what every sequence becomes before it reaches the
//! container: a dtype, a shape and a row-major flat buffer. Conversion from
//! nested sequences follows the usual array-library rules (equal-length
//! nesting adds dimensions, dtypes promote `bool < int64 < float64`, any
//! string makes the whole array a string array).

use serde::{Deserialize, Serialize};

use crate::error::{NestoreError, Result};
use crate::value::Value;

/// Element type of an [`Array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DType {
    /// Booleans.
    Bool,
    /// 64-bit signed integers.
    Int64,
    /// 64-bit floats.
    Float64,
    /// UTF-8 strings.
    Str,
}

impl DType {
    /// The conventional dtype name (`"int64"`, `"float64"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Str => "str",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Row-major element storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    /// Boolean elements.
    Bool(Vec<bool>),
    /// Integer elements.
    Int64(Vec<i64>),
    /// Float elements.
    Float64(Vec<f64>),
    /// String elements.
    Str(Vec<String>),
}

impl ArrayData {
    /// Number of stored elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Str(v) => v.len(),
        }
    }

    /// True when no element is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The dtype matching this storage.
    pub fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Str(_) => DType::Str,
        }
    }
}

/// A fixed-shape array.
///
/// The product of `shape` always equals the number of elements in `data`. A
/// zero-dimensional array (`shape == []`) holds exactly one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    shape: Vec<usize>,
    data: ArrayData,
}

impl Array {
    /// Builds an array from an explicit shape and flat data.
    ///
    /// # Errors
    /// Returns [`NestoreError::Shape`] if the shape does not cover the data.
    pub fn from_shape(shape: Vec<usize>, data: ArrayData) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(NestoreError::Shape(format!(
                "shape {} holds {} elements but {} were given",
                format_shape(&shape),
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Converts a (possibly nested) sequence of values into an array.
    ///
    /// An empty sequence yields a `float64` array of shape `(0,)`.
    ///
    /// # Errors
    /// * [`NestoreError::Shape`] for ragged nesting.
    /// * [`NestoreError::Unsupported`] for elements that are not scalars,
    ///   sequences or arrays (mappings, `None`, objects without `as_array`).
    pub fn from_sequence(items: &[Value]) -> Result<Self> {
        let shape = sequence_shape(items)?;

        let mut elements = Vec::with_capacity(shape.iter().product());
        for item in items {
            flatten_into(item, &mut elements)?;
        }
        let data = promote(elements);
        Self::from_shape(shape, data)
    }

    /// The array dimensions.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Flat row-major storage.
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Consumes the array, returning shape and storage.
    pub fn into_parts(self) -> (Vec<usize>, ArrayData) {
        (self.shape, self.data)
    }

    /// Integer elements, if this is an `int64` array.
    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            ArrayData::Int64(v) => Some(v),
            _ => None,
        }
    }

    /// Float elements, if this is a `float64` array.
    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            ArrayData::Float64(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean elements, if this is a `bool` array.
    pub fn as_bool(&self) -> Option<&[bool]> {
        match &self.data {
            ArrayData::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// String elements, if this is a `str` array.
    pub fn as_str(&self) -> Option<&[String]> {
        match &self.data {
            ArrayData::Str(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! impl_from_vec {
    ($t:ty, $variant:ident) => {
        impl From<Vec<$t>> for Array {
            fn from(v: Vec<$t>) -> Self {
                Self {
                    shape: vec![v.len()],
                    data: ArrayData::$variant(v),
                }
            }
        }
    };
}

impl_from_vec!(bool, Bool);
impl_from_vec!(i64, Int64);
impl_from_vec!(f64, Float64);
impl_from_vec!(String, Str);

impl From<Vec<&str>> for Array {
    fn from(v: Vec<&str>) -> Self {
        Self::from(v.into_iter().map(str::to_owned).collect::<Vec<_>>())
    }
}

/// Formats a shape the way array libraries print it: `()`, `(3,)`, `(2, 3)`.
pub fn format_shape(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [n] => format!("({n},)"),
        dims => {
            let parts: Vec<String> = dims.iter().map(ToString::to_string).collect();
            format!("({})", parts.join(", "))
        }
    }
}

/// Shape a value would contribute inside a sequence.
pub(crate) fn shape_of(value: &Value) -> Result<Vec<usize>> {
    match value {
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Bytes(_) => {
            Ok(Vec::new())
        }
        Value::Array(a) => Ok(a.shape.clone()),
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => sequence_shape(items),
        Value::Object(obj) => match obj.as_array() {
            Some(a) => Ok(a.shape),
            None => Err(unsupported_element(value)),
        },
        Value::None | Value::Dict(_) => Err(unsupported_element(value)),
    }
}

fn sequence_shape(items: &[Value]) -> Result<Vec<usize>> {
    let mut inner: Option<Vec<usize>> = None;
    for item in items {
        let item_shape = shape_of(item)?;
        match &inner {
            None => inner = Some(item_shape),
            Some(prev) if *prev != item_shape => {
                return Err(NestoreError::Shape(format!(
                    "inhomogeneous sequence: element shapes {} and {}",
                    format_shape(prev),
                    format_shape(&item_shape)
                )));
            }
            Some(_) => {}
        }
    }
    let mut shape = vec![items.len()];
    shape.extend(inner.unwrap_or_default());
    Ok(shape)
}

fn unsupported_element(value: &Value) -> NestoreError {
    NestoreError::Unsupported(format!(
        "sequence element of type {} cannot be stored in an array",
        value.type_name()
    ))
}

enum Element {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

fn flatten_into(value: &Value, out: &mut Vec<Element>) -> Result<()> {
    match value {
        Value::Bool(b) => out.push(Element::Bool(*b)),
        Value::Int(i) => out.push(Element::Int(*i)),
        Value::Float(f) => out.push(Element::Float(*f)),
        Value::Str(s) => out.push(Element::Str(s.clone())),
        Value::Bytes(b) => out.push(Element::Str(String::from_utf8_lossy(b).into_owned())),
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
            for item in items {
                flatten_into(item, out)?;
            }
        }
        Value::Array(a) => flatten_array(a, out),
        Value::Object(obj) => match obj.as_array() {
            Some(a) => flatten_array(&a, out),
            None => return Err(unsupported_element(value)),
        },
        Value::None | Value::Dict(_) => return Err(unsupported_element(value)),
    }
    Ok(())
}

fn flatten_array(array: &Array, out: &mut Vec<Element>) {
    match &array.data {
        ArrayData::Bool(v) => out.extend(v.iter().map(|b| Element::Bool(*b))),
        ArrayData::Int64(v) => out.extend(v.iter().map(|i| Element::Int(*i))),
        ArrayData::Float64(v) => out.extend(v.iter().map(|f| Element::Float(*f))),
        ArrayData::Str(v) => out.extend(v.iter().cloned().map(Element::Str)),
    }
}

fn promote(elements: Vec<Element>) -> ArrayData {
    let mut dtype: Option<DType> = None;
    for e in &elements {
        let d = match e {
            Element::Bool(_) => DType::Bool,
            Element::Int(_) => DType::Int64,
            Element::Float(_) => DType::Float64,
            Element::Str(_) => DType::Str,
        };
        dtype = Some(dtype.map_or(d, |cur| cur.max(d)));
    }

    match dtype.unwrap_or(DType::Float64) {
        DType::Bool => ArrayData::Bool(
            elements
                .into_iter()
                .map(|e| matches!(e, Element::Bool(true)))
                .collect(),
        ),
        DType::Int64 => ArrayData::Int64(
            elements
                .into_iter()
                .map(|e| match e {
                    Element::Bool(b) => i64::from(b),
                    Element::Int(i) => i,
                    // Unreachable under promotion order.
                    Element::Float(f) => f as i64,
                    Element::Str(_) => 0,
                })
                .collect(),
        ),
        DType::Float64 => ArrayData::Float64(
            elements
                .into_iter()
                .map(|e| match e {
                    Element::Bool(b) => f64::from(u8::from(b)),
                    Element::Int(i) => i as f64,
                    Element::Float(f) => f,
                    Element::Str(_) => f64::NAN,
                })
                .collect(),
        ),
        DType::Str => ArrayData::Str(
            elements
                .into_iter()
                .map(|e| match e {
                    Element::Bool(true) => "True".to_string(),
                    Element::Bool(false) => "False".to_string(),
                    Element::Int(i) => i.to_string(),
                    Element::Float(f) => format!("{f:?}"),
                    Element::Str(s) => s,
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_lists_gain_dimensions() {
        let v = vec![
            Value::from(vec![1i64, 2, 3]),
            Value::from(vec![4i64, 5, 6]),
        ];
        let a = Array::from_sequence(&v).expect("conversion");
        assert_eq!(a.shape(), &[2, 3]);
        assert_eq!(a.as_i64(), Some(&[1, 2, 3, 4, 5, 6][..]));
    }

    #[test]
    fn mixed_numbers_promote_to_float() {
        let v = vec![Value::Bool(true), Value::Int(2), Value::Float(0.5)];
        let a = Array::from_sequence(&v).expect("conversion");
        assert_eq!(a.dtype(), DType::Float64);
        assert_eq!(a.as_f64(), Some(&[1.0, 2.0, 0.5][..]));
    }

    #[test]
    fn strings_win_over_numbers() {
        let v = vec![Value::from("a"), Value::Int(1), Value::Bool(false)];
        let a = Array::from_sequence(&v).expect("conversion");
        assert_eq!(
            a.as_str().map(<[String]>::to_vec),
            Some(vec!["a".to_string(), "1".to_string(), "False".to_string()])
        );
    }

    #[test]
    fn empty_sequence_is_empty_float_array() {
        let a = Array::from_sequence(&[]).expect("conversion");
        assert_eq!(a.shape(), &[0]);
        assert_eq!(a.dtype(), DType::Float64);
        assert!(a.is_empty());
    }

    #[test]
    fn ragged_sequence_is_rejected() {
        let v = vec![Value::from(vec![1i64, 2]), Value::from(vec![3i64])];
        assert!(matches!(
            Array::from_sequence(&v),
            Err(NestoreError::Shape(_))
        ));
    }

    #[test]
    fn dict_inside_sequence_is_unsupported() {
        let v = vec![Value::Dict(Default::default())];
        assert!(matches!(
            Array::from_sequence(&v),
            Err(NestoreError::Unsupported(_))
        ));
    }

    #[test]
    fn shape_formatting() {
        assert_eq!(format_shape(&[]), "()");
        assert_eq!(format_shape(&[3]), "(3,)");
        assert_eq!(format_shape(&[2, 3]), "(2, 3)");
    }

    #[test]
    fn from_shape_checks_element_count() {
        assert!(Array::from_shape(vec![2, 2], ArrayData::Int64(vec![1, 2, 3])).is_err());
        let a = Array::from_shape(vec![], ArrayData::Float64(vec![1.5])).expect("0-d");
        assert_eq!(a.ndim(), 0);
    }
}
