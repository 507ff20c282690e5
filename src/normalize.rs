//! Coercion of arbitrary values into storable shapes.
//!
//! Resolution order for a single value:
//!
//! 1. an opaque [`Storable`](crate::Storable) is returned untouched;
//! 2. otherwise an object's `as_dict` replaces it;
//! 3. otherwise an object's `as_array` replaces it;
//! 4. a dict has each of its values normalized in place;
//! 5. tuples and sets become lists;
//! 6. lists become arrays (an empty list becomes an empty array);
//! 7. everything else (scalars, arrays, `None`) is kept.

use crate::array::Array;
use crate::error::Result;
use crate::value::Value;

/// Normalizes `value` in place.
///
/// # Errors
/// Sequence-to-array conversion can fail with
/// [`NestoreError::Shape`](crate::NestoreError::Shape) or
/// [`NestoreError::Unsupported`](crate::NestoreError::Unsupported).
pub fn normalize(value: &mut Value) -> Result<()> {
    if let Value::Object(obj) = value {
        if obj.is_opaque() {
            return Ok(());
        }
        if let Some(dict) = obj.as_dict() {
            *value = Value::Dict(dict);
        } else if let Some(array) = obj.as_array() {
            *value = Value::Array(array);
        }
    }

    if let Value::Dict(dict) = value {
        for child in dict.values_mut() {
            normalize(child)?;
        }
        return Ok(());
    }

    if let Value::Tuple(items) | Value::Set(items) = value {
        let items = std::mem::take(items);
        *value = Value::List(items);
    }

    if let Value::List(items) = value {
        *value = Value::Array(Array::from_sequence(items)?);
    }

    Ok(())
}

/// By-value form of [`normalize`].
pub fn normalized(mut value: Value) -> Result<Value> {
    normalize(&mut value)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DType;
    use crate::value::{Dict, Storable, dict};

    #[derive(Debug)]
    struct Both {
        opaque: bool,
    }

    impl Storable for Both {
        fn type_name(&self) -> &str {
            "Both"
        }
        fn is_opaque(&self) -> bool {
            self.opaque
        }
        fn as_dict(&self) -> Option<Dict> {
            Some(dict([("a", vec![1i64, 2])]))
        }
        fn as_array(&self) -> Option<Array> {
            Some(Array::from(vec![9.0]))
        }
    }

    #[derive(Debug)]
    struct ArrayOnly;

    impl Storable for ArrayOnly {
        fn type_name(&self) -> &str {
            "ArrayOnly"
        }
        fn as_array(&self) -> Option<Array> {
            Some(Array::from(vec![true, false]))
        }
    }

    #[test]
    fn opaque_short_circuits_every_capability() {
        let v = Value::object(Both { opaque: true });
        let out = normalized(v.clone()).expect("normalize");
        assert_eq!(out, v);
    }

    #[test]
    fn decomposition_wins_over_array_and_recurses() {
        let out = normalized(Value::object(Both { opaque: false })).expect("normalize");
        let d = out.as_dict().expect("dict");
        let a = d["a"].as_array().expect("inner list became array");
        assert_eq!(a.as_i64(), Some(&[1, 2][..]));
    }

    #[test]
    fn array_capability() {
        let out = normalized(Value::object(ArrayOnly)).expect("normalize");
        assert_eq!(out.as_array().map(Array::dtype), Some(DType::Bool));
    }

    #[test]
    fn tuples_and_sets_become_arrays() {
        let t = normalized(Value::Tuple(vec![Value::Int(1), Value::Int(2)])).expect("tuple");
        assert_eq!(t.as_array().and_then(Array::as_i64), Some(&[1, 2][..]));
        let s = normalized(Value::Set(vec![Value::Float(0.5)])).expect("set");
        assert_eq!(s.as_array().and_then(Array::as_f64), Some(&[0.5][..]));
    }

    #[test]
    fn empty_list_is_empty_array_not_none() {
        let out = normalized(Value::List(Vec::new())).expect("normalize");
        let a = out.as_array().expect("array");
        assert_eq!(a.shape(), &[0]);
    }

    #[test]
    fn scalars_and_none_pass_through() {
        for v in [Value::None, Value::Int(3), Value::from("s"), Value::Bool(true)] {
            assert_eq!(normalized(v.clone()).expect("normalize"), v);
        }
    }

    #[test]
    fn nested_dict_values_rewritten_in_place() {
        let mut v = Value::dict([("outer", Value::dict([("inner", vec![1.5, 2.5])]))]);
        normalize(&mut v).expect("normalize");
        let inner = &v.as_dict().expect("dict")["outer"].as_dict().expect("dict")["inner"];
        assert!(inner.as_array().is_some());
    }
}
