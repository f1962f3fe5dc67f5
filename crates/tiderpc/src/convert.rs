//! # Value Conversion
//!
//! Typed views onto `Value`. Handlers take concrete Rust arguments and
//! return concrete results; these traits bridge them to the variant form.
//!
//! ## Rules
//! - Integers convert across every integer variant as long as the value fits.
//! - Integers widen into floats; `f32` and `f64` convert into each other.
//! - `Null` converts into `None` for any `Option<T>`.
//! - Everything else is a `TypeMismatch` naming both sides.

use std::collections::HashMap;
use std::hash::Hash;

use bytes::Bytes;

use crate::callchain::CallChain;
use crate::error::Error;
use crate::error::Result;
use crate::value::Fault;
use crate::value::Value;

/// Conversion from a borrowed variant into a concrete type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

/// Conversion from a concrete type into a variant.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

fn mismatch(expected: &str, value: &Value) -> Error {
    Error::TypeMismatch {
        expected: expected.to_string(),
        found: value.type_name().to_string(),
    }
}

fn as_i128(value: &Value) -> Option<i128> {
    Some(match *value {
        Value::I8(v) => v as i128,
        Value::I16(v) => v as i128,
        Value::I32(v) => v as i128,
        Value::I64(v) => v as i128,
        Value::U8(v) => v as i128,
        Value::U16(v) => v as i128,
        Value::U32(v) => v as i128,
        Value::U64(v) => v as i128,
        _ => return None,
    })
}

macro_rules! impl_int {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    let wide = as_i128(value).ok_or_else(|| mismatch(stringify!($ty), value))?;
                    $ty::try_from(wide).map_err(|_| Error::TypeMismatch {
                        expected: stringify!($ty).to_string(),
                        found: format!("{} {}", value.type_name(), wide),
                    })
                }
            }

            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }
        )*
    };
}

impl_int! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match *value {
            Value::F64(v) => Ok(v),
            Value::F32(v) => Ok(v as f64),
            _ => as_i128(value).map(|v| v as f64).ok_or_else(|| mismatch("f64", value)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        match *value {
            Value::F32(v) => Ok(v),
            Value::F64(v) => Ok(v as f32),
            _ => as_i128(value).map(|v| v as f32).ok_or_else(|| mismatch("f32", value)),
        }
    }
}

impl IntoValue for f32 {
    fn into_value(self) -> Value { Value::F32(self) }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value { Value::F64(self) }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value { Value::Bool(self) }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(v) => Ok(v.clone()),
            _ => Err(mismatch("string", value)),
        }
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value { Value::String(self) }
}

impl IntoValue for &str {
    fn into_value(self) -> Value { Value::String(self.to_string()) }
}

impl FromValue for Bytes {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(v) => Ok(v.clone()),
            _ => Err(mismatch("bytes", value)),
        }
    }
}

impl IntoValue for Bytes {
    fn into_value(self) -> Value { Value::Bytes(self) }
}

impl FromValue for CallChain {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::CallChain(v) => Ok(v.clone()),
            _ => Err(mismatch("call-chain", value)),
        }
    }
}

impl IntoValue for CallChain {
    fn into_value(self) -> Value { Value::CallChain(self) }
}

impl FromValue for Fault {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Error(v) => Ok(v.clone()),
            _ => Err(mismatch("error", value)),
        }
    }
}

impl IntoValue for Fault {
    fn into_value(self) -> Value { Value::Error(self) }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value { self }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Box<T> {
    fn from_value(value: &Value) -> Result<Self> {
        T::from_value(value).map(Box::new)
    }
}

impl<T: IntoValue> IntoValue for Box<T> {
    fn into_value(self) -> Value { (*self).into_value() }
}

/// Arrays convert element-wise. A `Bytes` value also converts into `Vec<u8>`.
impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            Value::Bytes(b) => b.iter().map(|byte| T::from_value(&Value::U8(*byte))).collect(),
            _ => Err(mismatch("array", value)),
        }
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::Array(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<K, V> FromValue for HashMap<K, V>
where
    K: FromValue + Eq + Hash,
    V: FromValue,
{
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Map(pairs) => pairs
                .iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            _ => Err(mismatch("map", value)),
        }
    }
}

impl<K: IntoValue, V: IntoValue> IntoValue for HashMap<K, V> {
    fn into_value(self) -> Value {
        Value::Map(self.into_iter().map(|(k, v)| (k.into_value(), v.into_value())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_cross_variants_when_in_range() {
        assert_eq!(i64::from_value(&Value::U8(7)).unwrap(), 7);
        assert_eq!(u16::from_value(&Value::I64(65_535)).unwrap(), 65_535);
        assert_eq!(i8::from_value(&Value::I32(-128)).unwrap(), -128);
        assert!(u8::from_value(&Value::I32(256)).is_err());
        assert!(u64::from_value(&Value::I8(-1)).is_err());
        assert_eq!(u64::from_value(&Value::U64(u64::MAX)).unwrap(), u64::MAX);
    }

    #[test]
    fn test_numbers_convert_to_floats() {
        assert_eq!(f64::from_value(&Value::I32(3)).unwrap(), 3.0);
        assert_eq!(f64::from_value(&Value::F32(1.5)).unwrap(), 1.5);
        assert_eq!(f32::from_value(&Value::F64(0.25)).unwrap(), 0.25);
        assert!(i32::from_value(&Value::F64(1.0)).is_err());
    }

    #[test]
    fn test_option_maps_null() {
        assert_eq!(Option::<String>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_value(&Value::String("x".into())).unwrap(),
            Some("x".to_string())
        );
        assert_eq!(None::<i32>.into_value(), Value::Null);
    }

    #[test]
    fn test_collections() {
        let v = vec![1i32, 2, 3].into_value();
        assert_eq!(Vec::<i64>::from_value(&v).unwrap(), vec![1, 2, 3]);

        let raw = Value::Bytes(Bytes::from_static(b"ab"));
        assert_eq!(Vec::<u8>::from_value(&raw).unwrap(), b"ab".to_vec());

        let mut m = HashMap::new();
        m.insert("k".to_string(), 9u32);
        let back = HashMap::<String, u64>::from_value(&m.into_value()).unwrap();
        assert_eq!(back.get("k"), Some(&9));
    }

    #[test]
    fn test_mismatch_names_both_sides() {
        let err = bool::from_value(&Value::String("yes".into())).unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch { expected: "bool".into(), found: "string".into() }
        );
    }
}
