//! Bound values carried by clauses, records and raw statements.
//!
//! [`Value`] is the argument type of every placeholder the crate renders. It is
//! store-agnostic (plain data that tests can compare), and implements
//! [`ToSql`] so the PostgreSQL store can bind it directly.

use crate::error::{OrmError, OrmResult};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use std::error::Error;
use rust_decimal::Decimal;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type, WrongType, to_sql_checked};
use uuid::Uuid;

/// A single bound argument.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    /// A multi-value argument (`IN` lists, `BETWEEN` bounds).
    ///
    /// Lists occupy one placeholder in a clause and are expanded by the
    /// execution layer before binding.
    List(Vec<Value>),
}

impl Value {
    /// Build a [`Value::List`] from any iterator of convertible values.
    ///
    /// Byte vectors convert to [`Value::Bytes`], so lists are always built
    /// explicitly.
    pub fn list<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
            Value::List(_) => "list",
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<&Vec<u8>> for Value {
    fn from(v: &Vec<u8>) -> Self {
        Value::Bytes(v.clone())
    }
}

/// Decode a [`Value`] into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> OrmResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> OrmError {
    OrmError::Other(format!("expected {expected}, got {}", value.kind()))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> OrmResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Int(v) => Ok(*v),
            other => Err(mismatch("int", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        let v = i64::from_value(value)?;
        i32::try_from(v).map_err(|_| OrmError::Other(format!("{v} does not fit in i32")))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(mismatch("float", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            other => Err(mismatch("text", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Bytes(v) => Ok(v.clone()),
            other => Err(mismatch("bytes", other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Uuid(v) => Ok(*v),
            other => Err(mismatch("uuid", other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Timestamp(v) => Ok(*v),
            other => Err(mismatch("timestamp", other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            other => Err(mismatch("json", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => bind(v, ty, out),
            Value::Int(v) => match *ty {
                Type::INT2 => bind(&i16::try_from(*v)?, ty, out),
                Type::INT4 => bind(&i32::try_from(*v)?, ty, out),
                Type::FLOAT4 => bind(&(*v as f32), ty, out),
                Type::FLOAT8 => bind(&(*v as f64), ty, out),
                Type::NUMERIC => bind(&Decimal::from(*v), ty, out),
                _ => bind(v, ty, out),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => bind(&(*v as f32), ty, out),
                Type::NUMERIC => bind(&Decimal::try_from(*v)?, ty, out),
                _ => bind(v, ty, out),
            },
            // Enum labels travel as their UTF-8 text in binary format.
            Value::Text(v) if matches!(ty.kind(), Kind::Enum(_)) => {
                out.extend_from_slice(v.as_bytes());
                Ok(IsNull::No)
            }
            Value::Text(v) => bind(v, ty, out),
            Value::Bytes(v) => bind(v, ty, out),
            Value::Uuid(v) => bind(v, ty, out),
            Value::Timestamp(v) => match *ty {
                Type::TIMESTAMP => bind(&v.naive_utc(), ty, out),
                _ => bind(v, ty, out),
            },
            Value::Json(v) => bind(v, ty, out),
            Value::List(_) => Err("list values must be expanded into placeholders before binding".into()),
        }
    }

    // The variant is only known at bind time; `to_sql` checks it against `ty`.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Encode `value` after checking its Rust type accepts the parameter type.
fn bind<T: ToSql>(value: &T, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    if !T::accepts(ty) {
        return Err(Box::new(WrongType::new::<T>(ty.clone())));
    }
    value.to_sql(ty, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_pick_the_matching_variant() {
        assert_eq!(Value::from(7i32), Value::Int(7));
        assert_eq!(Value::from("open"), Value::Text("open".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(
            Value::list([1, 2]),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn byte_vectors_are_bytes() {
        let value = Value::from(vec![1u8, 2, 3]);
        assert_eq!(value, Value::Bytes(vec![1, 2, 3]));
        assert_eq!(Vec::<u8>::from_value(&value).unwrap(), vec![1, 2, 3]);
        assert_eq!(Value::from(&b"ab"[..]), Value::Bytes(b"ab".to_vec()));
    }

    #[test]
    fn binding_checks_the_parameter_type() {
        let mut out = BytesMut::new();
        assert!(Value::Int(100).to_sql_checked(&Type::TIMESTAMP, &mut out).is_err());
        assert!(Value::Text("abc".into()).to_sql_checked(&Type::INT4, &mut out).is_err());
        assert!(Value::Bool(true).to_sql_checked(&Type::TEXT, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn binding_narrows_ints_and_accepts_matching_types() {
        let mut out = BytesMut::new();
        Value::Int(7).to_sql_checked(&Type::INT4, &mut out).unwrap();
        assert_eq!(&out[..], &[0, 0, 0, 7]);

        let mut out = BytesMut::new();
        assert!(Value::Int(70_000).to_sql_checked(&Type::INT2, &mut out).is_err());

        let mut out = BytesMut::new();
        Value::Text("abc".into()).to_sql_checked(&Type::VARCHAR, &mut out).unwrap();
        assert_eq!(&out[..], b"abc");

        let mut out = BytesMut::new();
        Value::Int(100).to_sql_checked(&Type::NUMERIC, &mut out).unwrap();
        assert!(!out.is_empty());

        let mut out = BytesMut::new();
        let mood = Type::new(
            "mood".into(),
            90_001,
            Kind::Enum(vec!["happy".into(), "sad".into()]),
            "public".into(),
        );
        Value::Text("sad".into()).to_sql_checked(&mood, &mut out).unwrap();
        assert_eq!(&out[..], b"sad");

        let mut out = BytesMut::new();
        let null = Value::Null.to_sql_checked(&Type::NUMERIC, &mut out).unwrap();
        assert!(matches!(null, IsNull::Yes));
    }

    #[test]
    fn option_decodes_null_as_none() {
        assert_eq!(Option::<String>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_value(&Value::Int(3)).unwrap(),
            Some(3)
        );
    }

    #[test]
    fn decode_mismatch_names_both_kinds() {
        let err = i64::from_value(&Value::Text("x".into())).unwrap_err();
        assert_eq!(err.to_string(), "expected int, got text");
    }
}
