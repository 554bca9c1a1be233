//! The dynamic [`Value`] carried by entity columns, filters and finder
//! arguments.
//!
//! Column types are declared per schema, so values are checked against the
//! declared [`ColumnType`](crate::schema::ColumnType) at the storage boundary
//! rather than in the type system. Typed access goes through `TryFrom<Value>`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CoreError;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value (SQL NULL).
    #[default]
    Null,
    /// Integer and reference columns.
    Integer(i64),
    /// String columns.
    Text(String),
    /// Boolean columns.
    Boolean(bool),
    /// Datetime columns.
    DateTime(DateTime<Utc>),
    /// Blob and zblob columns, always the caller's uncompressed bytes.
    Bytes(Vec<u8>),
    /// Object columns: an arbitrary structured value.
    Object(serde_json::Value),
}

impl Value {
    /// Builds an object value from anything serde can serialize.
    pub fn object<T: Serialize>(value: &T) -> Result<Self, CoreError> {
        Ok(Value::Object(serde_json::to_value(value)?))
    }

    /// Deserializes an object value back into `T`.
    ///
    /// `Null` deserializes as JSON `null`, so `Option<T>` targets read absent
    /// object columns as `None`.
    pub fn decode_object<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        match self {
            Value::Object(json) => Ok(T::deserialize(json)?),
            Value::Null => Ok(T::deserialize(serde_json::Value::Null)?),
            other => Err(CoreError::TypeMismatch {
                expected: "object",
                found: other.kind(),
            }),
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Text(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::DateTime(_) => "datetime",
            Value::Bytes(_) => "bytes",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON rendering for inspection output. Bytes are rendered as lowercase hex.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Text(s) => serde_json::Value::from(s.clone()),
            Value::Boolean(b) => serde_json::Value::from(*b),
            Value::DateTime(dt) => serde_json::Value::from(dt.to_rfc3339()),
            Value::Bytes(bytes) => serde_json::Value::from(hex(bytes)),
            Value::Object(json) => json.clone(),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::Object(json) => write!(f, "{json}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Into Value
// ---------------------------------------------------------------------------

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
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

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Out of Value
// ---------------------------------------------------------------------------

macro_rules! try_from_value {
    ($ty:ty, $expected:literal, $pat:pat => $out:expr) => {
        impl TryFrom<Value> for $ty {
            type Error = CoreError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    $pat => Ok($out),
                    other => Err(CoreError::TypeMismatch {
                        expected: $expected,
                        found: other.kind(),
                    }),
                }
            }
        }

        impl TryFrom<Value> for Option<$ty> {
            type Error = CoreError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    Value::Null => Ok(None),
                    other => <$ty>::try_from(other).map(Some),
                }
            }
        }
    };
}

try_from_value!(i64, "integer", Value::Integer(i) => i);
try_from_value!(String, "string", Value::Text(s) => s);
try_from_value!(bool, "boolean", Value::Boolean(b) => b);
try_from_value!(Vec<u8>, "bytes", Value::Bytes(b) => b);
try_from_value!(DateTime<Utc>, "datetime", Value::DateTime(dt) => dt);
try_from_value!(serde_json::Value, "object", Value::Object(j) => j);
