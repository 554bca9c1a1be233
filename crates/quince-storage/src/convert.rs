//! Value <-> SQLite conversion.
//!
//! Column-typed conversion ([`to_sql`], [`from_sql`]) applies the column's
//! encoding: booleans as 0/1, datetimes as RFC 3339 text with microsecond
//! precision, zblobs compressed, objects as JSON bytes. Finder arguments
//! have no column type and go through [`param_to_sql`].

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};

use quince_core::{codec, ColumnType, CoreError, Value};

use crate::error::StoreError;

/// Checks `value` against the column type and brings it into the canonical
/// form the cache holds, so cached values equal what a reload produces.
pub fn normalize(column: &str, ty: ColumnType, value: Value) -> Result<Value, StoreError> {
    let value = match (ty, value) {
        (_, Value::Null) => Value::Null,
        (ColumnType::Object, Value::Object(json)) => Value::Object(json),
        (ColumnType::Object, other) => Value::Object(other.to_json()),
        (ColumnType::DateTime, Value::DateTime(dt)) => Value::DateTime(dt.trunc_subsecs(6)),
        (ty, value) => {
            if !ty.accepts(&value) {
                return Err(StoreError::WrongType {
                    column: column.to_string(),
                    expected: expected_kind(ty),
                    found: value.kind(),
                });
            }
            value
        }
    };
    Ok(value)
}

fn expected_kind(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer => "integer",
        ColumnType::String => "string",
        ColumnType::Boolean => "boolean",
        ColumnType::DateTime => "datetime",
        ColumnType::Blob | ColumnType::ZBlob => "bytes",
        ColumnType::Object => "object",
    }
}

fn datetime_text(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encodes a normalized value for a column of type `ty`.
pub fn to_sql(ty: ColumnType, value: &Value) -> Result<SqlValue, CoreError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::DateTime(dt) => SqlValue::Text(datetime_text(dt)),
        Value::Bytes(bytes) => SqlValue::Blob(codec::encode_bytes(bytes, ty.encoding())?),
        Value::Object(json) => SqlValue::Blob(codec::encode_object(json, ty.encoding())?),
    })
}

/// Decodes a stored value for a column of type `ty`.
pub fn from_sql(ty: ColumnType, raw: ValueRef<'_>) -> Result<Value, CoreError> {
    if let ValueRef::Null = raw {
        return Ok(Value::Null);
    }
    match ty {
        ColumnType::Integer => match raw {
            ValueRef::Integer(i) => Ok(Value::Integer(i)),
            ValueRef::Real(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Ok(Value::Integer(f as i64))
            }
            other => Err(mismatch("integer", other)),
        },
        ColumnType::Boolean => match raw {
            ValueRef::Integer(i) => Ok(Value::Boolean(i != 0)),
            other => Err(mismatch("boolean", other)),
        },
        ColumnType::String => match raw {
            ValueRef::Text(bytes) => Ok(Value::Text(String::from_utf8_lossy(bytes).into_owned())),
            ValueRef::Integer(i) => Ok(Value::Text(i.to_string())),
            other => Err(mismatch("string", other)),
        },
        ColumnType::DateTime => match raw {
            ValueRef::Text(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                DateTime::parse_from_rfc3339(&text)
                    .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                    .map_err(|e| CoreError::InvalidDateTime {
                        text: text.into_owned(),
                        reason: e.to_string(),
                    })
            }
            other => Err(mismatch("datetime", other)),
        },
        ColumnType::Blob | ColumnType::ZBlob => match raw {
            ValueRef::Blob(bytes) | ValueRef::Text(bytes) => {
                Ok(Value::Bytes(codec::decode_bytes(bytes, ty.encoding())?))
            }
            other => Err(mismatch("bytes", other)),
        },
        ColumnType::Object => match raw {
            ValueRef::Blob(bytes) | ValueRef::Text(bytes) => {
                Ok(Value::Object(codec::decode_object(bytes, ty.encoding())?))
            }
            other => Err(mismatch("object", other)),
        },
    }
}

fn mismatch(expected: &'static str, raw: ValueRef<'_>) -> CoreError {
    CoreError::TypeMismatch {
        expected,
        found: match raw {
            ValueRef::Null => "null",
            ValueRef::Integer(_) => "integer",
            ValueRef::Real(_) => "real",
            ValueRef::Text(_) => "text",
            ValueRef::Blob(_) => "blob",
        },
    }
}

/// Encodes a finder argument that has no declared column type.
pub fn param_to_sql(value: &Value) -> Result<SqlValue, CoreError> {
    match value {
        Value::Bytes(bytes) => Ok(SqlValue::Blob(bytes.clone())),
        Value::Object(json) => Ok(SqlValue::Blob(codec::encode_object(json, codec::Encoding::Plain)?)),
        other => to_sql(ColumnType::Integer, other),
    }
}

/// Untyped rendering of a stored value, for inspecting tables without a schema.
pub fn raw_to_json(raw: ValueRef<'_>) -> serde_json::Value {
    match raw {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(bytes) => serde_json::Value::from(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()).to_json(),
    }
}
