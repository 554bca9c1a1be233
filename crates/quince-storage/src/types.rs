//! Storage-layer identity types.
//!
//! [`RowId`] is defined here (not in quince-core) because row identity is a
//! storage concern: rows only gain an ID when inserted. The inner `i64`
//! aligns with SQLite's `INTEGER PRIMARY KEY`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quince_core::Value;

/// Storage-assigned row identifier, unique per table and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub i64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RowId> for Value {
    fn from(id: RowId) -> Self {
        Value::Integer(id.0)
    }
}

/// Version marker: microseconds since the Unix epoch, strictly increasing
/// per store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(pub i64);

impl Version {
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Version> for Value {
    fn from(v: Version) -> Self {
        Value::Integer(v.0)
    }
}

/// Cache key: one entry per (table, row id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub table: String,
    pub row_id: RowId,
}

impl RowKey {
    pub fn new(table: &str, row_id: RowId) -> Self {
        RowKey {
            table: table.to_string(),
            row_id,
        }
    }
}

/// A user table as seen by [`crate::Store::catalog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub sql: String,
    pub rows: i64,
}
