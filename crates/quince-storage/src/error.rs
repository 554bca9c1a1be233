//! Storage error types for quince-storage.
//!
//! [`StoreError`] covers every failure a caller can observe. Lookups that
//! match nothing are not errors; they return `None` or an empty `Vec`.
//! Constraint failures reported by SQLite are classified into
//! [`StoreError::ConstraintViolation`] by the `From<rusqlite::Error>` impl so
//! every `?` on a statement surfaces them unchanged.

use quince_core::{CoreError, SchemaError};
use thiserror::Error;

/// Errors produced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique, foreign-key, NOT NULL or CHECK constraint rejected the statement.
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Any other SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// An object or zblob payload could not be encoded or decoded, or a
    /// value could not be converted to the requested type.
    #[error("serialization failure: {0}")]
    SerializationFailure(#[from] CoreError),

    /// A schema declaration was rejected.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The column is not declared by this entity type.
    #[error("unknown column '{column}' for entity '{entity}'")]
    UnknownColumn { entity: String, column: String },

    /// The column is maintained by the store and cannot be written.
    #[error("column '{column}' is read-only")]
    ReadOnlyColumn { column: String },

    /// The column is not a reference column.
    #[error("column '{column}' of entity '{entity}' is not a reference")]
    NotAReference { entity: String, column: String },

    /// A value does not fit the declared column type.
    #[error("column '{column}' expects {expected}, got {found}")]
    WrongType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A NOT NULL column without default was not supplied on create.
    #[error("missing value for required column '{column}'")]
    MissingColumn { column: String },

    /// No table with that name exists in the database.
    #[error("unknown table '{table}'")]
    UnknownTable { table: String },

    /// No finder with that name was declared.
    #[error("unknown finder '{name}' for entity '{entity}'")]
    UnknownFinder { entity: String, name: String },

    /// Arguments do not match what a query expects.
    #[error("bad parameters: {reason}")]
    BadParameters { reason: String },

    /// A named reference target has not been registered with the store.
    #[error("unresolved reference to entity '{entity}'")]
    UnresolvedReference { entity: String },

    /// The row behind an entity has been deleted.
    #[error("row {row_id} of table '{table}' has been deleted")]
    Deleted { table: String, row_id: i64 },

    /// Configuration could not be read.
    #[error("invalid configuration {key}={value}")]
    Config { key: String, value: String },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// A lock was poisoned by a panicking thread.
    #[error("lock poisoned")]
    Lock,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation {
                    message: message.unwrap_or_else(|| code.to_string()),
                }
            }
            other => StoreError::Sqlite(other),
        }
    }
}

impl StoreError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }
}
