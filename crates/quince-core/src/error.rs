//! Core error types for quince-core.
//!
//! Uses `thiserror` for structured, matchable error variants. [`SchemaError`]
//! covers bad declarations and is raised by [`crate::schema::SchemaBuilder::build`]
//! before any storage access; [`CoreError`] covers value conversion and codec
//! failures.

use thiserror::Error;

/// Errors produced while compiling entity declarations into a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// An entity, table, column, constraint or finder name is not usable.
    #[error("invalid identifier: '{name}'")]
    InvalidIdentifier { name: String },

    /// The same column was declared twice.
    #[error("duplicate column '{column}' in entity '{entity}'")]
    DuplicateColumn { entity: String, column: String },

    /// A declared column collides with one of the implicit columns.
    #[error("column '{column}' is reserved for internal use")]
    ReservedColumn { column: String },

    /// Two finders share a name.
    #[error("duplicate finder '{name}' in entity '{entity}'")]
    DuplicateFinder { entity: String, name: String },

    /// Two constraints share a name.
    #[error("duplicate constraint '{name}' in entity '{entity}'")]
    DuplicateConstraint { entity: String, name: String },

    /// An index names a column that was never declared.
    #[error("index on unknown column '{column}' in entity '{entity}'")]
    UnknownIndexColumn { entity: String, column: String },

    /// A CHECK constraint refers to a column that was never declared.
    #[error("constraint '{constraint}' in entity '{entity}' refers to unknown column '{column}'")]
    UnknownConstraintColumn {
        entity: String,
        constraint: String,
        column: String,
    },

    /// A finder fragment uses both `?` and `:name` placeholders.
    #[error("finder '{name}' mixes positional and named placeholders")]
    MixedPlaceholders { name: String },

    /// A custom query has no table placeholder to substitute.
    #[error("custom query '{name}' does not contain the {placeholder} placeholder")]
    MissingTablePlaceholder {
        name: String,
        placeholder: &'static str,
    },

    /// A column default does not fit the declared column type.
    #[error("default for column '{column}' does not match its type")]
    BadDefault { column: String },
}

/// Value conversion and codec errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value could not be converted into the requested Rust type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// JSON serialization or deserialization of an object value failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// zlib compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// A stored datetime could not be parsed.
    #[error("invalid datetime '{text}': {reason}")]
    InvalidDateTime { text: String, reason: String },
}
