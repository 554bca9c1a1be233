//! Storage-independent building blocks for quince entities.
//!
//! Entity types are described by declarations (columns, references,
//! constraints, indices and finders) that compile once into an immutable
//! [`Schema`]. Column values travel as the dynamic [`Value`]; object and zblob
//! payloads are turned into bytes by the [`codec`].
//!
//! # Modules
//!
//! - [`error`]: SchemaError and CoreError
//! - [`value`]: the Value model and its conversions
//! - [`codec`]: JSON and zlib byte encodings
//! - [`ident`]: identifier validation, quoting and table naming
//! - [`finder`]: declared and custom finder compilation
//! - [`schema`]: declarations, the schema compiler and DDL generation
//! - [`order`]: table creation ordering across references

pub mod codec;
pub mod error;
pub mod finder;
pub mod ident;
pub mod order;
pub mod schema;
pub mod value;

// Re-export key types for ergonomic use.
pub use codec::Encoding;
pub use error::{CoreError, SchemaError};
pub use finder::{Finder, FinderKind, Placeholders, TABLE_PLACEHOLDER};
pub use order::creation_order;
pub use schema::{
    Accessor, AccessorKind, Column, ColumnType, Constraint, DeletePolicy, Reference, Referent,
    Schema, SchemaBuilder, TableResolver, CREATED, ROW_ID, UPDATED,
};
pub use value::Value;
