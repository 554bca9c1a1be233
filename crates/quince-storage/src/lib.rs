//! SQLite-backed persistence engine for quince entities.
//!
//! A [`Store`] owns one connection, the registry of schemas it has seen, and
//! the row cache that keeps every [`Entity`] for the same row pointing at one
//! shared entry. Writes go through to storage immediately; rows removed by
//! `ON DELETE CASCADE` are noticed the next time a cached entity is read.
//!
//! # Modules
//!
//! - [`error`]: StoreError with all failure modes
//! - [`types`]: RowId, Version, TableInfo
//! - [`config`]: StoreConfig and its environment overrides
//! - [`connection`]: connection setup and pragmas
//! - [`convert`]: Value <-> SQLite conversion
//! - [`clock`]: the monotonic version clock
//! - [`store`]: Store lifecycle, table creation and the write path
//! - [`entity`]: the Entity facade
//! - [`query`]: finders, declared queries and bulk deletes
//! - [`freshest`]: the freshest-version query
//! - [`reference`]: reference resolution
//! - [`catalog`]: schema-less inspection for tooling

mod cache;
mod registry;

pub mod catalog;
pub mod clock;
pub mod config;
pub mod connection;
pub mod convert;
pub mod entity;
pub mod error;
pub mod freshest;
pub mod query;
pub mod reference;
pub mod store;
pub mod types;

// Re-export key types for ergonomic use.
pub use config::{JournalMode, StoreConfig, Synchronous, IN_MEMORY};
pub use entity::Entity;
pub use error::StoreError;
pub use freshest::FreshestQuery;
pub use query::Params;
pub use store::Store;
pub use types::{RowId, TableInfo, Version};
