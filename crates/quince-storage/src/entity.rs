//! Entity Facade: a cheap handle onto one shared row entry.
//!
//! An [`Entity`] never owns column values. Reads and writes go through the
//! `Arc<RowCell>` it shares with every other entity for the same row, so a
//! write through one handle is visible through all of them immediately.
//! Stale entries are refetched on the next read.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use quince_core::{CoreError, Schema, Value};

use crate::cache::{lock, RowCell, RowState};
use crate::error::StoreError;
use crate::store::{Store, CREATED_SLOT, UPDATED_SLOT};
use crate::types::{RowId, Version};

/// Handle to one persisted row.
#[derive(Clone)]
pub struct Entity {
    schema: Arc<Schema>,
    row_id: RowId,
    cell: Arc<RowCell>,
    store: Store,
}

impl Entity {
    pub(crate) fn new(schema: Arc<Schema>, row_id: RowId, cell: Arc<RowCell>, store: Store) -> Self {
        Entity {
            schema,
            row_id,
            cell,
            store,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn table_name(&self) -> &str {
        self.schema.table_name()
    }

    /// The row's identifier. Unlike `get("row_id")` this stays available
    /// after deletion.
    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn cell(&self) -> &Arc<RowCell> {
        &self.cell
    }

    /// Runs `f` against the entry after refreshing it if stale.
    fn read<T>(&self, f: impl FnOnce(&RowState) -> T) -> Result<T, StoreError> {
        let mut state = lock(&self.cell)?;
        if state.stale && !state.deleted {
            self.store
                .refresh_locked(&self.schema, self.row_id, &self.cell, &mut state)?;
        }
        Ok(f(&state))
    }

    fn slot(&self, column: &str) -> Result<usize, StoreError> {
        self.schema
            .accessor(column)
            .map(|accessor| accessor.column)
            .ok_or_else(|| StoreError::UnknownColumn {
                entity: self.schema.entity().to_string(),
                column: column.to_string(),
            })
    }

    /// Current value of `column`; `Null` once the row is deleted.
    pub fn get(&self, column: &str) -> Result<Value, StoreError> {
        let slot = self.slot(column)?;
        self.read(|state| state.values[slot].clone())
    }

    /// Current value of `column` converted to `T`.
    pub fn get_as<T>(&self, column: &str) -> Result<T, StoreError>
    where
        T: TryFrom<Value, Error = CoreError>,
    {
        Ok(T::try_from(self.get(column)?)?)
    }

    /// Deserializes an object column into `T`.
    pub fn get_object<T: DeserializeOwned>(&self, column: &str) -> Result<T, StoreError> {
        Ok(self.get(column)?.decode_object()?)
    }

    /// Writes one column through to storage.
    pub fn set(&self, column: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        self.store.write(self, &[(column, value.into())])
    }

    /// Writes several columns as one update; on failure none of them apply.
    pub fn set_many(&self, changes: &[(&str, Value)]) -> Result<(), StoreError> {
        self.store.write(self, changes)
    }

    /// Version at which the row was inserted.
    pub fn created(&self) -> Result<Option<Version>, StoreError> {
        self.read(|state| state.version_at(CREATED_SLOT))
    }

    /// Version of the last write to the row.
    pub fn updated(&self) -> Result<Option<Version>, StoreError> {
        self.read(|state| state.version_at(UPDATED_SLOT))
    }

    /// Deletes the row. Every entity sharing the entry observes the deletion.
    pub fn delete(&self) -> Result<(), StoreError> {
        self.store.delete_entity(self)
    }

    /// Whether the row is gone. A stale entry is checked against storage
    /// first, so rows removed by a cascade report true.
    pub fn is_deleted(&self) -> Result<bool, StoreError> {
        self.read(|state| state.deleted)
    }

    pub fn is_stale(&self) -> Result<bool, StoreError> {
        Ok(lock(&self.cell)?.stale)
    }

    /// Refetches the entry from storage now.
    pub fn refresh(&self) -> Result<(), StoreError> {
        let mut state = lock(&self.cell)?;
        if state.deleted {
            return Ok(());
        }
        self.store
            .refresh_locked(&self.schema, self.row_id, &self.cell, &mut state)
    }

    /// Snapshot of every column, implicit ones included.
    pub fn to_mapping(&self) -> Result<IndexMap<String, Value>, StoreError> {
        self.read(|state| {
            self.schema
                .columns()
                .iter()
                .zip(state.values.iter())
                .map(|(column, value)| (column.name.clone(), value.clone()))
                .collect()
        })
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.row_id == other.row_id && self.schema.table_name() == other.schema.table_name()
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.schema.table_name().hash(state);
        self.row_id.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("table", &self.schema.table_name())
            .field("row_id", &self.row_id)
            .finish()
    }
}

/// Entities bind and store as their row identifier.
impl From<&Entity> for Value {
    fn from(entity: &Entity) -> Self {
        Value::Integer(entity.row_id.0)
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        Value::Integer(entity.row_id.0)
    }
}
