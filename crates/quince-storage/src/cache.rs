//! Row Cache: one shared, mutable entry per (table, row id).
//!
//! The cache maps [`RowKey`] to a `Weak` handle of the entry. Entities hold
//! the strong `Arc`, so an entry lives exactly as long as some entity refers
//! to it and every entity for the same row reads and writes the same cell.
//! Dead weak slots are replaced on the next lookup of their key.
//!
//! Lock order is entry first, then cache shard (via `evict`), then the
//! connection. Nothing locks an entry while holding a shard or the connection.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use quince_core::Value;

use crate::error::StoreError;
use crate::store::UPDATED_SLOT;
use crate::types::{RowKey, Version};

/// Mutable state of one cached row.
#[derive(Debug, Clone)]
pub(crate) struct RowState {
    /// Aligned with `Schema::columns()`: `row_id`, `created`, `updated`, then
    /// declared columns.
    pub values: Vec<Value>,
    pub deleted: bool,
    /// Values may not reflect storage; refetch before the next read.
    pub stale: bool,
}

impl RowState {
    pub fn loaded(values: Vec<Value>) -> Self {
        RowState {
            values,
            deleted: false,
            stale: false,
        }
    }

    /// An entry whose values have not been read yet.
    pub fn unloaded(width: usize) -> Self {
        RowState {
            values: vec![Value::Null; width],
            deleted: false,
            stale: true,
        }
    }

    /// Transition to the deleted state: every column reads as absent.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.stale = false;
        for value in &mut self.values {
            *value = Value::Null;
        }
    }

    /// Takes values read by a query unless the entry already holds a newer
    /// write. `settled` is false when rows were deleted after the read, in
    /// which case the entry stays stale until a read checks storage again.
    pub fn merge_fetched(&mut self, values: Vec<Value>, settled: bool) {
        if self.deleted {
            return;
        }
        let fetched = values.get(UPDATED_SLOT).and_then(Value::as_i64).map(Version);
        if self.version_at(UPDATED_SLOT) <= fetched {
            self.values = values;
            if settled {
                self.stale = false;
            }
        }
    }

    pub fn version_at(&self, index: usize) -> Option<Version> {
        self.values.get(index).and_then(Value::as_i64).map(Version)
    }
}

pub(crate) type RowCell = Mutex<RowState>;

pub(crate) fn lock(cell: &RowCell) -> Result<MutexGuard<'_, RowState>, StoreError> {
    cell.lock().map_err(|_| StoreError::Lock)
}

/// Process-wide index of live row entries.
#[derive(Debug, Default)]
pub(crate) struct RowCache {
    rows: DashMap<RowKey, Weak<RowCell>>,
}

impl RowCache {
    pub fn new() -> Self {
        RowCache::default()
    }

    /// The live entry for `key`, if any entity still holds it.
    pub fn get(&self, key: &RowKey) -> Option<Arc<RowCell>> {
        let live = self.rows.get(key).and_then(|weak| weak.upgrade());
        if live.is_none() {
            self.rows.remove_if(key, |_, weak| weak.strong_count() == 0);
        }
        live
    }

    /// Returns the live entry for `key`, or installs one built by `init`.
    /// The flag is true when the entry was created by this call.
    pub fn get_or_insert_with(
        &self,
        key: RowKey,
        init: impl FnOnce() -> RowState,
    ) -> (Arc<RowCell>, bool) {
        match self.rows.entry(key) {
            Entry::Occupied(mut slot) => {
                if let Some(cell) = slot.get().upgrade() {
                    return (cell, false);
                }
                let cell = Arc::new(Mutex::new(init()));
                slot.insert(Arc::downgrade(&cell));
                (cell, true)
            }
            Entry::Vacant(slot) => {
                let cell = Arc::new(Mutex::new(init()));
                slot.insert(Arc::downgrade(&cell));
                (cell, true)
            }
        }
    }

    /// Removes `key` if it still points at `cell`.
    pub fn evict(&self, key: &RowKey, cell: &Arc<RowCell>) {
        self.rows
            .remove_if(key, |_, weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(cell)));
    }

    /// Live entries of one table.
    pub fn entries_for_table(&self, table: &str) -> Vec<(RowKey, Arc<RowCell>)> {
        self.rows
            .iter()
            .filter(|item| item.key().table == table)
            .filter_map(|item| item.value().upgrade().map(|cell| (item.key().clone(), cell)))
            .collect()
    }

    pub fn clear(&self) {
        self.rows.clear();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.rows.iter().filter(|item| item.value().strong_count() > 0).count()
    }
}
