//! The [`Store`] handle: connection, schema registry, row cache and version
//! clock for one database.
//!
//! A store is constructed explicitly and passed to every operation; clones
//! share the same state. All operations are synchronous. The connection sits
//! behind a mutex and is only held for the duration of a statement, never
//! while waiting on a cache entry.
//!
//! This module holds the lifecycle, table creation and the write path
//! (create, column writes, delete). Reads live in [`crate::query`] and
//! [`crate::freshest`], reference resolution in [`crate::reference`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use quince_core::{creation_order, ident, AccessorKind, Column, ColumnType, Schema, Value, UPDATED};

use crate::cache::{lock, RowCache, RowCell, RowState};
use crate::clock::VersionClock;
use crate::config::StoreConfig;
use crate::convert::{normalize, to_sql};
use crate::entity::Entity;
use crate::error::StoreError;
use crate::registry::Registry;
use crate::types::{RowId, RowKey, Version};

/// Positions of the implicit columns in every row's value vector.
pub(crate) const ROW_ID_SLOT: usize = 0;
pub(crate) const CREATED_SLOT: usize = 1;
pub(crate) const UPDATED_SLOT: usize = 2;

/// Handle to an open quince database.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    conn: Mutex<Option<Connection>>,
    pub(crate) cache: RowCache,
    pub(crate) registry: RwLock<Registry>,
    clock: VersionClock,
    /// Bumped under the connection lock by every statement that deletes rows.
    deletions: AtomicU64,
    path: String,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.inner.path)
            .field("cached_rows", &self.inner.cache.len())
            .finish()
    }
}

impl Store {
    /// Opens (or creates) the database described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = crate::connection::open(config)?;
        info!(path = %config.path, "store opened");
        Ok(Store {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(Some(conn)),
                cache: RowCache::new(),
                registry: RwLock::new(Registry::default()),
                clock: VersionClock::new(),
                deletions: AtomicU64::new(0),
                path: config.path.clone(),
            }),
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(&StoreConfig::default())
    }

    /// Opens (or creates) a database file with default settings.
    pub fn open_path(path: &str) -> Result<Self, StoreError> {
        Self::open(&StoreConfig::at_path(path))
    }

    /// Releases every cache entry and the connection. Later operations that
    /// need storage fail with [`StoreError::Closed`]; entities keep the
    /// values they last read.
    pub fn close(&self) -> Result<(), StoreError> {
        let conn = self
            .inner
            .conn
            .lock()
            .map_err(|_| StoreError::Lock)?
            .take();
        self.inner.cache.clear();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| StoreError::from(e))?;
            info!(path = %self.inner.path, "store closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .conn
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }

    /// Number of live cache entries.
    pub fn cached_rows(&self) -> usize {
        self.inner.cache.len()
    }

    /// Makes `schema` known to this store so named references to its entity
    /// resolve and its cascade relationships are tracked.
    pub fn register(&self, schema: &Arc<Schema>) -> Result<(), StoreError> {
        self.inner
            .registry
            .write()
            .map_err(|_| StoreError::Lock)?
            .register(schema);
        Ok(())
    }

    pub(crate) fn ensure_registered(&self, schema: &Arc<Schema>) -> Result<(), StoreError> {
        let known = self
            .inner
            .registry
            .read()
            .map_err(|_| StoreError::Lock)?
            .contains(schema);
        if known {
            Ok(())
        } else {
            self.register(schema)
        }
    }

    /// Registers `schema` and creates its table and indices if missing.
    pub fn create_table(&self, schema: &Arc<Schema>) -> Result<(), StoreError> {
        self.register(schema)?;
        let ddl = {
            let registry = self.inner.registry.read().map_err(|_| StoreError::Lock)?;
            schema.create_table_sql(&*registry)
        };
        let latest = self.with_conn(|conn| {
            debug!(sql = %ddl, "create table");
            conn.execute(&ddl, [])?;
            for index in schema.create_index_sql() {
                debug!(sql = %index, "create index");
                conn.execute(&index, [])?;
            }
            let latest: Option<i64> = conn
                .query_row(
                    &format!(
                        "SELECT MAX({}) FROM {}",
                        ident::quote(UPDATED),
                        ident::quote(schema.table_name())
                    ),
                    [],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            Ok(latest)
        })?;
        if let Some(latest) = latest {
            self.inner.clock.observe(Version(latest));
        }
        info!(entity = schema.entity(), table = schema.table_name(), "table ready");
        Ok(())
    }

    /// Creates several tables, referenced tables first.
    pub fn create_tables(&self, schemas: &[Arc<Schema>]) -> Result<(), StoreError> {
        for schema in schemas {
            self.register(schema)?;
        }
        for schema in creation_order(schemas) {
            self.create_table(&schema)?;
        }
        Ok(())
    }

    /// Inserts a row and returns an entity over its new cache entry.
    ///
    /// Unsupplied columns take their declared default, or NULL. A NOT NULL
    /// column with neither fails with [`StoreError::MissingColumn`] before
    /// storage is touched; store-side constraint failures surface as
    /// [`StoreError::ConstraintViolation`].
    pub fn create(&self, schema: &Arc<Schema>, values: &[(&str, Value)]) -> Result<Entity, StoreError> {
        self.ensure_registered(schema)?;
        let width = schema.columns().len();
        let mut row = vec![Value::Null; width];
        let mut supplied = vec![false; width];

        for (name, value) in values {
            let (slot, column) = writable_column(schema, name)?;
            row[slot] = normalize(name, column.ty, value.clone())?;
            supplied[slot] = true;
        }
        for (slot, column) in schema.columns().iter().enumerate() {
            if column.is_implicit() {
                continue;
            }
            if !supplied[slot] {
                if let Some(default) = &column.default {
                    row[slot] = normalize(&column.name, column.ty, default.clone())?;
                }
            }
            if column.not_null && row[slot].is_null() {
                return Err(StoreError::MissingColumn {
                    column: column.name.clone(),
                });
            }
        }

        let version = self.inner.clock.next();
        row[CREATED_SLOT] = Value::Integer(version.0);
        row[UPDATED_SLOT] = Value::Integer(version.0);

        let mut names = Vec::with_capacity(width);
        let mut params: Vec<SqlValue> = Vec::with_capacity(width);
        for (slot, column) in schema.columns().iter().enumerate().skip(CREATED_SLOT) {
            names.push(ident::quote(&column.name));
            params.push(to_sql(column.ty, &row[slot])?);
        }
        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            ident::quote(schema.table_name()),
            names.join(", "),
            placeholders.join(", ")
        );

        let id = self.with_conn(|conn| {
            debug!(sql = %sql, "insert");
            conn.prepare_cached(&sql)?.execute(params_from_iter(params.iter()))?;
            Ok(conn.last_insert_rowid())
        })?;
        let row_id = RowId(id);
        row[ROW_ID_SLOT] = Value::Integer(id);

        let key = RowKey::new(schema.table_name(), row_id);
        let (cell, fresh) = self
            .inner
            .cache
            .get_or_insert_with(key, || RowState::loaded(row.clone()));
        if !fresh {
            *lock(&cell)? = RowState::loaded(row);
        }
        Ok(Entity::new(Arc::clone(schema), row_id, cell, self.clone()))
    }

    /// Flags the entity's shared entry so the next read refetches it.
    pub fn mark_stale(&self, entity: &Entity) -> Result<(), StoreError> {
        let mut state = lock(entity.cell())?;
        if !state.deleted {
            state.stale = true;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Runs `f` with the connection, failing if the store is closed.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.inner.conn.lock().map_err(|_| StoreError::Lock)?;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }

    pub(crate) fn deletion_mark(&self) -> u64 {
        self.inner.deletions.load(Ordering::SeqCst)
    }

    /// Call with the connection held, right after a statement removed rows.
    pub(crate) fn note_deletion(&self) {
        self.inner.deletions.fetch_add(1, Ordering::SeqCst);
    }

    /// Re-reads a stale entry in place. A row that no longer exists turns the
    /// entry deleted and evicts it.
    pub(crate) fn refresh_locked(
        &self,
        schema: &Schema,
        row_id: RowId,
        cell: &Arc<RowCell>,
        state: &mut RowState,
    ) -> Result<(), StoreError> {
        match self.load_row(schema, row_id)? {
            Some(values) => {
                debug!(table = schema.table_name(), %row_id, "stale entry refreshed");
                state.values = values;
                state.stale = false;
            }
            None => {
                debug!(table = schema.table_name(), %row_id, "stale entry no longer stored");
                state.mark_deleted();
                self.inner
                    .cache
                    .evict(&RowKey::new(schema.table_name(), row_id), cell);
            }
        }
        Ok(())
    }

    /// Writes `changes` to one entry and its row as a single update.
    ///
    /// The entry is changed first and restored to its previous values if
    /// the statement fails, so it never holds a half-applied write.
    pub(crate) fn write(&self, entity: &Entity, changes: &[(&str, Value)]) -> Result<(), StoreError> {
        let schema = entity.schema();
        let mut resolved: Vec<(usize, ColumnType, Value)> = Vec::with_capacity(changes.len());
        for (name, value) in changes {
            let (slot, column) = writable_column(schema, name)?;
            resolved.push((slot, column.ty, normalize(name, column.ty, value.clone())?));
        }
        if resolved.is_empty() {
            return Ok(());
        }

        let cell = entity.cell();
        let mut state = lock(cell)?;
        if state.stale && !state.deleted {
            self.refresh_locked(schema, entity.row_id(), cell, &mut state)?;
        }
        if state.deleted {
            return Err(StoreError::Deleted {
                table: schema.table_name().to_string(),
                row_id: entity.row_id().0,
            });
        }

        let snapshot = state.values.clone();
        let version = self.inner.clock.next();
        for (slot, _, value) in &resolved {
            state.values[*slot] = value.clone();
        }
        state.values[UPDATED_SLOT] = Value::Integer(version.0);

        match self.persist_update(schema, entity.row_id(), &resolved, version) {
            Ok(0) => {
                state.mark_deleted();
                self.inner
                    .cache
                    .evict(&RowKey::new(schema.table_name(), entity.row_id()), cell);
                Err(StoreError::Deleted {
                    table: schema.table_name().to_string(),
                    row_id: entity.row_id().0,
                })
            }
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(
                    table = schema.table_name(),
                    row_id = %entity.row_id(),
                    error = %err,
                    "write failed, entry rolled back"
                );
                state.values = snapshot;
                Err(err)
            }
        }
    }

    fn persist_update(
        &self,
        schema: &Schema,
        row_id: RowId,
        changes: &[(usize, ColumnType, Value)],
        version: Version,
    ) -> Result<usize, StoreError> {
        let mut assignments = Vec::with_capacity(changes.len() + 1);
        let mut params: Vec<SqlValue> = Vec::with_capacity(changes.len() + 2);
        for (slot, ty, value) in changes {
            params.push(to_sql(*ty, value)?);
            assignments.push(format!(
                "{} = ?{}",
                ident::quote(&schema.columns()[*slot].name),
                params.len()
            ));
        }
        params.push(SqlValue::Integer(version.0));
        assignments.push(format!("{} = ?{}", ident::quote(UPDATED), params.len()));
        params.push(SqlValue::Integer(row_id.0));
        let sql = format!(
            "UPDATE {} SET {} WHERE row_id = ?{}",
            ident::quote(schema.table_name()),
            assignments.join(", "),
            params.len()
        );
        self.with_conn(|conn| {
            debug!(sql = %sql, "update");
            Ok(conn.prepare_cached(&sql)?.execute(params_from_iter(params.iter()))?)
        })
    }

    /// Deletes an entity's row and moves its shared entry to the deleted state.
    pub(crate) fn delete_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        let schema = entity.schema();
        let cell = entity.cell();
        {
            let mut state = lock(cell)?;
            if state.deleted {
                return Ok(());
            }
            let sql = format!(
                "DELETE FROM {} WHERE row_id = ?1",
                ident::quote(schema.table_name())
            );
            self.with_conn(|conn| {
                debug!(sql = %sql, row_id = %entity.row_id(), "delete");
                if conn.prepare_cached(&sql)?.execute([entity.row_id().0])? > 0 {
                    self.note_deletion();
                }
                Ok(())
            })?;
            state.mark_deleted();
            self.inner
                .cache
                .evict(&RowKey::new(schema.table_name(), entity.row_id()), cell);
        }
        self.invalidate_cascades(schema.table_name())
    }

    /// Marks cached entries of every table SQLite may have cascaded into as
    /// stale. Cascaded deletions are reconciled when those entries are next
    /// read, not here.
    pub(crate) fn invalidate_cascades(&self, table: &str) -> Result<(), StoreError> {
        let dependents = self
            .inner
            .registry
            .read()
            .map_err(|_| StoreError::Lock)?
            .cascade_dependents(table);
        for dependent in dependents {
            let entries = self.inner.cache.entries_for_table(&dependent);
            if !entries.is_empty() {
                debug!(table, dependent = %dependent, entries = entries.len(), "cascade invalidation");
            }
            for (_, cell) in entries {
                let mut state = lock(&cell)?;
                if !state.deleted {
                    state.stale = true;
                }
            }
        }
        Ok(())
    }
}

/// Looks up a column that callers may write.
pub(crate) fn writable_column<'s>(
    schema: &'s Schema,
    name: &str,
) -> Result<(usize, &'s Column), StoreError> {
    let accessor = schema.accessor(name).ok_or_else(|| StoreError::UnknownColumn {
        entity: schema.entity().to_string(),
        column: name.to_string(),
    })?;
    match accessor.kind {
        AccessorKind::ReadOnly => Err(StoreError::ReadOnlyColumn {
            column: name.to_string(),
        }),
        AccessorKind::Scalar(_) | AccessorKind::Reference => {
            Ok((accessor.column, &schema.columns()[accessor.column]))
        }
    }
}
