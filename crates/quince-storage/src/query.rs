//! Query Engine: basic finders, declared finders and bulk deletes.
//!
//! Every read is executed to completion while the connection is held, and
//! only then turned into entities. Result rows for identifiers that are
//! already cached overwrite the shared entry in place.

use std::sync::Arc;

use rusqlite::types::{ToSql, Value as SqlValue};
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use quince_core::{ident, Placeholders, Schema, Value, ROW_ID};

use crate::cache::{lock, RowState};
use crate::convert::{from_sql, normalize, param_to_sql, to_sql};
use crate::entity::Entity;
use crate::error::StoreError;
use crate::store::{Store, ROW_ID_SLOT};
use crate::types::{RowId, RowKey};

/// Arguments for a declared finder.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    /// Bound to `?` placeholders in order.
    Positional(Vec<Value>),
    /// Bound to `:name` placeholders.
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Params::Positional(values.into_iter().collect())
    }

    pub fn named<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Params::Named(
            pairs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }
}

/// Statement parameters after conversion.
pub(crate) enum Bind {
    Positional(Vec<SqlValue>),
    /// Keys include the leading `:`.
    Named(Vec<(String, SqlValue)>),
}

impl Bind {
    pub(crate) fn none() -> Self {
        Bind::Positional(Vec::new())
    }
}

/// One result row mapped onto a schema's column slots.
pub(crate) struct FetchedRow {
    pub row_id: RowId,
    pub values: Vec<Value>,
    /// Every schema column was present in the result.
    pub complete: bool,
}

/// Runs `sql` and decodes each result row by column name.
fn fetch_rows(
    conn: &Connection,
    schema: &Schema,
    sql: &str,
    bind: &Bind,
) -> Result<Vec<FetchedRow>, StoreError> {
    debug!(sql = %sql, "query");
    let mut stmt = conn.prepare_cached(sql)?;
    let width = schema.columns().len();
    let slots: Vec<Option<usize>> = stmt
        .column_names()
        .into_iter()
        .map(|name| schema.accessor(name).map(|accessor| accessor.column))
        .collect();
    let id_pos = slots
        .iter()
        .position(|slot| *slot == Some(ROW_ID_SLOT))
        .ok_or_else(|| StoreError::BadParameters {
            reason: format!("query result has no {ROW_ID} column"),
        })?;
    let complete = (0..width).all(|slot| slots.contains(&Some(slot)));

    let named: Vec<(&str, &dyn ToSql)> = match bind {
        Bind::Named(pairs) => pairs
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect(),
        Bind::Positional(_) => Vec::new(),
    };
    let mut rows = match bind {
        Bind::Positional(values) => stmt.query(params_from_iter(values.iter()))?,
        Bind::Named(_) => stmt.query(named.as_slice())?,
    };

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let Some(id) = row.get::<_, Option<i64>>(id_pos)? else {
            continue;
        };
        let mut values = vec![Value::Null; width];
        for (index, slot) in slots.iter().enumerate() {
            if let Some(slot) = *slot {
                values[slot] = from_sql(schema.columns()[slot].ty, row.get_ref(index)?)?;
            }
        }
        out.push(FetchedRow {
            row_id: RowId(id),
            values,
            complete,
        });
    }
    Ok(out)
}

/// Builds ` WHERE a = ?1 AND b IS NULL` for equality filters.
fn where_clause(schema: &Schema, filters: &[(&str, Value)]) -> Result<(String, Vec<SqlValue>), StoreError> {
    let mut terms = Vec::with_capacity(filters.len());
    let mut params = Vec::with_capacity(filters.len());
    for (name, value) in filters {
        let column = schema.column(name).ok_or_else(|| StoreError::UnknownColumn {
            entity: schema.entity().to_string(),
            column: name.to_string(),
        })?;
        let value = normalize(name, column.ty, value.clone())?;
        if value.is_null() {
            terms.push(format!("{} IS NULL", ident::quote(name)));
        } else {
            params.push(to_sql(column.ty, &value)?);
            terms.push(format!("{} = ?{}", ident::quote(name), params.len()));
        }
    }
    if terms.is_empty() {
        Ok((String::new(), params))
    } else {
        Ok((format!(" WHERE {}", terms.join(" AND ")), params))
    }
}

impl Store {
    /// Runs a query and notes the deletion mark it was read under.
    pub(crate) fn fetch(
        &self,
        schema: &Schema,
        sql: &str,
        bind: &Bind,
    ) -> Result<(Vec<FetchedRow>, u64), StoreError> {
        self.with_conn(|conn| {
            let rows = fetch_rows(conn, schema, sql, bind)?;
            Ok((rows, self.deletion_mark()))
        })
    }

    /// Builds an entity for a fetched row, reusing the live cache entry.
    ///
    /// The result may predate writes made through other handles since the
    /// read, so cached values are only replaced by ones at least as new. If
    /// rows were deleted after `mark` the entry is left stale, which makes
    /// the next read confirm the row still exists.
    pub(crate) fn materialize(
        &self,
        schema: &Arc<Schema>,
        fetched: FetchedRow,
        mark: u64,
    ) -> Result<Entity, StoreError> {
        let width = schema.columns().len();
        let FetchedRow {
            row_id,
            values,
            complete,
        } = fetched;
        let (cell, _) = self
            .inner
            .cache
            .get_or_insert_with(RowKey::new(schema.table_name(), row_id), || RowState::unloaded(width));
        {
            // The mark is read with the entry locked so a concurrent delete
            // either shows up in it or finds this entry when it marks rows.
            let mut state = lock(&cell)?;
            let settled = self.deletion_mark() == mark;
            if complete {
                state.merge_fetched(values, settled);
            } else if !state.deleted {
                state.stale = true;
            }
        }
        Ok(Entity::new(Arc::clone(schema), row_id, cell, self.clone()))
    }

    fn select(&self, schema: &Arc<Schema>, sql: &str, bind: &Bind) -> Result<Vec<Entity>, StoreError> {
        self.ensure_registered(schema)?;
        let (fetched, mark) = self.fetch(schema, sql, bind)?;
        fetched
            .into_iter()
            .map(|row| self.materialize(schema, row, mark))
            .collect()
    }

    /// Reads one row's values straight from storage.
    pub(crate) fn load_row(&self, schema: &Schema, row_id: RowId) -> Result<Option<Vec<Value>>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE row_id = ?1",
            ident::quote(schema.table_name())
        );
        let bind = Bind::Positional(vec![SqlValue::Integer(row_id.0)]);
        let mut rows = self.with_conn(|conn| fetch_rows(conn, schema, &sql, &bind))?;
        Ok(rows.pop().map(|row| row.values))
    }

    /// The row with identifier `row_id`, served from the cache when possible.
    pub fn find(&self, schema: &Arc<Schema>, row_id: RowId) -> Result<Option<Entity>, StoreError> {
        self.ensure_registered(schema)?;
        if let Some(cell) = self.inner.cache.get(&RowKey::new(schema.table_name(), row_id)) {
            let alive = {
                let mut state = lock(&cell)?;
                if state.stale && !state.deleted {
                    self.refresh_locked(schema, row_id, &cell, &mut state)?;
                }
                !state.deleted
            };
            return Ok(alive.then(|| Entity::new(Arc::clone(schema), row_id, cell, self.clone())));
        }
        let sql = format!(
            "SELECT * FROM {} WHERE row_id = ?1",
            ident::quote(schema.table_name())
        );
        let bind = Bind::Positional(vec![SqlValue::Integer(row_id.0)]);
        let (mut fetched, mark) = self.fetch(schema, &sql, &bind)?;
        match fetched.pop() {
            Some(row) => self.materialize(schema, row, mark).map(Some),
            None => Ok(None),
        }
    }

    pub fn find_all(&self, schema: &Arc<Schema>) -> Result<Vec<Entity>, StoreError> {
        self.find_by(schema, &[])
    }

    /// Rows matching every equality filter, in `row_id` order.
    pub fn find_by(&self, schema: &Arc<Schema>, filters: &[(&str, Value)]) -> Result<Vec<Entity>, StoreError> {
        let (clause, params) = where_clause(schema, filters)?;
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY row_id",
            ident::quote(schema.table_name()),
            clause
        );
        self.select(schema, &sql, &Bind::Positional(params))
    }

    pub fn find_first_by(
        &self,
        schema: &Arc<Schema>,
        filters: &[(&str, Value)],
    ) -> Result<Option<Entity>, StoreError> {
        let (clause, params) = where_clause(schema, filters)?;
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY row_id LIMIT 1",
            ident::quote(schema.table_name()),
            clause
        );
        Ok(self
            .select(schema, &sql, &Bind::Positional(params))?
            .into_iter()
            .next())
    }

    pub fn count(&self, schema: &Arc<Schema>) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", ident::quote(schema.table_name()));
        self.with_conn(|conn| {
            debug!(sql = %sql, "count");
            Ok(conn.query_row(&sql, [], |row| row.get(0))?)
        })
    }

    /// Deletes every row matching the filters and returns how many went.
    /// Cached entries of those rows become deleted.
    pub fn delete_where(&self, schema: &Arc<Schema>, filters: &[(&str, Value)]) -> Result<usize, StoreError> {
        self.ensure_registered(schema)?;
        let table = ident::quote(schema.table_name());
        let (clause, params) = where_clause(schema, filters)?;
        let select = format!("SELECT row_id FROM {table}{clause}");
        let delete = format!("DELETE FROM {table}{clause}");

        let ids = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let ids = tx
                .prepare_cached(&select)?
                .query_map(params_from_iter(params.iter()), |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            debug!(sql = %delete, rows = ids.len(), "delete where");
            tx.execute(&delete, params_from_iter(params.iter()))?;
            tx.commit()?;
            if !ids.is_empty() {
                self.note_deletion();
            }
            Ok(ids)
        })?;

        for id in &ids {
            let key = RowKey::new(schema.table_name(), RowId(*id));
            if let Some(cell) = self.inner.cache.get(&key) {
                lock(&cell)?.mark_deleted();
                self.inner.cache.evict(&key, &cell);
            }
        }
        if !ids.is_empty() {
            self.invalidate_cascades(schema.table_name())?;
        }
        Ok(ids.len())
    }

    pub fn delete_all(&self, schema: &Arc<Schema>) -> Result<usize, StoreError> {
        self.delete_where(schema, &[])
    }

    /// Runs the declared finder `name` with `params`.
    pub fn query(&self, schema: &Arc<Schema>, name: &str, params: Params) -> Result<Vec<Entity>, StoreError> {
        let finder = schema.finder(name).ok_or_else(|| StoreError::UnknownFinder {
            entity: schema.entity().to_string(),
            name: name.to_string(),
        })?;
        let bind = bind_params(&finder.placeholders, params)?;
        self.select(schema, &finder.sql, &bind)
    }
}

/// Checks arguments against a finder's placeholders and converts them.
fn bind_params(expected: &Placeholders, params: Params) -> Result<Bind, StoreError> {
    match (expected, params) {
        (Placeholders::None, Params::None) => Ok(Bind::none()),
        (Placeholders::None, Params::Positional(v)) if v.is_empty() => Ok(Bind::none()),
        (Placeholders::None, Params::Named(v)) if v.is_empty() => Ok(Bind::none()),
        (Placeholders::Positional(count), Params::Positional(values)) => {
            if values.len() != *count {
                return Err(StoreError::BadParameters {
                    reason: format!("expected {count} arguments, got {}", values.len()),
                });
            }
            let converted = values
                .iter()
                .map(param_to_sql)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Bind::Positional(converted))
        }
        (Placeholders::Named(names), Params::Named(pairs)) => {
            if let Some((extra, _)) = pairs.iter().find(|(key, _)| !names.contains(key)) {
                return Err(StoreError::BadParameters {
                    reason: format!("unexpected parameter :{extra}"),
                });
            }
            let mut converted = Vec::with_capacity(names.len());
            for name in names {
                let (_, value) = pairs
                    .iter()
                    .find(|(key, _)| key == name)
                    .ok_or_else(|| StoreError::BadParameters {
                        reason: format!("missing parameter :{name}"),
                    })?;
                converted.push((format!(":{name}"), param_to_sql(value)?));
            }
            Ok(Bind::Named(converted))
        }
        (expected, params) => Err(StoreError::BadParameters {
            reason: format!("finder expects {expected:?}, got {params:?}"),
        }),
    }
}
