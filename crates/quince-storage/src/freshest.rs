//! Freshest-version query: the latest row per distinct grouping tuple.
//!
//! Candidates are filtered by `select_by` equality and an optional version
//! ceiling on `updated`, partitioned by the `group_by` columns, and ranked
//! inside each partition by `updated` then `row_id`, both descending. The
//! first-ranked row of every partition is returned.

use std::sync::Arc;

use quince_core::{ident, Schema, Value, ROW_ID, UPDATED};

use crate::convert::{normalize, to_sql};
use crate::entity::Entity;
use crate::error::StoreError;
use crate::query::Bind;
use crate::store::Store;
use crate::types::Version;

const RANK: &str = "__freshness_rank";

/// Arguments of [`Store::find_freshest`].
#[derive(Debug, Clone, Default)]
pub struct FreshestQuery {
    group_by: Vec<String>,
    version: Option<Version>,
    select_by: Vec<(String, Value)>,
}

impl FreshestQuery {
    pub fn new<S: Into<String>>(group_by: impl IntoIterator<Item = S>) -> Self {
        FreshestQuery {
            group_by: group_by.into_iter().map(Into::into).collect(),
            ..FreshestQuery::default()
        }
    }

    /// Only consider rows last updated at or before `version`.
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Only consider rows whose `column` equals `value`.
    pub fn select_by(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.select_by.push((column.into(), value.into()));
        self
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    /// SQL text and parameters for `schema`.
    fn compile(&self, schema: &Schema) -> Result<(String, Vec<rusqlite::types::Value>), StoreError> {
        if self.group_by.is_empty() {
            return Err(StoreError::BadParameters {
                reason: "freshest query needs at least one group_by column".to_string(),
            });
        }
        let unknown = |name: &str| StoreError::UnknownColumn {
            entity: schema.entity().to_string(),
            column: name.to_string(),
        };

        let mut partition = Vec::with_capacity(self.group_by.len());
        for name in &self.group_by {
            schema.column(name).ok_or_else(|| unknown(name))?;
            partition.push(ident::quote(name));
        }

        let mut terms = Vec::new();
        let mut params = Vec::new();
        for (name, value) in &self.select_by {
            let column = schema.column(name).ok_or_else(|| unknown(name))?;
            let value = normalize(name, column.ty, value.clone())?;
            if value.is_null() {
                terms.push(format!("{} IS NULL", ident::quote(name)));
            } else {
                params.push(to_sql(column.ty, &value)?);
                terms.push(format!("{} = ?{}", ident::quote(name), params.len()));
            }
        }
        if let Some(version) = self.version {
            params.push(rusqlite::types::Value::Integer(version.0));
            terms.push(format!("{} <= ?{}", ident::quote(UPDATED), params.len()));
        }
        let filter = if terms.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", terms.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM (SELECT *, ROW_NUMBER() OVER (PARTITION BY {partition} ORDER BY {updated} DESC, {row_id} DESC) AS {rank} FROM {table}{filter}) WHERE {rank} = 1 ORDER BY {row_id}",
            partition = partition.join(", "),
            updated = ident::quote(UPDATED),
            row_id = ident::quote(ROW_ID),
            rank = ident::quote(RANK),
            table = ident::quote(schema.table_name()),
        );
        Ok((sql, params))
    }
}

impl Store {
    /// One entity per distinct `group_by` tuple: the most recently updated
    /// row of that group, ties going to the larger `row_id`. Results are in
    /// `row_id` order.
    ///
    /// One store never hands out the same version twice, so ties only occur
    /// between rows written through different connections.
    pub fn find_freshest(&self, schema: &Arc<Schema>, query: &FreshestQuery) -> Result<Vec<Entity>, StoreError> {
        self.ensure_registered(schema)?;
        let (sql, params) = query.compile(schema)?;
        let bind = Bind::Positional(params);
        let (fetched, mark) = self.fetch(schema, &sql, &bind)?;
        fetched
            .into_iter()
            .map(|row| self.materialize(schema, row, mark))
            .collect()
    }
}
