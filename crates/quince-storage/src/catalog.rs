//! Schema-less inspection of a quince database, used by the CLI.

use indexmap::IndexMap;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use quince_core::ident;

use crate::convert::raw_to_json;
use crate::error::StoreError;
use crate::store::Store;
use crate::types::TableInfo;

fn stored_sql(conn: &Connection, table: &str) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get::<_, String>(0),
        )
        .optional()?)
}

impl Store {
    /// User tables with their DDL and row counts, by name.
    pub fn catalog(&self) -> Result<Vec<TableInfo>, StoreError> {
        self.with_conn(|conn| {
            let tables = conn
                .prepare(
                    "SELECT name, sql FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )?
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut out = Vec::with_capacity(tables.len());
            for (name, sql) in tables {
                let rows: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", ident::quote(&name)),
                    [],
                    |row| row.get(0),
                )?;
                out.push(TableInfo { name, sql, rows });
            }
            Ok(out)
        })
    }

    /// The stored `CREATE TABLE` statement of `table`.
    pub fn table_sql(&self, table: &str) -> Result<String, StoreError> {
        self.with_conn(|conn| {
            stored_sql(conn, table)?.ok_or_else(|| StoreError::UnknownTable {
                table: table.to_string(),
            })
        })
    }

    /// Raw rows of `table` as JSON objects, in `row_id` order.
    pub fn dump_table(
        &self,
        table: &str,
        limit: Option<usize>,
    ) -> Result<Vec<IndexMap<String, serde_json::Value>>, StoreError> {
        self.with_conn(|conn| {
            if stored_sql(conn, table)?.is_none() {
                return Err(StoreError::UnknownTable {
                    table: table.to_string(),
                });
            }
            let mut sql = format!("SELECT * FROM {} ORDER BY row_id", ident::quote(table));
            if let Some(limit) = limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            debug!(sql = %sql, "dump");
            let mut stmt = conn.prepare(&sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = IndexMap::with_capacity(names.len());
                for (index, name) in names.iter().enumerate() {
                    record.insert(name.clone(), raw_to_json(row.get_ref(index)?));
                }
                out.push(record);
            }
            Ok(out)
        })
    }
}
