//! Opening and configuring the SQLite connection.

use std::time::Duration;

use rusqlite::Connection;

use crate::config::StoreConfig;
use crate::error::StoreError;

/// Opens the database described by `config` with its pragmas applied.
pub fn open(config: &StoreConfig) -> Result<Connection, StoreError> {
    let conn = if config.is_in_memory() {
        Connection::open_in_memory()?
    } else {
        Connection::open(&config.path)?
    };
    configure(&conn, config)?;
    Ok(conn)
}

fn configure(conn: &Connection, config: &StoreConfig) -> Result<(), StoreError> {
    // In-memory databases always use the MEMORY journal.
    if !config.is_in_memory() {
        conn.pragma_update(None, "journal_mode", config.journal_mode.as_str())?;
    }
    conn.pragma_update(None, "synchronous", config.synchronous.as_str())?;
    // Foreign key enforcement is off by default in SQLite.
    conn.pragma_update(None, "foreign_keys", config.enforce_foreign_keys)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}
