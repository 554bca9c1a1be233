//! Store configuration.
//!
//! Defaults to an in-memory database. [`StoreConfig::from_env`] reads:
//! - `QUINCE_DB_PATH`: SQLite database file path (default: ":memory:")
//! - `QUINCE_JOURNAL_MODE`: DELETE, TRUNCATE, PERSIST, MEMORY, WAL or OFF (default: WAL)
//! - `QUINCE_SYNCHRONOUS`: OFF, NORMAL or FULL (default: NORMAL)
//! - `QUINCE_BUSY_TIMEOUT_MS`: milliseconds to wait on a locked database (default: 5000)

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Path that selects an in-memory database.
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        }
    }
}

impl FromStr for JournalMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DELETE" => Ok(JournalMode::Delete),
            "TRUNCATE" => Ok(JournalMode::Truncate),
            "PERSIST" => Ok(JournalMode::Persist),
            "MEMORY" => Ok(JournalMode::Memory),
            "WAL" => Ok(JournalMode::Wal),
            "OFF" => Ok(JournalMode::Off),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Synchronous {
    Off,
    Normal,
    Full,
}

impl Synchronous {
    pub fn as_str(self) -> &'static str {
        match self {
            Synchronous::Off => "OFF",
            Synchronous::Normal => "NORMAL",
            Synchronous::Full => "FULL",
        }
    }
}

impl FromStr for Synchronous {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OFF" => Ok(Synchronous::Off),
            "NORMAL" => Ok(Synchronous::Normal),
            "FULL" => Ok(Synchronous::Full),
            _ => Err(()),
        }
    }
}

/// Connection settings for a [`crate::Store`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
    /// Ignored for in-memory databases.
    pub journal_mode: JournalMode,
    pub synchronous: Synchronous,
    pub busy_timeout_ms: u64,
    pub enforce_foreign_keys: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: IN_MEMORY.to_string(),
            journal_mode: JournalMode::Wal,
            synchronous: Synchronous::Normal,
            busy_timeout_ms: 5000,
            enforce_foreign_keys: true,
        }
    }
}

impl StoreConfig {
    /// A default configuration for the database file at `path`.
    pub fn at_path(path: impl Into<String>) -> Self {
        StoreConfig {
            path: path.into(),
            ..StoreConfig::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY
    }

    /// Reads overrides from `QUINCE_*` environment variables.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StoreError> {
        let mut config = StoreConfig::default();
        if let Some(path) = lookup("QUINCE_DB_PATH") {
            config.path = path;
        }
        if let Some(mode) = lookup("QUINCE_JOURNAL_MODE") {
            config.journal_mode = parse("QUINCE_JOURNAL_MODE", &mode)?;
        }
        if let Some(sync) = lookup("QUINCE_SYNCHRONOUS") {
            config.synchronous = parse("QUINCE_SYNCHRONOUS", &sync)?;
        }
        if let Some(timeout) = lookup("QUINCE_BUSY_TIMEOUT_MS") {
            config.busy_timeout_ms = timeout.parse().map_err(|_| StoreError::Config {
                key: "QUINCE_BUSY_TIMEOUT_MS".to_string(),
                value: timeout.clone(),
            })?;
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, StoreError> {
    value.parse().map_err(|_| StoreError::Config {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_to_memory() {
        let config = StoreConfig::default();
        assert!(config.is_in_memory());
        assert!(config.enforce_foreign_keys);
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("QUINCE_DB_PATH", "/tmp/q.db"),
            ("QUINCE_JOURNAL_MODE", "delete"),
            ("QUINCE_SYNCHRONOUS", "FULL"),
            ("QUINCE_BUSY_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();
        let config = StoreConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.path, "/tmp/q.db");
        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert_eq!(config.synchronous, Synchronous::Full);
        assert_eq!(config.busy_timeout_ms, 250);
    }

    #[test]
    fn bad_values_are_reported() {
        let err = StoreConfig::from_lookup(|k| (k == "QUINCE_SYNCHRONOUS").then(|| "sometimes".to_string()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Config { key, .. } if key == "QUINCE_SYNCHRONOUS"));
    }

    #[test]
    fn deserializes_partial_json() {
        let config: StoreConfig = serde_json::from_str(r#"{"path":"x.db","journal_mode":"MEMORY"}"#).unwrap();
        assert_eq!(config.path, "x.db");
        assert_eq!(config.journal_mode, JournalMode::Memory);
        assert_eq!(config.synchronous, Synchronous::Normal);
    }
}
