//! Declared finders, compiled once when the schema is built.
//!
//! A predicate finder contributes a `WHERE` fragment such as `one < ? and
//! two < ?` or `t = :t`. A custom finder supplies the whole query text with
//! [`TABLE_PLACEHOLDER`] standing in for the table name. Either way the SQL
//! text is fixed at compile time and arguments are only ever bound as
//! statement parameters.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SchemaError;
use crate::ident;

/// Token replaced by the quoted table name in custom query text.
pub const TABLE_PLACEHOLDER: &str = "__TABLE__";

static RE_NAMED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("named placeholder pattern is valid"));

/// The parameters a compiled finder expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholders {
    /// No parameters at all.
    None,
    /// `count` anonymous `?` parameters.
    Positional(usize),
    /// Distinct `:name` parameters in order of first appearance.
    Named(Vec<String>),
}

/// Whether the finder supplied a fragment or the whole query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderKind {
    Predicate,
    Custom,
}

/// A declared finder with its final SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finder {
    pub name: String,
    pub kind: FinderKind,
    pub source: String,
    pub sql: String,
    pub placeholders: Placeholders,
}

impl Finder {
    /// Compiles a `WHERE` fragment against `table`.
    pub fn predicate(name: &str, fragment: &str, table: &str) -> Result<Self, SchemaError> {
        ident::validate(name)?;
        let placeholders = scan_placeholders(name, fragment)?;
        Ok(Finder {
            name: name.to_string(),
            kind: FinderKind::Predicate,
            source: fragment.to_string(),
            sql: format!(
                "SELECT * FROM {} WHERE ({}) ORDER BY row_id",
                ident::quote(table),
                fragment
            ),
            placeholders,
        })
    }

    /// Compiles full query text, substituting the table placeholder.
    pub fn custom(name: &str, text: &str, table: &str) -> Result<Self, SchemaError> {
        ident::validate(name)?;
        if !text.contains(TABLE_PLACEHOLDER) {
            return Err(SchemaError::MissingTablePlaceholder {
                name: name.to_string(),
                placeholder: TABLE_PLACEHOLDER,
            });
        }
        let placeholders = scan_placeholders(name, text)?;
        Ok(Finder {
            name: name.to_string(),
            kind: FinderKind::Custom,
            source: text.to_string(),
            sql: text.replace(TABLE_PLACEHOLDER, &ident::quote(table)),
            placeholders,
        })
    }
}

/// Finds `?` and `:name` placeholders outside of string literals.
fn scan_placeholders(name: &str, sql: &str) -> Result<Placeholders, SchemaError> {
    let mut positional = 0usize;
    let mut named: Vec<String> = Vec::new();

    for (i, segment) in sql.split('\'').enumerate() {
        // Odd segments sit inside a quoted literal.
        if i % 2 == 1 {
            continue;
        }
        positional += segment.matches('?').count();
        for cap in RE_NAMED.captures_iter(segment) {
            let param = cap[1].to_string();
            if !named.contains(&param) {
                named.push(param);
            }
        }
    }

    match (positional, named.is_empty()) {
        (0, true) => Ok(Placeholders::None),
        (n, true) => Ok(Placeholders::Positional(n)),
        (0, false) => Ok(Placeholders::Named(named)),
        _ => Err(SchemaError::MixedPlaceholders {
            name: name.to_string(),
        }),
    }
}
