//! Identifier validation, quoting and table-name normalization.
//!
//! Every identifier emitted into generated SQL goes through [`quote`], so
//! tables and columns named after SQL keywords (`create`, `group`, `order`)
//! work in every statement.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SchemaError;

static RE_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

static RE_STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").expect("string literal pattern is valid"));

static RE_QUOTED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""((?:[^"]|"")*)""#).expect("quoted name pattern is valid"));

static RE_BARE_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_.])([A-Za-z_][A-Za-z0-9_]*)").expect("bare word pattern is valid")
});

/// Words that may appear bare in a CHECK expression without naming a column.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "and", "as", "between", "binary", "blob", "case", "cast", "collate", "current_date",
    "current_time", "current_timestamp", "distinct", "else", "end", "escape", "exists", "false",
    "glob", "in", "integer", "is", "isnull", "like", "match", "nocase", "not", "notnull", "null",
    "numeric", "or", "real", "regexp", "rtrim", "text", "then", "true", "when",
];

/// Rejects names that cannot be used as a table, column or finder name.
pub fn validate(name: &str) -> Result<(), SchemaError> {
    if RE_IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

/// Double-quotes an identifier for SQLite.
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column names referenced by a SQL expression.
///
/// String literals are skipped, quoted names are always columns, and bare
/// words count unless they are keywords or function calls.
pub fn expression_columns(expr: &str) -> Vec<String> {
    let without_literals = RE_STRING_LITERAL.replace_all(expr, "''");
    let mut columns = Vec::new();
    for caps in RE_QUOTED_NAME.captures_iter(&without_literals) {
        columns.push(caps[1].replace("\"\"", "\""));
    }
    let bare = RE_QUOTED_NAME.replace_all(&without_literals, " ");
    for caps in RE_BARE_WORD.captures_iter(&bare) {
        let Some(word) = caps.get(1) else { continue };
        let is_call = bare[word.end()..].trim_start().starts_with('(');
        let lowered = word.as_str().to_ascii_lowercase();
        if !is_call && !EXPRESSION_KEYWORDS.contains(&lowered.as_str()) {
            columns.push(word.as_str().to_string());
        }
    }
    columns
}

/// Default table name for an entity: the last path segment, lower-cased.
///
/// `"billing::Customer"` becomes `"customer"`.
pub fn default_table_name(entity: &str) -> String {
    entity
        .rsplit("::")
        .next()
        .unwrap_or(entity)
        .to_ascii_lowercase()
}
