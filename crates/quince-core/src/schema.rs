//! Schema Registry: compiles entity declarations into an immutable [`Schema`].
//!
//! A schema is built once per entity type through [`SchemaBuilder`] and shared
//! as `Arc<Schema>` afterwards. Building validates every declaration and
//! compiles the per-column [`Accessor`] table and the declared finders, so
//! later operations never re-interpret declarations.
//!
//! Every table carries three implicit columns ahead of the declared ones:
//! `row_id` (storage-assigned, never reused), `created` and `updated`
//! (version markers maintained by the store).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::codec::Encoding;
use crate::error::SchemaError;
use crate::finder::Finder;
use crate::ident;
use crate::value::Value;

/// Name of the storage-assigned identifier column.
pub const ROW_ID: &str = "row_id";
/// Name of the creation version marker column.
pub const CREATED: &str = "created";
/// Name of the last-update version marker column.
pub const UPDATED: &str = "updated";

const IMPLICIT_COLUMNS: [&str; 3] = [ROW_ID, CREATED, UPDATED];

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    String,
    Boolean,
    DateTime,
    /// Raw bytes, stored verbatim.
    Blob,
    /// Raw bytes, zlib-compressed transparently.
    ZBlob,
    /// Arbitrary structured value, serialized.
    Object,
}

impl ColumnType {
    /// SQLite column type used in DDL.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::String | ColumnType::DateTime => "TEXT",
            ColumnType::Blob | ColumnType::ZBlob | ColumnType::Object => "BLOB",
        }
    }

    /// On-disk encoding of byte-carrying columns.
    pub fn encoding(self) -> Encoding {
        match self {
            ColumnType::ZBlob => Encoding::Zlib,
            _ => Encoding::Plain,
        }
    }

    /// Whether `value` can be stored in a column of this type.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Integer, Value::Integer(_))
                | (ColumnType::String, Value::Text(_))
                | (ColumnType::Boolean, Value::Boolean(_))
                | (ColumnType::DateTime, Value::DateTime(_))
                | (ColumnType::Blob | ColumnType::ZBlob, Value::Bytes(_))
                | (ColumnType::Object, _)
        )
    }
}

/// What happens to referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeletePolicy {
    /// Deleting a referenced row fails while dependents exist.
    #[default]
    NoAction,
    /// Deleting a referenced row deletes its dependents.
    Cascade,
}

/// The target of a reference column.
#[derive(Debug, Clone)]
pub enum Referent {
    /// A schema that already exists.
    Schema(Arc<Schema>),
    /// A forward or self reference by entity name, resolved on first use.
    Named(String),
}

/// A reference from one column to the `row_id` of another entity.
#[derive(Debug, Clone)]
pub struct Reference {
    referent: Referent,
    on_delete: DeletePolicy,
}

impl Reference {
    /// References an already-built schema.
    pub fn to(schema: &Arc<Schema>) -> Self {
        Reference {
            referent: Referent::Schema(Arc::clone(schema)),
            on_delete: DeletePolicy::NoAction,
        }
    }

    /// References an entity by name, possibly one not built yet.
    pub fn named(entity: impl Into<String>) -> Self {
        Reference {
            referent: Referent::Named(entity.into()),
            on_delete: DeletePolicy::NoAction,
        }
    }

    pub fn on_delete(mut self, policy: DeletePolicy) -> Self {
        self.on_delete = policy;
        self
    }

    pub fn referent(&self) -> &Referent {
        &self.referent
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.on_delete
    }

    /// Entity name of the target.
    pub fn target_entity(&self) -> &str {
        match &self.referent {
            Referent::Schema(schema) => schema.entity(),
            Referent::Named(name) => name,
        }
    }

    /// The referenced column, always `row_id`.
    pub fn column(&self) -> &'static str {
        ROW_ID
    }

    /// True when the target schema was supplied directly.
    pub fn is_managed(&self) -> bool {
        matches!(self.referent, Referent::Schema(_))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "references {}({})", self.target_entity(), self.column())
    }
}

/// A column declaration.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub default: Option<Value>,
    pub not_null: bool,
    pub reference: Option<Reference>,
    implicit: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Column {
            name: name.into(),
            ty,
            default: None,
            not_null: false,
            reference: None,
            implicit: false,
        }
    }

    /// An integer column holding the `row_id` of another entity.
    pub fn reference(name: impl Into<String>, reference: Reference) -> Self {
        Column {
            reference: Some(reference),
            ..Column::new(name, ColumnType::Integer)
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// True for `row_id`, `created` and `updated`.
    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    fn implicit(name: &str) -> Self {
        Column {
            implicit: true,
            ..Column::new(name, ColumnType::Integer)
        }
    }
}

/// A named CHECK constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub name: String,
    pub check: String,
}

/// How a column may be read and written through an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    /// Maintained by the store; readable only.
    ReadOnly,
    /// A plain value column of the given type.
    Scalar(ColumnType),
    /// A reference column, resolvable to an entity of the target schema.
    Reference,
}

/// Compiled accessor for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accessor {
    /// Position in [`Schema::columns`].
    pub column: usize,
    pub kind: AccessorKind,
}

impl Accessor {
    pub fn is_writable(&self) -> bool {
        !matches!(self.kind, AccessorKind::ReadOnly)
    }
}

/// The compiled, immutable description of one entity type.
#[derive(Debug)]
pub struct Schema {
    entity: String,
    table: String,
    columns: Vec<Column>,
    constraints: Vec<Constraint>,
    indices: Vec<String>,
    finders: IndexMap<String, Finder>,
    accessors: IndexMap<String, Accessor>,
}

/// Maps an entity name to its table for references that were declared by name.
pub trait TableResolver {
    fn resolve_table(&self, entity: &str) -> Option<String>;
}

/// Resolves nothing, so every named reference falls back to the default
/// table name of the entity.
impl TableResolver for () {
    fn resolve_table(&self, _entity: &str) -> Option<String> {
        None
    }
}

impl Schema {
    pub fn builder(entity: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(entity)
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// All columns: the implicit ones first, then declarations in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Declared columns only.
    pub fn declared_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.implicit)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.accessors.get(name).map(|a| &self.columns[a.column])
    }

    pub fn accessor(&self, name: &str) -> Option<Accessor> {
        self.accessors.get(name).copied()
    }

    /// Declared reference columns and their references.
    pub fn references(&self) -> impl Iterator<Item = (&Column, &Reference)> {
        self.columns
            .iter()
            .filter_map(|c| c.reference.as_ref().map(|r| (c, r)))
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn indices(&self) -> &[String] {
        &self.indices
    }

    pub fn finder(&self, name: &str) -> Option<&Finder> {
        self.finders.get(name)
    }

    pub fn finders(&self) -> impl Iterator<Item = &Finder> {
        self.finders.values()
    }

    /// `CREATE TABLE` statement for this schema.
    pub fn create_table_sql(&self, resolver: &dyn TableResolver) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.columns.len() + self.constraints.len());
        for column in &self.columns {
            parts.push(self.column_sql(column, resolver));
        }
        for constraint in &self.constraints {
            parts.push(format!(
                "CONSTRAINT {} CHECK ({})",
                ident::quote(&constraint.name),
                constraint.check
            ));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            ident::quote(&self.table),
            parts.join(", ")
        )
    }

    /// One `CREATE INDEX` statement per declared index.
    pub fn create_index_sql(&self) -> Vec<String> {
        self.indices
            .iter()
            .map(|column| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    ident::quote(&format!("{}_{}", self.table, column)),
                    ident::quote(&self.table),
                    ident::quote(column)
                )
            })
            .collect()
    }

    /// Table that a reference points at, consulting `resolver` for named targets.
    pub fn target_table(reference: &Reference, resolver: &dyn TableResolver) -> String {
        match reference.referent() {
            Referent::Schema(schema) => schema.table_name().to_string(),
            Referent::Named(entity) => resolver
                .resolve_table(entity)
                .unwrap_or_else(|| ident::default_table_name(entity)),
        }
    }

    fn column_sql(&self, column: &Column, resolver: &dyn TableResolver) -> String {
        if column.name == ROW_ID {
            return format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", ident::quote(ROW_ID));
        }
        let mut sql = format!("{} {}", ident::quote(&column.name), column.ty.sql_type());
        if column.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(literal) = column.default.as_ref().and_then(sql_literal) {
            sql.push_str(" DEFAULT ");
            sql.push_str(&literal);
        }
        if let Some(reference) = &column.reference {
            sql.push_str(&format!(
                " REFERENCES {}({})",
                ident::quote(&Self::target_table(reference, resolver)),
                reference.column()
            ));
            if reference.delete_policy() == DeletePolicy::Cascade {
                sql.push_str(" ON DELETE CASCADE");
            }
        }
        sql
    }
}

/// Renders a default value as an SQL literal. Object defaults have none and
/// are supplied on insert instead.
fn sql_literal(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("NULL".to_string()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Boolean(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Text(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Value::DateTime(dt) => Some(format!("'{}'", dt.to_rfc3339())),
        Value::Bytes(_) | Value::Object(_) => None,
    }
}

/// Collects declarations for one entity type.
#[derive(Debug)]
pub struct SchemaBuilder {
    entity: String,
    table: Option<String>,
    columns: Vec<Column>,
    constraints: Vec<Constraint>,
    indices: Vec<String>,
    queries: Vec<(String, String, bool)>,
}

impl SchemaBuilder {
    pub fn new(entity: impl Into<String>) -> Self {
        SchemaBuilder {
            entity: entity.into(),
            table: None,
            columns: Vec::new(),
            constraints: Vec::new(),
            indices: Vec::new(),
            queries: Vec::new(),
        }
    }

    /// Overrides the default table name.
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column(self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.column_with(Column::new(name, ty))
    }

    pub fn column_with(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn reference(self, name: impl Into<String>, reference: Reference) -> Self {
        self.column_with(Column::reference(name, reference))
    }

    pub fn constraint(mut self, name: impl Into<String>, check: impl Into<String>) -> Self {
        self.constraints.push(Constraint {
            name: name.into(),
            check: check.into(),
        });
        self
    }

    pub fn index_on(mut self, column: impl Into<String>) -> Self {
        self.indices.push(column.into());
        self
    }

    /// Declares a finder from a `WHERE` fragment.
    pub fn query(mut self, name: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.queries.push((name.into(), fragment.into(), false));
        self
    }

    /// Declares a finder from full query text containing `__TABLE__`.
    pub fn custom_query(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.queries.push((name.into(), text.into(), true));
        self
    }

    /// Validates the declarations and compiles the schema.
    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        let entity = self.entity;
        if entity.is_empty() {
            return Err(SchemaError::InvalidIdentifier { name: entity });
        }
        let table = self
            .table
            .unwrap_or_else(|| ident::default_table_name(&entity));
        ident::validate(&table)?;

        let mut columns: Vec<Column> = IMPLICIT_COLUMNS.iter().map(|n| Column::implicit(n)).collect();
        let mut accessors: IndexMap<String, Accessor> = IndexMap::new();
        for (i, name) in IMPLICIT_COLUMNS.iter().enumerate() {
            accessors.insert(
                name.to_string(),
                Accessor {
                    column: i,
                    kind: AccessorKind::ReadOnly,
                },
            );
        }

        for column in self.columns {
            ident::validate(&column.name)?;
            if IMPLICIT_COLUMNS.contains(&column.name.as_str()) {
                return Err(SchemaError::ReservedColumn {
                    column: column.name,
                });
            }
            if accessors.contains_key(&column.name) {
                return Err(SchemaError::DuplicateColumn {
                    entity,
                    column: column.name,
                });
            }
            if let Some(default) = &column.default {
                let fits = column.ty.accepts(default) && !(column.not_null && default.is_null());
                if !fits {
                    return Err(SchemaError::BadDefault {
                        column: column.name,
                    });
                }
            }
            let kind = if column.reference.is_some() {
                AccessorKind::Reference
            } else {
                AccessorKind::Scalar(column.ty)
            };
            accessors.insert(
                column.name.clone(),
                Accessor {
                    column: columns.len(),
                    kind,
                },
            );
            columns.push(column);
        }

        let mut constraints: Vec<Constraint> = Vec::with_capacity(self.constraints.len());
        for constraint in self.constraints {
            ident::validate(&constraint.name)?;
            if constraints.iter().any(|c| c.name == constraint.name) {
                return Err(SchemaError::DuplicateConstraint {
                    entity,
                    name: constraint.name,
                });
            }
            let unknown = ident::expression_columns(&constraint.check)
                .into_iter()
                .find(|column| !accessors.keys().any(|known| known.eq_ignore_ascii_case(column)));
            if let Some(column) = unknown {
                return Err(SchemaError::UnknownConstraintColumn {
                    entity,
                    constraint: constraint.name,
                    column,
                });
            }
            constraints.push(constraint);
        }

        for column in &self.indices {
            if !accessors.contains_key(column) {
                return Err(SchemaError::UnknownIndexColumn {
                    entity,
                    column: column.clone(),
                });
            }
        }

        let mut finders: IndexMap<String, Finder> = IndexMap::new();
        for (name, text, custom) in self.queries {
            if finders.contains_key(&name) {
                return Err(SchemaError::DuplicateFinder { entity, name });
            }
            let finder = if custom {
                Finder::custom(&name, &text, &table)?
            } else {
                Finder::predicate(&name, &text, &table)?
            };
            finders.insert(name, finder);
        }

        Ok(Arc::new(Schema {
            entity,
            table,
            columns,
            constraints,
            indices: self.indices,
            finders,
            accessors,
        }))
    }
}
