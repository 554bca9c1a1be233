//! Reference Resolver: turns stored row identifiers into entities of the
//! target schema.
//!
//! Resolution is one hop per call. The referenced entity comes from
//! [`Store::find`], so an already-cached target is returned without a
//! storage round trip and self references never recurse.

use std::sync::Arc;

use quince_core::{AccessorKind, Reference, Referent, Schema};

use crate::entity::Entity;
use crate::error::StoreError;
use crate::store::Store;
use crate::types::RowId;

impl Store {
    /// The schema a reference points at. Named targets must have been
    /// registered with this store.
    pub fn resolve_schema(&self, reference: &Reference) -> Result<Arc<Schema>, StoreError> {
        match reference.referent() {
            Referent::Schema(schema) => Ok(Arc::clone(schema)),
            Referent::Named(entity) => self
                .inner
                .registry
                .read()
                .map_err(|_| StoreError::Lock)?
                .by_entity(entity)
                .ok_or_else(|| StoreError::UnresolvedReference {
                    entity: entity.clone(),
                }),
        }
    }
}

impl Entity {
    /// Resolves the reference column `column`. `None` when the column is
    /// empty or the target row no longer exists.
    pub fn get_ref(&self, column: &str) -> Result<Option<Entity>, StoreError> {
        let schema = self.schema();
        let not_a_reference = || StoreError::NotAReference {
            entity: schema.entity().to_string(),
            column: column.to_string(),
        };
        let accessor = schema.accessor(column).ok_or_else(|| StoreError::UnknownColumn {
            entity: schema.entity().to_string(),
            column: column.to_string(),
        })?;
        if accessor.kind != AccessorKind::Reference {
            return Err(not_a_reference());
        }
        let reference = schema.columns()[accessor.column]
            .reference
            .as_ref()
            .ok_or_else(not_a_reference)?;

        let Some(id) = self.get(column)?.as_i64() else {
            return Ok(None);
        };
        let target = self.store().resolve_schema(reference)?;
        self.store().find(&target, RowId(id))
    }
}
