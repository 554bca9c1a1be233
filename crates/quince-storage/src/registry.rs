//! Schemas known to a store, by entity name and by table.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use quince_core::{DeletePolicy, Schema, TableResolver};

#[derive(Debug, Default)]
pub(crate) struct Registry {
    by_entity: HashMap<String, Arc<Schema>>,
    by_table: HashMap<String, Arc<Schema>>,
}

impl Registry {
    pub fn register(&mut self, schema: &Arc<Schema>) {
        self.by_entity
            .insert(schema.entity().to_string(), Arc::clone(schema));
        self.by_table
            .insert(schema.table_name().to_string(), Arc::clone(schema));
    }

    pub fn by_entity(&self, entity: &str) -> Option<Arc<Schema>> {
        self.by_entity.get(entity).cloned()
    }

    pub fn contains(&self, schema: &Schema) -> bool {
        self.by_entity.contains_key(schema.entity())
    }

    /// Tables whose rows SQLite removes, directly or transitively, when a
    /// row of `table` is deleted.
    pub fn cascade_dependents(&self, table: &str) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([table.to_string()]);
        let mut out = Vec::new();

        while let Some(target) = queue.pop_front() {
            for schema in self.by_table.values() {
                let cascades = schema.references().any(|(_, reference)| {
                    reference.delete_policy() == DeletePolicy::Cascade
                        && Schema::target_table(reference, self) == target
                });
                if cascades && seen.insert(schema.table_name().to_string()) {
                    out.push(schema.table_name().to_string());
                    queue.push_back(schema.table_name().to_string());
                }
            }
        }
        out
    }
}

impl TableResolver for Registry {
    fn resolve_table(&self, entity: &str) -> Option<String> {
        self.by_entity
            .get(entity)
            .map(|schema| schema.table_name().to_string())
    }
}
