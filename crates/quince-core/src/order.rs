//! Table creation ordering.
//!
//! Referenced tables are created before the tables that reference them. The
//! dependency graph is a petgraph `DiGraph` with an edge from each target to
//! its dependent; self references add no edge.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::schema::Schema;

/// Orders `schemas` so that every reference target precedes its dependents.
///
/// Targets outside the given set are ignored. If the references form a cycle
/// the declaration order is returned unchanged; SQLite only checks foreign
/// keys when rows are written, so any order creates valid tables.
pub fn creation_order(schemas: &[Arc<Schema>]) -> Vec<Arc<Schema>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..schemas.len()).map(|i| graph.add_node(i)).collect();
    let by_entity: HashMap<&str, usize> = schemas
        .iter()
        .enumerate()
        .map(|(i, s)| (s.entity(), i))
        .collect();

    for (i, schema) in schemas.iter().enumerate() {
        for (_, reference) in schema.references() {
            if let Some(&target) = by_entity.get(reference.target_entity()) {
                if target != i {
                    graph.update_edge(nodes[target], nodes[i], ());
                }
            }
        }
    }

    match toposort(&graph, None) {
        Ok(sorted) => sorted
            .into_iter()
            .map(|n| Arc::clone(&schemas[graph[n]]))
            .collect(),
        Err(_) => schemas.to_vec(),
    }
}
