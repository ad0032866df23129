// Copyright 2025 the Strata authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Global type and applied-schema membership index.
//!
//! Maps every type and schema name to the set of entities carrying it, so
//! "which entities have a Health schema" is a map lookup instead of a graph
//! traversal, and "is this entity a Character" is O(1) set membership
//! instead of a hierarchy walk — ancestor closures are flattened once at
//! registration time in [`SchemaHierarchy`].
//!
//! The index is derived, never authoritative: it can be rebuilt from a full
//! traversal at any time, and incremental updates are restricted to the one
//! entity that changed (O(names-of-that-entity)). When a full rebuild and an
//! incremental update race, the incremental update wins — consumers doing
//! destructive, correctness-critical work must confirm against the graph.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use ahash::{AHashMap, AHashSet};

use strata_core::{EntityId, PropertyGraph};

/// Dependency-injected registry of schema type inheritance.
///
/// Hosts register every schema type with its direct bases up front; the
/// transitive ancestor closure is flattened eagerly so index builds and
/// queries never walk the hierarchy. Bases must be registered before their
/// derived types.
#[derive(Debug, Default)]
pub struct SchemaHierarchy {
    // type name -> that type plus all its ancestors, flattened.
    closures: AHashMap<String, Vec<String>>,
}

impl SchemaHierarchy {
    /// Creates an empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type with its direct base types.
    ///
    /// The stored closure contains the type itself followed by the union of
    /// its bases' closures. Unregistered bases are treated as roots.
    pub fn register(&mut self, type_name: &str, bases: &[&str]) {
        let mut closure = vec![type_name.to_owned()];
        let mut seen: AHashSet<&str> = AHashSet::new();
        seen.insert(type_name);

        for &base in bases {
            match self.closures.get(base) {
                Some(base_closure) => {
                    for ancestor in base_closure {
                        if seen.insert(ancestor.as_str()) {
                            closure.push(ancestor.clone());
                        }
                    }
                }
                None => {
                    if seen.insert(base) {
                        closure.push(base.to_owned());
                    }
                }
            }
        }

        self.closures.insert(type_name.to_owned(), closure);
    }

    /// The type itself plus all its ancestors.
    ///
    /// Unregistered types get a closure of just themselves.
    #[must_use]
    pub fn closure_of(&self, type_name: &str) -> Vec<String> {
        self.closures
            .get(type_name)
            .cloned()
            .unwrap_or_else(|| vec![type_name.to_owned()])
    }

    /// O(1)-flattened "is-a" test between registered types.
    #[must_use]
    pub fn is_a(&self, type_name: &str, ancestor: &str) -> bool {
        type_name == ancestor
            || self
                .closures
                .get(type_name)
                .is_some_and(|c| c.iter().any(|a| a == ancestor))
    }
}

#[derive(Debug, Default)]
struct IndexInner {
    // name (type, ancestor, or schema) -> entities carrying it.
    members: AHashMap<String, AHashSet<EntityId>>,
    // entity -> names it is indexed under, for O(names) removal.
    names_of: AHashMap<EntityId, Vec<String>>,
}

impl IndexInner {
    fn insert(&mut self, entity: EntityId, names: Vec<String>) {
        self.remove(entity);
        for name in &names {
            self.members.entry(name.clone()).or_default().insert(entity);
        }
        self.names_of.insert(entity, names);
    }

    fn remove(&mut self, entity: EntityId) {
        if let Some(names) = self.names_of.remove(&entity) {
            for name in names {
                if let Some(set) = self.members.get_mut(&name) {
                    set.remove(&entity);
                    if set.is_empty() {
                        self.members.remove(&name);
                    }
                }
            }
        }
    }
}

/// Shared index from type/schema names to entity sets.
///
/// Internally locked: queries take the read lock, updates the write lock,
/// so many worker threads can test membership concurrently.
#[derive(Debug, Default)]
pub struct SchemaIndex {
    inner: RwLock<IndexInner>,
    rebuilds: AtomicU64,
}

impl SchemaIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies every entity in one full traversal.
    ///
    /// Each entity is indexed under its concrete type, that type's flattened
    /// ancestors, and every applied schema — multiple-apply instances
    /// (`"schema:instance"`) under both the full instance key and the base
    /// schema name.
    pub fn build_full(&self, graph: &dyn PropertyGraph, hierarchy: &SchemaHierarchy) {
        let mut fresh = IndexInner::default();
        for entity in graph.traverse_all() {
            fresh.insert(entity, Self::index_names(graph, hierarchy, entity));
        }

        let count = {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            *inner = fresh;
            inner.names_of.len()
        };
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        log::debug!("schema index rebuilt: {count} entities");
    }

    /// Entities currently indexed under a type or schema name.
    #[must_use]
    pub fn entities_with(&self, name: &str) -> Vec<EntityId> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .members
            .get(name)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// O(1) membership test.
    #[must_use]
    pub fn has(&self, entity: EntityId, name: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .members
            .get(name)
            .is_some_and(|set| set.contains(&entity))
    }

    /// Indexes a newly created entity. O(names-of-that-entity).
    pub fn on_entity_created(
        &self,
        graph: &dyn PropertyGraph,
        hierarchy: &SchemaHierarchy,
        entity: EntityId,
    ) {
        let names = Self::index_names(graph, hierarchy, entity);
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.insert(entity, names);
    }

    /// Drops a destroyed entity from the index. O(names-of-that-entity).
    pub fn on_entity_destroyed(&self, entity: EntityId) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.remove(entity);
    }

    /// Re-classifies one entity after its type or schema set changed.
    ///
    /// Last-write-wins: whatever the graph reports now replaces the
    /// entity's previous index entries, including any from a concurrent
    /// full rebuild.
    pub fn on_schema_changed(
        &self,
        graph: &dyn PropertyGraph,
        hierarchy: &SchemaHierarchy,
        entity: EntityId,
    ) {
        self.on_entity_created(graph, hierarchy, entity);
    }

    /// How many full rebuilds have run. Incremental updates never bump this.
    #[must_use]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Number of indexed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.names_of.len()
    }

    /// Returns true if no entity is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index_names(
        graph: &dyn PropertyGraph,
        hierarchy: &SchemaHierarchy,
        entity: EntityId,
    ) -> Vec<String> {
        let mut names = hierarchy.closure_of(&graph.concrete_type(entity));
        for schema in graph.applied_schemas(entity) {
            // "schema:instance" is indexed under both the instance key and
            // the base schema name.
            if let Some((base, _instance)) = schema.split_once(':') {
                if !names.iter().any(|n| n == base) {
                    names.push(base.to_owned());
                }
            }
            if !names.iter().any(|n| n == &schema) {
                names.push(schema);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_flattens_transitive_ancestors() {
        let mut hierarchy = SchemaHierarchy::new();
        hierarchy.register("Entity", &[]);
        hierarchy.register("Character", &["Entity"]);
        hierarchy.register("Npc", &["Character"]);

        let closure = hierarchy.closure_of("Npc");
        assert!(closure.contains(&"Npc".to_owned()));
        assert!(closure.contains(&"Character".to_owned()));
        assert!(closure.contains(&"Entity".to_owned()));

        assert!(hierarchy.is_a("Npc", "Entity"));
        assert!(hierarchy.is_a("Npc", "Npc"));
        assert!(!hierarchy.is_a("Entity", "Npc"));
    }

    #[test]
    fn diamond_bases_deduplicate() {
        let mut hierarchy = SchemaHierarchy::new();
        hierarchy.register("Base", &[]);
        hierarchy.register("Left", &["Base"]);
        hierarchy.register("Right", &["Base"]);
        hierarchy.register("Leaf", &["Left", "Right"]);

        let closure = hierarchy.closure_of("Leaf");
        assert_eq!(
            closure.iter().filter(|n| n.as_str() == "Base").count(),
            1,
            "diamond ancestor indexed once"
        );
    }
}
