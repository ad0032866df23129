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

//! A self-contained in-memory [`PropertyGraph`] implementation.
//!
//! Stands in for a real composed scene graph in tests, benchmarks, and
//! host prototypes. It performs no composition — every attribute has one
//! flat value — but it honors the full contract: handles, per-entity
//! generations, applied schemas, and rejection of read-only or mistyped
//! writes. Call counters on the slow-path methods (`lookup`, `get_typed`,
//! `set_typed`) make cache behavior observable: a working cache keeps them
//! nearly flat frame over frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ahash::AHashMap;

use strata_core::{AttributeHandle, EntityId, PropertyGraph, Value, ValueType};

#[derive(Debug)]
struct AttrRecord {
    entity: EntityId,
    value: Value,
    read_only: bool,
}

#[derive(Debug, Default)]
struct EntityRecord {
    concrete_type: String,
    schemas: Vec<String>,
    generation: u64,
    attrs: AHashMap<String, AttributeHandle>,
}

#[derive(Debug, Default)]
struct GraphInner {
    entities: AHashMap<EntityId, EntityRecord>,
    attrs: AHashMap<AttributeHandle, AttrRecord>,
    next_handle: u64,
}

/// A flat, instrumented property graph.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    inner: Mutex<GraphInner>,
    lookups: AtomicU64,
    gets: AtomicU64,
    sets: AtomicU64,
}

impl MemoryGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity with a concrete type.
    pub fn add_entity(&self, entity: EntityId, concrete_type: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entities.entry(entity).or_default().concrete_type = concrete_type.to_owned();
    }

    /// Applies a schema (or `"schema:instance"`) to an entity.
    ///
    /// Bumps the entity's generation: schema application changes
    /// composition.
    pub fn apply_schema(&self, entity: EntityId, schema: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = inner.entities.get_mut(&entity) {
            record.schemas.push(schema.to_owned());
            record.generation += 1;
        }
    }

    /// Adds an attribute with an initial value; the declared type is the
    /// value's tag.
    pub fn add_attribute(&self, entity: EntityId, name: &str, value: Value) -> AttributeHandle {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let handle = AttributeHandle(inner.next_handle);
        inner.next_handle += 1;
        inner.attrs.insert(
            handle,
            AttrRecord {
                entity,
                value,
                read_only: false,
            },
        );
        inner
            .entities
            .entry(entity)
            .or_default()
            .attrs
            .insert(name.to_owned(), handle);
        handle
    }

    /// Marks an attribute read-only; writes through `set_typed` will be
    /// rejected from now on.
    pub fn set_read_only(&self, entity: EntityId, name: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let handle = inner
            .entities
            .get(&entity)
            .and_then(|r| r.attrs.get(name))
            .copied();
        if let Some(handle) = handle {
            if let Some(attr) = inner.attrs.get_mut(&handle) {
                attr.read_only = true;
            }
        }
    }

    /// Removes an attribute and kills its handle, bumping the generation.
    ///
    /// Outstanding handles to it stop resolving, exercising the caches'
    /// stale-handle recovery.
    pub fn remove_attribute(&self, entity: EntityId, name: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let handle = inner
            .entities
            .get_mut(&entity)
            .and_then(|r| r.attrs.remove(name));
        if let Some(handle) = handle {
            inner.attrs.remove(&handle);
        }
        if let Some(record) = inner.entities.get_mut(&entity) {
            record.generation += 1;
        }
    }

    /// Bumps an entity's generation without changing anything else, as a
    /// variant switch or payload reload would.
    pub fn bump_generation(&self, entity: EntityId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = inner.entities.get_mut(&entity) {
            record.generation += 1;
        }
    }

    /// Removes an entity and all its attributes.
    pub fn remove_entity(&self, entity: EntityId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = inner.entities.remove(&entity) {
            for (_, handle) in record.attrs {
                inner.attrs.remove(&handle);
            }
        }
    }

    /// Reads an attribute value directly, bypassing handles and counters.
    ///
    /// This is "what the graph really holds" for assertions against cached
    /// state.
    #[must_use]
    pub fn value_of(&self, entity: EntityId, name: &str) -> Option<Value> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let handle = inner.entities.get(&entity)?.attrs.get(name)?;
        inner.attrs.get(handle).map(|a| a.value.clone())
    }

    /// Number of `lookup` calls served so far.
    #[must_use]
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Number of `get_typed` calls served so far.
    #[must_use]
    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Number of `set_typed` calls served so far.
    #[must_use]
    pub fn set_count(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }
}

impl PropertyGraph for MemoryGraph {
    fn lookup(&self, entity: EntityId, name: &str) -> Option<AttributeHandle> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entities.get(&entity)?.attrs.get(name).copied()
    }

    fn get_typed(&self, handle: AttributeHandle) -> Option<Value> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.attrs.get(&handle).map(|a| a.value.clone())
    }

    fn set_typed(&self, handle: AttributeHandle, value: &Value) -> bool {
        self.sets.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.attrs.get_mut(&handle) {
            Some(attr) if !attr.read_only && attr.value.value_type() == value.value_type() => {
                attr.value = value.clone();
                true
            }
            _ => false,
        }
    }

    fn declared_type(&self, handle: AttributeHandle) -> Option<ValueType> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.attrs.get(&handle).map(|a| a.value.value_type())
    }

    fn generation(&self, entity: EntityId) -> u64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entities.get(&entity).map_or(0, |r| r.generation)
    }

    fn applied_schemas(&self, entity: EntityId) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entities
            .get(&entity)
            .map(|r| r.schemas.clone())
            .unwrap_or_default()
    }

    fn concrete_type(&self, entity: EntityId) -> String {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entities
            .get(&entity)
            .map(|r| r.concrete_type.clone())
            .unwrap_or_default()
    }

    fn traverse_all(&self) -> Vec<EntityId> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<EntityId> = inner.entities.keys().copied().collect();
        all.sort();
        all
    }
}
