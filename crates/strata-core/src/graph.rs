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

//! The narrow contract the cache layer consumes from the property graph.
//!
//! The underlying graph is a hierarchical, composition-resolving store
//! (inheritance, overrides, variants). Its name-based queries are correct
//! but slow; the cache layer exists to avoid repeating them. Everything the
//! cache needs from the graph fits in the [`PropertyGraph`] trait — the
//! composition algorithm, file formats, and asset resolution stay behind it.

use crate::ids::{AttributeHandle, EntityId};
use crate::value::{Value, ValueType};

/// The underlying composed property graph, as seen by the cache layer.
///
/// Implementations are expected to be internally synchronized (`&self`
/// methods, `Send + Sync`): the cache calls into the graph from whichever
/// worker thread took the miss. Calls may be comparatively slow — every
/// method here is a cache-miss or rebuild path, never a per-frame hot path.
pub trait PropertyGraph: Send + Sync {
    /// Resolves a property name on an entity to an opaque handle.
    ///
    /// Returns `None` when the composed entity has no such property. The
    /// cache stores that outcome as a negative entry, so a graph should not
    /// treat repeated lookups of absent names as an error.
    fn lookup(&self, entity: EntityId, name: &str) -> Option<AttributeHandle>;

    /// Reads the current composed value behind a handle.
    ///
    /// Returns `None` if the handle no longer resolves (the composition
    /// moved underneath it); the cache recovers by re-resolving.
    fn get_typed(&self, handle: AttributeHandle) -> Option<Value>;

    /// Writes a value through a handle.
    ///
    /// Returns `false` when the graph rejects the write (read-only
    /// property, unloaded payload). The cache reports that as a
    /// [`SyncConflict`](crate::error::SyncConflict) rather than panicking.
    fn set_typed(&self, handle: AttributeHandle, value: &Value) -> bool;

    /// Returns the declared type of the attribute behind a handle.
    fn declared_type(&self, handle: AttributeHandle) -> Option<ValueType>;

    /// Returns the entity's composition generation.
    ///
    /// Bumped whenever composition affecting the entity changes (schema
    /// applied/removed, variant switch, payload load/unload). The cache
    /// stamps every entry with the generation observed at fill time.
    fn generation(&self, entity: EntityId) -> u64;

    /// Returns the schema names applied to an entity.
    ///
    /// Multiple-apply schemas appear once per instance, keyed as
    /// `"schemaName:instanceName"`.
    fn applied_schemas(&self, entity: EntityId) -> Vec<String>;

    /// Returns the entity's concrete type name.
    fn concrete_type(&self, entity: EntityId) -> String;

    /// Enumerates every entity in the graph, for full index rebuilds.
    fn traverse_all(&self) -> Vec<EntityId>;
}

/// A change notification pushed by the graph to the synchronization engine.
///
/// Delivered over a `crossbeam_channel`; the engine drains pending events at
/// the start of every `tick()` and invalidates or refreshes the affected
/// per-entity caches. The graph may coalesce events but must not drop them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEvent {
    /// Composition affecting this entity changed (override edited, variant
    /// switched). Cached handles and clean values are stale.
    CompositionChanged(EntityId),
    /// The entity's applied-schema set or concrete type changed. Implies
    /// `CompositionChanged` and additionally re-indexes the entity.
    SchemaChanged(EntityId),
    /// A payload beneath this entity was unloaded; handles into it are dead.
    PayloadUnloaded(EntityId),
    /// The entity was created after the last full index build.
    EntityCreated(EntityId),
    /// The entity no longer exists; all cached state for it is dropped.
    EntityDestroyed(EntityId),
}

impl GraphEvent {
    /// The entity this event concerns.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        match *self {
            GraphEvent::CompositionChanged(e)
            | GraphEvent::SchemaChanged(e)
            | GraphEvent::PayloadUnloaded(e)
            | GraphEvent::EntityCreated(e)
            | GraphEvent::EntityDestroyed(e) => e,
        }
    }
}
