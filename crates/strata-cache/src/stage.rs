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

//! The consumer-facing facade over the whole cache layer.
//!
//! A [`StageCache`] owns one graph connection and everything derived from
//! it: the token registry, the per-entity caches, the schema index, the
//! batch store, and the synchronization engine. Game systems talk to this
//! type; the graph's name-based API is only hit on cache misses, index
//! builds, and tick-time flushes.
//!
//! Typical frame:
//!
//! ```
//! use strata_cache::{MemoryGraph, SchemaHierarchy, StageCache};
//! use strata_cache::{EntityId, Value};
//!
//! let graph = MemoryGraph::new();
//! let e1 = EntityId(1);
//! graph.add_entity(e1, "Character");
//! graph.add_attribute(e1, "health:current", Value::Float(100.0));
//!
//! let mut stage = StageCache::new(graph, SchemaHierarchy::new());
//! let health = stage.token("health:current");
//!
//! // Hot path: cached reads, write-behind writes.
//! let hp: Option<f32> = stage.get(e1, health).unwrap();
//! assert_eq!(hp, Some(100.0));
//! stage.set(e1, health, 40.0f32).unwrap();
//!
//! // Frame boundary: dirty values reach the graph here, not before.
//! let report = stage.tick();
//! assert_eq!(report.flushed, 1);
//! ```

use std::sync::Arc;

use ahash::AHashMap;

use strata_core::{
    CacheError, CacheResult, EntityId, GraphEvent, PropertyGraph, PropertyValue, Token, Value,
};

use crate::batch::{BatchStore, ComponentBlock, SlotIndex, SoaComponent};
use crate::index::{SchemaHierarchy, SchemaIndex};
use crate::prim::{FlushOutcome, PrimCache};
use crate::stats::StageStats;
use crate::sync::{SyncEngine, SyncPolicy, TickReport};
use crate::tokens::TokenRegistry;

/// The cache layer's entry point for game systems.
pub struct StageCache<G: PropertyGraph> {
    graph: G,
    tokens: Arc<TokenRegistry>,
    hierarchy: SchemaHierarchy,
    index: SchemaIndex,
    prims: AHashMap<EntityId, PrimCache>,
    batches: BatchStore,
    sync: SyncEngine,
}

impl<G: PropertyGraph> StageCache<G> {
    /// Creates a cache over a graph, with the default flush policy.
    #[must_use]
    pub fn new(graph: G, hierarchy: SchemaHierarchy) -> Self {
        Self::with_policy(graph, hierarchy, SyncPolicy::default())
    }

    /// Creates a cache with an explicit flush-selection policy.
    #[must_use]
    pub fn with_policy(graph: G, hierarchy: SchemaHierarchy, policy: SyncPolicy) -> Self {
        Self {
            graph,
            tokens: Arc::new(TokenRegistry::new()),
            hierarchy,
            index: SchemaIndex::new(),
            prims: AHashMap::new(),
            batches: BatchStore::new(),
            sync: SyncEngine::new(policy),
        }
    }

    /// The underlying graph.
    #[must_use]
    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// The shared token registry, for pre-warming or thread-local caching.
    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenRegistry> {
        &self.tokens
    }

    /// Interns a property or type name.
    pub fn token(&self, name: &str) -> Token {
        self.tokens.intern(name)
    }

    /// The schema hierarchy this stage was built with.
    #[must_use]
    pub fn hierarchy(&self) -> &SchemaHierarchy {
        &self.hierarchy
    }

    /// A sender for graph change events; drained on the next [`tick`](Self::tick).
    #[must_use]
    pub fn event_sender(&self) -> crossbeam_channel::Sender<GraphEvent> {
        self.sync.event_sender()
    }

    // ---- typed property access -------------------------------------------

    /// Reads a property through the caches.
    ///
    /// `Ok(None)` means the composed entity has no such property (negatively
    /// cached). Read-your-own-writes: a value set earlier this frame is
    /// returned even though the graph has not seen it yet. Requesting a type
    /// other than the declared one is a programmer error: debug builds
    /// assert, release builds get [`CacheError::TypeMismatch`].
    pub fn get<T: PropertyValue>(&mut self, entity: EntityId, token: Token) -> CacheResult<Option<T>> {
        let prim = self
            .prims
            .entry(entity)
            .or_insert_with(|| PrimCache::new(self.graph.generation(entity)));

        let Some(value) = prim.read(&self.graph, &self.tokens, entity, token) else {
            return Ok(None);
        };

        match T::from_value(&value) {
            Some(typed) => Ok(Some(typed)),
            None => {
                let name = self.tokens.resolve(token);
                let found = value.value_type();
                debug_assert!(
                    false,
                    "type mismatch reading '{name}': requested {}, declared {found}",
                    T::TYPE
                );
                Err(CacheError::TypeMismatch {
                    name,
                    expected: T::TYPE,
                    found,
                })
            }
        }
    }

    /// Writes a property, write-behind.
    ///
    /// The cached value changes immediately; the graph sees it at the next
    /// flush point. Fails on unknown properties and type mismatches (see
    /// [`get`](Self::get)).
    pub fn set<T: PropertyValue>(
        &mut self,
        entity: EntityId,
        token: Token,
        value: T,
    ) -> CacheResult<()> {
        let prim = self
            .prims
            .entry(entity)
            .or_insert_with(|| PrimCache::new(self.graph.generation(entity)));
        prim.write(&self.graph, &self.tokens, entity, token, value.into_value())
    }

    /// Resolves handles and decodes values for a group of names up front.
    ///
    /// Call outside the hot path (level load, streaming completion) so the
    /// first frame touching these properties pays no miss cost.
    pub fn prewarm(&mut self, entity: EntityId, names: &[&str]) {
        let tokens = self.tokens.intern_all(names.iter().copied());
        let prim = self
            .prims
            .entry(entity)
            .or_insert_with(|| PrimCache::new(self.graph.generation(entity)));
        for token in tokens {
            let _ = prim.read(&self.graph, &self.tokens, entity, token);
        }
    }

    // ---- schema queries ---------------------------------------------------

    /// Rebuilds the schema index from a full graph traversal.
    pub fn build_index(&self) {
        self.index.build_full(&self.graph, &self.hierarchy);
    }

    /// O(1) test for a type, ancestor type, or applied schema.
    ///
    /// Served from the index, which is a best-effort accelerator: after
    /// destructive decisions, confirm against the graph.
    #[must_use]
    pub fn has_schema(&self, entity: EntityId, name: &str) -> bool {
        self.index.has(entity, name)
    }

    /// Entities carrying a type, ancestor type, or applied schema.
    #[must_use]
    pub fn entities_with(&self, name: &str) -> Vec<EntityId> {
        self.index.entities_with(name)
    }

    /// The index itself, for rebuild-count instrumentation.
    #[must_use]
    pub fn index(&self) -> &SchemaIndex {
        &self.index
    }

    // ---- batch store ------------------------------------------------------

    /// Registers a component kind for batch storage.
    pub fn register_batch<C: SoaComponent>(&mut self) {
        self.batches.register::<C>();
    }

    /// The block for a registered component kind.
    #[must_use]
    pub fn batch<C: SoaComponent>(&self) -> Option<&ComponentBlock<C>> {
        self.batches.block::<C>()
    }

    /// Mutable access to a component kind's block.
    pub fn batch_mut<C: SoaComponent>(&mut self) -> Option<&mut ComponentBlock<C>> {
        self.batches.block_mut::<C>()
    }

    /// Visits every live slot of a component kind.
    pub fn for_each_in_batch<C, F>(&self, f: F)
    where
        C: SoaComponent,
        F: FnMut(EntityId, SlotIndex, &C::Columns),
    {
        if let Some(block) = self.batches.block::<C>() {
            block.for_each_active(f);
        }
    }

    /// Visits every live slot of a component kind with mutable columns.
    pub fn for_each_in_batch_mut<C, F>(&mut self, f: F)
    where
        C: SoaComponent,
        F: FnMut(EntityId, SlotIndex, &mut C::Columns),
    {
        if let Some(block) = self.batches.block_mut::<C>() {
            block.for_each_active_mut(f);
        }
    }

    /// Compacts every component block. Schedule off the hot path.
    pub fn compact_batches(&mut self) {
        self.batches.compact_all();
    }

    // ---- synchronization --------------------------------------------------

    /// Requests that an entity flush on the next tick (MarkedOnly policy).
    pub fn mark_sync_required(&mut self, entity: EntityId) {
        self.sync.mark_sync_required(entity);
    }

    /// Replaces the flush-selection policy.
    pub fn set_sync_policy(&mut self, policy: SyncPolicy) {
        self.sync.set_policy(policy);
    }

    /// Flushes one entity's dirty values immediately.
    pub fn flush(&mut self, entity: EntityId) -> FlushOutcome {
        match self.prims.get_mut(&entity) {
            Some(prim) => prim.flush(&self.graph, &self.tokens, entity),
            None => FlushOutcome::default(),
        }
    }

    /// Flushes every entity with dirty values, regardless of policy.
    pub fn flush_all(&mut self) -> FlushOutcome {
        let mut total = FlushOutcome::default();
        let dirty: Vec<EntityId> = self
            .prims
            .iter()
            .filter(|(_, p)| p.has_dirty())
            .map(|(&e, _)| e)
            .collect();
        for entity in dirty {
            if let Some(prim) = self.prims.get_mut(&entity) {
                let outcome = prim.flush(&self.graph, &self.tokens, entity);
                total.flushed += outcome.flushed;
                total.conflicts.extend(outcome.conflicts);
            }
        }
        total
    }

    /// Re-reads the entity's generation and drops entries it stales.
    ///
    /// Dirty values survive; clean values and handles from older
    /// generations are re-fetched lazily on next access.
    pub fn refresh(&mut self, entity: EntityId) {
        let generation = self.graph.generation(entity);
        if let Some(prim) = self.prims.get_mut(&entity) {
            prim.refresh(generation);
        }
    }

    /// Drops all cached state for an entity, including pending writes.
    pub fn invalidate(&mut self, entity: EntityId) {
        self.prims.remove(&entity);
    }

    /// The host-driven synchronization pump; call once per frame.
    ///
    /// First drains pending graph events — composition changes refresh the
    /// affected entity's caches, schema changes additionally re-index the
    /// entity, destructions drop caches, index entries, and batch slots.
    /// Then flushes dirty values for the policy-selected entity set.
    ///
    /// Conflict policy ("single writer wins at flush time"): an external
    /// edit that raced a dirty local value is overwritten by the flush —
    /// the running session owns gameplay state. Rejected write-backs are
    /// returned in the report, one entry per property, and stay dirty.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        for event in self.sync.drain_events() {
            log::debug!("graph event: {event:?}");
            match event {
                GraphEvent::CompositionChanged(entity) | GraphEvent::PayloadUnloaded(entity) => {
                    if let Some(prim) = self.prims.get_mut(&entity) {
                        prim.refresh(self.graph.generation(entity));
                        report.invalidated += 1;
                    }
                }
                GraphEvent::SchemaChanged(entity) => {
                    if let Some(prim) = self.prims.get_mut(&entity) {
                        prim.refresh(self.graph.generation(entity));
                    }
                    self.index
                        .on_schema_changed(&self.graph, &self.hierarchy, entity);
                    report.invalidated += 1;
                }
                GraphEvent::EntityCreated(entity) => {
                    self.index
                        .on_entity_created(&self.graph, &self.hierarchy, entity);
                }
                GraphEvent::EntityDestroyed(entity) => {
                    self.prims.remove(&entity);
                    self.index.on_entity_destroyed(entity);
                    self.batches.release_entity(entity);
                    report.destroyed += 1;
                }
            }
        }

        let marked = self.sync.take_marked();
        let mut targets = Vec::new();
        match self.sync.policy() {
            SyncPolicy::AllDirty => {
                for (&entity, prim) in self.prims.iter() {
                    if prim.has_dirty() {
                        targets.push(entity);
                    }
                }
            }
            SyncPolicy::MarkedOnly => {
                for (&entity, prim) in self.prims.iter() {
                    if marked.contains(&entity) && prim.has_dirty() {
                        targets.push(entity);
                    }
                }
            }
        }

        for entity in targets {
            if let Some(prim) = self.prims.get_mut(&entity) {
                let outcome = prim.flush(&self.graph, &self.tokens, entity);
                report.flushed += outcome.flushed;
                report.conflicts.extend(outcome.conflicts);
            }
        }

        report
    }

    // ---- introspection ----------------------------------------------------

    /// Aggregated cache counters across all entities.
    #[must_use]
    pub fn stats(&self) -> StageStats {
        let mut stats = StageStats {
            cached_entities: self.prims.len(),
            interned_tokens: self.tokens.len(),
            ..StageStats::default()
        };
        for prim in self.prims.values() {
            stats.handles.merge(prim.handle_stats());
            stats.values.merge(prim.value_stats());
        }
        stats
    }

    /// Returns true if the entity has a live per-entity cache.
    #[must_use]
    pub fn is_cached(&self, entity: EntityId) -> bool {
        self.prims.contains_key(&entity)
    }
}

// Untyped access for tooling that works with `Value` directly.
impl<G: PropertyGraph> StageCache<G> {
    /// Reads a property as a tagged [`Value`], no static type required.
    pub fn get_value(&mut self, entity: EntityId, token: Token) -> Option<Value> {
        let prim = self
            .prims
            .entry(entity)
            .or_insert_with(|| PrimCache::new(self.graph.generation(entity)));
        prim.read(&self.graph, &self.tokens, entity, token)
    }
}
