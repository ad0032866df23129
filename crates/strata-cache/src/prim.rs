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

//! The per-entity cache composite: handles + values + generation mirror.
//!
//! A [`PrimCache`] is everything the layer knows about one entity. It keeps
//! the entity's last observed composition generation locally so the hot
//! read path compares two integers instead of calling back into the graph;
//! the mirror is advanced by [`refresh`](PrimCache::refresh), which the
//! synchronization engine drives from graph change events.
//!
//! Independent entities get independent `PrimCache`s, so disjoint worker
//! partitions mutate their entities without sharing any lock. Concurrent
//! writers to the same entity's same property within a frame are a caller
//! error (single-writer-per-entity-per-frame).

use strata_core::error::ConflictReason;
use strata_core::{CacheError, CacheResult, EntityId, PropertyGraph, SyncConflict, Token, Value};

use crate::handles::{HandleCache, HandleSlot};
use crate::tokens::TokenRegistry;
use crate::values::ValueCache;

/// The result of flushing one entity's dirty values.
#[derive(Debug, Default)]
pub struct FlushOutcome {
    /// Entries successfully written back and marked clean.
    pub flushed: usize,
    /// Write-backs the graph refused; the entries stay dirty.
    pub conflicts: Vec<SyncConflict>,
}

/// Cached state for a single entity.
#[derive(Debug)]
pub struct PrimCache {
    handles: HandleCache,
    values: ValueCache,
    /// Last observed composition generation for this entity.
    generation: u64,
}

impl PrimCache {
    /// Creates an empty cache pinned to the given generation.
    #[must_use]
    pub fn new(generation: u64) -> Self {
        Self {
            handles: HandleCache::new(),
            values: ValueCache::new(),
            generation,
        }
    }

    /// The generation this cache currently trusts.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reads a property, filling handle and value caches on the way.
    ///
    /// Returns `Ok(None)` for a legitimately absent property (negatively
    /// cached, so only the first call pays the graph lookup). A handle that
    /// stopped resolving without a generation bump is re-resolved once,
    /// transparently; if the property is gone for good the negative
    /// sentinel takes over.
    pub fn read(
        &mut self,
        graph: &dyn PropertyGraph,
        tokens: &TokenRegistry,
        entity: EntityId,
        token: Token,
    ) -> Option<Value> {
        let generation = self.generation;
        if let Some(entry) = self.values.lookup(token, generation) {
            return Some(entry.value.clone());
        }

        // Two attempts: the second covers a dead handle detected mid-read.
        for attempt in 0..2 {
            let slot = self.handles.get(token, generation, || {
                graph.lookup(entity, &tokens.resolve(token))
            });
            match slot {
                HandleSlot::Absent => return None,
                HandleSlot::Resolved(handle) => match graph.get_typed(handle) {
                    Some(value) => {
                        self.values.store_clean(token, value.clone(), generation);
                        return Some(value);
                    }
                    None if attempt == 0 => {
                        // Stale handle; drop it and re-resolve.
                        log::debug!(
                            "stale handle for {entity} '{}', re-resolving",
                            tokens.resolve(token)
                        );
                        self.handles.remove(token);
                    }
                    None => {
                        // Re-resolution produced another dead handle; treat
                        // the property as absent until the next generation.
                        self.handles.remove(token);
                        self.handles.get(token, generation, || None);
                        return None;
                    }
                },
            }
        }
        None
    }

    /// Applies a write-behind update to a property.
    ///
    /// The cached value is replaced in place and marked dirty; the graph is
    /// not touched beyond a one-time handle/type resolution on the first
    /// write to a property that was never read. A type disagreement with
    /// the graph's declared type is a programmer error: debug builds assert,
    /// release builds return [`CacheError::TypeMismatch`].
    pub fn write(
        &mut self,
        graph: &dyn PropertyGraph,
        tokens: &TokenRegistry,
        entity: EntityId,
        token: Token,
        value: Value,
    ) -> CacheResult<()> {
        let generation = self.generation;

        if let Some(entry) = self.values.peek(token) {
            let declared = entry.value.value_type();
            let requested = value.value_type();
            if declared != requested {
                let name = tokens.resolve(token);
                debug_assert!(
                    false,
                    "type mismatch writing '{name}': {requested} vs {declared}"
                );
                return Err(CacheError::TypeMismatch {
                    name,
                    expected: requested,
                    found: declared,
                });
            }
            self.values.write(token, value, generation);
            return Ok(());
        }

        // First touch of this property: resolve once to validate existence
        // and declared type, then go write-behind like every later write.
        let name = tokens.resolve(token);
        let slot = self
            .handles
            .get(token, generation, || graph.lookup(entity, &name));
        match slot {
            HandleSlot::Absent => Err(CacheError::PropertyUnknown { entity, name }),
            HandleSlot::Resolved(handle) => {
                if let Some(declared) = graph.declared_type(handle) {
                    let requested = value.value_type();
                    if declared != requested {
                        debug_assert!(
                            false,
                            "type mismatch writing '{name}': {requested} vs declared {declared}"
                        );
                        return Err(CacheError::TypeMismatch {
                            name,
                            expected: requested,
                            found: declared,
                        });
                    }
                }
                self.values.write(token, value, generation);
                Ok(())
            }
        }
    }

    /// Writes every dirty entry back through the graph's typed setter.
    ///
    /// Fault-isolated per entry: a rejected set becomes a [`SyncConflict`]
    /// and the entry stays dirty, while the rest of the batch proceeds.
    /// Clean entries are untouched, which is what makes a second flush with
    /// no intervening write a no-op.
    pub fn flush(
        &mut self,
        graph: &dyn PropertyGraph,
        tokens: &TokenRegistry,
        entity: EntityId,
    ) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();
        let generation = self.generation;

        for token in self.values.dirty_tokens() {
            let name = tokens.resolve(token);
            let slot = self
                .handles
                .get(token, generation, || graph.lookup(entity, &name));

            let handle = match slot {
                HandleSlot::Resolved(handle) => Some(handle),
                HandleSlot::Absent => {
                    // The handle cache may hold a stale negative from before
                    // the dirty write; one re-resolution settles it.
                    self.handles.remove(token);
                    match self
                        .handles
                        .get(token, generation, || graph.lookup(entity, &name))
                    {
                        HandleSlot::Resolved(handle) => Some(handle),
                        HandleSlot::Absent => None,
                    }
                }
            };

            let Some(handle) = handle else {
                log::warn!("dirty value for {entity} '{name}' has no property to land on");
                outcome.conflicts.push(SyncConflict {
                    entity,
                    name,
                    reason: ConflictReason::PropertyVanished,
                });
                continue;
            };

            // Dirty entries are guaranteed present; dirty_tokens just
            // listed them and nothing in between can remove entries.
            let value = self.values.peek(token).map(|e| e.value.clone());
            let Some(value) = value else { continue };

            if graph.set_typed(handle, &value) {
                self.values.mark_clean(token, generation);
                outcome.flushed += 1;
            } else {
                log::warn!("graph rejected write-back for {entity} '{name}'");
                outcome.conflicts.push(SyncConflict {
                    entity,
                    name,
                    reason: ConflictReason::Rejected,
                });
            }
        }

        outcome
    }

    /// Advances the generation mirror and discards entries it stales.
    ///
    /// Clean values and handles from older generations become unreachable
    /// and are re-fetched lazily; dirty values survive (their write still
    /// has to land).
    pub fn refresh(&mut self, generation: u64) {
        if generation != self.generation {
            self.generation = generation;
            self.values.refresh(generation);
        }
    }

    /// Drops all cached state for this entity, including pending writes.
    pub fn invalidate(&mut self) {
        self.handles.invalidate();
        self.values.invalidate();
    }

    /// Returns true if any value awaits flushing.
    #[must_use]
    pub fn has_dirty(&self) -> bool {
        self.values.has_dirty()
    }

    /// Handle-cache counters.
    #[must_use]
    pub fn handle_stats(&self) -> crate::stats::CacheStats {
        self.handles.stats()
    }

    /// Value-cache counters.
    #[must_use]
    pub fn value_stats(&self) -> crate::stats::CacheStats {
        self.values.stats()
    }
}
