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

//! Per-entity caching of resolved attribute handles.
//!
//! Resolving a name through the composed graph is the expensive step this
//! layer exists to avoid. Each entity gets a small token→handle map filled
//! on first miss. "No such property" is cached too, as a negative sentinel:
//! optional attributes are common, and paying a full composed lookup on
//! every frame for a property that legitimately isn't there would defeat
//! the cache.
//!
//! Every slot is stamped with the entity's generation at fill time. A stale
//! stamp means the composition may have moved or removed the property, so
//! the slot is refilled lazily on next access — the cache has no visibility
//! into composition internals and never tracks validity manually.

use ahash::AHashMap;

use strata_core::{AttributeHandle, Token};

use crate::stats::CacheStats;

/// The outcome of a handle resolution, cached per (entity, token).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleSlot {
    /// The property exists; the graph minted this handle for it.
    Resolved(AttributeHandle),
    /// The composed entity has no such property ("known absent").
    Absent,
}

#[derive(Debug, Clone, Copy)]
struct StampedSlot {
    slot: HandleSlot,
    generation: u64,
}

/// Token→handle cache for a single entity.
#[derive(Debug, Default)]
pub struct HandleCache {
    slots: AHashMap<Token, StampedSlot>,
    stats: CacheStats,
}

impl HandleCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `token`, resolving through `resolve` on a miss.
    ///
    /// A hit requires a matching generation stamp; a stale slot is treated
    /// as a miss and overwritten. `resolve` is the graph's name lookup —
    /// its `None` is stored as [`HandleSlot::Absent`] so the next call is a
    /// hit.
    pub fn get<F>(&mut self, token: Token, generation: u64, resolve: F) -> HandleSlot
    where
        F: FnOnce() -> Option<AttributeHandle>,
    {
        if let Some(stamped) = self.slots.get(&token) {
            if stamped.generation == generation {
                self.stats.hit();
                return stamped.slot;
            }
        }

        self.stats.miss();
        let slot = match resolve() {
            Some(handle) => HandleSlot::Resolved(handle),
            None => HandleSlot::Absent,
        };
        self.slots.insert(token, StampedSlot { slot, generation });
        slot
    }

    /// Drops one cached slot, forcing re-resolution on next access.
    ///
    /// Used when a resolved handle turns out to be dead (the graph returned
    /// nothing for it) before the generation stamp caught up.
    pub fn remove(&mut self, token: Token) {
        self.slots.remove(&token);
    }

    /// Drops every cached slot for this entity.
    pub fn invalidate(&mut self) {
        self.slots.clear();
    }

    /// Number of cached slots (resolved and negative).
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Hit/miss counters for this cache.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lookup_hits_without_resolving() {
        let mut cache = HandleCache::new();
        let token = Token(0);
        let mut calls = 0;

        let first = cache.get(token, 1, || {
            calls += 1;
            Some(AttributeHandle(7))
        });
        let second = cache.get(token, 1, || {
            calls += 1;
            Some(AttributeHandle(99))
        });

        assert_eq!(first, HandleSlot::Resolved(AttributeHandle(7)));
        assert_eq!(second, first);
        assert_eq!(calls, 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn absent_property_is_negatively_cached() {
        let mut cache = HandleCache::new();
        let token = Token(3);
        let mut calls = 0;

        for _ in 0..3 {
            let slot = cache.get(token, 1, || {
                calls += 1;
                None
            });
            assert_eq!(slot, HandleSlot::Absent);
        }

        // The sentinel absorbs every lookup after the first.
        assert_eq!(calls, 1);
    }

    #[test]
    fn generation_mismatch_forces_refill() {
        let mut cache = HandleCache::new();
        let token = Token(0);

        cache.get(token, 1, || Some(AttributeHandle(7)));
        let refreshed = cache.get(token, 2, || Some(AttributeHandle(8)));

        assert_eq!(refreshed, HandleSlot::Resolved(AttributeHandle(8)));
    }

    #[test]
    fn generation_mismatch_invalidates_negative_entries_too() {
        let mut cache = HandleCache::new();
        let token = Token(0);

        cache.get(token, 1, || None);
        // The property appeared in a later composition.
        let slot = cache.get(token, 2, || Some(AttributeHandle(4)));

        assert_eq!(slot, HandleSlot::Resolved(AttributeHandle(4)));
    }
}
