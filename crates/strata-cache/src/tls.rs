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

//! Thread-local access helpers for the shared structures.
//!
//! The token registry is process-wide shared state behind a lock. Worker
//! threads that resolve the same hot names every frame should not touch
//! that lock at all: [`cached_token`] keeps a per-thread name→token map, so
//! after the first frame a worker's token lookups are lock-free.
//!
//! Tokens are process-stable (the intern table is append-only), so entries
//! in the per-thread map never go stale. The map only needs clearing in
//! tests that build multiple registries on one thread — tokens are not
//! portable across registries.
//!
//! [`partition_entities`] backs the scheduling model: disjoint entity
//! partitions per worker, one worker writing any given entity per frame.

use std::cell::RefCell;

use ahash::AHashMap;

use strata_core::{EntityId, Token};

use crate::tokens::TokenRegistry;

thread_local! {
    static TOKEN_CACHE: RefCell<AHashMap<String, Token>> = RefCell::new(AHashMap::new());
}

/// Resolves a name to its token through the calling thread's cache.
///
/// Falls back to (and fills from) the shared registry on the first use of a
/// name on this thread; every later call is a local map hit.
pub fn cached_token(registry: &TokenRegistry, name: &str) -> Token {
    TOKEN_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some(&token) = cache.get(name) {
            return token;
        }
        let token = registry.intern(name);
        cache.insert(name.to_owned(), token);
        token
    })
}

/// Empties the calling thread's token cache.
pub fn clear_thread_cache() {
    TOKEN_CACHE.with(|cache| cache.borrow_mut().clear());
}

/// Number of names cached on the calling thread.
#[must_use]
pub fn thread_cache_len() -> usize {
    TOKEN_CACHE.with(|cache| cache.borrow().len())
}

/// Splits entities into at most `partitions` contiguous, disjoint chunks.
///
/// Chunk sizes differ by at most one. Returns fewer chunks than requested
/// when there are fewer entities; an empty input yields no chunks. Typical
/// use: one partition per hardware thread, each worker owning its chunk's
/// entities for the frame.
#[must_use]
pub fn partition_entities(entities: &[EntityId], partitions: usize) -> Vec<Vec<EntityId>> {
    if entities.is_empty() || partitions == 0 {
        return Vec::new();
    }

    let count = partitions.min(entities.len());
    let base = entities.len() / count;
    let remainder = entities.len() % count;

    let mut chunks = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let len = base + usize::from(i < remainder);
        chunks.push(entities[start..start + len].to_vec());
        start += len;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_cache_avoids_registry_after_first_use() {
        clear_thread_cache();
        let registry = TokenRegistry::new();

        let a = cached_token(&registry, "health:current");
        let b = cached_token(&registry, "health:current");

        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert_eq!(thread_cache_len(), 1);
        clear_thread_cache();
    }

    #[test]
    fn partitions_are_disjoint_and_cover_all() {
        let entities: Vec<EntityId> = (0..10).map(EntityId).collect();
        let chunks = partition_entities(&entities, 3);

        assert_eq!(chunks.len(), 3);
        let flattened: Vec<EntityId> = chunks.concat();
        assert_eq!(flattened, entities);
        // Sizes differ by at most one.
        assert_eq!(chunks[0].len(), 4);
        assert_eq!(chunks[1].len(), 3);
        assert_eq!(chunks[2].len(), 3);
    }

    #[test]
    fn degenerate_partitions() {
        assert!(partition_entities(&[], 4).is_empty());
        assert!(partition_entities(&[EntityId(1)], 0).is_empty());

        let one = partition_entities(&[EntityId(1)], 8);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0], vec![EntityId(1)]);
    }
}
