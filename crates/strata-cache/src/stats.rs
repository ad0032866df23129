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

//! Hit/miss accounting for the cache layers.

use serde::{Deserialize, Serialize};

/// Running hit/miss counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Requests answered from the cache (including negative entries).
    pub hits: u64,
    /// Requests that fell through to the underlying graph.
    pub misses: u64,
}

impl CacheStats {
    /// Records a hit.
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    /// Records a miss.
    pub fn miss(&mut self) {
        self.misses += 1;
    }

    /// Fraction of requests served from the cache, or 0.0 when idle.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Merges another counter set into this one.
    pub fn merge(&mut self, other: CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
    }
}

/// A snapshot of cache effectiveness across a whole stage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageStats {
    /// Handle-cache counters summed over all entities.
    pub handles: CacheStats,
    /// Value-cache counters summed over all entities.
    pub values: CacheStats,
    /// Entities with live per-entity caches.
    pub cached_entities: usize,
    /// Names interned in the token registry.
    pub interned_tokens: usize,
}
