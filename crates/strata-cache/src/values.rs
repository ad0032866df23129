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

//! Per-entity storage of decoded property values with dirty tracking.
//!
//! One generation-stamped [`CachedEntry`] is the single dirty-tracking
//! primitive for every property kind — no per-struct dirty booleans. Each
//! entry cycles through the states
//!
//! ```text
//! Absent -> Clean (fill) -> Dirty (local write) -> Clean (flush)
//!           Clean|Dirty -> Absent (invalidate / generation mismatch)
//! ```
//!
//! Writes are write-behind: they mutate the cached value and set the dirty
//! bit, and never touch the underlying graph synchronously. A dirty entry
//! survives a generation bump — the local write is authoritative until the
//! next flush (single-writer-wins) — while stale clean entries are simply
//! discarded and re-read lazily.

use ahash::AHashMap;

use strata_core::{Token, Value};

use crate::stats::CacheStats;

/// Whether a cached value has pending local modifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// In sync with the graph as of `generation`.
    Clean,
    /// Locally written, not yet flushed back.
    Dirty,
}

/// A decoded value plus its dirty bit and fill-time generation stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub value: Value,
    pub state: EntryState,
    /// The owning entity's generation when this entry was filled or last
    /// written.
    pub generation: u64,
}

/// Token→value cache for a single entity.
#[derive(Debug, Default)]
pub struct ValueCache {
    entries: AHashMap<Token, CachedEntry>,
    stats: CacheStats,
}

impl ValueCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached entry usable at `generation`, if any.
    ///
    /// Dirty entries are always usable (read-your-own-writes); clean entries
    /// only while their stamp matches. A stale clean entry is dropped here
    /// so the caller falls through to a fresh graph read.
    pub fn lookup(&mut self, token: Token, generation: u64) -> Option<&CachedEntry> {
        match self.entries.get(&token) {
            Some(entry)
                if entry.state == EntryState::Dirty || entry.generation == generation =>
            {
                self.stats.hit();
                self.entries.get(&token)
            }
            Some(_) => {
                self.entries.remove(&token);
                self.stats.miss();
                None
            }
            None => {
                self.stats.miss();
                None
            }
        }
    }

    /// Peeks at an entry without generation checks or stats.
    #[must_use]
    pub fn peek(&self, token: Token) -> Option<&CachedEntry> {
        self.entries.get(&token)
    }

    /// Stores a freshly decoded value as clean.
    pub fn store_clean(&mut self, token: Token, value: Value, generation: u64) {
        self.entries.insert(
            token,
            CachedEntry {
                value,
                state: EntryState::Clean,
                generation,
            },
        );
    }

    /// Applies a local write: replaces the value in place and marks dirty.
    pub fn write(&mut self, token: Token, value: Value, generation: u64) {
        self.entries.insert(
            token,
            CachedEntry {
                value,
                state: EntryState::Dirty,
                generation,
            },
        );
    }

    /// Marks a flushed entry clean and restamps it.
    pub fn mark_clean(&mut self, token: Token, generation: u64) {
        if let Some(entry) = self.entries.get_mut(&token) {
            entry.state = EntryState::Clean;
            entry.generation = generation;
        }
    }

    /// Tokens with pending local writes.
    #[must_use]
    pub fn dirty_tokens(&self) -> Vec<Token> {
        self.entries
            .iter()
            .filter(|(_, e)| e.state == EntryState::Dirty)
            .map(|(&t, _)| t)
            .collect()
    }

    /// Returns true if any entry is dirty.
    #[must_use]
    pub fn has_dirty(&self) -> bool {
        self.entries.values().any(|e| e.state == EntryState::Dirty)
    }

    /// Discards entries staled by a generation change.
    ///
    /// Clean entries with an old stamp are dropped (re-read lazily on next
    /// access); dirty entries are kept — the pending write still has to
    /// reach the graph.
    pub fn refresh(&mut self, generation: u64) {
        self.entries
            .retain(|_, e| e.state == EntryState::Dirty || e.generation == generation);
    }

    /// Drops every entry, including dirty ones.
    ///
    /// Only for entity destruction or explicit host invalidation; pending
    /// writes are lost.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
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
    fn entry_state_machine() {
        let mut cache = ValueCache::new();
        let token = Token(0);

        // Absent
        assert!(cache.lookup(token, 1).is_none());

        // -> Clean on fill
        cache.store_clean(token, Value::Float(100.0), 1);
        assert_eq!(cache.lookup(token, 1).unwrap().state, EntryState::Clean);

        // -> Dirty on local write
        cache.write(token, Value::Float(40.0), 1);
        let entry = cache.lookup(token, 1).unwrap();
        assert_eq!(entry.state, EntryState::Dirty);
        assert_eq!(entry.value, Value::Float(40.0));

        // -> Clean on flush
        cache.mark_clean(token, 1);
        assert_eq!(cache.lookup(token, 1).unwrap().state, EntryState::Clean);

        // -> Absent on generation mismatch
        assert!(cache.lookup(token, 2).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn dirty_entries_survive_generation_bump() {
        let mut cache = ValueCache::new();
        let token = Token(0);

        cache.write(token, Value::Int(5), 1);
        cache.refresh(2);

        // The pending write is still visible and still dirty.
        let entry = cache.lookup(token, 2).unwrap();
        assert_eq!(entry.state, EntryState::Dirty);
        assert_eq!(entry.value, Value::Int(5));
    }

    #[test]
    fn refresh_drops_stale_clean_entries_only() {
        let mut cache = ValueCache::new();
        cache.store_clean(Token(0), Value::Bool(true), 1);
        cache.store_clean(Token(1), Value::Bool(false), 2);
        cache.write(Token(2), Value::Int(9), 1);

        cache.refresh(2);

        assert!(cache.peek(Token(0)).is_none());
        assert!(cache.peek(Token(1)).is_some());
        assert!(cache.peek(Token(2)).is_some());
    }

    #[test]
    fn dirty_tokens_lists_pending_writes() {
        let mut cache = ValueCache::new();
        cache.store_clean(Token(0), Value::Int(1), 1);
        cache.write(Token(1), Value::Int(2), 1);
        cache.write(Token(2), Value::Int(3), 1);

        let mut dirty = cache.dirty_tokens();
        dirty.sort();
        assert_eq!(dirty, vec![Token(1), Token(2)]);
        assert!(cache.has_dirty());
    }
}
