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

//! String interning for property and type names.
//!
//! Name comparison and hashing dominate the cost of name-based graph
//! queries. The registry interns each distinct string exactly once and hands
//! out [`Token`]s — `u32` handles that compare in O(1). The intern table is
//! append-only and lives for the whole process; tokens are never retired.
//!
//! The registry is an explicitly constructed instance shared via `Arc`, not
//! an ambient singleton, so tests can build isolated registries. Hosts
//! normally create one per process next to their [`StageCache`](crate::StageCache).

use std::sync::RwLock;

use ahash::AHashMap;

use strata_core::Token;

struct RegistryInner {
    by_name: AHashMap<String, Token>,
    // Token(i) indexes names[i]; entries are never removed or reordered.
    names: Vec<String>,
}

/// A thread-safe, append-only intern table for name strings.
pub struct TokenRegistry {
    inner: RwLock<RegistryInner>,
}

impl TokenRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                by_name: AHashMap::new(),
                names: Vec::new(),
            }),
        }
    }

    /// Interns a name, returning its token.
    ///
    /// Idempotent: every call with an equal string returns the identical
    /// token. Safe to call concurrently from multiple threads; the
    /// read-then-write double check guarantees two racing interns of the
    /// same string agree on one token.
    pub fn intern(&self, name: &str) -> Token {
        {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if let Some(&token) = inner.by_name.get(name) {
                return token;
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        // Another thread may have interned it between the locks.
        if let Some(&token) = inner.by_name.get(name) {
            return token;
        }

        let token = Token(inner.names.len() as u32);
        inner.names.push(name.to_owned());
        inner.by_name.insert(name.to_owned(), token);
        log::trace!("interned '{name}' as {token:?}");
        token
    }

    /// Interns a group of names in one write pass.
    ///
    /// Pre-warming helper for schema token groups, so hot per-frame code
    /// never takes the write lock.
    pub fn intern_all<'a, I>(&self, names: I) -> Vec<Token>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().map(|n| self.intern(n)).collect()
    }

    /// Looks up a token without interning.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Token> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_name.get(name).copied()
    }

    /// Returns the string a token was interned from.
    ///
    /// Total for every token this registry produced. Panics on a token that
    /// was forged or produced by a different registry — tokens are not
    /// portable across registries.
    #[must_use]
    pub fn resolve(&self, token: Token) -> String {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .names
            .get(token.index())
            .unwrap_or_else(|| panic!("{token:?} was not produced by this registry"))
            .clone()
    }

    /// Number of distinct names interned so far.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.names.len()
    }

    /// Returns true if nothing has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn intern_is_idempotent() {
        let registry = TokenRegistry::new();
        let a = registry.intern("health:current");
        let b = registry.intern("health:current");
        let c = registry.intern("health:maximum");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.resolve(a), "health:current");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_interns_agree() {
        let registry = Arc::new(TokenRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                (0..100)
                    .map(|i| registry.intern(&format!("attr{}", i % 10)))
                    .collect::<Vec<_>>()
            }));
        }

        let results: Vec<Vec<Token>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // All threads must have observed the same token for the same name.
        for tokens in &results[1..] {
            assert_eq!(tokens, &results[0]);
        }
        assert_eq!(registry.len(), 10);
    }

    #[test]
    fn get_does_not_intern() {
        let registry = TokenRegistry::new();
        assert_eq!(registry.get("missing"), None);
        assert!(registry.is_empty());

        let t = registry.intern("present");
        assert_eq!(registry.get("present"), Some(t));
    }
}
