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

//! Identifier newtypes shared by the cache layer and the underlying graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A stable identifier for a node (prim) in the underlying property graph.
///
/// Entities are owned by the graph: the cache layer never mints or retires
/// an `EntityId`, it only caches facts about entities the graph reports.
/// The inner value is opaque to this layer; it is typically a path hash or
/// a dense index assigned by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// An interned handle for a property or type name string.
///
/// Tokens are produced only by the `TokenRegistry` in `strata-cache`.
/// Equal strings always map to the identical token for the lifetime of the
/// process (the intern table is append-only), so equality and ordering are
/// O(1) integer comparisons and never touch the original string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token(pub u32);

impl Token {
    /// Returns the raw intern-table index backing this token.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An opaque reference the underlying graph mints from a name lookup.
///
/// Scoped to one `(EntityId, Token)` pair; the graph can resolve it to a
/// storage location faster than a fresh name-based lookup. A handle is only
/// valid while the owning entity's generation is unchanged — the cache layer
/// stamps every stored handle with the generation observed at fill time and
/// discards it lazily on mismatch, since it has no visibility into the
/// graph's composition internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeHandle(pub u64);

impl fmt::Display for AttributeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attr#{}", self.0)
    }
}
