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

//! A runtime caching and synchronization layer over a composed property graph.
//!
//! A hierarchical property graph with inheritance, overrides, and variants is
//! flexible to author against but too slow to query by name on every frame.
//! This crate sits between such a graph (abstracted as
//! [`PropertyGraph`](strata_core::PropertyGraph)) and a real-time consumer:
//!
//! - [`tokens`] interns name strings into cheap comparable [`Token`]s.
//! - [`handles`] caches per-entity name→handle resolutions, including
//!   negative entries for legitimately absent optional properties.
//! - [`values`] holds decoded property values with a unified
//!   dirty/generation-stamped entry, so per-frame writes never touch the
//!   graph synchronously (write-behind).
//! - [`index`] maps types and applied schemas to entity sets with
//!   precomputed ancestor closures for O(1) "is-a" queries.
//! - [`batch`] provides structure-of-arrays component blocks for
//!   vectorizable whole-group updates.
//! - [`sync`] reconciles dirty values back to the graph and applies
//!   invalidation events at explicit `tick()` flush points.
//! - [`tls`] keeps hot tokens in per-thread caches away from shared locks.
//!
//! The consumer-facing surface is [`StageCache`]. The graph is the single
//! source of truth; everything here is a derived accelerator whose
//! correctness contract is "eventually consistent with the graph, with
//! explicit flush points".

pub mod batch;
pub mod handles;
pub mod index;
pub mod memory;
pub mod prim;
pub mod stage;
pub mod stats;
pub mod sync;
pub mod tls;
pub mod tokens;
pub mod values;

pub use batch::{BatchStore, ComponentBlock, SlotIndex, SoaColumns, SoaComponent};
pub use handles::{HandleCache, HandleSlot};
pub use index::{SchemaHierarchy, SchemaIndex};
pub use memory::MemoryGraph;
pub use prim::{FlushOutcome, PrimCache};
pub use stage::StageCache;
pub use stats::{CacheStats, StageStats};
pub use sync::{SyncEngine, SyncPolicy, TickReport};
pub use tokens::TokenRegistry;
pub use values::{CachedEntry, EntryState, ValueCache};

pub use strata_core::{
    AttributeHandle, CacheError, CacheResult, ConflictReason, EntityId, GraphEvent, PropertyGraph,
    PropertyValue, SyncConflict, Token, Value, ValueType, Vec3f,
};

#[cfg(test)]
mod tests;
