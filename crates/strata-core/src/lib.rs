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

//! Core types and interface contracts for the Strata runtime cache.
//!
//! This crate defines the boundary between the cache layer and the composed
//! property graph it accelerates: the [`PropertyGraph`](graph::PropertyGraph)
//! trait, the typed value model, the identifier newtypes, and the error
//! hierarchy. It contains no caching logic of its own; see `strata-cache`
//! for the layer itself.

pub mod error;
pub mod graph;
pub mod ids;
pub mod value;

pub use error::{CacheError, CacheResult, ConflictReason, SyncConflict};
pub use graph::{GraphEvent, PropertyGraph};
pub use ids::{AttributeHandle, EntityId, Token};
pub use value::{PropertyValue, Value, ValueType, Vec3f};
