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

//! Error types for the cache layer.
//!
//! Absent properties are not errors here — optional attributes are common,
//! so lookups surface `None` (backed by a negative-cache sentinel). The
//! error enum covers the cases that remain: type mismatches, which are
//! programmer errors, and unknown entities. Write-back failures are
//! collected per tick as [`SyncConflict`]s instead of being thrown across
//! the batch boundary.

use std::fmt;

use crate::ids::EntityId;
use crate::value::ValueType;

/// Result alias for fallible cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// An error produced by a cache read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The requested Rust type disagrees with the attribute's declared type
    /// (e.g. reading a `double` attribute as `f32`). This is a programming
    /// bug; debug builds assert on it before this error is returned.
    TypeMismatch {
        /// The property name involved.
        name: String,
        /// The type the caller requested.
        expected: ValueType,
        /// The type the graph declares.
        found: ValueType,
    },
    /// The entity is not known to the underlying graph.
    EntityUnknown(EntityId),
    /// A local write targeted a property the composed entity does not have.
    ///
    /// Reads of absent optional properties return `None`, but a write-behind
    /// value with nowhere to land would only surface as a conflict many
    /// frames later — so writes fail loudly up front instead.
    PropertyUnknown {
        /// The entity that was written to.
        entity: EntityId,
        /// The property name that does not resolve.
        name: String,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::TypeMismatch {
                name,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Type mismatch on '{name}': requested {expected}, graph declares {found}"
                )
            }
            CacheError::EntityUnknown(id) => write!(f, "Unknown entity: {id}"),
            CacheError::PropertyUnknown { entity, name } => {
                write!(f, "{entity} has no property '{name}'")
            }
        }
    }
}

impl std::error::Error for CacheError {}

/// A dirty value the graph refused to accept at flush time.
///
/// One entry per failed write-back; `tick()` collects these into its report
/// so a single rejected set never aborts the rest of the batch. The value
/// stays dirty in the cache, so the host can retry, drop, or log per case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConflict {
    /// The entity whose write-back failed.
    pub entity: EntityId,
    /// The property name that could not be written.
    pub name: String,
    /// Why the write-back failed.
    pub reason: ConflictReason,
}

/// The cause of a write-back failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The graph rejected the set (read-only property, locked layer).
    Rejected,
    /// The cached handle no longer resolves and re-resolution also failed:
    /// the property vanished from the composition while dirty.
    PropertyVanished,
}

impl fmt::Display for SyncConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            ConflictReason::Rejected => "graph rejected the write",
            ConflictReason::PropertyVanished => "property vanished from the composition",
        };
        write!(f, "Sync conflict on {} '{}': {reason}", self.entity, self.name)
    }
}
