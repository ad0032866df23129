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

//! The synchronization engine behind `tick()`.
//!
//! Two responsibilities meet at the tick boundary: pending dirty values flow
//! back to the graph (write-behind flush), and pending graph change events
//! flow into the caches (invalidation). Within the cache, read-your-own-
//! writes always holds; a subsystem reading the graph directly sees local
//! writes only after the tick that flushed them — "eventually consistent
//! with explicit flush points".
//!
//! Which entities flush per tick is the batching policy: every dirty entity
//! ([`SyncPolicy::AllDirty`], the default), or only those the host marked
//! sync-required this frame ([`SyncPolicy::MarkedOnly`], for hosts that
//! stagger flush cost across frames).

use ahash::AHashSet;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use strata_core::{EntityId, GraphEvent, SyncConflict};

/// Which dirty entities a `tick()` flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Flush every entity with dirty values.
    #[default]
    AllDirty,
    /// Flush only entities passed to `mark_sync_required` since the last
    /// tick. Unmarked dirty entities stay dirty until a later tick.
    MarkedOnly,
}

/// What one `tick()` did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Dirty entries successfully written back.
    pub flushed: usize,
    /// Entities whose caches were invalidated or refreshed by events.
    pub invalidated: usize,
    /// Entities whose cached state was dropped entirely (destroyed).
    pub destroyed: usize,
    /// Write-backs the graph refused this tick. Collected, never thrown —
    /// one bad property must not abort the batch.
    pub conflicts: Vec<SyncConflict>,
}

impl TickReport {
    /// Returns true if every write-back landed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Event intake and flush-selection state for a stage.
pub struct SyncEngine {
    sender: Sender<GraphEvent>,
    receiver: Receiver<GraphEvent>,
    policy: SyncPolicy,
    marked: AHashSet<EntityId>,
}

impl SyncEngine {
    /// Creates an engine with its own event channel.
    #[must_use]
    pub fn new(policy: SyncPolicy) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            policy,
            marked: AHashSet::new(),
        }
    }

    /// A sender the graph (or host glue) pushes change events into.
    ///
    /// Cheap to clone; safe to use from any thread. Events queue up until
    /// the next tick drains them.
    #[must_use]
    pub fn event_sender(&self) -> Sender<GraphEvent> {
        self.sender.clone()
    }

    /// The active flush-selection policy.
    #[must_use]
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Replaces the flush-selection policy.
    pub fn set_policy(&mut self, policy: SyncPolicy) {
        self.policy = policy;
    }

    /// Requests that an entity's dirty values flush on the next tick.
    ///
    /// Only consulted under [`SyncPolicy::MarkedOnly`].
    pub fn mark_sync_required(&mut self, entity: EntityId) {
        self.marked.insert(entity);
    }

    /// Drains every queued event, preserving arrival order.
    pub fn drain_events(&mut self) -> Vec<GraphEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Takes the marked set for this tick, leaving it empty for the next.
    pub fn take_marked(&mut self) -> AHashSet<EntityId> {
        std::mem::take(&mut self.marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_queue_until_drained() {
        let mut engine = SyncEngine::new(SyncPolicy::AllDirty);
        let sender = engine.event_sender();

        sender.send(GraphEvent::CompositionChanged(EntityId(1))).unwrap();
        sender.send(GraphEvent::EntityDestroyed(EntityId(2))).unwrap();

        let events = engine.drain_events();
        assert_eq!(
            events,
            vec![
                GraphEvent::CompositionChanged(EntityId(1)),
                GraphEvent::EntityDestroyed(EntityId(2)),
            ]
        );
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn marked_set_resets_each_take() {
        let mut engine = SyncEngine::new(SyncPolicy::MarkedOnly);
        engine.mark_sync_required(EntityId(7));
        engine.mark_sync_required(EntityId(7));
        engine.mark_sync_required(EntityId(9));

        let marked = engine.take_marked();
        assert_eq!(marked.len(), 2);
        assert!(engine.take_marked().is_empty());
    }
}
