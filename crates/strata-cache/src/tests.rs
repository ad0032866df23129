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

//! Cross-module tests for the cache layer against an instrumented graph.

use strata_core::{EntityId, GraphEvent, PropertyGraph, Value, Vec3f};

use crate::index::SchemaHierarchy;
use crate::memory::MemoryGraph;
use crate::soa_columns;
use crate::stage::StageCache;
use crate::sync::SyncPolicy;
use crate::SoaComponent;

// --- DUMMY COMPONENT FOR BATCH TESTS ---

#[derive(Debug, Clone, Copy, PartialEq)]
struct Health {
    current: f32,
    maximum: f32,
}

soa_columns! {
    struct HealthColumns for Health {
        current: f32,
        maximum: f32,
    }
}

impl SoaComponent for Health {
    type Columns = HealthColumns;
}

fn character_stage() -> (StageCache<MemoryGraph>, EntityId) {
    let graph = MemoryGraph::new();
    let e1 = EntityId(1);
    graph.add_entity(e1, "Character");
    graph.add_attribute(e1, "health:current", Value::Float(100.0));
    graph.add_attribute(e1, "health:maximum", Value::Float(100.0));
    graph.add_attribute(e1, "position", Value::Vec3f(Vec3f::new(1.0, 2.0, 3.0)));
    (StageCache::new(graph, SchemaHierarchy::new()), e1)
}

// --- TESTS ---

#[test]
fn round_trip_through_flush() {
    // --- 1. SETUP ---
    let (mut stage, e1) = character_stage();
    let health = stage.token("health:current");
    let position = stage.token("position");

    // --- 2. ACTION ---
    stage.set(e1, health, 40.0f32).unwrap();
    stage
        .set(e1, position, Vec3f::new(4.0, 5.0, 6.0))
        .unwrap();
    let outcome = stage.flush(e1);

    // --- 3. ASSERTIONS ---
    assert_eq!(outcome.flushed, 2);
    assert!(outcome.conflicts.is_empty());
    assert_eq!(
        stage.graph().value_of(e1, "health:current"),
        Some(Value::Float(40.0))
    );
    assert_eq!(
        stage.graph().value_of(e1, "position"),
        Some(Value::Vec3f(Vec3f::new(4.0, 5.0, 6.0)))
    );
}

#[test]
fn write_then_read_before_flush() {
    let (mut stage, e1) = character_stage();
    let health = stage.token("health:current");

    stage.set(e1, health, 40.0f32).unwrap();

    // Read-your-own-writes inside the cache...
    assert_eq!(stage.get::<f32>(e1, health).unwrap(), Some(40.0));
    // ...while the graph has not been touched yet (write-behind).
    assert_eq!(
        stage.graph().value_of(e1, "health:current"),
        Some(Value::Float(100.0))
    );
}

#[test]
fn flush_is_idempotent() {
    let (mut stage, e1) = character_stage();
    let health = stage.token("health:current");

    stage.set(e1, health, 40.0f32).unwrap();
    stage.flush(e1);
    let sets_after_first = stage.graph().set_count();
    stage.flush(e1);

    // The dirty flag was cleared by the first flush; the second one must
    // not call the graph's setter again.
    assert_eq!(sets_after_first, 1);
    assert_eq!(stage.graph().set_count(), 1);
}

#[test]
fn absent_property_costs_one_lookup() {
    let (mut stage, e1) = character_stage();
    let missing = stage.token("mana:current");

    assert_eq!(stage.get::<f32>(e1, missing).unwrap(), None);
    let lookups_after_first = stage.graph().lookup_count();
    assert_eq!(stage.get::<f32>(e1, missing).unwrap(), None);

    // The second read hit the negative-cache sentinel.
    assert_eq!(stage.graph().lookup_count(), lookups_after_first);
}

#[test]
fn generation_bump_forces_refetch() {
    // --- 1. SETUP ---
    let (mut stage, e1) = character_stage();
    let health = stage.token("health:current");
    assert_eq!(stage.get::<f32>(e1, health).unwrap(), Some(100.0));
    let gets_after_fill = stage.graph().get_count();

    // A cached read does not touch the graph.
    assert_eq!(stage.get::<f32>(e1, health).unwrap(), Some(100.0));
    assert_eq!(stage.graph().get_count(), gets_after_fill);

    // --- 2. ACTION ---
    // The graph changes underneath the cache: new value, new generation.
    let handle = stage.graph().lookup(e1, "health:current").unwrap();
    assert!(stage.graph().set_typed(handle, &Value::Float(25.0)));
    stage.graph().bump_generation(e1);
    stage.refresh(e1);

    // --- 3. ASSERTIONS ---
    // The stale cached 100.0 must not come back; the cache re-fetches.
    assert_eq!(stage.get::<f32>(e1, health).unwrap(), Some(25.0));
    assert!(stage.graph().get_count() > gets_after_fill);
}

#[test]
fn composition_event_invalidates_via_tick() {
    let (mut stage, e1) = character_stage();
    let health = stage.token("health:current");
    assert_eq!(stage.get::<f32>(e1, health).unwrap(), Some(100.0));

    let handle = stage.graph().lookup(e1, "health:current").unwrap();
    assert!(stage.graph().set_typed(handle, &Value::Float(10.0)));
    stage.graph().bump_generation(e1);
    stage
        .event_sender()
        .send(GraphEvent::CompositionChanged(e1))
        .unwrap();

    let report = stage.tick();
    assert_eq!(report.invalidated, 1);
    assert_eq!(stage.get::<f32>(e1, health).unwrap(), Some(10.0));
}

#[test]
#[should_panic(expected = "type mismatch")]
fn mismatched_read_type_fails_fast() {
    let (mut stage, e1) = character_stage();
    let health = stage.token("health:current");

    // Declared float, requested double: programmer error.
    let _ = stage.get::<f64>(e1, health);
}

#[test]
fn write_to_unknown_property_fails_loudly() {
    let (mut stage, e1) = character_stage();
    let missing = stage.token("mana:current");

    let err = stage.set(e1, missing, 5.0f32).unwrap_err();
    assert!(matches!(
        err,
        strata_core::CacheError::PropertyUnknown { entity, .. } if entity == e1
    ));
}

#[test]
fn rejected_write_back_is_reported_not_thrown() {
    // --- 1. SETUP ---
    let (mut stage, e1) = character_stage();
    stage.graph().set_read_only(e1, "health:maximum");
    let maximum = stage.token("health:maximum");
    let current = stage.token("health:current");

    // --- 2. ACTION ---
    stage.set(e1, maximum, 150.0f32).unwrap();
    stage.set(e1, current, 40.0f32).unwrap();
    let report = stage.tick();

    // --- 3. ASSERTIONS ---
    // The rejected property shows up as a conflict; the other one still
    // flushed (fault isolation per entry).
    assert_eq!(report.flushed, 1);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].name, "health:maximum");
    assert_eq!(
        stage.graph().value_of(e1, "health:current"),
        Some(Value::Float(40.0))
    );
    // The conflicted value is still dirty and retried next tick.
    let retry = stage.tick();
    assert_eq!(retry.conflicts.len(), 1);
}

#[test]
fn marked_only_policy_flushes_selectively() {
    let graph = MemoryGraph::new();
    let (e1, e2) = (EntityId(1), EntityId(2));
    for &e in &[e1, e2] {
        graph.add_entity(e, "Character");
        graph.add_attribute(e, "health:current", Value::Float(100.0));
    }
    let mut stage = StageCache::with_policy(graph, SchemaHierarchy::new(), SyncPolicy::MarkedOnly);
    let health = stage.token("health:current");

    stage.set(e1, health, 10.0f32).unwrap();
    stage.set(e2, health, 20.0f32).unwrap();
    stage.mark_sync_required(e1);

    let report = stage.tick();
    assert_eq!(report.flushed, 1);
    assert_eq!(
        stage.graph().value_of(e1, "health:current"),
        Some(Value::Float(10.0))
    );
    // e2 was not marked: still dirty, graph untouched.
    assert_eq!(
        stage.graph().value_of(e2, "health:current"),
        Some(Value::Float(100.0))
    );

    stage.mark_sync_required(e2);
    let report = stage.tick();
    assert_eq!(report.flushed, 1);
    assert_eq!(
        stage.graph().value_of(e2, "health:current"),
        Some(Value::Float(20.0))
    );
}

#[test]
fn schema_index_updates_incrementally() {
    // --- 1. SETUP ---
    let graph = MemoryGraph::new();
    let (e1, e2) = (EntityId(1), EntityId(2));
    graph.add_entity(e1, "Character");
    graph.add_entity(e2, "Prop");
    graph.apply_schema(e1, "HealthAPI");

    let mut hierarchy = SchemaHierarchy::new();
    hierarchy.register("Entity", &[]);
    hierarchy.register("Character", &["Entity"]);
    hierarchy.register("Prop", &["Entity"]);

    let stage = StageCache::new(graph, hierarchy);
    stage.build_index();
    assert_eq!(stage.index().rebuild_count(), 1);

    // Ancestor-closure membership is O(1) set lookups.
    assert!(stage.has_schema(e1, "Character"));
    assert!(stage.has_schema(e1, "Entity"));
    assert!(stage.has_schema(e2, "Entity"));
    assert!(stage.has_schema(e1, "HealthAPI"));
    assert!(!stage.has_schema(e2, "HealthAPI"));

    // --- 2. ACTION ---
    // Apply a schema to e2 and deliver the incremental update.
    let mut stage = stage;
    stage.graph().apply_schema(e2, "HealthAPI");
    stage
        .event_sender()
        .send(GraphEvent::SchemaChanged(e2))
        .unwrap();
    stage.tick();

    // --- 3. ASSERTIONS ---
    let mut with_health = stage.entities_with("HealthAPI");
    with_health.sort();
    assert_eq!(with_health, vec![e1, e2]);
    // No full rebuild happened.
    assert_eq!(stage.index().rebuild_count(), 1);
}

#[test]
fn multi_apply_schemas_index_under_both_keys() {
    let graph = MemoryGraph::new();
    let e1 = EntityId(1);
    graph.add_entity(e1, "Character");
    graph.apply_schema(e1, "CollectionAPI:loot");
    graph.apply_schema(e1, "CollectionAPI:quests");

    let stage = StageCache::new(graph, SchemaHierarchy::new());
    stage.build_index();

    assert!(stage.has_schema(e1, "CollectionAPI"));
    assert!(stage.has_schema(e1, "CollectionAPI:loot"));
    assert!(stage.has_schema(e1, "CollectionAPI:quests"));
    assert!(!stage.has_schema(e1, "CollectionAPI:vendors"));
}

#[test]
fn destroyed_entity_leaves_no_trace() {
    // --- 1. SETUP ---
    let (mut stage, e1) = character_stage();
    let health = stage.token("health:current");
    stage.register_batch::<Health>();
    stage.build_index();

    assert_eq!(stage.get::<f32>(e1, health).unwrap(), Some(100.0));
    stage
        .batch_mut::<Health>()
        .unwrap()
        .acquire_slot(e1, Health { current: 100.0, maximum: 100.0 });

    // --- 2. ACTION ---
    stage
        .event_sender()
        .send(GraphEvent::EntityDestroyed(e1))
        .unwrap();
    let report = stage.tick();

    // --- 3. ASSERTIONS ---
    assert_eq!(report.destroyed, 1);
    assert!(!stage.is_cached(e1));
    assert!(stage.entities_with("Character").is_empty());
    assert!(stage.batch::<Health>().unwrap().is_empty());
}

#[test]
fn batch_tombstones_are_never_visited() {
    // --- 1. SETUP ---
    let mut block = crate::ComponentBlock::<Health>::new();
    let (e1, e2, e3) = (EntityId(1), EntityId(2), EntityId(3));
    block.acquire_slot(e1, Health { current: 1.0, maximum: 10.0 });
    block.acquire_slot(e2, Health { current: 2.0, maximum: 20.0 });
    block.acquire_slot(e3, Health { current: 3.0, maximum: 30.0 });

    // --- 2. ACTION ---
    block.release_slot(e2);
    // A new entity reuses the tombstoned slot from the free list.
    let e4 = EntityId(4);
    let slot = block.acquire_slot(e4, Health { current: 4.0, maximum: 40.0 });

    // --- 3. ASSERTIONS ---
    assert_eq!(slot, 1, "free-listed slot is reused");
    let mut visited = Vec::new();
    block.for_each_active(|entity, slot, columns| {
        visited.push((entity, columns.current[slot as usize]));
    });
    visited.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        visited,
        vec![(e1, 1.0), (e3, 3.0), (e4, 4.0)],
        "old entity's data must never surface"
    );
}

#[test]
fn batch_compaction_preserves_live_rows() {
    // --- 1. SETUP ---
    let mut block = crate::ComponentBlock::<Health>::new();
    let entities: Vec<EntityId> = (0..6).map(EntityId).collect();
    for (i, &e) in entities.iter().enumerate() {
        block.acquire_slot(e, Health { current: i as f32, maximum: 100.0 });
    }
    block.release_slot(entities[1]);
    block.release_slot(entities[4]);

    // --- 2. ACTION ---
    block.compact();

    // --- 3. ASSERTIONS ---
    assert_eq!(block.live_len(), 4);
    assert_eq!(block.capacity_rows(), 4, "tombstones reclaimed");
    // Side table and columns moved together.
    for &e in &[entities[0], entities[2], entities[3], entities[5]] {
        let component = block.read(e).unwrap();
        assert_eq!(component.current, e.0 as f32);
    }
    // Compaction preserves slot order of survivors.
    let mut order = Vec::new();
    block.for_each_active(|entity, _, _| order.push(entity));
    assert_eq!(order, vec![entities[0], entities[2], entities[3], entities[5]]);
}

#[test]
fn empty_batch_iteration_is_a_noop() {
    let block = crate::ComponentBlock::<Health>::new();
    let mut calls = 0;
    block.for_each_active(|_, _, _| calls += 1);
    assert_eq!(calls, 0);
}

#[test]
fn prewarm_fills_caches_ahead_of_reads() {
    let (mut stage, e1) = character_stage();
    stage.prewarm(e1, &["health:current", "health:maximum", "position"]);

    let lookups = stage.graph().lookup_count();
    let gets = stage.graph().get_count();

    let health = stage.token("health:current");
    assert_eq!(stage.get::<f32>(e1, health).unwrap(), Some(100.0));

    // The warmed read cost no graph traffic.
    assert_eq!(stage.graph().lookup_count(), lookups);
    assert_eq!(stage.graph().get_count(), gets);
}

#[test]
fn stats_report_hits_and_misses() {
    let (mut stage, e1) = character_stage();
    let health = stage.token("health:current");

    let _ = stage.get::<f32>(e1, health); // miss + fill
    let _ = stage.get::<f32>(e1, health); // hit
    let _ = stage.get::<f32>(e1, health); // hit

    let stats = stage.stats();
    assert_eq!(stats.values.hits, 2);
    assert_eq!(stats.values.misses, 1);
    assert_eq!(stats.cached_entities, 1);
    assert!(stats.values.hit_rate() > 0.6);
}
