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

//! Structure-of-arrays component blocks for batch per-frame updates.
//!
//! Systems that touch many entities per frame should not go through the
//! per-entity value cache one property at a time. A [`ComponentBlock`]
//! stores one component kind's fields as parallel arrays, so a whole-group
//! update walks densely packed, vectorizable columns.
//!
//! Slot lifecycle: [`acquire_slot`](ComponentBlock::acquire_slot) reuses a
//! free slot or appends; [`release_slot`](ComponentBlock::release_slot)
//! tombstones and free-lists the slot without shuffling anything, so a
//! despawn is O(1); iteration visits live slots in slot order and skips
//! tombstones; [`compact`](ComponentBlock::compact) runs off the hot path,
//! squeezing tombstones out and updating the entity↔slot side tables in the
//! same pass as the column moves. Compaction invalidates previously
//! obtained slot indices.

use std::any::{Any, TypeId};

use ahash::AHashMap;

use strata_core::EntityId;

/// Index of a row inside a [`ComponentBlock`]. Stable until `compact()`.
pub type SlotIndex = u32;

/// Parallel field arrays for one component kind.
///
/// Implementations keep one `Vec` per field, all the same length; the
/// [`soa_columns!`](crate::soa_columns) macro generates the typical impl.
pub trait SoaColumns<C>: Default + Send + Sync {
    /// Appends one component, growing every column by one row.
    fn push(&mut self, component: C);

    /// Overwrites the row at `slot`.
    fn write(&mut self, slot: usize, component: C);

    /// Assembles the component stored at `slot`.
    fn read(&self, slot: usize) -> C;

    /// Copies row `from` over row `to`, leaving `from` as garbage.
    fn relocate(&mut self, from: usize, to: usize);

    /// Shrinks every column to `len` rows.
    fn truncate(&mut self, len: usize);

    /// Current row count.
    fn len(&self) -> usize;

    /// Returns true if no rows are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A component kind storable in a [`ComponentBlock`].
pub trait SoaComponent: Sized + Send + Sync + 'static {
    /// The column set holding this kind's fields.
    type Columns: SoaColumns<Self>;
}

/// Generates a column struct and its [`SoaColumns`] impl for a component.
///
/// ```
/// use strata_cache::{soa_columns, SoaComponent};
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// pub struct Health {
///     pub current: f32,
///     pub maximum: f32,
/// }
///
/// soa_columns! {
///     pub struct HealthColumns for Health {
///         current: f32,
///         maximum: f32,
///     }
/// }
///
/// impl SoaComponent for Health {
///     type Columns = HealthColumns;
/// }
/// ```
///
/// The generated column fields are exposed with the struct's visibility as
/// plain `Vec`s, so vectorized kernels can slice them directly
/// (`&columns.current[..]`). Tombstoned rows are present in those slices;
/// batch kernels that must skip them iterate via
/// [`ComponentBlock::for_each_active`] instead.
#[macro_export]
macro_rules! soa_columns {
    (
        $vis:vis struct $columns:ident for $component:ident {
            $( $field:ident : $ty:ty ),+ $(,)?
        }
    ) => {
        #[derive(Debug, Default)]
        $vis struct $columns {
            $( $vis $field: Vec<$ty>, )+
        }

        impl $crate::SoaColumns<$component> for $columns {
            fn push(&mut self, component: $component) {
                $( self.$field.push(component.$field); )+
            }

            fn write(&mut self, slot: usize, component: $component) {
                $( self.$field[slot] = component.$field; )+
            }

            fn read(&self, slot: usize) -> $component {
                $component {
                    $( $field: self.$field[slot].clone(), )+
                }
            }

            fn relocate(&mut self, from: usize, to: usize) {
                $( self.$field[to] = self.$field[from].clone(); )+
            }

            fn truncate(&mut self, len: usize) {
                $( self.$field.truncate(len); )+
            }

            fn len(&self) -> usize {
                // Columns are kept row-parallel; any field reports the len.
                let lens = [ $( self.$field.len(), )+ ];
                lens[0]
            }
        }
    };
}

/// SoA storage for one component kind across a set of entities.
#[derive(Debug)]
pub struct ComponentBlock<C: SoaComponent> {
    columns: C::Columns,
    // Row-parallel side tables: entities[i] owns row i, live[i] is the
    // tombstone bit.
    entities: Vec<EntityId>,
    live: Vec<bool>,
    slot_of: AHashMap<EntityId, SlotIndex>,
    free: Vec<SlotIndex>,
}

impl<C: SoaComponent> Default for ComponentBlock<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: SoaComponent> ComponentBlock<C> {
    /// Creates an empty block.
    #[must_use]
    pub fn new() -> Self {
        Self {
            columns: C::Columns::default(),
            entities: Vec::new(),
            live: Vec::new(),
            slot_of: AHashMap::new(),
            free: Vec::new(),
        }
    }

    /// Allocates (or reuses) a slot for `entity` and stores `component`.
    ///
    /// Reuses a free-listed slot when one exists, otherwise appends. An
    /// entity that already holds a slot keeps it; the component data is
    /// overwritten in place.
    pub fn acquire_slot(&mut self, entity: EntityId, component: C) -> SlotIndex {
        if let Some(&slot) = self.slot_of.get(&entity) {
            self.columns.write(slot as usize, component);
            return slot;
        }

        let slot = match self.free.pop() {
            Some(slot) => {
                let idx = slot as usize;
                self.columns.write(idx, component);
                self.entities[idx] = entity;
                self.live[idx] = true;
                slot
            }
            None => {
                let slot = self.entities.len() as SlotIndex;
                self.columns.push(component);
                self.entities.push(entity);
                self.live.push(true);
                slot
            }
        };
        self.slot_of.insert(entity, slot);
        slot
    }

    /// Tombstones the entity's slot and returns it to the free list.
    ///
    /// No compaction happens here — despawns stay O(1). The stale row data
    /// remains in the columns but is invisible to iteration. Returns false
    /// if the entity held no slot.
    pub fn release_slot(&mut self, entity: EntityId) -> bool {
        let Some(slot) = self.slot_of.remove(&entity) else {
            return false;
        };
        self.live[slot as usize] = false;
        self.free.push(slot);
        true
    }

    /// The entity's current slot, if it holds one.
    #[must_use]
    pub fn slot_of(&self, entity: EntityId) -> Option<SlotIndex> {
        self.slot_of.get(&entity).copied()
    }

    /// Reads the entity's component out of the columns.
    #[must_use]
    pub fn read(&self, entity: EntityId) -> Option<C> {
        self.slot_of
            .get(&entity)
            .map(|&slot| self.columns.read(slot as usize))
    }

    /// Overwrites the entity's component. Returns false without a slot.
    pub fn write(&mut self, entity: EntityId, component: C) -> bool {
        match self.slot_of.get(&entity) {
            Some(&slot) => {
                self.columns.write(slot as usize, component);
                true
            }
            None => false,
        }
    }

    /// Visits every live slot in slot order, skipping tombstones.
    ///
    /// An empty block is a trivial no-op, not a special case.
    pub fn for_each_active<F>(&self, mut f: F)
    where
        F: FnMut(EntityId, SlotIndex, &C::Columns),
    {
        for slot in 0..self.live.len() {
            if self.live[slot] {
                f(self.entities[slot], slot as SlotIndex, &self.columns);
            }
        }
    }

    /// Visits every live slot with mutable column access.
    pub fn for_each_active_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(EntityId, SlotIndex, &mut C::Columns),
    {
        for slot in 0..self.live.len() {
            if self.live[slot] {
                f(self.entities[slot], slot as SlotIndex, &mut self.columns);
            }
        }
    }

    /// Direct access to the columns for whole-array kernels.
    #[must_use]
    pub fn columns(&self) -> &C::Columns {
        &self.columns
    }

    /// Mutable access to the columns for whole-array kernels.
    pub fn columns_mut(&mut self) -> &mut C::Columns {
        &mut self.columns
    }

    /// Squeezes tombstoned rows out and shrinks the columns.
    ///
    /// Live rows slide down in slot order; the entity→slot side table is
    /// rewritten in the same pass as each column move, so no observer with
    /// `&mut` access can see them disagree. All previously obtained
    /// [`SlotIndex`]es are invalidated.
    pub fn compact(&mut self) {
        let before = self.live.len();
        let mut write = 0usize;

        for read in 0..self.live.len() {
            if !self.live[read] {
                continue;
            }
            if read != write {
                self.columns.relocate(read, write);
                let entity = self.entities[read];
                self.entities[write] = entity;
                self.live[write] = true;
                self.slot_of.insert(entity, write as SlotIndex);
            }
            write += 1;
        }

        self.columns.truncate(write);
        self.entities.truncate(write);
        self.live.truncate(write);
        self.free.clear();

        if before != write {
            log::debug!("compacted component block: {before} -> {write} rows");
        }
    }

    /// Number of live (non-tombstoned) slots.
    #[must_use]
    pub fn live_len(&self) -> usize {
        self.slot_of.len()
    }

    /// Total rows including tombstones.
    #[must_use]
    pub fn capacity_rows(&self) -> usize {
        self.live.len()
    }

    /// Returns true if no live slot exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot_of.is_empty()
    }
}

/// Type-erased operations the store needs on every block regardless of kind.
trait AnyBlock: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn release_entity(&mut self, entity: EntityId) -> bool;
    fn compact_block(&mut self);
}

impl<C: SoaComponent> AnyBlock for ComponentBlock<C> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn release_entity(&mut self, entity: EntityId) -> bool {
        self.release_slot(entity)
    }

    fn compact_block(&mut self) {
        self.compact();
    }
}

/// All component blocks of a stage, keyed by component kind.
#[derive(Default)]
pub struct BatchStore {
    blocks: AHashMap<TypeId, Box<dyn AnyBlock>>,
}

impl BatchStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component kind, creating its (empty) block.
    ///
    /// Idempotent; re-registering keeps the existing block.
    pub fn register<C: SoaComponent>(&mut self) {
        self.blocks
            .entry(TypeId::of::<C>())
            .or_insert_with(|| Box::new(ComponentBlock::<C>::new()));
    }

    /// The block for a component kind, if registered.
    #[must_use]
    pub fn block<C: SoaComponent>(&self) -> Option<&ComponentBlock<C>> {
        self.blocks
            .get(&TypeId::of::<C>())
            .and_then(|b| b.as_any().downcast_ref())
    }

    /// Mutable access to a component kind's block.
    pub fn block_mut<C: SoaComponent>(&mut self) -> Option<&mut ComponentBlock<C>> {
        self.blocks
            .get_mut(&TypeId::of::<C>())
            .and_then(|b| b.as_any_mut().downcast_mut())
    }

    /// Releases the entity's slot in every block that holds one.
    ///
    /// Driven by `EntityDestroyed` events so no block iterates over a dead
    /// entity's data.
    pub fn release_entity(&mut self, entity: EntityId) -> usize {
        self.blocks
            .values_mut()
            .map(|b| b.release_entity(entity))
            .filter(|released| *released)
            .count()
    }

    /// Compacts every block. Off the hot path by design.
    pub fn compact_all(&mut self) {
        for block in self.blocks.values_mut() {
            block.compact_block();
        }
    }

    /// Number of registered component kinds.
    #[must_use]
    pub fn kinds(&self) -> usize {
        self.blocks.len()
    }
}
