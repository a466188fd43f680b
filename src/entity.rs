// Copyright 2024 Saptak Santra
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

//! Entity identifiers and location metadata.
//!
//! Entities are `{index, generation}` pairs (spec.md §3 "Entity"). The
//! index is the row an entity's id column cell holds inside its
//! archetype's chunks, so its range is capped by `entity_id_byte_width`
//! (1/2/4 bytes — spec.md §6); the generation only ever lives in this
//! manager's slot table, never inside a chunk.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::append_list::AppendList;
use crate::error::{EcsError, Result};

/// Stable handle to an entity. `index` identifies a slot in the
/// `EntityManager`'s table; `generation` detects reuse of a freed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    pub index: u32,
    pub generation: u32,
}

/// Entity location: which archetype it lives in and which row within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: u32,
    pub row: usize,
}

/// Maximum index an entity can be given, derived from the configured
/// entity-id column width (spec.md §6: 1/2/4 bytes => 2^8/2^16/2^32 - 1
/// distinct live indices).
pub fn max_index_for_width(entity_id_byte_width: u8) -> u64 {
    match entity_id_byte_width {
        1 => (1u64 << 8) - 1,
        2 => (1u64 << 16) - 1,
        4 => u32::MAX as u64,
        _ => panic!("entity_id_byte_width must be 1, 2, or 4"),
    }
}

const FREE_LIST_NIL: usize = usize::MAX;
const UNSET_ROW: usize = usize::MAX;

/// One entity's generation and current location, held in atomics so
/// `create`/`destroy` need no lock (spec.md §4.5 "A concurrent variant
/// uses lock-free create/destroy backed by the same append-only chunked
/// list plus a CAS free-list"). Generation parity is the liveness flag
/// per spec.md §4.5's own convention: odd means alive, even means free.
struct EntitySlot {
    generation: AtomicU32,
    archetype_id: AtomicU32,
    row: AtomicUsize,
    next_free: AtomicUsize,
}

/// Owns the table mapping entity index to `{generation, location}`, plus
/// a CAS free-list of recyclable indices, mirroring `ChunkManager`'s
/// slot-table design directly over the same `AppendList` primitive
/// (spec.md §4.5; SPEC_FULL.md §5's "`AppendList<T>`... reused by both
/// `ChunkManager` metadata growth and `EntityManager` slot-table growth").
pub struct EntityManager {
    slots: AppendList<EntitySlot>,
    free_head: AtomicUsize,
    max_index: u64,
}

impl EntityManager {
    pub fn new(entity_id_byte_width: u8) -> Self {
        Self::with_capacity(entity_id_byte_width, 0)
    }

    /// Like [`Self::new`], but sizes the first slot-table block around
    /// `capacity` (`WorldConfig::default_entity_capacity`) to avoid early
    /// table growth.
    pub fn with_capacity(entity_id_byte_width: u8, capacity: usize) -> Self {
        let block_capacity = capacity.max(1).next_power_of_two();
        Self {
            slots: AppendList::with_block_capacity(block_capacity),
            free_head: AtomicUsize::new(FREE_LIST_NIL),
            max_index: max_index_for_width(entity_id_byte_width),
        }
    }

    /// Create a new entity with no location assigned yet. Callers
    /// (`World::spawn`) must follow with `set_location`.
    pub fn create(&self) -> Result<Entity> {
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            if head == FREE_LIST_NIL {
                break;
            }
            let slot = self
                .slots
                .get(head)
                .expect("free-list index must reference a committed slot");
            let next = slot.next_free.load(Ordering::Relaxed);
            if self
                .free_head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let generation = slot.generation.fetch_add(1, Ordering::AcqRel) + 1;
                slot.row.store(UNSET_ROW, Ordering::Release);
                return Ok(Entity {
                    index: head as u32,
                    generation,
                });
            }
            // Lost the race for this slot; retry from the (possibly new) head.
        }

        let next_index = self.slots.committed_len() as u64;
        if next_index > self.max_index {
            return Err(EcsError::CapacityExceeded);
        }
        let index = self.slots.push(EntitySlot {
            generation: AtomicU32::new(1),
            archetype_id: AtomicU32::new(0),
            row: AtomicUsize::new(UNSET_ROW),
            next_free: AtomicUsize::new(FREE_LIST_NIL),
        });
        Ok(Entity {
            index: index as u32,
            generation: 1,
        })
    }

    /// Validate `entity` is currently alive and recycle its index.
    /// Generation wraparound is tolerated (wraps silently): with 2^32
    /// generations per index, a collision requires recycling the same
    /// index two billion times (every other generation is the "freed"
    /// value), which spec.md does not class as a condition worth a fatal
    /// panic (contrast chunk generations, spec.md §9 Open Question (a),
    /// which are deliberately narrower).
    pub fn destroy(&self, entity: Entity) -> Result<EntityLocation> {
        let slot = self
            .slots
            .get(entity.index as usize)
            .ok_or(EcsError::StaleEntity)?;

        loop {
            let current = slot.generation.load(Ordering::Acquire);
            if current != entity.generation || current % 2 == 0 {
                return Err(EcsError::StaleEntity);
            }
            let row = slot.row.load(Ordering::Acquire);
            if row == UNSET_ROW {
                return Err(EcsError::StaleEntity);
            }
            if slot
                .generation
                .compare_exchange(current, current.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let archetype_id = slot.archetype_id.load(Ordering::Acquire);
                slot.row.store(UNSET_ROW, Ordering::Release);

                loop {
                    let head = self.free_head.load(Ordering::Acquire);
                    slot.next_free.store(head, Ordering::Relaxed);
                    if self
                        .free_head
                        .compare_exchange(head, entity.index as usize, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        break;
                    }
                }
                return Ok(EntityLocation { archetype_id, row });
            }
            // Lost the generation CAS race; retry from the current value.
        }
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        match self.slots.get(entity.index as usize) {
            Some(slot) => {
                slot.generation.load(Ordering::Acquire) == entity.generation
                    && entity.generation % 2 == 1
                    && slot.row.load(Ordering::Acquire) != UNSET_ROW
            }
            None => false,
        }
    }

    pub fn get_location(&self, entity: Entity) -> Result<EntityLocation> {
        let slot = self
            .slots
            .get(entity.index as usize)
            .ok_or(EcsError::StaleEntity)?;
        if slot.generation.load(Ordering::Acquire) != entity.generation {
            return Err(EcsError::StaleEntity);
        }
        let row = slot.row.load(Ordering::Acquire);
        if row == UNSET_ROW {
            return Err(EcsError::StaleEntity);
        }
        Ok(EntityLocation {
            archetype_id: slot.archetype_id.load(Ordering::Acquire),
            row,
        })
    }

    pub fn set_location(&self, entity: Entity, location: EntityLocation) -> Result<()> {
        let slot = self
            .slots
            .get(entity.index as usize)
            .ok_or(EcsError::StaleEntity)?;
        if slot.generation.load(Ordering::Acquire) != entity.generation {
            return Err(EcsError::StaleEntity);
        }
        slot.archetype_id.store(location.archetype_id, Ordering::Relaxed);
        slot.row.store(location.row, Ordering::Release);
        Ok(())
    }

    /// Update the location for whichever live entity currently holds
    /// `index`, without a generation check. Used by `World` to fix up the
    /// entity that a swap-remove just relocated, where only the raw index
    /// stored in the chunk's id column (not a full `Entity` handle with
    /// its generation) is available.
    pub fn set_location_by_index(&self, index: u32, location: EntityLocation) -> Result<()> {
        let slot = self.slots.get(index as usize).ok_or(EcsError::StaleEntity)?;
        slot.archetype_id.store(location.archetype_id, Ordering::Relaxed);
        slot.row.store(location.row, Ordering::Release);
        Ok(())
    }

    /// Number of entities currently alive.
    pub fn alive_count(&self) -> usize {
        self.slots.committed_len() - self.recycled_count()
    }

    /// Number of indices currently recyclable (teacher idiom: `chunk.rs`'s
    /// free-list walk for `ChunkManagerStats`, the same shape here).
    pub fn recycled_count(&self) -> usize {
        let mut count = 0usize;
        let mut cursor = self.free_head.load(Ordering::Acquire);
        while cursor != FREE_LIST_NIL {
            count += 1;
            let slot = self.slots.get(cursor).expect("free-list must be well-formed");
            cursor = slot.next_free.load(Ordering::Acquire);
        }
        count
    }
}
