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

//! Archetype registry: interns `(mask -> ArchetypeStore)`, maintains the
//! structural-change transition graph, and caches query-to-archetype
//! matches incrementally.

use ahash::AHashMap;
use rustc_hash::FxHashMap;

use crate::archetype::ArchetypeStore;
use crate::component::{ComponentId, ComponentRegistry};
use crate::error::{EcsError, Result};
use crate::layout::Layout;
use crate::mask::{ComponentMask, HashedMask, DEFAULT_MASK_WORDS};

/// Highest archetype id representable by the packed transition-edge key
/// (spec.md §4.4: `archetype_id` is 20 bits).
pub const MAX_ARCHETYPE_ID: u32 = (1 << 20) - 1;

fn pack_edge(archetype_id: u32, component_id: ComponentId, adding: bool) -> u32 {
    debug_assert!(archetype_id <= MAX_ARCHETYPE_ID);
    debug_assert!(component_id.0 <= crate::component::MAX_COMPONENT_TYPE_ID);
    archetype_id | ((component_id.0 as u32) << 20) | ((adding as u32) << 31)
}

/// Owns every live archetype, the mask-to-id interning table, the
/// add/remove transition graph, and the per-query incremental match
/// cache.
pub struct ArchetypeRegistry<const W: usize = DEFAULT_MASK_WORDS> {
    archetypes: Vec<ArchetypeStore<W>>,
    by_mask: FxHashMap<HashedMask<W>, u32>,
    /// Packed `(archetype_id, component_id, direction) -> dest archetype_id`.
    /// Created lazily on first touch, never removed (spec.md §4.4).
    edges: FxHashMap<u32, u32>,
    /// Query descriptions are embedder-defined and comparatively rare
    /// next to mask interning and transition lookups, so this table uses
    /// `ahash` rather than `rustc_hash` — the teacher pack reaches for
    /// `AHashMap` on exactly this kind of lower-frequency lookup table.
    query_cache: AHashMap<QueryKey<W>, QueryCache>,
}

/// `(all, none, any)` bitset triple identifying a query description,
/// used as the query-cache key (spec.md §4.5 "QueryDescription").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryKey<const W: usize = DEFAULT_MASK_WORDS> {
    pub all: ComponentMask<W>,
    pub none: ComponentMask<W>,
    pub any: ComponentMask<W>,
}

impl<const W: usize> QueryKey<W> {
    pub fn matches(&self, archetype_mask: &ComponentMask<W>) -> bool {
        if !archetype_mask.is_superset_of(&self.all) {
            return false;
        }
        if archetype_mask.intersects(&self.none) {
            return false;
        }
        if !self.any.is_empty() && !archetype_mask.intersects(&self.any) {
            return false;
        }
        true
    }
}

/// Cached list of archetype ids matching one `QueryKey`, plus a watermark
/// of how many archetypes existed the last time it was refreshed.
struct QueryCache {
    matching: Vec<u32>,
    archetypes_seen: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryStats {
    pub archetype_count: usize,
    pub edge_count: usize,
}

impl<const W: usize> Default for ArchetypeRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const W: usize> ArchetypeRegistry<W> {
    pub fn new() -> Self {
        Self {
            archetypes: Vec::new(),
            by_mask: FxHashMap::default(),
            edges: FxHashMap::default(),
            query_cache: AHashMap::default(),
        }
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn get(&self, archetype_id: u32) -> Option<&ArchetypeStore<W>> {
        self.archetypes.get(archetype_id as usize)
    }

    pub fn get_mut(&mut self, archetype_id: u32) -> Option<&mut ArchetypeStore<W>> {
        self.archetypes.get_mut(archetype_id as usize)
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            archetype_count: self.archetypes.len(),
            edge_count: self.edges.len(),
        }
    }

    /// Resolve `mask` to its archetype id, creating a fresh
    /// `ArchetypeStore` (and its `Layout`) if this is the first time the
    /// mask is seen.
    pub fn get_or_create(
        &mut self,
        mask: ComponentMask<W>,
        component_registry: &ComponentRegistry,
        chunk_size: usize,
        entity_id_width: u8,
    ) -> Result<u32> {
        let key = HashedMask::new(mask);
        if let Some(&id) = self.by_mask.get(&key) {
            return Ok(id);
        }

        let next_id = self.archetypes.len() as u32;
        if next_id > MAX_ARCHETYPE_ID {
            return Err(EcsError::TooManyArchetypes);
        }

        let layout = Layout::compute(mask, component_registry, chunk_size, entity_id_width)?;
        self.archetypes.push(ArchetypeStore::new(next_id, layout));
        self.by_mask.insert(key, next_id);
        Ok(next_id)
    }

    /// Follow (or lazily create) the transition edge from `archetype_id`
    /// by adding (`adding = true`) or removing (`adding = false`)
    /// `component_id`. O(1) after the first touch (spec.md §4.4).
    pub fn transition(
        &mut self,
        archetype_id: u32,
        component_id: ComponentId,
        adding: bool,
        component_registry: &ComponentRegistry,
        chunk_size: usize,
        entity_id_width: u8,
    ) -> Result<u32> {
        let edge_key = pack_edge(archetype_id, component_id, adding);
        if let Some(&dest) = self.edges.get(&edge_key) {
            return Ok(dest);
        }

        let source_mask = *self
            .archetypes
            .get(archetype_id as usize)
            .ok_or(EcsError::ArchetypeNotFound)?
            .mask();

        let dest_mask = if adding {
            source_mask.with(component_id)
        } else {
            source_mask.without(component_id)
        };

        let dest_id = self.get_or_create(dest_mask, component_registry, chunk_size, entity_id_width)?;
        self.edges.insert(edge_key, dest_id);
        Ok(dest_id)
    }

    /// Move the row at `src_row` in `src_id` into a freshly allocated row
    /// in `dest_id`, copying every component the two archetypes share,
    /// then swap-removes the vacated source row. Returns the row the
    /// entity now occupies in `dest_id`, plus — if the swap-remove pulled
    /// a different entity into `src_row` — that entity's raw index so
    /// the caller can fix up its `EntityLocation`.
    pub fn move_row(
        &mut self,
        src_id: u32,
        src_row: usize,
        dest_id: u32,
        chunk_mgr: &crate::chunk::ChunkManager,
        component_registry: &ComponentRegistry,
    ) -> Result<(usize, Option<u32>)> {
        assert_ne!(src_id, dest_id, "move_row requires distinct archetypes");
        let (src_idx, dest_idx) = (src_id as usize, dest_id as usize);

        let (src, dest) = if src_idx < dest_idx {
            let (left, right) = self.archetypes.split_at_mut(dest_idx);
            (&mut left[src_idx], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(src_idx);
            (&mut right[0], &mut left[dest_idx])
        };

        let dest_row = dest.entity_count();
        dest.allocate_entity(chunk_mgr)?;
        src.copy_shared_components(src_row, dest, dest_row, chunk_mgr, component_registry)?;
        let moved_id = src.read_entity_id(chunk_mgr, src_row)?;
        dest.write_entity_id(chunk_mgr, dest_row, moved_id)?;

        let last_index = src.entity_count() - 1;
        let fixup = if src_row != last_index {
            let tail_id = src.read_entity_id(chunk_mgr, last_index)?;
            src.copy_row_within(last_index, src_row, chunk_mgr, component_registry)?;
            Some(tail_id)
        } else {
            None
        };
        src.swap_remove_bookkeeping(src_row, chunk_mgr)?;

        Ok((dest_row, fixup))
    }

    /// Matching archetype ids for `key`, refreshed incrementally: only
    /// archetypes created since the last call are re-tested (spec.md §4.5
    /// "QueryDescription -> matching archetype list, cached").
    pub fn matching_archetypes(&mut self, key: QueryKey<W>) -> &[u32] {
        let total = self.archetypes.len();
        let entry = self.query_cache.entry(key).or_insert_with(|| QueryCache {
            matching: Vec::new(),
            archetypes_seen: 0,
        });

        if entry.archetypes_seen < total {
            for (id, store) in self.archetypes.iter().enumerate().skip(entry.archetypes_seen) {
                if key.matches(store.mask()) {
                    entry.matching.push(id as u32);
                }
            }
            entry.archetypes_seen = total;
        }

        &entry.matching
    }
}
