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

//! Archetype storage: owns the chunks for one unique component set and
//! implements swap-remove entity deletion.

use crate::chunk::{ChunkHandle, ChunkManager};
use crate::component::{ComponentId, ComponentRegistry};
use crate::error::Result;
use crate::layout::Layout;
use crate::mask::{ComponentMask, DEFAULT_MASK_WORDS};

/// `(chunk_index, intra_chunk_slot)` decomposition of a global index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSlot {
    pub chunk_index: usize,
    pub slot: usize,
}

/// Owns the ordered chunk list for one archetype; implements
/// allocate/remove with swap-remove semantics.
pub struct ArchetypeStore<const W: usize = DEFAULT_MASK_WORDS> {
    archetype_id: u32,
    layout: Layout<W>,
    chunks: Vec<ChunkHandle>,
    entity_count: usize,
}

impl<const W: usize> ArchetypeStore<W> {
    pub fn new(archetype_id: u32, layout: Layout<W>) -> Self {
        assert!(archetype_id < (1 << 20), "archetype id must fit in 20 bits");
        Self {
            archetype_id,
            layout,
            chunks: Vec::new(),
            entity_count: 0,
        }
    }

    pub fn archetype_id(&self) -> u32 {
        self.archetype_id
    }

    pub fn mask(&self) -> &ComponentMask<W> {
        self.layout.mask()
    }

    pub fn layout(&self) -> &Layout<W> {
        &self.layout
    }

    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count == 0
    }

    pub fn get_chunk(&self, chunk_index: usize) -> Option<ChunkHandle> {
        self.chunks.get(chunk_index).copied()
    }

    pub fn chunks(&self) -> &[ChunkHandle] {
        &self.chunks
    }

    fn decompose(&self, global_index: usize) -> ChunkSlot {
        let epc = self.layout.entities_per_chunk();
        ChunkSlot {
            chunk_index: global_index / epc,
            slot: global_index % epc,
        }
    }

    /// Live entity count occupying a given chunk.
    pub fn live_count_in_chunk(&self, chunk_index: usize) -> usize {
        let epc = self.layout.entities_per_chunk();
        let start = chunk_index * epc;
        if start >= self.entity_count {
            0
        } else {
            (self.entity_count - start).min(epc)
        }
    }

    /// Reserve a new row, growing the chunk list by one if the current
    /// last chunk is full. Returns the chunk handle and intra-chunk slot.
    pub fn allocate_entity(&mut self, chunk_mgr: &ChunkManager) -> Result<(ChunkHandle, usize)> {
        let epc = self.layout.entities_per_chunk();
        let global_index = self.entity_count;
        let needed_chunks = global_index / epc + 1;
        while self.chunks.len() < needed_chunks {
            let handle = chunk_mgr.allocate()?;
            self.chunks.push(handle);
        }
        self.entity_count += 1;
        let loc = self.decompose(global_index);
        Ok((self.chunks[loc.chunk_index], loc.slot))
    }

    /// Drop the last row and, if its chunk is now fully empty, free it.
    /// Returns the global index of the entity that *was* last (the one the
    /// caller must have already copied into the vacated slot via
    /// [`Self::copy_row_within`]), or `None` if the removed row was itself
    /// the last one.
    pub fn swap_remove_bookkeeping(
        &mut self,
        global_index: usize,
        chunk_mgr: &ChunkManager,
    ) -> Result<Option<usize>> {
        if global_index >= self.entity_count {
            return Ok(None);
        }
        let last_index = self.entity_count - 1;
        self.entity_count -= 1;

        let epc = self.layout.entities_per_chunk();
        // Free trailing chunks once they hold zero live entities. Never
        // touch the head chunk of a still-nonempty archetype.
        while let Some(&last_chunk) = self.chunks.last() {
            let last_chunk_start = (self.chunks.len() - 1) * epc;
            if self.entity_count <= last_chunk_start {
                chunk_mgr.free(last_chunk)?;
                self.chunks.pop();
            } else {
                break;
            }
        }

        if global_index == last_index {
            Ok(None)
        } else {
            Ok(Some(last_index))
        }
    }

    /// `(chunk, slot)` for a global index, without mutating anything.
    pub fn locate(&self, global_index: usize) -> Option<ChunkSlot> {
        if global_index >= self.entity_count {
            return None;
        }
        Some(self.decompose(global_index))
    }

    /// Read the entity id stored in the id column at `global_index`.
    pub fn read_entity_id(&self, chunk_mgr: &ChunkManager, global_index: usize) -> Result<u32> {
        let loc = self.decompose(global_index);
        let handle = self.chunks[loc.chunk_index];
        let bytes = chunk_mgr.get(handle)?;
        let width = self.layout.entity_id_width() as usize;
        let start = loc.slot * width;
        Ok(read_width(&bytes[start..start + width], width))
    }

    /// Write the entity id into the id column at `global_index`.
    pub fn write_entity_id(
        &self,
        chunk_mgr: &ChunkManager,
        global_index: usize,
        entity_id: u32,
    ) -> Result<()> {
        let loc = self.decompose(global_index);
        let handle = self.chunks[loc.chunk_index];
        let width = self.layout.entity_id_width() as usize;
        let start = loc.slot * width;
        // SAFETY: no other component/id-column borrow of this chunk is
        // held across this call (World serializes structural changes,
        // spec.md §5).
        unsafe {
            let ptr = chunk_mgr.get_mut(handle)?;
            write_width(std::slice::from_raw_parts_mut(ptr.add(start), width), entity_id, width);
        }
        Ok(())
    }

    /// Byte pointer to component `cid`'s cell at `global_index`, or
    /// `None` if `cid` is not present in this archetype.
    ///
    /// # Safety
    /// Caller must not retain the pointer across another structural
    /// change to this chunk.
    pub unsafe fn component_ptr(
        &self,
        chunk_mgr: &ChunkManager,
        global_index: usize,
        cid: ComponentId,
        registry: &ComponentRegistry,
    ) -> Result<Option<*mut u8>> {
        let Some(base) = self.layout.base_offset(cid) else {
            return Ok(None);
        };
        let Some(info) = registry.get(cid) else {
            return Ok(None);
        };
        let loc = self.decompose(global_index);
        let handle = self.chunks[loc.chunk_index];
        let offset = base + loc.slot * info.size as usize;
        let ptr = chunk_mgr.get_mut(handle)?;
        Ok(Some(ptr.add(offset)))
    }

    /// Copy every component present in both `self` and `dst`'s layout
    /// from `(self, src_index)` to `(dst, dst_index)`, byte for byte.
    /// Used by `World` when moving an entity across a structural
    /// transition (add/remove component).
    pub fn copy_shared_components(
        &self,
        src_index: usize,
        dst: &Self,
        dst_index: usize,
        chunk_mgr: &ChunkManager,
        registry: &ComponentRegistry,
    ) -> Result<()> {
        for bit in self.mask().intersection(dst.mask()).ones() {
            let cid = ComponentId(bit as u16);
            let Some(info) = registry.get(cid) else { continue };
            if info.size == 0 {
                continue;
            }
            // SAFETY: src and dst rows never alias (different archetype
            // storage, or a freshly allocated row in the same one).
            unsafe {
                let Some(src_ptr) = self.component_ptr(chunk_mgr, src_index, cid, registry)? else {
                    continue;
                };
                let Some(dst_ptr) = dst.component_ptr(chunk_mgr, dst_index, cid, registry)? else {
                    continue;
                };
                std::ptr::copy_nonoverlapping(src_ptr, dst_ptr, info.size as usize);
            }
        }
        Ok(())
    }

    /// Copy the full row (every present component plus the entity-id
    /// cell) from `src_index` to `dst_index` within the *same* archetype —
    /// used by swap-remove to move the last row into the vacated slot.
    pub fn copy_row_within(
        &self,
        src_index: usize,
        dst_index: usize,
        chunk_mgr: &ChunkManager,
        registry: &ComponentRegistry,
    ) -> Result<()> {
        for bit in self.mask().ones() {
            let cid = ComponentId(bit as u16);
            let Some(info) = registry.get(cid) else { continue };
            if info.size == 0 {
                continue;
            }
            unsafe {
                let Some(src_ptr) = self.component_ptr(chunk_mgr, src_index, cid, registry)? else {
                    continue;
                };
                let Some(dst_ptr) = self.component_ptr(chunk_mgr, dst_index, cid, registry)? else {
                    continue;
                };
                std::ptr::copy_nonoverlapping(src_ptr, dst_ptr, info.size as usize);
            }
        }
        let moved_id = self.read_entity_id(chunk_mgr, src_index)?;
        self.write_entity_id(chunk_mgr, dst_index, moved_id)?;
        Ok(())
    }

    /// Release every chunk back to the manager. Used when an archetype is
    /// torn down entirely (`World::clear`).
    pub fn free_all_chunks(&mut self, chunk_mgr: &ChunkManager) -> Result<()> {
        for handle in self.chunks.drain(..) {
            chunk_mgr.free(handle)?;
        }
        self.entity_count = 0;
        Ok(())
    }
}

fn read_width(bytes: &[u8], width: usize) -> u32 {
    match width {
        1 => bytes[0] as u32,
        2 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
        4 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        _ => unreachable!("entity_id_byte_width must be 1, 2, or 4"),
    }
}

fn write_width(bytes: &mut [u8], value: u32, width: usize) {
    match width {
        1 => bytes[0] = value as u8,
        2 => bytes[..2].copy_from_slice(&(value as u16).to_le_bytes()),
        4 => bytes[..4].copy_from_slice(&value.to_le_bytes()),
        _ => unreachable!("entity_id_byte_width must be 1, 2, or 4"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentGuid;

    fn registry_p() -> ComponentRegistry {
        let mut b = ComponentRegistry::builder();
        b.register_pinned("P", 12, 4, ComponentGuid(1), ComponentId(0));
        b.build()
    }

    #[test]
    fn allocate_grows_chunks_as_needed() {
        let registry = registry_p();
        let mgr = ChunkManager::new(256);
        let mask = ComponentMask::<DEFAULT_MASK_WORDS>::new().with(ComponentId(0));
        let layout = Layout::compute(mask, &registry, 256, 4).unwrap();
        let epc = layout.entities_per_chunk();
        let mut store = ArchetypeStore::new(0, layout);

        for _ in 0..epc + 1 {
            store.allocate_entity(&mgr).unwrap();
        }
        assert_eq!(store.chunk_count(), 2);
        assert_eq!(store.entity_count(), epc + 1);
    }

    #[test]
    fn removing_last_entity_in_last_chunk_frees_it() {
        let registry = registry_p();
        let mgr = ChunkManager::new(256);
        let mask = ComponentMask::<DEFAULT_MASK_WORDS>::new().with(ComponentId(0));
        let layout = Layout::compute(mask, &registry, 256, 4).unwrap();
        let mut store = ArchetypeStore::new(0, layout);

        store.allocate_entity(&mgr).unwrap();
        store.allocate_entity(&mgr).unwrap();
        assert_eq!(store.chunk_count(), 1);

        store.swap_remove_bookkeeping(1, &mgr).unwrap();
        assert_eq!(store.entity_count(), 1);
        // chunk still holds one live entity; must not be freed.
        assert_eq!(store.chunk_count(), 1);

        store.swap_remove_bookkeeping(0, &mgr).unwrap();
        assert_eq!(store.entity_count(), 0);
        assert_eq!(store.chunk_count(), 0);
    }

    #[test]
    fn swap_remove_reports_moved_index() {
        let registry = registry_p();
        let mgr = ChunkManager::new(256);
        let mask = ComponentMask::<DEFAULT_MASK_WORDS>::new().with(ComponentId(0));
        let layout = Layout::compute(mask, &registry, 256, 4).unwrap();
        let mut store = ArchetypeStore::new(0, layout);

        store.allocate_entity(&mgr).unwrap();
        store.allocate_entity(&mgr).unwrap();
        store.allocate_entity(&mgr).unwrap();

        let moved = store.swap_remove_bookkeeping(0, &mgr).unwrap();
        assert_eq!(moved, Some(2));
        assert_eq!(store.entity_count(), 2);
    }
}
