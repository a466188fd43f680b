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

//! Struct-of-Arrays layout for a given component-set mask.

use smallvec::SmallVec;

use crate::component::{ComponentId, ComponentRegistry};
use crate::error::{EcsError, Result};
use crate::mask::{ComponentMask, DEFAULT_MASK_WORDS};
use crate::utils::align_to;

/// Archetypes with more distinct component types than this spill the
/// packing pass's scratch list onto the heap; most real archetypes stay
/// well under it (teacher idiom: bundles sized against `SmallVec<[_; 8]>`
/// rather than a bare `Vec`).
const INLINE_COMPONENTS: usize = 8;

/// Precomputed SoA placement for one archetype mask: the byte offset of
/// each present component's column within a chunk, the entity-id column
/// width, and how many entities fit per chunk.
///
/// A pure function of `(mask, registry, chunk_size, entity_id_width)`:
/// two `Layout`s built from the same inputs agree on every field
/// (spec.md §8 "Round-trip and idempotence laws").
#[derive(Debug, Clone)]
pub struct Layout<const W: usize = DEFAULT_MASK_WORDS> {
    mask: ComponentMask<W>,
    entities_per_chunk: usize,
    entity_id_width: u8,
    min_cid: u16,
    /// Dense, indexed by `cid - min_cid`; `-1` means absent.
    base_offset: Box<[i32]>,
}

impl<const W: usize> Layout<W> {
    /// Entity-id column always starts at byte 0 of a chunk (spec.md §6).
    pub const ENTITY_ID_COLUMN_OFFSET: usize = 0;

    pub fn compute(
        mask: ComponentMask<W>,
        registry: &ComponentRegistry,
        chunk_size: usize,
        entity_id_width: u8,
    ) -> Result<Self> {
        let bounds = mask.bounds();

        let (min_cid, max_cid) = match bounds {
            Some(b) => b,
            None => {
                // Empty mask: only the entity-id column exists.
                return Ok(Self {
                    mask,
                    entities_per_chunk: chunk_size,
                    entity_id_width,
                    min_cid: 0,
                    base_offset: Box::new([]),
                });
            }
        };

        let span = (max_cid - min_cid + 1) as usize;
        let mut base_offset = vec![-1i32; span];

        // Resolve metadata for every present component up front.
        struct Entry {
            cid: ComponentId,
            size: u16,
            alignment: u8,
        }
        let mut entries: SmallVec<[Entry; INLINE_COMPONENTS]> = SmallVec::new();
        for bit in mask.ones() {
            let cid = ComponentId(bit as u16);
            let info = registry.get(cid).ok_or(EcsError::UnregisteredComponent)?;
            entries.push(Entry {
                cid,
                size: info.size,
                alignment: info.alignment,
            });
        }

        let per_entity: usize = entries.iter().map(|e| e.size as usize).sum();

        if per_entity == 0 {
            // Only tag (zero-size) components: entity-id column dominates
            // (spec.md §8 boundary behavior).
            for e in &entries {
                base_offset[(e.cid.0 - min_cid) as usize] = 0;
            }
            return Ok(Self {
                mask,
                entities_per_chunk: chunk_size,
                entity_id_width,
                min_cid,
                base_offset: base_offset.into_boxed_slice(),
            });
        }

        let mut entities_per_chunk = (chunk_size / per_entity).max(1);

        loop {
            let mut running = entity_id_width as usize * entities_per_chunk;
            for e in &entries {
                if e.size == 0 {
                    base_offset[(e.cid.0 - min_cid) as usize] = 0;
                    continue;
                }
                running = align_to(running, e.alignment as usize);
                base_offset[(e.cid.0 - min_cid) as usize] = running as i32;
                running += e.size as usize * entities_per_chunk;
            }

            if running <= chunk_size {
                break;
            }

            entities_per_chunk -= 1;
            if entities_per_chunk == 0 {
                panic!(
                    "chunk_size {chunk_size} cannot fit even a single entity for this component set \
                     (per-entity size {per_entity} bytes) — this is a configuration error, not a \
                     runtime condition"
                );
            }
        }

        Ok(Self {
            mask,
            entities_per_chunk,
            entity_id_width,
            min_cid,
            base_offset: base_offset.into_boxed_slice(),
        })
    }

    pub fn mask(&self) -> &ComponentMask<W> {
        &self.mask
    }

    pub fn entities_per_chunk(&self) -> usize {
        self.entities_per_chunk
    }

    pub fn entity_id_width(&self) -> u8 {
        self.entity_id_width
    }

    /// Byte offset from chunk start to component `cid`'s column, or
    /// `None` if `cid` is absent from this layout's mask.
    pub fn base_offset(&self, cid: ComponentId) -> Option<usize> {
        if !self.mask.contains(cid) {
            return None;
        }
        if cid.0 < self.min_cid {
            return None;
        }
        let idx = (cid.0 - self.min_cid) as usize;
        let offset = *self.base_offset.get(idx)?;
        if offset < 0 {
            None
        } else {
            Some(offset as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentGuid;

    fn registry_abc() -> ComponentRegistry {
        let mut b = ComponentRegistry::builder();
        b.register_pinned("A", 1, 1, ComponentGuid(1), ComponentId(0));
        b.register_pinned("B", 8, 8, ComponentGuid(2), ComponentId(1));
        b.register_pinned("C", 4, 4, ComponentGuid(3), ComponentId(2));
        b.build()
    }

    #[test]
    fn layout_determinism_scenario() {
        // spec.md §8 scenario 3.
        let registry = registry_abc();
        let mask = ComponentMask::<DEFAULT_MASK_WORDS>::new()
            .with(ComponentId(0))
            .with(ComponentId(1))
            .with(ComponentId(2));

        let l1 = Layout::compute(mask, &registry, 64, 2).unwrap();
        let l2 = Layout::compute(mask, &registry, 64, 2).unwrap();

        assert_eq!(l1.entities_per_chunk(), l2.entities_per_chunk());
        for cid in [0u16, 1, 2] {
            assert_eq!(l1.base_offset(ComponentId(cid)), l2.base_offset(ComponentId(cid)));
        }

        // every present column must be aligned and fit within chunk_size.
        let epc = l1.entities_per_chunk();
        let infos = [(0u16, 1usize, 1usize), (1, 8, 8), (2, 4, 4)];
        for (cid, size, alignment) in infos {
            let off = l1.base_offset(ComponentId(cid)).unwrap();
            assert_eq!(off % alignment, 0);
            assert!(off + size * epc <= 64);
        }
    }

    #[test]
    fn empty_mask_uses_full_chunk_for_entity_ids() {
        let registry = ComponentRegistry::builder().build();
        let mask = ComponentMask::<DEFAULT_MASK_WORDS>::new();
        let layout = Layout::compute(mask, &registry, 1024, 4).unwrap();
        assert_eq!(layout.entities_per_chunk(), 1024);
    }

    #[test]
    fn tag_only_mask_dominates_with_entity_id_column() {
        let mut b = ComponentRegistry::builder();
        b.register_pinned("Tag", 0, 1, ComponentGuid(1), ComponentId(0));
        let registry = b.build();
        let mask = ComponentMask::<DEFAULT_MASK_WORDS>::new().with(ComponentId(0));

        let layout = Layout::compute(mask, &registry, 512, 2).unwrap();
        assert_eq!(layout.entities_per_chunk(), 512);
        assert_eq!(layout.base_offset(ComponentId(0)), Some(0));
    }

    #[test]
    fn unregistered_component_is_an_error() {
        let registry = ComponentRegistry::builder().build();
        let mask = ComponentMask::<DEFAULT_MASK_WORDS>::new().with(ComponentId(0));
        assert_eq!(
            Layout::compute(mask, &registry, 256, 4).unwrap_err(),
            EcsError::UnregisteredComponent
        );
    }
}
