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

//! Query system: `(all, none, any)` archetype matching with three
//! enumerator granularities (archetype, chunk, entity-id) plus a
//! zero-allocation chunk view over component columns.

use crate::chunk::ChunkManager;
use crate::component::{ComponentId, ComponentRegistry};
use crate::error::Result;
use crate::mask::{ComponentMask, DEFAULT_MASK_WORDS};
use crate::registry::{ArchetypeRegistry, QueryKey};

/// Fluent builder for a `(all, none, any)` query description (spec.md
/// §4.5). `all` requires the bit; `none` excludes it; `any` requires at
/// least one bit from the set if the set is non-empty.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<const W: usize = DEFAULT_MASK_WORDS> {
    all: ComponentMask<W>,
    none: ComponentMask<W>,
    any: ComponentMask<W>,
}

impl<const W: usize> Default for QueryBuilder<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const W: usize> QueryBuilder<W> {
    pub fn new() -> Self {
        Self {
            all: ComponentMask::new(),
            none: ComponentMask::new(),
            any: ComponentMask::new(),
        }
    }

    pub fn with(mut self, id: ComponentId) -> Self {
        self.all.set(id);
        self
    }

    pub fn without(mut self, id: ComponentId) -> Self {
        self.none.set(id);
        self
    }

    pub fn with_any(mut self, id: ComponentId) -> Self {
        self.any.set(id);
        self
    }

    pub fn build(self) -> QueryKey<W> {
        QueryKey {
            all: self.all,
            none: self.none,
            any: self.any,
        }
    }
}

/// Zero-allocation view over one chunk's live rows, scoped to the
/// archetype's `Layout`. Dropped (and the chunk borrow released) before
/// the iterator advances to the next chunk.
pub struct ChunkView<'a> {
    bytes: &'a [u8],
    entity_id_width: u8,
    len: usize,
}

impl<'a> ChunkView<'a> {
    /// Live entity rows in this chunk.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw entity-id column value at `row`.
    pub fn entity_id(&self, row: usize) -> u32 {
        let width = self.entity_id_width as usize;
        let start = row * width;
        let slice = &self.bytes[start..start + width];
        match width {
            1 => slice[0] as u32,
            2 => u16::from_le_bytes([slice[0], slice[1]]) as u32,
            4 => u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]),
            _ => unreachable!("entity_id_byte_width must be 1, 2, or 4"),
        }
    }

    /// Borrow component `cid`'s column for this chunk as raw bytes,
    /// bounded to exactly the chunk's live rows (`len() * stride` bytes
    /// starting at `base_offset`) — trailing allocated-but-unused rows in
    /// a partially-filled chunk are never reachable through this span
    /// (spec.md §4.7 "a contiguous typed span `[0, live_count)`").
    /// `base_offset`/`stride` come from the archetype's `Layout`
    /// (`Layout::base_offset` and the component's registered size).
    pub fn component_column(&self, base_offset: usize, stride: usize) -> &'a [u8] {
        let len = stride * self.len;
        &self.bytes[base_offset..base_offset + len]
    }
}

/// Run `f` once per chunk of every archetype matching `key`, skipping
/// archetypes with zero live entities implicitly (an empty chunk list
/// yields no iterations — spec.md §9 Open Question (c)).
pub fn for_each_chunk<const W: usize>(
    key: QueryKey<W>,
    registry: &mut ArchetypeRegistry<W>,
    chunk_mgr: &ChunkManager,
    mut f: impl FnMut(u32, usize, ChunkView<'_>),
) -> Result<()> {
    let matching: Vec<u32> = registry.matching_archetypes(key).to_vec();
    for archetype_id in matching {
        let Some(store) = registry.get(archetype_id) else { continue };
        let entity_id_width = store.layout().entity_id_width();
        for (chunk_index, &handle) in store.chunks().iter().enumerate() {
            let live = store.live_count_in_chunk(chunk_index);
            if live == 0 {
                continue;
            }
            let bytes = chunk_mgr.get(handle)?;
            let view = ChunkView {
                bytes,
                entity_id_width,
                len: live,
            };
            f(archetype_id, chunk_index, view);
        }
    }
    Ok(())
}

/// Run `f` once per matching archetype id, without touching chunks.
pub fn for_each_archetype<const W: usize>(
    key: QueryKey<W>,
    registry: &mut ArchetypeRegistry<W>,
    mut f: impl FnMut(u32),
) {
    let matching: Vec<u32> = registry.matching_archetypes(key).to_vec();
    for id in matching {
        f(id);
    }
}

/// Run `f` once per live entity id across every chunk of every matching
/// archetype. Built on [`for_each_chunk`]; the coarser granularity a
/// caller wants to pay less per-chunk overhead, the finer lets them
/// avoid re-deriving offsets themselves.
pub fn for_each_entity_id<const W: usize>(
    key: QueryKey<W>,
    registry: &mut ArchetypeRegistry<W>,
    chunk_mgr: &ChunkManager,
    mut f: impl FnMut(u32),
) -> Result<()> {
    for_each_chunk(key, registry, chunk_mgr, |_archetype_id, _chunk_index, view| {
        for row in 0..view.len() {
            f(view.entity_id(row));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentGuid;
    use crate::config::WorldConfig;
    use crate::world::World;

    fn registry_ab() -> ComponentRegistry {
        let mut b = ComponentRegistry::builder();
        b.register_pinned("A", 4, 4, ComponentGuid(1), ComponentId(0));
        b.register_pinned("B", 4, 4, ComponentGuid(2), ComponentId(1));
        b.build()
    }

    #[test]
    fn query_builder_produces_expected_key() {
        let key = QueryBuilder::<DEFAULT_MASK_WORDS>::new()
            .with(ComponentId(0))
            .without(ComponentId(1))
            .build();
        assert!(key.all.contains(ComponentId(0)));
        assert!(key.none.contains(ComponentId(1)));
    }

    #[test]
    fn for_each_entity_id_visits_every_spawned_entity() {
        let component_registry = registry_ab();
        let mut world = World::with_config(WorldConfig::default(), component_registry);
        let mut spawned = Vec::new();
        for _ in 0..10 {
            let e = world.spawn(&[ComponentId(0)]).unwrap();
            spawned.push(e);
        }

        let key = QueryBuilder::<DEFAULT_MASK_WORDS>::new().with(ComponentId(0)).build();
        let mut seen = Vec::new();
        world.for_each_entity_id(key, |id| seen.push(id)).unwrap();
        assert_eq!(seen.len(), 10);
    }

    // spec.md §4.7: a chunk view's component column is bounded to
    // `[0, live_count)`, never the full `entities_per_chunk`-wide column.
    #[test]
    fn chunk_view_component_column_exposes_only_live_rows() {
        let component_registry = registry_ab();
        let config = WorldConfig::default();
        let mut world = World::with_config(config, component_registry.clone());

        let values = [10u32, 20, 30];
        for &v in &values {
            let e = world.spawn(&[ComponentId(0)]).unwrap();
            world.set_component(e, ComponentId(0), &v.to_le_bytes()).unwrap();
        }

        let mask = ComponentMask::<DEFAULT_MASK_WORDS>::new().with(ComponentId(0));
        let layout =
            crate::layout::Layout::compute(mask, &component_registry, config.chunk_size, config.entity_id_byte_width)
                .unwrap();
        let base_offset = layout.base_offset(ComponentId(0)).unwrap();

        let key = QueryBuilder::<DEFAULT_MASK_WORDS>::new().with(ComponentId(0)).build();
        let mut read_values = Vec::new();
        world
            .for_each_chunk(key, |_archetype_id, _chunk_index, view| {
                let column = view.component_column(base_offset, 4);
                assert_eq!(column.len(), view.len() * 4);
                for cell in column.chunks_exact(4) {
                    read_values.push(u32::from_le_bytes(cell.try_into().unwrap()));
                }
            })
            .unwrap();

        read_values.sort_unstable();
        let mut expected = values.to_vec();
        expected.sort_unstable();
        assert_eq!(read_values, expected);
    }
}
