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

//! World: central entity, archetype, and chunk storage.

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::chunk::ChunkManager;
use crate::component::{ComponentId, ComponentRegistry};
use crate::config::WorldConfig;
use crate::entity::{Entity, EntityLocation, EntityManager};
use crate::error::{EcsError, Result};
use crate::mask::{ComponentMask, DEFAULT_MASK_WORDS};
use crate::registry::{ArchetypeRegistry, QueryKey, RegistryStats};

/// Snapshot of the world's memory usage, for diagnostics (teacher idiom:
/// `World::memory_stats` in the original profiling tooling).
#[derive(Debug, Clone, Copy)]
pub struct WorldMemoryStats {
    pub alive_entities: usize,
    pub recycled_entities: usize,
    pub archetype_count: usize,
    pub transition_edge_count: usize,
    pub total_chunks: usize,
    pub free_chunks: usize,
    pub chunk_size: usize,
}

/// Central ECS world: owns the entity table, the archetype registry (and
/// its transition graph and query cache), and the chunk allocator.
///
/// `W` picks the `ComponentMask` width; it must satisfy
/// `W * 64 > component_registry.max_component_id()` for every component
/// the world will ever see (spec.md §6).
pub struct World<const W: usize = DEFAULT_MASK_WORDS> {
    config: WorldConfig,
    component_registry: ComponentRegistry,
    entities: EntityManager,
    archetypes: ArchetypeRegistry<W>,
    chunks: ChunkManager,
    empty_archetype_id: u32,
}

impl<const W: usize> World<W> {
    /// Create a world with default configuration.
    pub fn new(component_registry: ComponentRegistry) -> Self {
        Self::with_config(WorldConfig::default(), component_registry)
    }

    /// Create a world with explicit configuration.
    ///
    /// # Panics
    /// Panics if `config` fails [`WorldConfig::validate`], or if `W` is
    /// too narrow for `component_registry`'s highest registered id — both
    /// are build-time configuration errors (spec.md §7).
    pub fn with_config(config: WorldConfig, component_registry: ComponentRegistry) -> Self {
        config.validate().expect("invalid WorldConfig");
        assert!(
            (W * 64) as u32 > component_registry.max_component_id() as u32,
            "ComponentMask width {} (covers {} bits) is too narrow for max component id {}",
            W,
            W * 64,
            component_registry.max_component_id()
        );

        let entities =
            EntityManager::with_capacity(config.entity_id_byte_width, config.default_entity_capacity);
        let mut archetypes = ArchetypeRegistry::new();
        let chunks = ChunkManager::with_capacity(config.chunk_size, config.default_chunk_capacity);

        let empty_archetype_id = archetypes
            .get_or_create(
                ComponentMask::new(),
                &component_registry,
                config.chunk_size,
                config.entity_id_byte_width,
            )
            .expect("the empty archetype must always be constructible");

        Self {
            config,
            component_registry,
            entities,
            archetypes,
            chunks,
            empty_archetype_id,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn component_registry(&self) -> &ComponentRegistry {
        &self.component_registry
    }

    fn mask_from_components(&self, components: &[ComponentId]) -> Result<ComponentMask<W>> {
        let mut mask = ComponentMask::new();
        for &cid in components {
            if !self.component_registry.contains(cid) {
                return Err(EcsError::UnregisteredComponent);
            }
            if !mask.set(cid) {
                return Err(EcsError::InvalidComponentId(cid));
            }
        }
        Ok(mask)
    }

    /// Spawn a new entity with exactly the given component set. Every
    /// component's byte cell is zero-initialized (chunks are always
    /// handed out zeroed, spec.md §4.1); callers write real values with
    /// [`Self::set_component`] afterward.
    pub fn spawn(&mut self, components: &[ComponentId]) -> Result<Entity> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.spawn", component_count = components.len()).entered();

        let mask = self.mask_from_components(components)?;
        let archetype_id = self.archetypes.get_or_create(
            mask,
            &self.component_registry,
            self.config.chunk_size,
            self.config.entity_id_byte_width,
        )?;

        let entity = self.entities.create()?;
        let store = self
            .archetypes
            .get_mut(archetype_id)
            .ok_or(EcsError::ArchetypeNotFound)?;
        let row = store.entity_count();
        store.allocate_entity(&self.chunks)?;
        store.write_entity_id(&self.chunks, row, entity.index)?;

        self.entities
            .set_location(entity, EntityLocation { archetype_id, row })?;
        Ok(entity)
    }

    /// Spawn `count` entities with the same component set. A thin
    /// convenience loop over [`Self::spawn`] — archetype resolution is
    /// already O(1) after the first call, so batching would only save the
    /// mask-building work, not a distinct code path.
    pub fn spawn_batch(&mut self, count: usize, components: &[ComponentId]) -> Result<Vec<Entity>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.spawn(components)?);
        }
        Ok(out)
    }

    /// Destroy an entity, swap-removing its row from its archetype's
    /// storage and fixing up whichever entity the swap relocated.
    pub fn despawn(&mut self, entity: Entity) -> Result<()> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.despawn").entered();

        let location = self.entities.destroy(entity)?;
        let store = self
            .archetypes
            .get_mut(location.archetype_id)
            .ok_or(EcsError::ArchetypeNotFound)?;

        if store.entity_count() == 0 {
            return Err(EcsError::StaleEntity);
        }
        let last_index = store.entity_count() - 1;
        if location.row != last_index {
            let tail_id = store.read_entity_id(&self.chunks, last_index)?;
            store.copy_row_within(last_index, location.row, &self.chunks, &self.component_registry)?;
            self.entities.set_location_by_index(
                tail_id,
                EntityLocation {
                    archetype_id: location.archetype_id,
                    row: location.row,
                },
            )?;
        }
        store.swap_remove_bookkeeping(location.row, &self.chunks)?;
        Ok(())
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn has_component(&self, entity: Entity, component_id: ComponentId) -> Result<bool> {
        let location = self.entities.get_location(entity)?;
        let store = self
            .archetypes
            .get(location.archetype_id)
            .ok_or(EcsError::ArchetypeNotFound)?;
        Ok(store.mask().contains(component_id))
    }

    /// Add `component_id` to `entity`, transitioning it to the archetype
    /// one edge over in the transition graph. No-op if already present.
    pub fn add_component(&mut self, entity: Entity, component_id: ComponentId) -> Result<()> {
        if !self.component_registry.contains(component_id) {
            return Err(EcsError::UnregisteredComponent);
        }
        let location = self.entities.get_location(entity)?;
        let src_mask = *self
            .archetypes
            .get(location.archetype_id)
            .ok_or(EcsError::ArchetypeNotFound)?
            .mask();
        if src_mask.contains(component_id) {
            return Ok(());
        }

        let dest_id = self.archetypes.transition(
            location.archetype_id,
            component_id,
            true,
            &self.component_registry,
            self.config.chunk_size,
            self.config.entity_id_byte_width,
        )?;
        self.move_entity(entity, location, dest_id)
    }

    /// Remove `component_id` from `entity`. No-op if already absent.
    pub fn remove_component(&mut self, entity: Entity, component_id: ComponentId) -> Result<()> {
        let location = self.entities.get_location(entity)?;
        let src_mask = *self
            .archetypes
            .get(location.archetype_id)
            .ok_or(EcsError::ArchetypeNotFound)?
            .mask();
        if !src_mask.contains(component_id) {
            return Ok(());
        }

        let dest_id = self.archetypes.transition(
            location.archetype_id,
            component_id,
            false,
            &self.component_registry,
            self.config.chunk_size,
            self.config.entity_id_byte_width,
        )?;
        self.move_entity(entity, location, dest_id)
    }

    fn move_entity(&mut self, entity: Entity, location: EntityLocation, dest_id: u32) -> Result<()> {
        let (dest_row, fixup) = self.archetypes.move_row(
            location.archetype_id,
            location.row,
            dest_id,
            &self.chunks,
            &self.component_registry,
        )?;
        if let Some(tail_index) = fixup {
            self.entities.set_location_by_index(
                tail_index,
                EntityLocation {
                    archetype_id: location.archetype_id,
                    row: location.row,
                },
            )?;
        }
        self.entities.set_location(
            entity,
            EntityLocation {
                archetype_id: dest_id,
                row: dest_row,
            },
        )
    }

    /// Raw byte pointer to `entity`'s cell for `component_id`. `Ok(None)`
    /// if the entity does not carry that component.
    ///
    /// # Safety
    /// Caller must not retain the pointer across a structural change to
    /// `entity`'s archetype.
    pub unsafe fn get_component_ptr(
        &self,
        entity: Entity,
        component_id: ComponentId,
    ) -> Result<Option<*mut u8>> {
        let location = self.entities.get_location(entity)?;
        let store = self
            .archetypes
            .get(location.archetype_id)
            .ok_or(EcsError::ArchetypeNotFound)?;
        store.component_ptr(&self.chunks, location.row, component_id, &self.component_registry)
    }

    /// Copy `value` into `entity`'s cell for `component_id`. `value.len()`
    /// must equal the component's registered size.
    pub fn set_component(&self, entity: Entity, component_id: ComponentId, value: &[u8]) -> Result<()> {
        let info = self
            .component_registry
            .get(component_id)
            .ok_or(EcsError::UnregisteredComponent)?;
        if value.len() != info.size as usize {
            return Err(EcsError::ComponentSizeMismatch);
        }
        // SAFETY: caller owns `entity`'s archetype for the duration of
        // this synchronous call; no other structural change runs
        // concurrently (spec.md §5).
        unsafe {
            match self.get_component_ptr(entity, component_id)? {
                Some(ptr) => {
                    std::ptr::copy_nonoverlapping(value.as_ptr(), ptr, value.len());
                    Ok(())
                }
                None => Err(EcsError::ComponentNotFound),
            }
        }
    }

    /// Read `entity`'s cell for `component_id` into a freshly allocated
    /// `Vec<u8>`.
    pub fn get_component(&self, entity: Entity, component_id: ComponentId) -> Result<Vec<u8>> {
        let info = self
            .component_registry
            .get(component_id)
            .ok_or(EcsError::UnregisteredComponent)?;
        // SAFETY: see `set_component`.
        unsafe {
            match self.get_component_ptr(entity, component_id)? {
                Some(ptr) => Ok(std::slice::from_raw_parts(ptr, info.size as usize).to_vec()),
                None => Err(EcsError::ComponentNotFound),
            }
        }
    }

    pub fn empty_archetype_id(&self) -> u32 {
        self.empty_archetype_id
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.archetypes.stats()
    }

    /// Run `f` once per live entity id across every archetype matching
    /// `key` (spec.md §4.5's entity-id enumerator).
    pub fn for_each_entity_id(&mut self, key: QueryKey<W>, f: impl FnMut(u32)) -> Result<()> {
        crate::query::for_each_entity_id(key, &mut self.archetypes, &self.chunks, f)
    }

    /// Run `f` once per chunk across every archetype matching `key`
    /// (spec.md §4.5's chunk enumerator).
    pub fn for_each_chunk(
        &mut self,
        key: QueryKey<W>,
        f: impl FnMut(u32, usize, crate::query::ChunkView<'_>),
    ) -> Result<()> {
        crate::query::for_each_chunk(key, &mut self.archetypes, &self.chunks, f)
    }

    /// Run `f` once per archetype matching `key`, without visiting chunks
    /// (spec.md §4.5's archetype enumerator).
    pub fn for_each_archetype(&mut self, key: QueryKey<W>, f: impl FnMut(u32)) {
        crate::query::for_each_archetype(key, &mut self.archetypes, f)
    }

    /// Diagnostic snapshot of entity, archetype, and chunk memory usage.
    pub fn memory_stats(&self) -> WorldMemoryStats {
        let chunk_stats = self.chunks.stats();
        let registry_stats = self.archetypes.stats();
        WorldMemoryStats {
            alive_entities: self.entities.alive_count(),
            recycled_entities: self.entities.recycled_count(),
            archetype_count: registry_stats.archetype_count,
            transition_edge_count: registry_stats.edge_count,
            total_chunks: chunk_stats.total_slots,
            free_chunks: chunk_stats.free_slots,
            chunk_size: chunk_stats.chunk_size,
        }
    }

    /// Tear down every entity and archetype, releasing all chunks back to
    /// a fresh allocator. The component registry and configuration
    /// survive (they are build-time, not per-instance, state).
    pub fn clear(&mut self) {
        self.entities = EntityManager::with_capacity(
            self.config.entity_id_byte_width,
            self.config.default_entity_capacity,
        );
        self.archetypes = ArchetypeRegistry::new();
        self.chunks =
            ChunkManager::with_capacity(self.config.chunk_size, self.config.default_chunk_capacity);
        self.empty_archetype_id = self
            .archetypes
            .get_or_create(
                ComponentMask::new(),
                &self.component_registry,
                self.config.chunk_size,
                self.config.entity_id_byte_width,
            )
            .expect("the empty archetype must always be constructible");
    }
}
