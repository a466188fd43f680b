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

//! Runtime-tunable `World` configuration.
//!
//! The component-mask width is a compile-time choice (the `W` const
//! generic parameter on `World<W>`/`ComponentMask<W>`), since it sizes an
//! inline array; everything else that's a pure runtime tradeoff lives
//! here.

/// Default chunk size: 16 KiB (spec.md §6).
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Default entity-id column width: 4 bytes, i.e. up to `u32::MAX`
/// distinct live entities (spec.md §6).
pub const DEFAULT_ENTITY_ID_BYTE_WIDTH: u8 = 4;

/// Tunable knobs for one `World`. Immutable for the `World`'s lifetime:
/// changing chunk size or entity-id width after entities exist would
/// invalidate every `Layout` already computed from them.
#[derive(Debug, Clone, Copy)]
pub struct WorldConfig {
    /// Byte size of every chunk handed out by the `ChunkManager`. Must be
    /// at least 256 bytes (spec.md §6).
    pub chunk_size: usize,

    /// Width, in bytes, of the entity-id column stored in every chunk.
    /// One of 1, 2, or 4; bounds the number of entities a `World` can
    /// have alive at once (spec.md §6).
    pub entity_id_byte_width: u8,

    /// Hint for how many entities the `EntityManager`'s slot table should
    /// reserve up front, to avoid early reallocation.
    pub default_entity_capacity: usize,

    /// Hint for how many chunk slots the `ChunkManager`'s metadata table
    /// should reserve up front.
    pub default_chunk_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            entity_id_byte_width: DEFAULT_ENTITY_ID_BYTE_WIDTH,
            default_entity_capacity: 1024,
            default_chunk_capacity: 64,
        }
    }
}

impl WorldConfig {
    /// Validate the config's own internal invariants (spec.md §6): chunk
    /// size floor and a legal entity-id width. Does not (and cannot)
    /// check that `mask_width > max_component_id`, since mask width is a
    /// compile-time parameter the caller chose by picking `World<W>`.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.chunk_size < 256 {
            return Err("chunk_size must be >= 256 bytes");
        }
        if !matches!(self.entity_id_byte_width, 1 | 2 | 4) {
            return Err("entity_id_byte_width must be 1, 2, or 4");
        }
        Ok(())
    }
}
