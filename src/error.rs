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

//! Error types for the ECS core.

use std::fmt;

use crate::component::ComponentId;

/// ECS core error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Operated on an entity id that was never issued, or has since been
    /// destroyed (generation mismatch).
    StaleEntity,

    /// Chunk handle generation does not match the manager's current
    /// generation for that id.
    StaleChunk,

    /// Component type was never registered in the `ComponentRegistry`.
    UnregisteredComponent,

    /// Component id is outside `[0, MaxComponentTypeId]`.
    InvalidComponentId(ComponentId),

    /// Entity does not carry the requested component.
    ComponentNotFound,

    /// Payload passed to `set_component` does not match the component's
    /// registered size.
    ComponentSizeMismatch,

    /// Archetype id did not resolve to a live archetype.
    ArchetypeNotFound,

    /// Structural-change graph would need an archetype id beyond `2^20 - 1`.
    TooManyArchetypes,

    /// Backing allocator failed to supply a chunk.
    OutOfMemory,

    /// Entity id would exceed the configured `entity_id_byte_width` range.
    CapacityExceeded,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::StaleEntity => write!(f, "stale or unknown entity"),
            EcsError::StaleChunk => write!(f, "stale chunk handle"),
            EcsError::UnregisteredComponent => write!(f, "component type not registered"),
            EcsError::InvalidComponentId(id) => write!(f, "invalid component id {}", id.0),
            EcsError::ComponentNotFound => write!(f, "entity does not have component"),
            EcsError::ComponentSizeMismatch => write!(f, "component payload size does not match registered size"),
            EcsError::ArchetypeNotFound => write!(f, "archetype not found"),
            EcsError::TooManyArchetypes => write!(f, "archetype id space exhausted (2^20 - 1)"),
            EcsError::OutOfMemory => write!(f, "chunk allocator out of memory"),
            EcsError::CapacityExceeded => write!(f, "entity id capacity exceeded"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EcsError>;
