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

//! Archetype ECS core — chunked Struct-of-Arrays component storage, an
//! archetype registry with a cached structural-change transition graph,
//! and archetype/chunk/entity-id query enumerators.
//!
//! This crate is the storage and query engine only: it has no concept of
//! systems, scheduling, or typed component access. Component metadata
//! (size, alignment, stable guid) is supplied by an external code
//! generator through [`component::ComponentRegistry`]; this crate moves
//! and indexes raw bytes according to that metadata.

pub mod append_list;
pub mod archetype;
pub mod chunk;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod layout;
pub mod mask;
pub mod query;
pub mod registry;
pub mod utils;
pub mod world;

pub use archetype::ArchetypeStore;
pub use chunk::{ChunkHandle, ChunkManager};
pub use component::{ComponentGuid, ComponentId, ComponentRegistry, ComponentTypeInfo};
pub use config::WorldConfig;
pub use entity::{Entity, EntityLocation};
pub use error::{EcsError, Result};
pub use layout::Layout;
pub use mask::{ComponentMask, HashedMask, Mask, DEFAULT_MASK_WORDS, FULL_MASK_WORDS};
pub use query::{ChunkView, QueryBuilder};
pub use registry::{ArchetypeRegistry, QueryKey};
pub use world::World;
