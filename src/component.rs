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

//! Component metadata contract.
//!
//! The registry is populated once, before any `World` is created, by an
//! external code generator. This module only plays the generator's role
//! for tests and embedders: it assigns ids by a deterministic rule and
//! never mutates after `build()`.

use rustc_hash::FxHashMap;

/// Largest component id representable (`MaxComponentTypeId`).
pub const MAX_COMPONENT_TYPE_ID: u16 = 2047;

/// Sentinel for "no component".
pub const INVALID_COMPONENT_ID: ComponentId = ComponentId(u16::MAX);

/// Small integer identifying a component type, in `[0, MAX_COMPONENT_TYPE_ID]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u16);

impl ComponentId {
    pub fn is_valid(self) -> bool {
        self != INVALID_COMPONENT_ID && self.0 <= MAX_COMPONENT_TYPE_ID
    }
}

/// 128-bit stable identifier, independent of build-assigned `ComponentId`,
/// used by external serializers to round-trip component instances across
/// builds with re-numbered ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentGuid(pub u128);

/// Immutable-after-registration metadata for one component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentTypeInfo {
    pub id: ComponentId,
    pub size: u16,
    pub alignment: u8,
    pub guid: ComponentGuid,
}

impl ComponentTypeInfo {
    /// A zero-size "tag" component contributes to the mask but consumes no
    /// bytes in the chunk.
    pub fn is_tag(&self) -> bool {
        self.size == 0
    }
}

/// Process-wide, immutable-after-init table mapping component id to
/// `{size, alignment, guid}`.
///
/// Constructed once via [`ComponentRegistryBuilder`] before any `World` is
/// created; all `World`s in a process share one registry (by reference or
/// by clone — the table itself never changes after `build()`).
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    by_id: FxHashMap<ComponentId, ComponentTypeInfo>,
    max_id: u16,
}

impl ComponentRegistry {
    pub fn builder() -> ComponentRegistryBuilder {
        ComponentRegistryBuilder::default()
    }

    pub fn get(&self, id: ComponentId) -> Option<&ComponentTypeInfo> {
        self.by_id.get(&id)
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Highest component id currently registered; drives the minimum mask
    /// width a `World` needs (`capacity(mask) > max_component_id`).
    pub fn max_component_id(&self) -> u16 {
        self.max_id
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// One pending registration, prior to id assignment.
struct PendingEntry {
    name: &'static str,
    size: u16,
    alignment: u8,
    guid: ComponentGuid,
    pinned_id: Option<ComponentId>,
}

/// Stand-in for the external compile-time code generator.
///
/// Ids are assigned by a deterministic rule so builds are reproducible:
/// pinned ids are honored first, then the remaining entries are sorted by
/// alignment descending, then by name ascending, and assigned the lowest
/// ids not already claimed by a pin (see SPEC_FULL.md Open Question (b)).
#[derive(Default)]
pub struct ComponentRegistryBuilder {
    pending: Vec<PendingEntry>,
}

impl ComponentRegistryBuilder {
    /// Register a component type, letting the builder auto-assign its id.
    pub fn register(
        &mut self,
        name: &'static str,
        size: u16,
        alignment: u8,
        guid: ComponentGuid,
    ) -> &mut Self {
        self.pending.push(PendingEntry {
            name,
            size,
            alignment,
            guid,
            pinned_id: None,
        });
        self
    }

    /// Register a component type with a manually pinned id. Auto-assigned
    /// ids will skip over pinned values.
    pub fn register_pinned(
        &mut self,
        name: &'static str,
        size: u16,
        alignment: u8,
        guid: ComponentGuid,
        id: ComponentId,
    ) -> &mut Self {
        self.pending.push(PendingEntry {
            name,
            size,
            alignment,
            guid,
            pinned_id: Some(id),
        });
        self
    }

    /// Finalize the registry. Panics if ids collide or exceed
    /// `MAX_COMPONENT_TYPE_ID`; both are build-time configuration errors,
    /// not runtime conditions (see spec.md §7 "reject at configuration
    /// time when possible").
    pub fn build(mut self) -> ComponentRegistry {
        let mut by_id = FxHashMap::default();
        let mut max_id = 0u16;

        // Claim pinned ids first.
        self.pending.sort_by(|a, b| {
            b.pinned_id
                .is_some()
                .cmp(&a.pinned_id.is_some())
                .then_with(|| b.alignment.cmp(&a.alignment))
                .then_with(|| a.name.cmp(b.name))
        });

        let mut taken = vec![false; MAX_COMPONENT_TYPE_ID as usize + 1];
        let mut next_auto: u16 = 0;

        for entry in self.pending {
            let id = match entry.pinned_id {
                Some(id) => {
                    assert!(
                        id.0 <= MAX_COMPONENT_TYPE_ID,
                        "pinned component id {} exceeds MAX_COMPONENT_TYPE_ID",
                        id.0
                    );
                    assert!(
                        !taken[id.0 as usize],
                        "duplicate component id {} (pinned on '{}')",
                        id.0,
                        entry.name
                    );
                    id
                }
                None => {
                    while next_auto <= MAX_COMPONENT_TYPE_ID && taken[next_auto as usize] {
                        next_auto += 1;
                    }
                    assert!(
                        next_auto <= MAX_COMPONENT_TYPE_ID,
                        "component id space exhausted while registering '{}'",
                        entry.name
                    );
                    ComponentId(next_auto)
                }
            };
            taken[id.0 as usize] = true;
            max_id = max_id.max(id.0);

            by_id.insert(
                id,
                ComponentTypeInfo {
                    id,
                    size: entry.size,
                    alignment: entry.alignment,
                    guid: entry.guid,
                },
            );
        }

        ComponentRegistry { by_id, max_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_assignment_is_deterministic() {
        let mut builder = ComponentRegistry::builder();
        builder.register("Velocity", 12, 4, ComponentGuid(2));
        builder.register("Position", 12, 4, ComponentGuid(1));
        builder.register("Flag", 0, 1, ComponentGuid(3));
        let registry = builder.build();

        // alignment descending, then name ascending among equal alignment
        let pos = registry
            .by_id
            .values()
            .find(|i| i.guid == ComponentGuid(1))
            .unwrap();
        let vel = registry
            .by_id
            .values()
            .find(|i| i.guid == ComponentGuid(2))
            .unwrap();
        assert!(pos.id.0 < vel.id.0, "Position sorts before Velocity");
    }

    #[test]
    fn pinned_ids_are_skipped_by_auto_assignment() {
        let mut builder = ComponentRegistry::builder();
        builder.register_pinned("Pinned", 4, 4, ComponentGuid(9), ComponentId(0));
        builder.register("Auto", 4, 4, ComponentGuid(10));
        let registry = builder.build();

        let auto = registry
            .by_id
            .values()
            .find(|i| i.guid == ComponentGuid(10))
            .unwrap();
        assert_ne!(auto.id, ComponentId(0));
    }

    #[test]
    #[should_panic(expected = "duplicate component id")]
    fn duplicate_pinned_ids_panic() {
        let mut builder = ComponentRegistry::builder();
        builder.register_pinned("A", 4, 4, ComponentGuid(1), ComponentId(5));
        builder.register_pinned("B", 4, 4, ComponentGuid(2), ComponentId(5));
        builder.build();
    }

    #[test]
    fn tag_component_has_zero_size() {
        let mut builder = ComponentRegistry::builder();
        builder.register("Tag", 0, 1, ComponentGuid(1));
        let registry = builder.build();
        let info = registry.get(ComponentId(0)).unwrap();
        assert!(info.is_tag());
    }
}
