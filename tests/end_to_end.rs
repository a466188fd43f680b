//! Integration tests for the literal end-to-end scenarios of spec.md §8,
//! driven through `World`'s public API rather than the per-module unit
//! tests (which exercise `ArchetypeRegistry`/`Layout`/`AppendList` directly).

use archetype_ecs_core::{ComponentGuid, ComponentId, ComponentRegistry, QueryBuilder, World, WorldConfig};

const POS: ComponentId = ComponentId(0);
const VEL: ComponentId = ComponentId(1);

fn registry_pv() -> ComponentRegistry {
    let mut b = ComponentRegistry::builder();
    b.register_pinned("Position", 12, 4, ComponentGuid(1), POS);
    b.register_pinned("Velocity", 12, 4, ComponentGuid(2), VEL);
    b.build()
}

fn vec3(x: f32, y: f32, z: f32) -> [u8; 12] {
    let mut buf = [0u8; 12];
    buf[0..4].copy_from_slice(&x.to_le_bytes());
    buf[4..8].copy_from_slice(&y.to_le_bytes());
    buf[8..12].copy_from_slice(&z.to_le_bytes());
    buf
}

// spec.md §8 scenario 1: spawn-move-despawn round trip.
#[test]
fn spawn_move_despawn_round_trip() {
    let mut world = World::new(registry_pv());

    let e1 = world.spawn(&[POS]).unwrap();
    world.set_component(e1, POS, &vec3(1.0, 2.0, 3.0)).unwrap();

    let e2 = world.spawn(&[POS, VEL]).unwrap();
    world.set_component(e2, POS, &vec3(4.0, 5.0, 6.0)).unwrap();
    world.set_component(e2, VEL, &vec3(7.0, 8.0, 9.0)).unwrap();

    assert_eq!(world.memory_stats().archetype_count, 3); // empty, {P}, {P,V}

    world.remove_component(e2, POS).unwrap();
    assert!(!world.has_component(e2, POS).unwrap());
    assert!(world.has_component(e2, VEL).unwrap());

    world.add_component(e2, POS).unwrap();
    world.set_component(e2, POS, &vec3(10.0, 11.0, 12.0)).unwrap();

    assert_eq!(world.get_component(e2, POS).unwrap(), vec3(10.0, 11.0, 12.0));
    assert_eq!(world.get_component(e2, VEL).unwrap(), vec3(7.0, 8.0, 9.0));

    // e1's data was never touched by e2's transitions.
    assert_eq!(world.get_component(e1, POS).unwrap(), vec3(1.0, 2.0, 3.0));
}

// spec.md §8 scenario 2: swap-remove correctness.
#[test]
fn swap_remove_preserves_surviving_entities() {
    let mut world = World::new(registry_pv());

    let e1 = world.spawn(&[POS]).unwrap();
    world.set_component(e1, POS, &vec3(1.0, 0.0, 0.0)).unwrap();
    let e2 = world.spawn(&[POS]).unwrap();
    world.set_component(e2, POS, &vec3(2.0, 0.0, 0.0)).unwrap();
    let e3 = world.spawn(&[POS]).unwrap();
    world.set_component(e3, POS, &vec3(3.0, 0.0, 0.0)).unwrap();

    world.despawn(e1).unwrap();

    assert!(world.is_alive(e2));
    assert!(world.is_alive(e3));
    assert_eq!(world.get_component(e2, POS).unwrap(), vec3(2.0, 0.0, 0.0));
    assert_eq!(world.get_component(e3, POS).unwrap(), vec3(3.0, 0.0, 0.0));
}

// spec.md §8 boundary behavior: a query with all three masks empty
// matches every archetype, including the bootstrap empty one.
#[test]
fn empty_query_matches_every_archetype_including_empty_one() {
    let mut world = World::new(registry_pv());
    world.spawn(&[POS]).unwrap();
    world.spawn(&[POS, VEL]).unwrap();

    let key = QueryBuilder::new().build();
    let mut seen = Vec::new();
    world.for_each_archetype(key, |id| seen.push(id));

    // empty archetype + {P} + {P,V}
    assert_eq!(seen.len(), 3);
    assert!(seen.contains(&world.empty_archetype_id()));
}

// Query iteration reads through chunk views at the byte level and must
// see exactly the live rows of matching archetypes, not more.
#[test]
fn chunk_enumerator_sums_to_spawned_count_across_archetypes() {
    let mut world = World::new(registry_pv());
    for i in 0..50 {
        let e = world.spawn(&[POS]).unwrap();
        world.set_component(e, POS, &vec3(i as f32, 0.0, 0.0)).unwrap();
    }
    for i in 0..30 {
        let e = world.spawn(&[POS, VEL]).unwrap();
        world.set_component(e, POS, &vec3(i as f32, 0.0, 0.0)).unwrap();
    }

    let key = QueryBuilder::new().with(POS).build();
    let mut total_rows = 0usize;
    world
        .for_each_chunk(key, |_archetype_id, _chunk_index, view| {
            total_rows += view.len();
        })
        .unwrap();
    assert_eq!(total_rows, 80);

    let mut ids = Vec::new();
    world.for_each_entity_id(key, |id| ids.push(id)).unwrap();
    assert_eq!(ids.len(), 80);
}

// `without` excludes archetypes that carry the component even if `all`
// would otherwise match.
#[test]
fn query_without_excludes_matching_archetype() {
    let mut world = World::new(registry_pv());
    world.spawn(&[POS]).unwrap();
    world.spawn(&[POS, VEL]).unwrap();

    let key = QueryBuilder::new().with(POS).without(VEL).build();
    let mut count = 0;
    world
        .for_each_chunk(key, |_a, _c, view| count += view.len())
        .unwrap();
    assert_eq!(count, 1);
}

// spec.md §8 boundary: spawning past the configured entity id width
// fails with CapacityExceeded, leaving the world otherwise unchanged.
#[test]
fn capacity_exceeded_boundary_for_narrow_entity_id_width() {
    let mut config = WorldConfig::default();
    config.entity_id_byte_width = 1;
    let mut world = World::with_config(config, registry_pv());

    for _ in 0..256 {
        world.spawn(&[POS]).unwrap();
    }
    let err = world.spawn(&[POS]).unwrap_err();
    assert_eq!(err, archetype_ecs_core::EcsError::CapacityExceeded);
}

// `World::clear` tears down entities and archetypes but keeps the
// registry and configuration (spec.md §4.6 teacher-idiom addition).
#[test]
fn clear_resets_world_but_keeps_registry_and_config() {
    let mut world = World::new(registry_pv());
    world.spawn(&[POS]).unwrap();
    world.spawn(&[POS, VEL]).unwrap();
    assert_eq!(world.memory_stats().alive_entities, 2);

    world.clear();

    assert_eq!(world.memory_stats().alive_entities, 0);
    assert_eq!(world.memory_stats().archetype_count, 1); // just the empty archetype
    assert!(world.component_registry().contains(POS));
}
