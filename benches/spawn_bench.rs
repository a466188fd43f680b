use archetype_ecs_core::{ComponentGuid, ComponentId, ComponentRegistry, World};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

fn registry() -> ComponentRegistry {
    let mut b = ComponentRegistry::builder();
    b.register_pinned("Position", 12, 4, ComponentGuid(1), ComponentId(0));
    b.register_pinned("Velocity", 12, 4, ComponentGuid(2), ComponentId(1));
    b.register_pinned("Health", 4, 4, ComponentGuid(3), ComponentId(2));
    b.build()
}

fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    // Spawning entities with 2 components.
    group.bench_function("spawn_2_components", |b| {
        b.iter(|| {
            let mut world = World::new(registry());
            for _ in 0..1000 {
                black_box(world.spawn(&[ComponentId(0), ComponentId(1)]).unwrap());
            }
        });
    });

    // Spawning entities with 3 components.
    group.bench_function("spawn_3_components", |b| {
        b.iter(|| {
            let mut world = World::new(registry());
            for _ in 0..1000 {
                black_box(
                    world
                        .spawn(&[ComponentId(0), ComponentId(1), ComponentId(2)])
                        .unwrap(),
                );
            }
        });
    });

    // Spawning entities that alternate between two archetypes, stressing
    // get_or_create's hash lookup over Spawn's straight allocation path.
    group.bench_function("spawn_mixed", |b| {
        b.iter(|| {
            let mut world = World::new(registry());
            for i in 0..1000 {
                if i % 2 == 0 {
                    black_box(world.spawn(&[ComponentId(0), ComponentId(1)]).unwrap());
                } else {
                    black_box(
                        world
                            .spawn(&[ComponentId(0), ComponentId(1), ComponentId(2)])
                            .unwrap(),
                    );
                }
            }
        });
    });

    group.finish();
}

fn despawn_benchmark(c: &mut Criterion) {
    c.bench_function("despawn_1000", |b| {
        b.iter_batched(
            || {
                let mut world = World::new(registry());
                let entities: Vec<_> = (0..1000)
                    .map(|_| world.spawn(&[ComponentId(0), ComponentId(1)]).unwrap())
                    .collect();
                (world, entities)
            },
            |(mut world, entities)| {
                for e in entities {
                    world.despawn(e).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, spawn_benchmark, despawn_benchmark);
criterion_main!(benches);
