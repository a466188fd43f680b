//! Micro-benchmarks for the archetype registry, transition graph, and
//! query enumerators (SPEC_FULL.md §2 ambient test tooling).

use archetype_ecs_core::mask::ComponentMask;
use archetype_ecs_core::{
    ComponentGuid, ComponentId, ComponentRegistry, Layout, QueryBuilder, World, DEFAULT_MASK_WORDS,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn registry_n(n: u16) -> ComponentRegistry {
    let mut b = ComponentRegistry::builder();
    for i in 0..n {
        b.register_pinned(
            Box::leak(format!("C{i}").into_boxed_str()),
            4,
            4,
            ComponentGuid(i as u128 + 1),
            ComponentId(i),
        );
    }
    b.build()
}

fn bench_layout_packing(c: &mut Criterion) {
    let registry = registry_n(16);
    let mut group = c.benchmark_group("layout");

    for width in [4usize, 8, 16].iter() {
        group.bench_with_input(
            BenchmarkId::new("compute_entities_per_chunk", width),
            width,
            |b, &width| {
                let mut mask = ComponentMask::<DEFAULT_MASK_WORDS>::new();
                for i in 0..width as u16 {
                    mask.set(ComponentId(i));
                }
                b.iter(|| black_box(Layout::compute(mask, &registry, 16_384, 4).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_archetype_segregation(c: &mut Criterion) {
    let registry = registry_n(4);

    c.bench_function("archetype_segregation_1k", |b| {
        b.iter(|| {
            let mut world = World::new(registry.clone());
            for i in 0..250 {
                let set: &[ComponentId] = match i % 4 {
                    0 => &[ComponentId(0), ComponentId(1)],
                    1 => &[ComponentId(0), ComponentId(2)],
                    2 => &[ComponentId(0), ComponentId(1), ComponentId(2)],
                    _ => &[ComponentId(0)],
                };
                black_box(world.spawn(set).unwrap());
            }
        });
    });
}

fn bench_transition_graph(c: &mut Criterion) {
    let registry = registry_n(8);

    c.bench_function("add_then_remove_roundtrip_1k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new(registry.clone());
                let entities: Vec<_> = (0..1_000)
                    .map(|_| world.spawn(&[ComponentId(0)]).unwrap())
                    .collect();
                (world, entities)
            },
            |(mut world, entities)| {
                for e in &entities {
                    world.add_component(*e, ComponentId(1)).unwrap();
                    world.remove_component(*e, ComponentId(1)).unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_query_iteration(c: &mut Criterion) {
    let registry = registry_n(4);
    let mut world = World::new(registry);
    for i in 0..100_000u32 {
        let e = if i % 2 == 0 {
            world.spawn(&[ComponentId(0), ComponentId(1)]).unwrap()
        } else {
            world
                .spawn(&[ComponentId(0), ComponentId(1), ComponentId(2)])
                .unwrap()
        };
        world
            .set_component(e, ComponentId(0), &1.0f32.to_le_bytes())
            .unwrap();
    }

    let key = QueryBuilder::new().with(ComponentId(0)).with(ComponentId(1)).build();

    c.bench_function("query_chunk_iteration_100k", |b| {
        b.iter(|| {
            let mut touched = 0usize;
            world
                .for_each_chunk(key, |_archetype_id, _chunk_index, view| {
                    touched += view.len();
                })
                .unwrap();
            black_box(touched);
        });
    });

    c.bench_function("query_entity_id_iteration_100k", |b| {
        b.iter(|| {
            let mut count = 0usize;
            world
                .for_each_entity_id(key, |_id| count += 1)
                .unwrap();
            black_box(count);
        });
    });
}

criterion_group!(
    benches,
    bench_layout_packing,
    bench_archetype_segregation,
    bench_transition_graph,
    bench_query_iteration
);
criterion_main!(benches);
