//! ECS benchmarks using criterion for historical comparison.

use std::{hint::black_box, time::Duration};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use strata_ecs::{Component, Entity, Query, Read, Threading, Values, World, WorldConfig, Write};

#[derive(Component, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Component, Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Component, Clone, Copy)]
struct Sleeping;

const TICK: Duration = Duration::from_millis(50);

fn position(i: u32) -> Position {
    Position {
        x: i as f32,
        y: 0.0,
        z: 0.0,
    }
}

fn populated(config: WorldConfig, count: u32) -> World {
    let mut world = World::with_config(config).unwrap();
    let entities = world.create_with(count as usize, Values::Generate(&mut |e| position(e.index())));
    world.add_components(
        &entities,
        Values::Broadcast(Velocity {
            x: 1.0,
            y: 0.5,
            z: 0.25,
        }),
    );
    world
}

fn create_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");

    for count in [1, 100, 1000, 10000] {
        group.throughput(Throughput::Elements(u64::from(count)));

        group.bench_with_input(BenchmarkId::new("empty", count), &count, |b, &count| {
            b.iter(|| {
                let mut world = World::new();
                black_box(world.create_many(count as usize));
            });
        });

        group.bench_with_input(BenchmarkId::new("with_position", count), &count, |b, &count| {
            b.iter(|| {
                let mut world = World::new();
                black_box(world.create_with(count as usize, Values::Generate(&mut |e| position(e.index()))));
            });
        });
    }

    group.finish();
}

fn component_access_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("component_access");

    for count in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(u64::from(count)));

        group.bench_with_input(BenchmarkId::new("get", count), &count, |b, &count| {
            let world = populated(WorldConfig::default(), count);
            let entities: Vec<Entity> = world.entities();

            b.iter(|| {
                for &entity in &entities {
                    black_box(world.get::<Position>(entity));
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("set", count), &count, |b, &count| {
            let mut world = populated(WorldConfig::default(), count);
            let entities: Vec<Entity> = world.entities();

            b.iter(|| {
                for &entity in &entities {
                    black_box(world.set_component(entity, position(entity.index() + 1)));
                }
            });
        });
    }

    group.finish();
}

fn churn_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn");

    for count in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(u64::from(count)));

        group.bench_with_input(BenchmarkId::new("tag_untag_tick", count), &count, |b, &count| {
            let mut world = populated(WorldConfig::default(), count);
            let entities: Vec<Entity> = world.entities();

            b.iter(|| {
                world.add_components(&entities, Values::Broadcast(Sleeping));
                world.tick(TICK);
                black_box(world.remove_components::<Sleeping>(&entities));
                world.tick(TICK);
            });
        });
    }

    group.finish();
}

fn movement_system(world: &mut World, threading: Threading) {
    world.declare(
        threading,
        Query::new().write::<Position>().read::<Velocity>().partial(),
        |info, pack| {
            let dt = info.dt().as_secs_f32();
            let (positions, velocities) = pack.view::<(Write<Position>, Read<Velocity>)>();
            for (p, v) in positions.iter_mut().zip(velocities) {
                p.x += v.x * dt;
                p.y += v.y * dt;
                p.z += v.z * dt;
            }
        },
    );
}

fn tick_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for count in [1000, 10000, 100_000] {
        group.throughput(Throughput::Elements(u64::from(count)));

        group.bench_with_input(BenchmarkId::new("sequential", count), &count, |b, &count| {
            let mut world = populated(WorldConfig::default().sequential(), count);
            movement_system(&mut world, Threading::Sequential);
            b.iter(|| world.tick(TICK));
        });

        group.bench_with_input(BenchmarkId::new("parallel", count), &count, |b, &count| {
            let mut world = populated(WorldConfig::default(), count);
            movement_system(&mut world, Threading::Parallel);
            b.iter(|| world.tick(TICK));
        });
    }

    group.finish();
}

fn ordering_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_by");

    for count in [1000, 10000, 100_000] {
        group.throughput(Throughput::Elements(u64::from(count)));

        let query = Query::new().order_by::<Position, _>(|a, b| b.x.total_cmp(&a.x));
        for (name, config) in [
            ("sequential", WorldConfig::default().sequential()),
            ("parallel", WorldConfig::default()),
        ] {
            group.bench_with_input(BenchmarkId::new(name, count), &count, |b, &count| {
                let world = populated(config.clone(), count);
                b.iter(|| black_box(world.filter(&query)));
            });
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    create_benchmarks,
    component_access_benchmarks,
    churn_benchmarks,
    tick_benchmarks,
    ordering_benchmarks,
);
criterion_main!(benches);
