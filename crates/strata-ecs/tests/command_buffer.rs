//! Committing command buffers, both by hand and from systems.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use strata_ecs::{Component, Entity, Query, Threading, Values, World};

#[derive(Component, Clone, Copy, Debug, PartialEq)]
struct Spawned(u32);

#[derive(Component, Clone, Copy, Debug, PartialEq)]
struct Marker;

const TICK: Duration = Duration::from_millis(16);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_commit_maps_provisional_ids() {
    let mut world = World::new();
    let existing = world.create_many(3);

    let mut buffer = world.command_buffer();
    let locals = buffer.create_with(2, Values::Each(&[Spawned(10), Spawned(20)]));
    buffer.add_component(locals[1], Marker);
    buffer.add_component(existing[0], Spawned(1));
    assert!(locals.iter().all(|&e| buffer.is_local(e)));
    assert!(!buffer.is_local(existing[2]));

    let mapping = world.commit(buffer);
    assert_eq!(mapping.len(), 2);

    let first = mapping[&locals[0]];
    let second = mapping[&locals[1]];
    assert!(world.is_alive(first) && world.is_alive(second));
    assert_eq!(world.get::<Spawned>(first), Some(Spawned(10)));
    assert_eq!(world.get::<Spawned>(second), Some(Spawned(20)));
    assert!(world.has_component::<Marker>(second));
    assert!(!world.has_component::<Marker>(first));
    assert_eq!(world.get::<Spawned>(existing[0]), Some(Spawned(1)));
}

#[test]
fn test_locally_destroyed_entities_never_materialize() {
    let mut world = World::new();
    let mut buffer = world.command_buffer();
    let locals = buffer.create_with(3, Values::Broadcast(Spawned(0)));
    buffer.destroy(locals[1]);
    assert_eq!(buffer.created_count(), 2);

    let mapping = world.commit(buffer);
    assert_eq!(mapping.len(), 2);
    assert!(!mapping.contains_key(&locals[1]));
    assert_eq!(world.size(), 2);
}

#[test]
fn test_buffered_destroy_and_remove() {
    let mut world = World::new();
    let entities = world.create_with(3, Values::Broadcast(Spawned(0)));
    world.add_component(entities[2], Marker);
    world.tick(TICK);

    let mut buffer = world.command_buffer();
    buffer.destroy(entities[0]);
    buffer.remove_component::<Marker>(entities[2]);
    assert!(world.is_alive(entities[0]));

    world.commit(buffer);
    assert!(!world.is_alive(entities[0]));
    assert!(world.has_removed::<Spawned>(entities[0]));
    assert!(world.has_removed::<Marker>(entities[2]));
    assert!(world.has_component::<Spawned>(entities[2]));
}

#[test]
fn test_data_for_dead_entities_is_dropped() {
    let mut world = World::new();
    let entities = world.create_many(2);

    let mut buffer = world.command_buffer();
    buffer.add_component(entities[0], Spawned(5));
    buffer.add_component(entities[1], Spawned(6));
    world.destroy(entities[0]);

    world.commit(buffer);
    assert!(world.get::<Spawned>(entities[0]).is_none());
    assert_eq!(world.get::<Spawned>(entities[1]), Some(Spawned(6)));
}

#[test]
fn test_system_commands_become_events_next_tick() {
    init_tracing();
    let mut world = World::new();

    let spawned_at = Arc::new(Mutex::new(Vec::<u64>::new()));
    let sink = Arc::clone(&spawned_at);
    world.declare(Threading::Main, Query::new(), move |info, _| {
        if info.tick() == 0 {
            info.commands().create_with(2, Values::Broadcast(Spawned(1)));
        }
    });

    let seen = Arc::new(Mutex::new(Vec::<Vec<Entity>>::new()));
    let seen_sink = Arc::clone(&seen);
    world.declare(Threading::Main, Query::new().on_add::<Spawned>(), move |info, pack| {
        if !pack.is_empty() {
            sink.lock().push(info.tick());
        }
        seen_sink.lock().push(pack.entities().to_vec());
    });

    world.tick(TICK);
    assert_eq!(world.size(), 2);
    assert!(seen.lock()[0].is_empty());

    world.tick(TICK);
    assert_eq!(seen.lock()[1].len(), 2);
    assert_eq!(*spawned_at.lock(), vec![1]);

    world.tick(TICK);
    assert!(seen.lock()[2].is_empty());
}

#[test]
fn test_parallel_buffers_all_commit() -> anyhow::Result<()> {
    init_tracing();
    let config = strata_ecs::WorldConfig::default()
        .with_workers(4)
        .with_min_entities_per_worker(8);
    let mut world = World::with_config(config)?;
    let parents = world.create_with(64, Values::Broadcast(Spawned(0)));

    world.declare(
        Threading::Parallel,
        Query::new().on_add::<Spawned>().partial(),
        |info, pack| {
            for &parent in pack.entities() {
                let child = info.commands().create_one();
                info.commands().add_component(child, Marker);
                info.commands().add_component(parent, Marker);
            }
        },
    );

    world.tick(TICK);
    assert_eq!(world.size(), 128);
    assert!(parents.iter().all(|&p| world.has_component::<Marker>(p)));
    let markers = world
        .entities()
        .into_iter()
        .filter(|&e| world.has_component::<Marker>(e))
        .count();
    assert_eq!(markers, 128);
    Ok(())
}
