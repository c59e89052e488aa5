//! Filter selectors observed through systems across ticks.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use strata_ecs::{Component, Entity, Query, Threading, Values, World};

#[derive(Component, Clone, Copy, Debug, PartialEq)]
struct Tagged(u32);

#[derive(Component, Clone, Copy, Debug, PartialEq)]
struct Other(u32);

#[derive(Component, Clone, Copy, Debug, PartialEq)]
struct Hidden;

const TICK: Duration = Duration::from_millis(16);

type Seen = Arc<Mutex<Vec<Vec<u32>>>>;

/// Declare a system that records the entity ids it sees every tick.
fn observe<S>(world: &mut World, query: Query<S>) -> Seen {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    world.declare(Threading::Main, query, move |_, pack| {
        sink.lock().push(pack.entities().iter().map(|e| e.index()).collect());
    });
    seen
}

fn last(seen: &Seen) -> Vec<u32> {
    seen.lock().last().cloned().unwrap_or_default()
}

#[test]
fn test_on_add_fires_once() {
    let mut world = World::new();
    let entities = world.create_many(5);
    let added = observe(&mut world, Query::new().on_add::<Tagged>());

    world.add_component(entities[0], Tagged(1));
    world.add_component(entities[2], Tagged(3));

    world.tick(TICK);
    assert_eq!(last(&added), vec![1, 3]);

    world.tick(TICK);
    assert_eq!(last(&added), Vec::<u32>::new());
}

#[test]
fn test_on_remove_sees_destroyed_entities() {
    let mut world = World::new();
    let entities = world.create_with(3, Values::Broadcast(Tagged(0)));
    let removed = observe(&mut world, Query::new().on_remove::<Tagged>().read::<Tagged>());
    world.tick(TICK);
    assert_eq!(last(&removed), Vec::<u32>::new());

    world.destroy(entities[1]);
    world.remove_component::<Tagged>(entities[2]);
    world.tick(TICK);
    assert_eq!(last(&removed), vec![2, 3]);

    world.tick(TICK);
    assert_eq!(last(&removed), Vec::<u32>::new());
}

#[test]
fn test_steady_filter_tracks_changes() {
    let mut world = World::new();
    let entities = world.create_many(4);
    world.add_components(&entities, Values::Broadcast(Tagged(0)));
    world.add_component(entities[1], Hidden);

    let visible = observe(&mut world, Query::new().read::<Tagged>().except::<Hidden>());
    world.tick(TICK);
    assert_eq!(last(&visible), vec![1, 3, 4]);

    world.add_component(entities[0], Hidden);
    world.remove_component::<Hidden>(entities[1]);
    world.destroy(entities[3]);
    world.tick(TICK);
    assert_eq!(last(&visible), vec![2, 3]);
}

#[test]
fn test_except_only_query_sees_bare_entities() {
    let mut world = World::new();
    let entities = world.create_many(3);
    world.add_component(entities[0], Hidden);
    let bare = observe(&mut world, Query::new().except::<Hidden>());

    world.tick(TICK);
    assert_eq!(last(&bare), vec![2, 3]);

    world.destroy(entities[2]);
    world.tick(TICK);
    assert_eq!(last(&bare), vec![2]);
}

#[test]
fn test_on_combine_and_on_break() {
    let mut world = World::new();
    let entities = world.create_with(3, Values::Broadcast(Tagged(0)));
    world.add_component(entities[0], Other(0));
    world.tick(TICK);

    let combined = observe(&mut world, Query::new().on_combine::<(Tagged, Other)>());
    let broken = observe(&mut world, Query::new().on_break::<(Tagged, Other)>());

    world.add_component(entities[1], Other(1));
    world.remove_component::<Tagged>(entities[0]);
    world.tick(TICK);
    assert_eq!(last(&combined), vec![2]);
    assert_eq!(last(&broken), vec![1]);
}

#[test]
fn test_seed_with_existing_sees_old_entities_once() {
    let mut world = World::new();
    world.create_with(2, Values::Broadcast(Tagged(0)));
    world.tick(TICK);

    let plain = observe(&mut world, Query::new().on_add::<Tagged>());
    let seeded = observe(&mut world, Query::new().on_add::<Tagged>().seed_with_existing());

    world.tick(TICK);
    assert_eq!(last(&plain), Vec::<u32>::new());
    assert_eq!(last(&seeded), vec![1, 2]);

    world.tick(TICK);
    assert_eq!(last(&seeded), Vec::<u32>::new());
}

#[test]
fn test_on_condition_reevaluates_every_tick() {
    let mut world = World::new();
    let entities = world.create_with(3, Values::Generate(&mut |e| Tagged(e.index())));
    let odd = observe(&mut world, Query::new().on_condition::<Tagged, _>(|t| t.0 % 2 == 1));

    world.tick(TICK);
    assert_eq!(last(&odd), vec![1, 3]);

    world.set_component(entities[1], Tagged(5));
    world.tick(TICK);
    assert_eq!(last(&odd), vec![1, 2, 3]);
}

#[test]
fn test_adhoc_filter_matches_declared_systems() {
    let mut world = World::new();
    let entities = world.create_many(6);
    for &e in entities.iter().step_by(2) {
        world.add_component(e, Tagged(e.index()));
    }
    world.add_component(entities[4], Hidden);

    let query = Query::new().read::<Tagged>().except::<Hidden>();
    let found: Vec<Entity> = world.filter(&query);
    assert_eq!(found, vec![entities[0], entities[2]]);
}

#[test]
fn test_shared_filters_survive_revoke() {
    let mut world = World::new();
    world.create_with(2, Values::Broadcast(Tagged(0)));

    let first = observe(&mut world, Query::new().read::<Tagged>());
    let second_seen: Seen = Arc::default();
    let sink = Arc::clone(&second_seen);
    let second = world.declare(Threading::Main, Query::new().read::<Tagged>(), move |_, pack| {
        sink.lock().push(pack.entities().iter().map(|e| e.index()).collect());
    });

    world.tick(TICK);
    assert!(world.revoke(second).is_ok());
    world.create_with(1, Values::Broadcast(Tagged(0)));
    world.tick(TICK);

    assert_eq!(last(&first), vec![1, 2, 3]);
    assert_eq!(second_seen.lock().len(), 1);
}
