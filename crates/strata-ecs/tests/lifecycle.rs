//! Entity and component lifecycle through the public World API.

use std::time::Duration;

use strata_ecs::{Component, Entity, Values, World, WorldConfig};

#[derive(Component, Clone, Copy, Debug, PartialEq)]
struct Health(u32);

#[derive(Component, Clone, Copy, Debug, PartialEq)]
struct Armor(u32);

#[derive(Component, Clone, Copy, Debug, PartialEq)]
struct Dead;

const TICK: Duration = Duration::from_millis(50);

#[test]
fn test_ids_start_at_one_and_are_dense() {
    let mut world = World::new();
    let entities = world.create_many(4);
    let ids: Vec<u32> = entities.iter().map(|e| e.index()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(world.capacity(), 5);
    assert!(!world.is_alive(Entity::INVALID));
}

#[test]
fn test_destroyed_ids_come_back_after_tick() {
    let mut world = World::new();
    let entities = world.create_many(3);
    assert_eq!(world.destroy_many(&[entities[0], entities[2], entities[0]]), 2);
    assert_eq!(world.size(), 1);

    // Not reusable until the removed components are promoted away.
    let fresh = world.create();
    assert_eq!(fresh.index(), 4);

    world.tick(TICK);
    let recycled = [world.create(), world.create()];
    assert!(recycled.contains(&entities[0]));
    assert!(recycled.contains(&entities[2]));
}

#[test]
fn test_destroy_moves_components_to_removed() -> anyhow::Result<()> {
    let mut world = World::with_config(WorldConfig::default().sequential())?;
    let e = world.create();
    world.add_component(e, Health(10));
    world.add_component(e, Dead);
    world.tick(TICK);

    world.destroy(e);
    assert!(world.has_removed::<Health>(e));
    assert!(world.has_removed::<Dead>(e));
    assert!(world.get::<Health>(e).is_none());

    world.tick(TICK);
    assert!(!world.has_removed::<Health>(e));
    Ok(())
}

#[test]
fn test_bulk_operations() {
    let mut world = World::new();
    let entities = world.create_with(3, Values::Generate(&mut |e| Health(e.index() * 10)));
    assert_eq!(world.get::<Health>(entities[2]), Some(Health(30)));

    world.add_components(&entities, Values::Each(&[Armor(1), Armor(2), Armor(3)]));
    assert!(world.has_components::<(Health, Armor)>(entities[1]));

    let written = world.set_components(&entities, Values::Initialize(Armor(100), &mut |a, e| a.0 += e.index()));
    assert_eq!(written, 3);
    assert_eq!(world.get::<Armor>(entities[0]), Some(Armor(101)));

    assert_eq!(world.remove_components::<(Health, Armor)>(&entities[..2]), 4);
    assert!(!world.has_component::<Health>(entities[0]));
    assert!(world.has_component::<Health>(entities[2]));
}

#[test]
fn test_readding_removed_component_revives_it() {
    let mut world = World::new();
    let e = world.create();
    world.add_component(e, Health(1));
    world.tick(TICK);

    world.remove_component::<Health>(e);
    assert!(world.has_removed::<Health>(e));
    world.add_component(e, Health(2));
    assert!(world.has_added::<Health>(e));
    assert!(!world.has_removed::<Health>(e));
    assert_eq!(world.get::<Health>(e), Some(Health(2)));
}

#[test]
fn test_clear_resets_everything() {
    let mut world = World::new();
    world.create_with(5, Values::Broadcast(Health(1)));
    world.clear();

    assert_eq!(world.size(), 0);
    assert!(world.entities().is_empty());
    assert_eq!(world.create().index(), 1);
    assert!(world.get::<Health>(Entity::new(1)).is_none());
}

#[test]
fn test_register_up_front() -> anyhow::Result<()> {
    let mut world = World::new();
    world.register::<Health>()?;
    world.register::<Health>()?;
    assert_eq!(world.registry().len(), 1);
    Ok(())
}
