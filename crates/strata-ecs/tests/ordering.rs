//! Conditions and ordering applied to matched entities.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use strata_ecs::{Component, Query, Threading, Values, World, WorldConfig};

#[derive(Component, Clone, Copy, Debug, PartialEq)]
struct Priority(u32);

#[derive(Component, Clone, Copy, Debug, PartialEq)]
struct Weight(i32);

const TICK: Duration = Duration::from_millis(16);

/// A pseudo-random but deterministic priority with many ties.
fn scrambled(index: u32) -> Priority {
    Priority(index.wrapping_mul(2_654_435_761) % 97)
}

fn ordered_ids(config: WorldConfig, count: usize) -> anyhow::Result<Vec<u32>> {
    let mut world = World::with_config(config)?;
    world.create_with(count, Values::Generate(&mut |e| scrambled(e.index())));

    let query = Query::new().order_by::<Priority, _>(|a, b| b.0.cmp(&a.0));
    Ok(world.filter(&query).into_iter().map(|e| e.index()).collect())
}

fn assert_descending_stable(ids: &[u32]) {
    // Descending priority, ties keep ascending id order.
    for pair in ids.windows(2) {
        let (a, b) = (scrambled(pair[0]), scrambled(pair[1]));
        assert!(a.0 > b.0 || (a.0 == b.0 && pair[0] < pair[1]));
    }
}

#[test]
fn test_parallel_sort_matches_sequential_sort() -> anyhow::Result<()> {
    const THRESHOLD: usize = 64;
    for count in [0, 1, 2, THRESHOLD - 1, THRESHOLD, THRESHOLD + 1, 5000] {
        let parallel = ordered_ids(
            WorldConfig::default()
                .with_workers(4)
                .with_sort_parallel_threshold(THRESHOLD),
            count,
        )?;
        let sequential = ordered_ids(WorldConfig::default().sequential(), count)?;

        assert_eq!(parallel.len(), count);
        assert_eq!(parallel, sequential, "orderings differ for {count} entities");
        assert_descending_stable(&parallel);
    }
    Ok(())
}

#[test]
fn test_empty_and_single_orderings() -> anyhow::Result<()> {
    assert!(ordered_ids(WorldConfig::default(), 0)?.is_empty());
    assert_eq!(ordered_ids(WorldConfig::default(), 1)?, vec![1]);
    Ok(())
}

#[test]
fn test_system_sees_ordered_pack() {
    let mut world = World::new();
    let weights = [5, -2, 9, 0, 3];
    world.create_with(weights.len(), Values::Each(&weights.map(Weight)));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    world.declare(
        Threading::Main,
        Query::new()
            .order_by::<Weight, _>(|a, b| a.0.cmp(&b.0))
            .read::<Weight>(),
        move |_, pack| {
            sink.lock().extend(pack.read::<Weight>().iter().map(|w| w.0));
        },
    );

    world.tick(TICK);
    assert_eq!(*seen.lock(), vec![-2, 0, 3, 5, 9]);
}

#[test]
fn test_conditions_before_ordering() {
    let mut world = World::new();
    let entities = world.create_with(6, Values::Generate(&mut |e| Weight(e.index() as i32 * 3 % 7)));
    world.add_components(&entities, Values::Generate(&mut |e| Priority(e.index())));

    let query = Query::new()
        .on_condition::<Priority, _>(|p| p.0 % 2 == 0)
        .order_by::<Weight, _>(|a, b| a.0.cmp(&b.0));
    let ids: Vec<u32> = world.filter(&query).into_iter().map(|e| e.index()).collect();

    // Even ids 2, 4, 6 weigh 6, 5 and 4.
    assert_eq!(ids, vec![6, 4, 2]);
}

#[test]
fn test_several_conditions_all_apply() {
    let mut world = World::new();
    let entities = world.create_with(10, Values::Generate(&mut |e| Priority(e.index())));
    world.add_components(&entities, Values::Generate(&mut |e| Weight(e.index() as i32)));

    let query = Query::new()
        .on_condition::<Priority, _>(|p| p.0 > 3)
        .on_condition::<Weight, _>(|w| w.0 % 3 == 0);
    let ids: Vec<u32> = world.filter(&query).into_iter().map(|e| e.index()).collect();
    assert_eq!(ids, vec![6, 9]);
}
