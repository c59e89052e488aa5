//! Particle simulation on top of Strata ECS.
//!
//! Every tick particles fall under gravity, age, and expire. Expired
//! particles are destroyed through command buffers and replaced by fresh
//! ones, so the run exercises events, parallel packs and commits together.
//!
//! Environment:
//! - `STRATA_WORKERS` - worker threads (default: rayon's global pool)
//! - `STRATA_TICKS` - ticks to simulate (default: 120)
//! - `STRATA_PARTICLES` - particles alive at any time (default: 10000)

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use eyre::WrapErr;
use strata_ecs::prelude::*;
use tracing::{debug, info};

#[derive(Component, Clone, Copy, Debug)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component, Clone, Copy, Debug)]
struct Velocity {
    x: f32,
    y: f32,
}

/// Remaining lifetime in ticks.
#[derive(Component, Clone, Copy, Debug)]
struct Lifetime(u32);

#[derive(Component, Clone, Copy, Debug)]
struct Grounded;

const GRAVITY: f32 = -9.81;
const DT: Duration = Duration::from_millis(50);

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> eyre::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().wrap_err_with(|| format!("invalid {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

/// Deterministic spread so runs are reproducible.
fn spawn_state(seed: u32) -> (Position, Velocity, Lifetime) {
    let h = seed.wrapping_mul(2_654_435_761);
    let spread = (h % 1000) as f32 / 1000.0;
    (
        Position {
            x: spread * 100.0,
            y: 50.0 + spread * 50.0,
        },
        Velocity {
            x: spread - 0.5,
            y: spread * 10.0,
        },
        Lifetime(20 + h % 60),
    )
}

fn spawn(commands: &mut CommandBuffer, seed: u32) {
    let (position, velocity, lifetime) = spawn_state(seed);
    let entity = commands.create_one();
    commands.add_component(entity, position);
    commands.add_component(entity, velocity);
    commands.add_component(entity, lifetime);
}

fn declare_systems(world: &mut World, expired: &Arc<AtomicUsize>) {
    world.declare(
        Threading::Parallel,
        Query::new()
            .write::<Position>()
            .write::<Velocity>()
            .except::<Grounded>()
            .partial(),
        |info, pack| {
            let dt = info.dt().as_secs_f32();
            let (positions, velocities) = pack.view::<(Write<Position>, Write<Velocity>)>();
            for (p, v) in positions.iter_mut().zip(velocities.iter_mut()) {
                v.y += GRAVITY * dt;
                p.x += v.x * dt;
                p.y += v.y * dt;
            }
        },
    );

    world.declare(
        Threading::Parallel,
        Query::new()
            .on_condition::<Position, _>(|p| p.y <= 0.0)
            .except::<Grounded>()
            .partial(),
        |info, pack| {
            for &entity in pack.entities() {
                info.commands().add_component(entity, Grounded);
            }
        },
    );

    world.declare(
        Threading::Parallel,
        Query::new().write::<Lifetime>().partial(),
        |info, pack| {
            let entities = pack.entities();
            let lifetimes = pack.write::<Lifetime>();
            for (&entity, lifetime) in entities.iter().zip(lifetimes.iter_mut()) {
                lifetime.0 = lifetime.0.saturating_sub(1);
                if lifetime.0 == 0 {
                    info.commands().destroy(entity);
                }
            }
        },
    );

    let counter = Arc::clone(expired);
    world.declare(
        Threading::Sequential,
        Query::new().on_remove::<Lifetime>(),
        move |info, pack| {
            counter.fetch_add(pack.len(), Ordering::Relaxed);
            let tick = info.tick() as u32;
            for (i, _) in pack.entities().iter().enumerate() {
                spawn(info.commands(), tick.wrapping_mul(31).wrapping_add(i as u32));
            }
        },
    );

    world.declare(
        Threading::Main,
        Query::new().on_add::<Grounded>(),
        |info, pack| {
            if !pack.is_empty() {
                debug!(tick = info.tick(), landed = pack.len(), "particles landed");
            }
        },
    );
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("strata_demo=info".parse()?)
                .add_directive("strata_ecs=info".parse()?),
        )
        .init();

    let workers: usize = env_or("STRATA_WORKERS", 0)?;
    let ticks: u64 = env_or("STRATA_TICKS", 120)?;
    let particles: usize = env_or("STRATA_PARTICLES", 10_000)?;

    let mut world = World::with_config(WorldConfig::default().with_workers(workers))
        .wrap_err("failed to build world")?;

    let mut commands = world.command_buffer();
    for seed in 0..particles {
        spawn(&mut commands, seed as u32);
    }
    world.commit(commands);
    info!("spawned {} particles", world.size());

    let expired = Arc::new(AtomicUsize::new(0));
    declare_systems(&mut world, &expired);

    let start = Instant::now();
    for tick in 0..ticks {
        world.tick(DT);
        if tick % 20 == 19 {
            let highest = world
                .filter(&Query::new().order_by::<Position, _>(|a, b| b.y.total_cmp(&a.y)))
                .first()
                .and_then(|&e| world.get::<Position>(e));
            info!(
                tick = world.tick_count(),
                alive = world.size(),
                expired = expired.load(Ordering::Relaxed),
                highest = ?highest,
                "simulation progress"
            );
        }
    }

    let elapsed = start.elapsed();
    info!(
        "simulated {} ticks in {:.2?} ({:.2?} per tick), {} particles expired",
        ticks,
        elapsed,
        elapsed / ticks.max(1) as u32,
        expired.load(Ordering::Relaxed)
    );

    Ok(())
}
