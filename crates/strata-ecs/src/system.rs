//! Systems and the context they run with.
//!
//! A system is a closure over an [`Info`] and a [`Pack`]. `Info` carries the
//! tick's timing, a [`CommandBuffer`] for structural changes, read-only
//! access to the world, and a way to declare or revoke systems. Those
//! requests take effect once the current tick finishes.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    command_buffer::CommandBuffer,
    component::{Component, ComponentSet},
    entity::{Entity, EntityAllocator},
    pack::Pack,
    query::{Query, QueryDescriptor},
    registry::ComponentRegistry,
    stage::StageRange,
};

/// Handle to a declared system.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemToken(u64);

impl SystemToken {
    /// Raw token value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SystemToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemToken({})", self.0)
    }
}

impl fmt::Display for SystemToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a system runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Threading {
    /// One call per tick, on the thread calling [`World::tick`](crate::World::tick).
    #[default]
    Sequential,
    /// Runs on the world's pool. Partial packs are split across its workers;
    /// full packs run once.
    Parallel,
    /// One call per tick, on the thread calling [`World::tick`](crate::World::tick),
    /// even when the world runs parallel systems.
    Main,
}

/// Signature of a system body.
pub type SystemFn = Box<dyn Fn(&mut Info<'_>, &mut Pack<'_>) + Send + Sync>;

/// A declared system.
pub(crate) struct System {
    pub token: SystemToken,
    pub threading: Threading,
    pub query: QueryDescriptor,
    pub body: SystemFn,
    pub has_run: bool,
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("token", &self.token)
            .field("threading", &self.threading)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

/// Declarations and revocations waiting for the tick to end.
#[derive(Default)]
pub(crate) struct SystemRequests {
    pub declare: Vec<System>,
    pub revoke: Vec<SystemToken>,
}

/// Hands out system tokens.
#[derive(Debug, Default)]
pub(crate) struct TokenSource(AtomicU64);

impl TokenSource {
    pub fn next(&self) -> SystemToken {
        SystemToken(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) fn build_system<S, F>(token: SystemToken, threading: Threading, query: Query<S>, body: F) -> System
where
    F: Fn(&mut Info<'_>, &mut Pack<'_>) + Send + Sync + 'static,
{
    System {
        token,
        threading,
        query: query.into_descriptor(),
        body: Box::new(body),
        has_run: false,
    }
}

/// Context of one system call.
pub struct Info<'a> {
    dt: Duration,
    tick: u64,
    commands: CommandBuffer,
    registry: &'a ComponentRegistry,
    entities: &'a EntityAllocator,
    requests: &'a Mutex<SystemRequests>,
    tokens: &'a TokenSource,
}

impl<'a> Info<'a> {
    pub(crate) fn new(
        dt: Duration,
        tick: u64,
        registry: &'a ComponentRegistry,
        entities: &'a EntityAllocator,
        requests: &'a Mutex<SystemRequests>,
        tokens: &'a TokenSource,
    ) -> Self {
        Self {
            dt,
            tick,
            commands: CommandBuffer::new(entities.capacity()),
            registry,
            entities,
            requests,
            tokens,
        }
    }

    /// Time step passed to [`World::tick`](crate::World::tick).
    #[must_use]
    pub const fn dt(&self) -> Duration {
        self.dt
    }

    /// Number of ticks completed before this one.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Buffer for structural changes, committed after the systems run.
    pub fn commands(&mut self) -> &mut CommandBuffer {
        &mut self.commands
    }

    pub(crate) fn into_commands(self) -> CommandBuffer {
        self.commands
    }

    /// Current value of an entity's `T`.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<T> {
        self.registry.read::<T>(entity, StageRange::ALIVE)
    }

    /// Whether the entity is alive.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Whether the entity holds `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.registry.holds(T::KEY, entity, StageRange::ALIVE)
    }

    /// Whether the entity holds every component of `C`.
    #[must_use]
    pub fn has_components<C: ComponentSet>(&self, entity: Entity) -> bool {
        C::keys()
            .iter()
            .all(|&key| self.registry.holds(key, entity, StageRange::ALIVE))
    }

    /// Whether `T` was added to the entity since the last tick.
    #[must_use]
    pub fn has_added<T: Component>(&self, entity: Entity) -> bool {
        self.registry.holds(T::KEY, entity, StageRange::ADDED)
    }

    /// Whether `T` was removed from the entity since the last tick.
    #[must_use]
    pub fn has_removed<T: Component>(&self, entity: Entity) -> bool {
        self.registry.holds(T::KEY, entity, StageRange::REMOVED)
    }

    /// Declare a system. It starts running on the next tick.
    pub fn declare<S, F>(&self, threading: Threading, query: Query<S>, body: F) -> SystemToken
    where
        F: Fn(&mut Info<'_>, &mut Pack<'_>) + Send + Sync + 'static,
    {
        let token = self.tokens.next();
        let system = build_system(token, threading, query, body);
        self.requests.lock().declare.push(system);
        token
    }

    /// Revoke a system once the current tick ends.
    pub fn revoke(&self, token: SystemToken) {
        self.requests.lock().revoke.push(token);
    }
}

impl fmt::Debug for Info<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Info")
            .field("dt", &self.dt)
            .field("tick", &self.tick)
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}
