//! World - entities, components, systems and the tick loop.
//!
//! Between ticks the world is mutated directly. During [`World::tick`]
//! systems only read it and record structural changes in command buffers.
//! Every tick runs the same pipeline:
//!
//! 1. drop cached filter results nobody uses, then bring the rest up to date
//!    from the entities modified since the previous tick;
//! 2. for each system in declaration order: apply its transforms, bind a
//!    pack, run the body, write back its write bindings;
//! 3. promote every storage (added becomes settled, removed is dropped) and
//!    make destroyed ids reusable;
//! 4. commit the command buffers in system order, so their changes show up
//!    as events on the next tick;
//! 5. advance the tick counter and apply system declarations and
//!    revocations requested by systems.

use std::{fmt, time::Duration};

use hashbrown::HashSet;
use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::{FxBuildHasher, FxHashMap};
use tracing::{debug, info, trace, warn};

use crate::{
    command_buffer::{CommandBuffer, CommandParts},
    component::{Component, ComponentInfo, ComponentSet},
    config::WorldConfig,
    container::{ComponentContainer, RawValues},
    column::RawValue,
    entity::{Entity, EntityAllocator},
    error::{EcsError, EcsResult},
    filter::{FilterCache, FilterContext},
    pack::{Pack, PackData},
    query::Query,
    registry::ComponentRegistry,
    sort::SortOptions,
    stage::StageRange,
    system::{Info, System, SystemRequests, SystemToken, Threading, TokenSource, build_system},
    values::Values,
};

/// The ECS world.
pub struct World {
    config: WorldConfig,
    /// Dedicated workers; `None` runs on rayon's global pool.
    pool: Option<rayon::ThreadPool>,
    entities: EntityAllocator,
    registry: ComponentRegistry,
    cache: FilterCache,
    systems: Vec<System>,
    /// Filled by systems through [`Info`], drained after each tick.
    requests: Mutex<SystemRequests>,
    tokens: TokenSource,
    /// Entities whose components changed since the last filtering pass.
    modified: HashSet<Entity, FxBuildHasher>,
    tick: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create a world on rayon's global pool with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(WorldConfig::default(), None)
    }

    /// Create a world, starting a dedicated pool if `config.workers > 0`.
    pub fn with_config(config: WorldConfig) -> EcsResult<Self> {
        let pool = if config.workers > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.workers)
                    .thread_name(|i| format!("strata-worker-{i}"))
                    .build()?,
            )
        } else {
            None
        };

        info!(
            "world created: {} workers, min {} entities per worker, parallel={}",
            pool.as_ref().map_or_else(rayon::current_num_threads, rayon::ThreadPool::current_num_threads),
            config.min_entities_per_worker,
            config.parallel
        );
        Ok(Self::from_parts(config, pool))
    }

    fn from_parts(config: WorldConfig, pool: Option<rayon::ThreadPool>) -> Self {
        Self {
            config,
            pool,
            entities: EntityAllocator::new(),
            registry: ComponentRegistry::new(),
            cache: FilterCache::new(),
            systems: Vec::new(),
            requests: Mutex::new(SystemRequests::default()),
            tokens: TokenSource::default(),
            modified: HashSet::default(),
            tick: 0,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Component containers.
    #[must_use]
    pub const fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn worker_count(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, rayon::ThreadPool::current_num_threads)
    }

    const fn sort_options(&self) -> SortOptions {
        SortOptions {
            parallel: self.config.parallel,
            threshold: self.config.sort_parallel_threshold,
        }
    }

    // ==================== Entities ====================

    /// Create an entity with no components.
    pub fn create(&mut self) -> Entity {
        let entity = self.entities.create();
        self.modified.insert(entity);
        entity
    }

    /// Create `count` entities.
    pub fn create_many(&mut self, count: usize) -> Vec<Entity> {
        (0..count).map(|_| self.create()).collect()
    }

    /// Create `count` entities holding a `T` each.
    pub fn create_with<T: Component>(&mut self, count: usize, values: Values<'_, T>) -> Vec<Entity> {
        let entities = self.create_many(count);
        self.add_components(&entities, values);
        entities
    }

    /// Destroy an entity. Its components move to the removed stage and its
    /// id becomes reusable after the next promotion.
    ///
    /// Returns `false` if the entity was not alive.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        self.destroy_many(&[entity]) == 1
    }

    /// Destroy several entities. Dead or repeated ids are ignored.
    ///
    /// Returns how many entities were destroyed.
    pub fn destroy_many(&mut self, entities: &[Entity]) -> usize {
        let released: Vec<Entity> = entities
            .iter()
            .copied()
            .filter(|&e| self.entities.release(e))
            .collect();
        if released.is_empty() {
            return 0;
        }

        for container in self.registry.iter_mut() {
            container.destroy(&released);
        }
        self.modified.extend(released.iter().copied());
        released.len()
    }

    /// Whether the entity is alive.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Every alive entity, ascending.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.entities.iter_alive().collect()
    }

    /// Number of alive entities.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.entities.alive_count()
    }

    /// One past the highest id ever issued.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.entities.capacity()
    }

    /// Number of completed ticks.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Forget every entity and component. Systems stay declared and their
    /// filters are re-evaluated from scratch on the next tick.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.entities.clear();
        self.modified.clear();
        self.cache.invalidate();
        debug!("world cleared");
    }

    // ==================== Components ====================

    /// Create the container for `T` up front.
    pub fn register<T: Component>(&mut self) -> EcsResult<()> {
        self.registry.register(ComponentInfo::of::<T>())?;
        Ok(())
    }

    fn insert_component<T: Component>(&mut self, entity: Entity, value: T) {
        if std::mem::size_of::<T>() == 0 {
            self.registry
                .get_or_create(ComponentInfo::of::<T>())
                .add(&[entity], RawValues::Broadcast(RawValue::of(&value)));
        } else {
            self.registry.typed_mut::<T>().insert(entity, value);
        }
        self.modified.insert(entity);
    }

    /// Attach `value` to an alive entity, overwriting any current `T`.
    ///
    /// Returns `false` if the entity is dead.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }
        self.insert_component(entity, value);
        true
    }

    /// Attach a `T` to each alive entity.
    pub fn add_components<T: Component>(&mut self, entities: &[Entity], values: Values<'_, T>) {
        values.for_each(entities, |entity, value| {
            if self.entities.is_alive(entity) {
                self.insert_component(entity, value);
            }
        });
    }

    /// Overwrite the `T` an entity already holds.
    ///
    /// Returns `false` if it holds none.
    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> bool {
        if std::mem::size_of::<T>() == 0 {
            return self.has_component::<T>(entity);
        }
        self.registry
            .find_typed_mut::<T>()
            .is_some_and(|storage| storage.set(entity, value))
    }

    /// Overwrite the `T` of each entity that holds one.
    ///
    /// Returns how many values were written.
    pub fn set_components<T: Component>(&mut self, entities: &[Entity], values: Values<'_, T>) -> usize {
        let mut written = 0;
        values.for_each(entities, |entity, value| {
            if self.set_component(entity, value) {
                written += 1;
            }
        });
        written
    }

    /// Detach `T` from an entity.
    ///
    /// Returns `false` if it held none.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> bool {
        self.remove_components::<T>(&[entity]) > 0
    }

    /// Detach every component of `C` from each entity.
    ///
    /// Returns how many components were removed.
    pub fn remove_components<C: ComponentSet>(&mut self, entities: &[Entity]) -> usize {
        let mut removed = 0;
        for key in C::keys() {
            if let Some(container) = self.registry.get_mut(key) {
                removed += container.destroy(entities);
            }
        }
        if removed > 0 {
            self.modified.extend(entities.iter().copied());
        }
        removed
    }

    /// Current value of an entity's `T`.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<T> {
        self.registry.read::<T>(entity, StageRange::ALIVE)
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

    // ==================== Queries and systems ====================

    /// Evaluate a query right now, without caching. Returns the matched
    /// entities after conditions and ordering.
    #[must_use]
    pub fn filter<S>(&self, query: &Query<S>) -> Vec<Entity> {
        let desc = query.descriptor();
        let mut entities = FilterContext::new(&self.registry, &self.entities).evaluate(desc.group());

        let transform = desc.transform();
        if !transform.is_empty() {
            let registry = &self.registry;
            let options = self.sort_options();
            self.install(|| transform.apply(registry, &mut entities, options));
        }
        entities
    }

    /// Declare a system. It runs from the next tick on, after every system
    /// declared before it.
    pub fn declare<S, F>(&mut self, threading: Threading, query: Query<S>, body: F) -> SystemToken
    where
        F: Fn(&mut Info<'_>, &mut Pack<'_>) + Send + Sync + 'static,
    {
        let token = self.tokens.next();
        self.install_system(build_system(token, threading, query, body));
        token
    }

    fn install_system(&mut self, system: System) {
        debug!("declared system {} ({:?})", system.token, system.threading);
        self.cache.acquire(system.query.group());
        self.systems.push(system);
    }

    /// Remove a system. Its cached filter is dropped on the next tick if no
    /// other system shares it.
    pub fn revoke(&mut self, token: SystemToken) -> EcsResult<()> {
        let index = self
            .systems
            .iter()
            .position(|s| s.token == token)
            .ok_or(EcsError::UnknownSystem(token))?;
        let system = self.systems.remove(index);
        self.cache.release(system.query.group());
        debug!("revoked system {token}");
        Ok(())
    }

    /// Number of declared systems.
    #[must_use]
    pub fn systems(&self) -> usize {
        self.systems.len()
    }

    fn apply_requests(&mut self) {
        let requests = std::mem::take(self.requests.get_mut());
        for system in requests.declare {
            self.install_system(system);
        }
        for token in requests.revoke {
            if let Err(err) = self.revoke(token) {
                warn!("deferred revoke ignored: {err}");
            }
        }
    }

    // ==================== Tick ====================

    /// Run one tick. See the module docs for the pipeline.
    pub fn tick(&mut self, dt: Duration) {
        trace!("tick {} begins", self.tick);

        let pruned = self.cache.prune();
        let mut modified: Vec<Entity> = self.modified.drain().collect();
        modified.sort_unstable();
        let ctx = FilterContext::new(&self.registry, &self.entities);
        self.cache.refresh(&ctx, &modified);
        trace!(
            "filtering: {} modified, {} groups cached, {} pruned",
            modified.len(),
            self.cache.len(),
            pruned
        );

        let mut systems = std::mem::take(&mut self.systems);
        let mut buffers = Vec::new();
        for system in &mut systems {
            buffers.extend(self.run_system(system, dt));
        }
        self.systems = systems;

        self.registry.promote_all();
        let recycled = self.entities.recycle();

        let mut committed = 0;
        for buffer in buffers {
            if !buffer.is_empty() {
                self.commit(buffer);
                committed += 1;
            }
        }

        self.tick += 1;
        self.apply_requests();
        trace!(
            "tick {} done: {} buffers committed, {} ids recycled",
            self.tick - 1,
            committed,
            recycled
        );
    }

    fn run_system(&mut self, system: &mut System, dt: Duration) -> Vec<CommandBuffer> {
        let group = system.query.group();
        let mut entities = if !system.has_run && system.query.seeds_with_existing() {
            FilterContext::new(&self.registry, &self.entities).evaluate(&group.seeded())
        } else {
            self.cache.get(group).map(<[Entity]>::to_vec).unwrap_or_default()
        };
        system.has_run = true;

        let transform = system.query.transform();
        if !transform.is_empty() {
            let registry = &self.registry;
            let options = self.sort_options();
            self.install(|| transform.apply(registry, &mut entities, options));
        }

        let mut data = PackData::resolve(
            &self.registry,
            system.query.bindings(),
            entities,
            system.query.is_partial(),
        );
        let buffers = self.dispatch(system, data.view(), dt);
        data.into_writes().apply(&mut self.registry);
        buffers
    }

    fn dispatch(&self, system: &System, pack: Pack<'_>, dt: Duration) -> Vec<CommandBuffer> {
        let (registry, entities) = (&self.registry, &self.entities);
        let (requests, tokens, tick) = (&self.requests, &self.tokens, self.tick);
        let run = |mut pack: Pack<'_>| {
            let mut info = Info::new(dt, tick, registry, entities, requests, tokens);
            (system.body)(&mut info, &mut pack);
            info.into_commands()
        };

        if !self.config.parallel || system.threading != Threading::Parallel {
            return vec![run(pack)];
        }

        let slices = (pack.len() / self.config.min_entities_per_worker.max(1)).min(self.worker_count());
        if !pack.is_partial() || slices < 2 {
            return vec![self.install(|| run(pack))];
        }

        trace!("system {} split into {} slices", system.token, slices);
        let packs = pack.split(slices);
        self.install(|| packs.into_par_iter().map(run).collect())
    }

    // ==================== Commands ====================

    /// An empty command buffer whose provisional ids lie above every current
    /// entity. Commit it before creating further entities.
    #[must_use]
    pub fn command_buffer(&self) -> CommandBuffer {
        CommandBuffer::new(self.entities.capacity())
    }

    /// Apply a command buffer.
    ///
    /// Surviving provisional entities become real ones, recorded components
    /// are merged into the world's containers, and recorded destructions are
    /// carried out. Returns the mapping from provisional to real ids.
    pub fn commit(&mut self, buffer: CommandBuffer) -> FxHashMap<Entity, Entity> {
        let CommandParts {
            first,
            created,
            components,
            destroyed,
        } = buffer.into_parts();

        let mut mapping = FxHashMap::default();
        mapping.reserve(created.len());
        for local in created {
            let entity = self.create();
            mapping.insert(local, entity);
        }

        let is_local = |entity: Entity| entity.index() >= first;
        for mut container in components {
            // Data recorded for ids that will not exist in the world.
            let stale: Vec<Entity> = container
                .entities(true)
                .iter()
                .copied()
                .filter(|e| {
                    if is_local(*e) {
                        !mapping.contains_key(e)
                    } else {
                        !self.entities.is_alive(*e)
                    }
                })
                .collect();
            for entity in stale {
                container.discard(entity);
            }

            container.remap(&mapping, &is_local);
            self.modified.extend(container.entities(true).iter().copied());
            self.registry.get_or_create(*container.info()).merge(&container);
        }

        let destroyed = self.destroy_many(&destroyed);
        debug!(
            "committed command buffer: {} created, {} destroyed",
            mapping.len(),
            destroyed
        );
        mapping
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.alive_count())
            .field("components", &self.registry)
            .field("systems", &self.systems.len())
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Component;

    #[derive(Component, Clone, Copy, Debug, PartialEq)]
    struct Position(i32);

    #[derive(Component, Clone, Copy, Debug, PartialEq)]
    struct Velocity(i32);

    #[derive(Component, Clone, Copy, Debug, PartialEq)]
    struct Frozen;

    #[test]
    fn test_create_and_destroy() {
        let mut world = World::new();
        let a = world.create();
        let b = world.create();
        assert_eq!(a, Entity::new(1));
        assert_eq!(b, Entity::new(2));
        assert_eq!(world.size(), 2);

        assert!(world.destroy(a));
        assert!(!world.destroy(a));
        assert!(!world.is_alive(a));
        assert_eq!(world.entities(), vec![b]);
    }

    #[test]
    fn test_ids_reused_only_after_tick() {
        let mut world = World::new();
        let a = world.create();
        world.destroy(a);
        assert_ne!(world.create(), a);

        world.tick(Duration::ZERO);
        assert_eq!(world.create(), a);
    }

    #[test]
    fn test_component_lifecycle() {
        let mut world = World::new();
        let e = world.create();

        assert!(world.add_component(e, Position(1)));
        assert!(world.add_component(e, Frozen));
        assert_eq!(world.get::<Position>(e), Some(Position(1)));
        assert_eq!(world.get::<Frozen>(e), Some(Frozen));
        assert!(world.has_added::<Position>(e));
        assert!(world.has_components::<(Position, Frozen)>(e));

        assert!(world.set_component(e, Position(5)));
        assert!(!world.set_component(e, Velocity(5)));
        assert_eq!(world.get::<Position>(e), Some(Position(5)));

        assert!(world.remove_component::<Frozen>(e));
        assert!(world.has_removed::<Frozen>(e));
        assert!(!world.has_component::<Frozen>(e));

        world.tick(Duration::ZERO);
        assert!(!world.has_added::<Position>(e));
        assert!(!world.has_removed::<Frozen>(e));
    }

    #[test]
    fn test_add_to_dead_entity_is_refused() {
        let mut world = World::new();
        let e = world.create();
        world.destroy(e);
        assert!(!world.add_component(e, Position(0)));
        assert!(world.get::<Position>(e).is_none());
    }

    #[test]
    fn test_commit_maps_provisional_ids() {
        let mut world = World::new();
        let existing = world.create();
        world.add_component(existing, Position(0));

        let mut buffer = world.command_buffer();
        let local = buffer.create_one();
        buffer.add_component(local, Velocity(3));
        buffer.remove_component::<Position>(existing);

        let mapping = world.commit(buffer);
        let real = mapping[&local];
        assert!(world.is_alive(real));
        assert_eq!(world.get::<Velocity>(real), Some(Velocity(3)));
        assert!(!world.has_component::<Position>(existing));
    }

    #[test]
    fn test_revoke_unknown_system() {
        let mut world = World::new();
        let token = world.declare(Threading::Main, Query::new(), |_, _| {});
        assert_eq!(world.systems(), 1);
        assert!(world.revoke(token).is_ok());
        assert!(matches!(world.revoke(token), Err(EcsError::UnknownSystem(t)) if t == token));
    }
}
