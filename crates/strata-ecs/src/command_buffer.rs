//! Deferred structural changes.
//!
//! Systems cannot touch the world while it is ticking, so they record
//! entity creation, destruction and component changes in a
//! [`CommandBuffer`]. The buffer hands out provisional ids starting at a
//! threshold above every world id; when the world commits the buffer, each
//! surviving provisional id is mapped to a real entity and the recorded
//! component data is merged in.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{
    column::{ByteColumn, RawValue},
    component::{Component, ComponentInfo, ComponentKey, ComponentSet},
    container::{ByteContainer, ComponentContainer, RawValues},
    entity::Entity,
    values::Values,
};

const NO_ORPHAN: u32 = u32::MAX;

/// Recorded changes, applied by [`World::commit`](crate::World::commit).
pub struct CommandBuffer {
    /// Provisional ids are `first + slot`.
    first: u32,
    /// `links[slot] == slot` while alive, otherwise the next free slot.
    links: Vec<u32>,
    next_orphan: u32,
    orphans: usize,
    components: FxHashMap<ComponentKey, ByteContainer>,
    destroyed: Vec<Entity>,
}

/// A committed buffer taken apart.
pub(crate) struct CommandParts {
    pub first: u32,
    pub created: Vec<Entity>,
    pub components: Vec<ByteContainer>,
    pub destroyed: Vec<Entity>,
}

impl CommandBuffer {
    /// Create a buffer whose provisional ids start at `first`.
    #[must_use]
    pub fn new(first: u32) -> Self {
        Self {
            first,
            links: Vec::new(),
            next_orphan: NO_ORPHAN,
            orphans: 0,
            components: FxHashMap::default(),
            destroyed: Vec::new(),
        }
    }

    /// First provisional id.
    #[must_use]
    pub const fn first(&self) -> u32 {
        self.first
    }

    /// Whether `entity` is a provisional id of this buffer.
    #[must_use]
    pub const fn is_local(&self, entity: Entity) -> bool {
        entity.index() >= self.first
    }

    fn slot(&self, entity: Entity) -> Option<usize> {
        let slot = entity.index().checked_sub(self.first)? as usize;
        (self.links.get(slot) == Some(&(slot as u32))).then_some(slot)
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.len() == self.orphans && self.components.is_empty() && self.destroyed.is_empty()
    }

    /// Number of live provisional entities.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.links.len() - self.orphans
    }

    /// Reserve one provisional entity.
    pub fn create_one(&mut self) -> Entity {
        let slot = if self.next_orphan == NO_ORPHAN {
            let slot = self.links.len() as u32;
            self.links.push(slot);
            slot
        } else {
            let slot = self.next_orphan;
            self.next_orphan = self.links[slot as usize];
            self.links[slot as usize] = slot;
            self.orphans -= 1;
            slot
        };
        Entity::new(self.first + slot)
    }

    /// Reserve `count` provisional entities.
    pub fn create(&mut self, count: usize) -> Vec<Entity> {
        (0..count).map(|_| self.create_one()).collect()
    }

    /// Reserve `count` provisional entities holding a `T` each.
    pub fn create_with<T: Component>(&mut self, count: usize, values: Values<'_, T>) -> Vec<Entity> {
        let entities = self.create(count);
        self.add_components(&entities, values);
        entities
    }

    /// Destroy an entity. Provisional ids are dropped immediately; world
    /// entities are destroyed when the buffer is committed.
    pub fn destroy(&mut self, entity: Entity) {
        if !self.is_local(entity) {
            self.destroyed.push(entity);
            return;
        }

        let Some(slot) = self.slot(entity) else {
            return;
        };
        for container in self.components.values_mut() {
            container.discard(entity);
        }
        self.links[slot] = self.next_orphan;
        self.next_orphan = slot as u32;
        self.orphans += 1;
    }

    /// Destroy several entities.
    pub fn destroy_many(&mut self, entities: &[Entity]) {
        for &entity in entities {
            self.destroy(entity);
        }
    }

    fn container(&mut self, info: ComponentInfo) -> &mut ByteContainer {
        self.components
            .entry(info.key())
            .or_insert_with(|| ByteContainer::new(info))
    }

    /// Attach `value` to `entity`, replacing any earlier recorded value.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) {
        self.container(ComponentInfo::of::<T>())
            .add(&[entity], RawValues::Broadcast(RawValue::of(&value)));
    }

    /// Attach a `T` to every entity.
    pub fn add_components<T: Component>(&mut self, entities: &[Entity], values: Values<'_, T>) {
        let info = ComponentInfo::of::<T>();
        let mut column = ByteColumn::with_capacity(info.layout(), entities.len());
        values.for_each(entities, |_, value| column.push(RawValue::of(&value)));
        self.container(info).add(entities, RawValues::Each(&column));
    }

    /// Detach every component of `C` from each entity.
    pub fn remove_components<C: ComponentSet>(&mut self, entities: &[Entity]) {
        for info in C::infos() {
            let container = self.container(info);
            for &entity in entities {
                container.mark_removed(entity);
            }
        }
    }

    /// Detach `T` from `entity`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) {
        self.remove_components::<T>(&[entity]);
    }

    /// Take the buffer apart for committing.
    pub(crate) fn into_parts(self) -> CommandParts {
        let created = self
            .links
            .iter()
            .enumerate()
            .filter(|&(slot, &link)| link == slot as u32)
            .map(|(slot, _)| Entity::new(self.first + slot as u32))
            .collect();
        CommandParts {
            first: self.first,
            created,
            components: self.components.into_values().collect(),
            destroyed: self.destroyed,
        }
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("first", &self.first)
            .field("created", &self.created_count())
            .field("components", &self.components.len())
            .field("destroyed", &self.destroyed.len())
            .finish()
    }
}
