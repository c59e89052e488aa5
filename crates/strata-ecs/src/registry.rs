//! Component registry.
//!
//! Maps component keys to their live containers. Containers are created
//! lazily, the first time a component is added or explicitly registered.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{
    component::{Component, ComponentInfo, ComponentKey},
    container::{ComponentContainer, TypedContainer},
    entity::Entity,
    error::{EcsError, EcsResult},
    stage::StageRange,
    storage::StagedSparseArray,
};

/// One container per component key.
#[derive(Default)]
pub struct ComponentRegistry {
    containers: FxHashMap<ComponentKey, Box<dyn ComponentContainer>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the container for `info`.
    ///
    /// Fails if another component already owns the key.
    pub fn register(&mut self, info: ComponentInfo) -> EcsResult<&mut dyn ComponentContainer> {
        let container = self
            .containers
            .entry(info.key())
            .or_insert_with(|| info.instantiate());

        let existing = container.info();
        if existing.name() != info.name() {
            return Err(EcsError::KeyCollision {
                key: info.key(),
                existing: existing.name(),
                incoming: info.name(),
            });
        }

        Ok(container.as_mut())
    }

    /// Get or create the container for `info`.
    ///
    /// # Panics
    ///
    /// Panics on a key collision.
    pub fn get_or_create(&mut self, info: ComponentInfo) -> &mut dyn ComponentContainer {
        match self.register(info) {
            Ok(container) => container,
            Err(err) => panic!("{err}"),
        }
    }

    /// Container for a key, if one exists.
    #[must_use]
    pub fn get(&self, key: ComponentKey) -> Option<&dyn ComponentContainer> {
        self.containers.get(&key).map(Box::as_ref)
    }

    /// Mutable container for a key, if one exists.
    #[must_use]
    pub fn get_mut(&mut self, key: ComponentKey) -> Option<&mut dyn ComponentContainer> {
        self.containers.get_mut(&key).map(Box::as_mut)
    }

    /// Typed storage of a (non-tag) component, if it exists.
    #[must_use]
    pub fn typed<T: Component>(&self) -> Option<&StagedSparseArray<T>> {
        self.get(T::KEY)?
            .as_any()
            .downcast_ref::<TypedContainer<T>>()
            .map(TypedContainer::storage)
    }

    /// Typed storage of a (non-tag) component, without creating it.
    #[must_use]
    pub fn find_typed_mut<T: Component>(&mut self) -> Option<&mut StagedSparseArray<T>> {
        self.get_mut(T::KEY)?
            .as_any_mut()
            .downcast_mut::<TypedContainer<T>>()
            .map(TypedContainer::storage_mut)
    }

    /// Whether the entity has an entry for `key` within `range`.
    #[must_use]
    pub fn holds(&self, key: ComponentKey, entity: Entity, range: StageRange) -> bool {
        self.get(key).is_some_and(|c| c.has(entity, range))
    }

    /// Copy of the component value an entity holds within `range`. Tags
    /// yield their (only) value when present.
    #[must_use]
    pub fn read<T: Component>(&self, entity: Entity, range: StageRange) -> Option<T> {
        if std::mem::size_of::<T>() == 0 {
            let container = self.get(T::KEY)?;
            // SAFETY: `T` is an inhabited zero-sized type, so zero bytes are
            // a valid value for it.
            return container
                .has(entity, range)
                .then(|| unsafe { std::mem::zeroed() });
        }
        self.typed::<T>()?.get_in(entity, range).copied()
    }

    /// Typed storage of a (non-tag) component, created on first use.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or another container type owns the key.
    pub fn typed_mut<T: Component>(&mut self) -> &mut StagedSparseArray<T> {
        assert!(std::mem::size_of::<T>() > 0, "{} is a tag and has no values", T::NAME);
        let container = self.get_or_create(ComponentInfo::of::<T>());
        let Some(typed) = container.as_any_mut().downcast_mut::<TypedContainer<T>>() else {
            panic!("{} is not stored as a typed container", T::NAME);
        };
        typed.storage_mut()
    }

    /// Number of containers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Whether no container exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Iterate all containers.
    pub fn iter(&self) -> impl Iterator<Item = &dyn ComponentContainer> {
        self.containers.values().map(Box::as_ref)
    }

    /// Iterate all containers mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut dyn ComponentContainer> {
        self.containers.values_mut().map(Box::as_mut)
    }

    /// Promote every container.
    pub fn promote_all(&mut self) {
        for container in self.containers.values_mut() {
            container.promote();
        }
    }

    /// Drop every container.
    pub fn clear(&mut self) {
        self.containers.clear();
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.containers.values().map(|c| c.info().name()))
            .finish()
    }
}
