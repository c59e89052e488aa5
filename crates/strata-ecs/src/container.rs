//! Type-erased component containers.
//!
//! The registry holds one [`ComponentContainer`] per component key. Three
//! shapes implement it:
//!
//! - [`TypedContainer<T>`]: ordinary components, backed by a typed vector.
//! - [`FlagContainer`]: zero-sized tags, membership only.
//! - [`ByteContainer`]: components known only by layout. Command buffers
//!   stage their writes in these.
//!
//! Values cross the trait boundary as [`RawValue`]s. Reading one back as a
//! concrete type checks the layout; keys are unique per component name,
//! which the registry verifies when a container is first created.

use std::any::Any;

use rustc_hash::FxHashMap;

use crate::{
    column::{ByteColumn, RawValue},
    component::{Component, ComponentInfo, ComponentKey},
    entity::Entity,
    stage::StageRange,
    storage::{StagedByteArray, StagedSparseArray, StagedSparseSet},
};

/// Source values for a bulk add.
#[derive(Debug, Clone, Copy)]
pub enum RawValues<'a> {
    /// The same value for every entity.
    Broadcast(RawValue<'a>),
    /// One value per entity, in entity order.
    Each(&'a ByteColumn),
}

impl RawValues<'_> {
    fn get(&self, index: usize) -> RawValue<'_> {
        match self {
            Self::Broadcast(value) => *value,
            Self::Each(column) => column.get(index),
        }
    }
}

/// Uniform operations over one component's staged storage.
pub trait ComponentContainer: Any + Send + Sync {
    /// Metadata of the stored component.
    fn info(&self) -> &ComponentInfo;

    /// Key of the stored component.
    fn key(&self) -> ComponentKey {
        self.info().key()
    }

    /// Alignment of one element.
    fn alignment(&self) -> usize {
        self.info().align()
    }

    /// Size of one element in bytes.
    fn element_size(&self) -> usize {
        self.info().size()
    }

    /// Insert or overwrite values for `entities`.
    fn add(&mut self, entities: &[Entity], values: RawValues<'_>);

    /// Move `entities` into the removed stage. Returns how many were erased.
    fn destroy(&mut self, entities: &[Entity]) -> usize;

    /// Whether `entity` lies within `range`.
    fn has(&self, entity: Entity, range: StageRange) -> bool;

    /// Whether `entity` currently holds the component.
    fn has_component(&self, entity: Entity) -> bool {
        self.has(entity, StageRange::ALIVE)
    }

    /// Whether the component was added to `entity` since the last promotion.
    fn has_added(&self, entity: Entity) -> bool {
        self.has(entity, StageRange::ADDED)
    }

    /// Whether the component was removed from `entity` since the last promotion.
    fn has_removed(&self, entity: Entity) -> bool {
        self.has(entity, StageRange::REMOVED)
    }

    /// Entities of the given stages, in slot order.
    fn stage_entities(&self, range: StageRange) -> &[Entity];

    /// Alive entities, optionally followed by the removed stage.
    fn entities(&self, include_removed: bool) -> &[Entity] {
        self.stage_entities(if include_removed {
            StageRange::ALL
        } else {
            StageRange::ALIVE
        })
    }

    /// Number of entries within `range`.
    fn len(&self, range: StageRange) -> usize {
        self.stage_entities(range).len()
    }

    /// Value of `entity` within `range`.
    fn raw(&self, entity: Entity, range: StageRange) -> Option<RawValue<'_>>;

    /// Dense slot of an entity in any stage.
    fn slot_of(&self, entity: Entity) -> Option<usize>;

    /// Pointer to slot 0 of the dense data.
    fn dense_ptr(&self) -> *const u8;

    /// Append the values of `entities` to `dst`, in order. Removed entries
    /// are readable until the next promotion.
    ///
    /// # Panics
    ///
    /// Panics if an entity has no entry in any stage.
    fn copy_to(&self, entities: &[Entity], dst: &mut ByteColumn) {
        dst.reserve(entities.len());
        for &entity in entities {
            let Some(value) = self.raw(entity, StageRange::ALL) else {
                panic!("{entity:?} has no {} to copy", self.info().name());
            };
            dst.push(value);
        }
    }

    /// Overwrite the values of `entities` from `src`, element `i` going to
    /// `entities[i]`. Entities that no longer hold the component are skipped.
    fn copy_from(&mut self, entities: &[Entity], src: &ByteColumn);

    /// Renumber entries nominated by `predicate` through `mapping`.
    fn remap(&mut self, mapping: &FxHashMap<Entity, Entity>, predicate: &dyn Fn(Entity) -> bool);

    /// Absorb another container of the same component: its alive entries are
    /// inserted or overwritten, its removed entries are erased here.
    fn merge(&mut self, other: &dyn ComponentContainer);

    /// Drop the removed stage and fold added into settled.
    fn promote(&mut self);

    /// Remove every entry.
    fn clear(&mut self);

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;

    /// Downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

fn assert_same_component(this: &ComponentInfo, other: &ComponentInfo) {
    assert_eq!(
        this.key(),
        other.key(),
        "cannot merge {} into {}",
        other.name(),
        this.name()
    );
    assert_eq!(this.size(), other.size(), "size mismatch merging {}", this.name());
}

// ==================== Typed ====================

/// Container for an ordinary component type.
pub struct TypedContainer<T: Component> {
    info: ComponentInfo,
    storage: StagedSparseArray<T>,
}

impl<T: Component> TypedContainer<T> {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            info: ComponentInfo::of::<T>(),
            storage: StagedSparseArray::new(),
        }
    }

    /// Typed storage.
    #[must_use]
    pub const fn storage(&self) -> &StagedSparseArray<T> {
        &self.storage
    }

    /// Mutable typed storage.
    #[must_use]
    pub const fn storage_mut(&mut self) -> &mut StagedSparseArray<T> {
        &mut self.storage
    }

    fn read(value: RawValue<'_>) -> T {
        // SAFETY: values reaching a typed container carry this component's
        // key, and keys map to exactly one component type.
        unsafe { value.read::<T>() }
    }
}

impl<T: Component> Default for TypedContainer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ComponentContainer for TypedContainer<T> {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn add(&mut self, entities: &[Entity], values: RawValues<'_>) {
        for (i, &entity) in entities.iter().enumerate() {
            self.storage.insert(entity, Self::read(values.get(i)));
        }
    }

    fn destroy(&mut self, entities: &[Entity]) -> usize {
        entities.iter().filter(|&&e| self.storage.erase(e)).count()
    }

    fn has(&self, entity: Entity, range: StageRange) -> bool {
        self.storage.has(entity, range)
    }

    fn stage_entities(&self, range: StageRange) -> &[Entity] {
        self.storage.entities(range)
    }

    fn raw(&self, entity: Entity, range: StageRange) -> Option<RawValue<'_>> {
        self.storage.get_in(entity, range).map(RawValue::of)
    }

    fn slot_of(&self, entity: Entity) -> Option<usize> {
        self.storage.index().slot_in(entity, StageRange::ALL)
    }

    fn dense_ptr(&self) -> *const u8 {
        self.storage.values().as_ptr().cast()
    }

    fn copy_to(&self, entities: &[Entity], dst: &mut ByteColumn) {
        dst.reserve(entities.len());
        for &entity in entities {
            let Some(value) = self.storage.get_in(entity, StageRange::ALL) else {
                panic!("{entity:?} has no {} to copy", T::NAME);
            };
            dst.push(RawValue::of(value));
        }
    }

    fn copy_from(&mut self, entities: &[Entity], src: &ByteColumn) {
        debug_assert_eq!(entities.len(), src.len());
        for (i, &entity) in entities.iter().enumerate() {
            self.storage.set(entity, Self::read(src.get(i)));
        }
    }

    fn remap(&mut self, mapping: &FxHashMap<Entity, Entity>, predicate: &dyn Fn(Entity) -> bool) {
        self.storage.remap(mapping, predicate);
    }

    fn merge(&mut self, other: &dyn ComponentContainer) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self.storage.merge(&other.storage);
            return;
        }

        assert_same_component(&self.info, other.info());
        for &entity in other.stage_entities(StageRange::ALIVE) {
            if let Some(value) = other.raw(entity, StageRange::ALIVE) {
                self.storage.insert(entity, Self::read(value));
            }
        }
        for &entity in other.stage_entities(StageRange::REMOVED) {
            self.storage.erase(entity);
        }
    }

    fn promote(&mut self) {
        self.storage.promote();
    }

    fn clear(&mut self) {
        self.storage.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ==================== Flag ====================

/// Container for zero-sized tag components.
pub struct FlagContainer {
    info: ComponentInfo,
    storage: StagedSparseSet,
}

impl FlagContainer {
    /// Create an empty container for a tag.
    #[must_use]
    pub fn new(info: ComponentInfo) -> Self {
        debug_assert!(info.is_tag(), "{} is not zero-sized", info.name());
        Self {
            info,
            storage: StagedSparseSet::new(),
        }
    }

    /// Membership storage.
    #[must_use]
    pub const fn storage(&self) -> &StagedSparseSet {
        &self.storage
    }
}

impl ComponentContainer for FlagContainer {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn add(&mut self, entities: &[Entity], _values: RawValues<'_>) {
        for &entity in entities {
            self.storage.insert(entity, ());
        }
    }

    fn destroy(&mut self, entities: &[Entity]) -> usize {
        entities.iter().filter(|&&e| self.storage.erase(e)).count()
    }

    fn has(&self, entity: Entity, range: StageRange) -> bool {
        self.storage.has(entity, range)
    }

    fn stage_entities(&self, range: StageRange) -> &[Entity] {
        self.storage.entities(range)
    }

    fn raw(&self, entity: Entity, range: StageRange) -> Option<RawValue<'_>> {
        self.storage
            .has(entity, range)
            .then(|| RawValue::of(&()))
    }

    fn slot_of(&self, entity: Entity) -> Option<usize> {
        self.storage.index().slot_in(entity, StageRange::ALL)
    }

    fn dense_ptr(&self) -> *const u8 {
        std::ptr::NonNull::<u8>::dangling().as_ptr()
    }

    fn copy_to(&self, entities: &[Entity], dst: &mut ByteColumn) {
        for _ in entities {
            dst.push(RawValue::of(&()));
        }
    }

    fn copy_from(&mut self, _entities: &[Entity], _src: &ByteColumn) {}

    fn remap(&mut self, mapping: &FxHashMap<Entity, Entity>, predicate: &dyn Fn(Entity) -> bool) {
        self.storage.remap(mapping, predicate);
    }

    fn merge(&mut self, other: &dyn ComponentContainer) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self.storage.merge(&other.storage);
            return;
        }

        assert_same_component(&self.info, other.info());
        for &entity in other.stage_entities(StageRange::ALIVE) {
            self.storage.insert(entity, ());
        }
        for &entity in other.stage_entities(StageRange::REMOVED) {
            self.storage.erase(entity);
        }
    }

    fn promote(&mut self) {
        self.storage.promote();
    }

    fn clear(&mut self) {
        self.storage.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ==================== Bytes ====================

/// Container for components known only by layout.
pub struct ByteContainer {
    info: ComponentInfo,
    storage: StagedByteArray,
}

impl ByteContainer {
    /// Create an empty container.
    #[must_use]
    pub fn new(info: ComponentInfo) -> Self {
        Self {
            storage: StagedByteArray::with_layout(info.layout()),
            info,
        }
    }

    /// Raw storage.
    #[must_use]
    pub const fn storage(&self) -> &StagedByteArray {
        &self.storage
    }

    /// Record that `entity` loses the component, whether or not this
    /// container holds it. Merging then erases it from the target.
    pub fn mark_removed(&mut self, entity: Entity) {
        if !self.storage.has(entity, StageRange::ALL) {
            // Removed entries are only used for their entity, never read, so
            // zeroed placeholder bytes are enough.
            let zeroes = vec![0u8; self.info.size()];
            // SAFETY: `zeroes` holds exactly one element's worth of bytes and
            // the column copies them bytewise.
            let value = unsafe { RawValue::from_raw(zeroes.as_ptr(), self.info.layout()) };
            self.storage.insert(entity, value);
        }
        self.storage.erase(entity);
    }

    /// Drop every trace of `entity`.
    pub fn discard(&mut self, entity: Entity) -> bool {
        self.storage.discard(entity)
    }
}

impl ComponentContainer for ByteContainer {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn add(&mut self, entities: &[Entity], values: RawValues<'_>) {
        for (i, &entity) in entities.iter().enumerate() {
            self.storage.insert(entity, values.get(i));
        }
    }

    fn destroy(&mut self, entities: &[Entity]) -> usize {
        entities.iter().filter(|&&e| self.storage.erase(e)).count()
    }

    fn has(&self, entity: Entity, range: StageRange) -> bool {
        self.storage.has(entity, range)
    }

    fn stage_entities(&self, range: StageRange) -> &[Entity] {
        self.storage.entities(range)
    }

    fn raw(&self, entity: Entity, range: StageRange) -> Option<RawValue<'_>> {
        self.storage.get_in(entity, range)
    }

    fn slot_of(&self, entity: Entity) -> Option<usize> {
        self.storage.index().slot_in(entity, StageRange::ALL)
    }

    fn dense_ptr(&self) -> *const u8 {
        self.storage.dense().as_ptr()
    }

    fn copy_from(&mut self, entities: &[Entity], src: &ByteColumn) {
        debug_assert_eq!(entities.len(), src.len());
        for (i, &entity) in entities.iter().enumerate() {
            self.storage.set(entity, src.get(i));
        }
    }

    fn remap(&mut self, mapping: &FxHashMap<Entity, Entity>, predicate: &dyn Fn(Entity) -> bool) {
        self.storage.remap(mapping, predicate);
    }

    fn merge(&mut self, other: &dyn ComponentContainer) {
        assert_same_component(&self.info, other.info());
        for &entity in other.stage_entities(StageRange::ALIVE) {
            if let Some(value) = other.raw(entity, StageRange::ALIVE) {
                self.storage.insert(entity, value);
            }
        }
        for &entity in other.stage_entities(StageRange::REMOVED) {
            self.storage.erase(entity);
        }
    }

    fn promote(&mut self) {
        self.storage.promote();
    }

    fn clear(&mut self) {
        self.storage.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
