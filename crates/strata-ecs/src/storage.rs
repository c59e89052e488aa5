//! Staged sparse storage.
//!
//! [`StagedStorage`] pairs a [`StagedIndex`] with a dense store and replays
//! every slot movement the index reports, so `dense[slot]` always belongs to
//! `index.entities(ALL)[slot]`. Three dense stores exist:
//!
//! - `Vec<T>` for typed components ([`StagedSparseArray`]),
//! - `()` for zero-sized tags, membership only ([`StagedSparseSet`]),
//! - [`ByteColumn`] for components known only by layout ([`StagedByteArray`]).

use std::alloc::Layout;

use rustc_hash::FxHashMap;

use crate::{
    column::{ByteColumn, RawValue},
    entity::Entity,
    sparse::{Placement, StagedIndex},
    stage::StageRange,
};

/// Dense side of a staged storage.
pub trait DenseStore {
    /// Value accepted when writing a slot.
    type Value<'v>;

    /// Insert at `slot`, shifting every later slot up by one.
    fn insert_at(&mut self, slot: usize, value: Self::Value<'_>);

    /// Overwrite an existing slot.
    fn write(&mut self, slot: usize, value: Self::Value<'_>);

    /// Swap two slots.
    fn swap_slots(&mut self, a: usize, b: usize);

    /// Keep only the first `len` slots.
    fn truncate(&mut self, len: usize);
}

impl<T: Copy> DenseStore for Vec<T> {
    type Value<'v> = T;

    fn insert_at(&mut self, slot: usize, value: T) {
        self.insert(slot, value);
    }

    fn write(&mut self, slot: usize, value: T) {
        self[slot] = value;
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        self.swap(a, b);
    }

    fn truncate(&mut self, len: usize) {
        Vec::truncate(self, len);
    }
}

impl DenseStore for () {
    type Value<'v> = ();

    fn insert_at(&mut self, _slot: usize, (): ()) {}

    fn write(&mut self, _slot: usize, (): ()) {}

    fn swap_slots(&mut self, _a: usize, _b: usize) {}

    fn truncate(&mut self, _len: usize) {}
}

impl DenseStore for ByteColumn {
    type Value<'v> = RawValue<'v>;

    fn insert_at(&mut self, slot: usize, value: RawValue<'_>) {
        self.insert(slot, value);
    }

    fn write(&mut self, slot: usize, value: RawValue<'_>) {
        ByteColumn::write(self, slot, value);
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        self.swap(a, b);
    }

    fn truncate(&mut self, len: usize) {
        ByteColumn::truncate(self, len);
    }
}

/// Sparse-set storage partitioned into settled, added and removed stages.
#[derive(Clone)]
pub struct StagedStorage<D> {
    index: StagedIndex,
    dense: D,
}

/// Typed storage for ordinary components.
pub type StagedSparseArray<T> = StagedStorage<Vec<T>>;

/// Membership-only storage for zero-sized tags.
pub type StagedSparseSet = StagedStorage<()>;

/// Storage for components known only by size and alignment.
pub type StagedByteArray = StagedStorage<ByteColumn>;

impl<D: DenseStore> StagedStorage<D> {
    /// The entity/slot index.
    #[must_use]
    pub const fn index(&self) -> &StagedIndex {
        &self.index
    }

    /// The dense store, in slot order.
    #[must_use]
    pub const fn dense(&self) -> &D {
        &self.dense
    }

    /// Whether the entity lies within `range`.
    #[must_use]
    pub fn has(&self, entity: Entity, range: StageRange) -> bool {
        self.index.has(entity, range)
    }

    /// Entities of the given stages, in slot order.
    #[must_use]
    pub fn entities(&self, range: StageRange) -> &[Entity] {
        self.index.entities(range)
    }

    /// Number of entries within `range`.
    #[must_use]
    pub fn len(&self, range: StageRange) -> usize {
        self.index.len(range)
    }

    /// Whether nothing is stored, removed stage included.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Insert or overwrite. New and revived entries land in the added stage;
    /// an entry that is already alive keeps its stage.
    pub fn insert(&mut self, entity: Entity, value: D::Value<'_>) -> Placement {
        let placement = self.index.insert(entity);
        match placement {
            Placement::Fresh(slot) => self.dense.insert_at(slot, value),
            Placement::Revived { slot, from } => {
                self.dense.swap_slots(from, slot);
                self.dense.write(slot, value);
            }
            Placement::Existing(slot) => self.dense.write(slot, value),
        }
        placement
    }

    /// Move an entity into the removed stage. Returns `false` if it was
    /// absent or already removed.
    pub fn erase(&mut self, entity: Entity) -> bool {
        let Some(swaps) = self.index.erase(entity) else {
            return false;
        };
        for (a, b) in swaps {
            self.dense.swap_slots(a, b);
        }
        true
    }

    /// Remove an entity from every stage immediately.
    pub fn discard(&mut self, entity: Entity) -> bool {
        let Some(swaps) = self.index.discard(entity) else {
            return false;
        };
        for (a, b) in swaps {
            self.dense.swap_slots(a, b);
        }
        self.dense.truncate(self.index.slots());
        true
    }

    /// Drop the removed stage and fold added into settled.
    pub fn promote(&mut self) {
        let len = self.index.promote();
        self.dense.truncate(len);
    }

    /// Renumber entries nominated by `predicate` through `mapping`.
    pub fn remap(
        &mut self,
        mapping: &FxHashMap<Entity, Entity>,
        predicate: &dyn Fn(Entity) -> bool,
    ) {
        self.index.remap(mapping, predicate);
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.index.clear();
        self.dense.truncate(0);
    }
}

impl<T: Copy> StagedSparseArray<T> {
    /// Create an empty typed storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: StagedIndex::new(),
            dense: Vec::new(),
        }
    }

    /// Value of an alive entity.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.get_in(entity, StageRange::ALIVE)
    }

    /// Value of an entity within `range` (use `ALL` to read removed data).
    #[must_use]
    pub fn get_in(&self, entity: Entity, range: StageRange) -> Option<&T> {
        self.index.slot_in(entity, range).map(|slot| &self.dense[slot])
    }

    /// Mutable value of an alive entity.
    #[must_use]
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let slot = self.index.slot_in(entity, StageRange::ALIVE)?;
        Some(&mut self.dense[slot])
    }

    /// Overwrite the value of an alive entity without changing its stage.
    ///
    /// Returns `false` if the entity does not hold the component.
    pub fn set(&mut self, entity: Entity, value: T) -> bool {
        match self.get_mut(entity) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Dense values in slot order, removed stage included.
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.dense
    }

    /// Absorb another storage of the same type: alive entries are inserted
    /// or overwritten, removed entries are erased here.
    pub fn merge(&mut self, other: &Self) {
        let alive = other.index.entities(StageRange::ALIVE);
        for (slot, &entity) in alive.iter().enumerate() {
            self.insert(entity, other.dense[slot]);
        }
        for &entity in other.index.entities(StageRange::REMOVED) {
            self.erase(entity);
        }
    }
}

impl<T: Copy> Default for StagedSparseArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl StagedSparseSet {
    /// Create an empty membership-only storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: StagedIndex::new(),
            dense: (),
        }
    }

    /// Absorb another set: alive entries are inserted, removed entries erased.
    pub fn merge(&mut self, other: &Self) {
        for &entity in other.index.entities(StageRange::ALIVE) {
            self.insert(entity, ());
        }
        for &entity in other.index.entities(StageRange::REMOVED) {
            self.erase(entity);
        }
    }
}

impl Default for StagedSparseSet {
    fn default() -> Self {
        Self::new()
    }
}

impl StagedByteArray {
    /// Create an empty byte storage for elements of `layout`.
    #[must_use]
    pub fn with_layout(layout: Layout) -> Self {
        Self {
            index: StagedIndex::new(),
            dense: ByteColumn::new(layout),
        }
    }

    /// Value of an entity within `range`.
    #[must_use]
    pub fn get_in(&self, entity: Entity, range: StageRange) -> Option<RawValue<'_>> {
        self.index
            .slot_in(entity, range)
            .map(|slot| self.dense.get(slot))
    }

    /// Overwrite the value of an alive entity.
    pub fn set(&mut self, entity: Entity, value: RawValue<'_>) -> bool {
        match self.index.slot_in(entity, StageRange::ALIVE) {
            Some(slot) => {
                ByteColumn::write(&mut self.dense, slot, value);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(id: u32) -> Entity {
        Entity::new(id)
    }

    #[test]
    fn test_typed_insert_get() {
        let mut storage = StagedSparseArray::<u32>::new();
        storage.insert(e(3), 30);
        storage.insert(e(1), 10);

        assert_eq!(storage.get(e(3)), Some(&30));
        assert_eq!(storage.get(e(1)), Some(&10));
        assert_eq!(storage.get(e(2)), None);
        assert!(storage.has(e(3), StageRange::ADDED));
    }

    #[test]
    fn test_typed_values_follow_slots() {
        let mut storage = StagedSparseArray::<u32>::new();
        for id in 1..=6 {
            storage.insert(e(id), id * 10);
        }
        storage.promote();
        storage.erase(e(2));
        storage.erase(e(5));
        storage.insert(e(7), 70);
        storage.erase(e(1));

        for &entity in storage.entities(StageRange::ALL) {
            let value = storage.get_in(entity, StageRange::ALL).copied();
            assert_eq!(value, Some(entity.index() * 10));
        }
        storage.index().assert_consistent();
    }

    #[test]
    fn test_erased_value_readable_until_promote() {
        let mut storage = StagedSparseArray::<u32>::new();
        storage.insert(e(1), 5);
        storage.promote();
        assert!(storage.erase(e(1)));

        assert_eq!(storage.get(e(1)), None);
        assert_eq!(storage.get_in(e(1), StageRange::REMOVED), Some(&5));

        storage.promote();
        assert_eq!(storage.get_in(e(1), StageRange::ALL), None);
        assert_eq!(storage.values().len(), 0);
    }

    #[test]
    fn test_revive_overwrites_value() {
        let mut storage = StagedSparseArray::<u32>::new();
        storage.insert(e(1), 1);
        storage.insert(e(2), 2);
        storage.promote();
        storage.erase(e(1));

        storage.insert(e(1), 100);
        assert_eq!(storage.get(e(1)), Some(&100));
        assert!(storage.has(e(1), StageRange::ADDED));
        assert_eq!(storage.len(StageRange::REMOVED), 0);
        assert_eq!(storage.get(e(2)), Some(&2));
    }

    #[test]
    fn test_set_keeps_stage() {
        let mut storage = StagedSparseArray::<u32>::new();
        storage.insert(e(1), 1);
        storage.promote();

        assert!(storage.set(e(1), 9));
        assert!(storage.has(e(1), StageRange::SETTLED));
        assert_eq!(storage.get(e(1)), Some(&9));
        assert!(!storage.set(e(2), 9));
    }

    #[test]
    fn test_merge_inserts_and_erases() {
        let mut world = StagedSparseArray::<u32>::new();
        world.insert(e(1), 1);
        world.insert(e(2), 2);
        world.promote();

        let mut local = StagedSparseArray::<u32>::new();
        local.insert(e(2), 20);
        local.insert(e(3), 30);
        local.insert(e(1), 0);
        local.erase(e(1));

        world.merge(&local);

        assert_eq!(world.get(e(1)), None);
        assert!(world.has(e(1), StageRange::REMOVED));
        assert_eq!(world.get(e(2)), Some(&20));
        assert!(world.has(e(2), StageRange::SETTLED));
        assert_eq!(world.get(e(3)), Some(&30));
        assert!(world.has(e(3), StageRange::ADDED));
    }

    #[test]
    fn test_tag_set_tracks_membership() {
        let mut tags = StagedSparseSet::new();
        tags.insert(e(4), ());
        tags.insert(e(8), ());
        tags.promote();
        tags.erase(e(4));

        assert!(tags.has(e(8), StageRange::SETTLED));
        assert!(tags.has(e(4), StageRange::REMOVED));
        tags.promote();
        assert_eq!(tags.entities(StageRange::ALL), &[e(8)]);
    }

    #[test]
    fn test_byte_array_discard() {
        let mut bytes = StagedByteArray::with_layout(Layout::new::<u16>());
        bytes.insert(e(1), RawValue::of(&1u16));
        bytes.insert(e(2), RawValue::of(&2u16));
        bytes.insert(e(3), RawValue::of(&3u16));

        assert!(bytes.discard(e(1)));
        assert!(!bytes.discard(e(1)));
        assert_eq!(bytes.len(StageRange::ALL), 2);
        assert_eq!(bytes.dense().len(), 2);
        let read = |id| {
            bytes
                .get_in(e(id), StageRange::ALIVE)
                // SAFETY: every slot holds a u16.
                .map(|value| unsafe { value.read::<u16>() })
        };
        assert_eq!(read(3), Some(3));
        assert_eq!(read(2), Some(2));
        assert_eq!(read(1), None);
        bytes.index().assert_consistent();
    }
}
