//! Staged sparse index.
//!
//! Maps entities to dense slots through a chunked sparse table and keeps the
//! reverse (slot -> entity) array partitioned into the settled, added and
//! removed stages. The index owns no component data: every mutating
//! operation reports the slot movements it performed so the dense side
//! (typed vector, byte column, or nothing for tags) can mirror them.
//!
//! Layout of the reverse array:
//!
//! ```text
//! 0          start[1]       start[2]         start[3] == len
//! | settled  |   added      |   removed      |
//! ```

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{
    entity::Entity,
    stage::{Stage, StageRange},
};

/// Number of entities addressed by one sparse chunk.
pub const CHUNK_SIZE: usize = 4096;

/// Sentinel stored in sparse cells that map to nothing.
const ABSENT: u32 = u32::MAX;

/// Slot swaps the dense side must replay, in order.
pub type SlotSwaps = SmallVec<[(usize, usize); 3]>;

/// Where an inserted entity ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// New entry at `slot`; the removed block moved up by one, so the dense
    /// side must insert (shift) at `slot`.
    Fresh(usize),
    /// Entity was erased earlier this tick and is back in the added stage.
    /// The dense side swaps `from` and `slot`, then overwrites `slot`.
    Revived { slot: usize, from: usize },
    /// Entity already alive at `slot`; only the value may change.
    Existing(usize),
}

impl Placement {
    /// Final dense slot of the entity.
    #[must_use]
    pub const fn slot(self) -> usize {
        match self {
            Self::Fresh(slot) | Self::Existing(slot) | Self::Revived { slot, .. } => slot,
        }
    }
}

/// Lazily allocated entity -> slot table.
#[derive(Default, Clone)]
struct SparseChunks {
    chunks: Vec<Option<Box<[u32; CHUNK_SIZE]>>>,
}

impl SparseChunks {
    const fn split(entity: Entity) -> (usize, usize) {
        let idx = entity.as_usize();
        (idx / CHUNK_SIZE, idx % CHUNK_SIZE)
    }

    fn get(&self, entity: Entity) -> Option<usize> {
        let (chunk, offset) = Self::split(entity);
        let value = self.chunks.get(chunk)?.as_ref()?[offset];
        (value != ABSENT).then_some(value as usize)
    }

    fn set(&mut self, entity: Entity, slot: usize) {
        debug_assert!(slot < ABSENT as usize, "dense slot overflow");
        let (chunk, offset) = Self::split(entity);
        if chunk >= self.chunks.len() {
            self.chunks.resize_with(chunk + 1, || None);
        }
        let block = self.chunks[chunk].get_or_insert_with(|| Box::new([ABSENT; CHUNK_SIZE]));
        block[offset] = slot as u32;
    }

    fn clear(&mut self, entity: Entity) {
        let (chunk, offset) = Self::split(entity);
        if let Some(Some(block)) = self.chunks.get_mut(chunk) {
            block[offset] = ABSENT;
        }
    }

    /// Mark every cell absent, keeping allocated chunks.
    fn reset(&mut self) {
        for block in self.chunks.iter_mut().flatten() {
            block.fill(ABSENT);
        }
    }

    fn allocated(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }
}

/// Entity <-> slot bookkeeping shared by every staged storage.
#[derive(Default, Clone)]
pub struct StagedIndex {
    sparse: SparseChunks,
    reverse: Vec<Entity>,
    /// Stage boundaries; `start[0]` is always 0 and `start[3]` the length.
    start: [usize; 4],
}

impl StagedIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dense slot of an entity in any stage.
    #[must_use]
    pub fn slot_of(&self, entity: Entity) -> Option<usize> {
        self.sparse.get(entity)
    }

    /// Dense slot of an entity, only if it lies within `range`.
    #[must_use]
    pub fn slot_in(&self, entity: Entity, range: StageRange) -> Option<usize> {
        self.slot_of(entity)
            .filter(|&slot| slot >= self.start[range.begin()] && slot < self.start[range.end()])
    }

    /// Whether the entity's slot falls within `range`.
    #[must_use]
    pub fn has(&self, entity: Entity, range: StageRange) -> bool {
        self.slot_in(entity, range).is_some()
    }

    /// Stage of a dense slot.
    #[must_use]
    pub fn stage_of(&self, slot: usize) -> Option<Stage> {
        if slot < self.start[1] {
            Some(Stage::Settled)
        } else if slot < self.start[2] {
            Some(Stage::Added)
        } else if slot < self.start[3] {
            Some(Stage::Removed)
        } else {
            None
        }
    }

    /// Entities of the given stages, in slot order.
    #[must_use]
    pub fn entities(&self, range: StageRange) -> &[Entity] {
        &self.reverse[self.start[range.begin()]..self.start[range.end()]]
    }

    /// Number of entries within `range`.
    #[must_use]
    pub fn len(&self, range: StageRange) -> usize {
        self.start[range.end()] - self.start[range.begin()]
    }

    /// Total number of slots, removed stage included.
    #[must_use]
    pub fn slots(&self) -> usize {
        self.start[3]
    }

    /// Whether no slot is in use.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start[3] == 0
    }

    /// Number of allocated sparse chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.sparse.allocated()
    }

    /// Place an entity in the added stage.
    pub fn insert(&mut self, entity: Entity) -> Placement {
        if let Some(slot) = self.slot_of(entity) {
            if slot < self.start[2] {
                return Placement::Existing(slot);
            }

            // Removed this tick: move to the front of the removed block and
            // grow the added stage over it.
            let target = self.start[2];
            self.swap_slots(slot, target);
            self.start[2] += 1;
            return Placement::Revived {
                slot: target,
                from: slot,
            };
        }

        let slot = self.start[2];
        self.reverse.insert(slot, entity);
        for moved in slot + 1..self.reverse.len() {
            self.sparse.set(self.reverse[moved], moved);
        }
        self.sparse.set(entity, slot);
        self.start[2] += 1;
        self.start[3] += 1;
        Placement::Fresh(slot)
    }

    /// Move an alive entity into the removed stage.
    ///
    /// Returns `None` if the entity is absent or already removed.
    pub fn erase(&mut self, entity: Entity) -> Option<SlotSwaps> {
        let mut slot = self.slot_of(entity)?;
        let stage = match self.stage_of(slot)? {
            Stage::Removed => return None,
            stage => stage.index(),
        };

        let mut swaps = SlotSwaps::new();
        for boundary in stage..2 {
            let last = self.start[boundary + 1] - 1;
            if slot != last {
                self.swap_slots(slot, last);
                swaps.push((slot, last));
                slot = last;
            }
            self.start[boundary + 1] -= 1;
        }
        Some(swaps)
    }

    /// Erase an entity and drop its slot entirely, without leaving it in the
    /// removed stage. The dense side replays the swaps and pops its last slot.
    pub fn discard(&mut self, entity: Entity) -> Option<SlotSwaps> {
        let slot = self.slot_of(entity)?;
        let mut swaps = if self.stage_of(slot) == Some(Stage::Removed) {
            SlotSwaps::new()
        } else {
            self.erase(entity)?
        };

        let slot = self.slot_of(entity)?;
        let last = self.start[3] - 1;
        if slot != last {
            self.swap_slots(slot, last);
            swaps.push((slot, last));
        }
        self.sparse.clear(entity);
        self.reverse.pop();
        self.start[3] -= 1;
        Some(swaps)
    }

    /// Drop the removed stage and merge added into settled.
    ///
    /// Returns the new slot count; the dense side truncates to it.
    pub fn promote(&mut self) -> usize {
        let keep = self.start[2];
        for &entity in &self.reverse[keep..] {
            self.sparse.clear(entity);
        }
        self.reverse.truncate(keep);
        self.start[1] = keep;
        self.start[3] = keep;
        keep
    }

    /// Renumber entities in place.
    ///
    /// Entries nominated by `predicate` are rewritten through `mapping`;
    /// entries without a mapping keep their id. Slots never move.
    pub fn remap(
        &mut self,
        mapping: &FxHashMap<Entity, Entity>,
        predicate: &dyn Fn(Entity) -> bool,
    ) {
        for entity in &mut self.reverse {
            if predicate(*entity) {
                if let Some(&target) = mapping.get(entity) {
                    *entity = target;
                }
            }
        }

        self.sparse.reset();
        for (slot, &entity) in self.reverse.iter().enumerate() {
            debug_assert!(
                self.sparse.get(entity).is_none(),
                "remap produced duplicate {entity:?}"
            );
            self.sparse.set(entity, slot);
        }
    }

    /// Forget every entry, keeping allocated chunks.
    pub fn clear(&mut self) {
        self.sparse.reset();
        self.reverse.clear();
        self.start = [0; 4];
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.reverse.swap(a, b);
        self.sparse.set(self.reverse[a], a);
        self.sparse.set(self.reverse[b], b);
    }

    /// Check the bijection between sparse and reverse. Test helper.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.reverse.len(), self.start[3]);
        assert!(self.start[0] <= self.start[1]);
        assert!(self.start[1] <= self.start[2]);
        assert!(self.start[2] <= self.start[3]);
        for (slot, &entity) in self.reverse.iter().enumerate() {
            assert_eq!(self.sparse.get(entity), Some(slot), "sparse mismatch for {entity:?}");
        }
    }
}
