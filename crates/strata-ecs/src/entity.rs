//! Entity identifiers and the world's id allocator.
//!
//! Entities are plain 32-bit handles. There is no generation counter: a
//! recycled id is indistinguishable from its previous occupant, so any
//! reference held across a destroy + create cycle silently aliases the new
//! entity. The allocator narrows that window by only reissuing an id after the
//! storage promotion that follows its destruction.

use std::fmt;

/// An opaque handle identifying a set of components.
///
/// `Entity(0)` is reserved as [`Entity::INVALID`]; the allocator never issues it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Entity(u32);

impl Entity {
    /// The reserved "no entity" value.
    pub const INVALID: Entity = Entity(0);

    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw id.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// The raw id widened for indexing.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Whether this is anything other than [`Entity::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Entity> for u32 {
    fn from(entity: Entity) -> Self {
        entity.0
    }
}

/// Issues entity ids and tracks which ones are alive.
///
/// Destroyed ids go through two lists: `pending` holds ids whose component
/// data may still sit in a removed stage, `orphans` holds ids that are safe to
/// hand out again. [`EntityAllocator::recycle`] moves the former into the
/// latter and must only be called right after every storage was promoted.
pub struct EntityAllocator {
    /// Next never-issued id.
    next: u32,
    /// Liveness flag per id (index 0 is the invalid entity and stays false).
    alive: Vec<bool>,
    /// Ids free for reuse, handed out LIFO.
    orphans: Vec<Entity>,
    /// Ids destroyed since the last recycle.
    pending: Vec<Entity>,
    /// Number of currently alive entities.
    alive_count: u32,
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityAllocator {
    /// Create an empty allocator; the first issued id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: 1,
            alive: Vec::new(),
            orphans: Vec::new(),
            pending: Vec::new(),
            alive_count: 0,
        }
    }

    /// Issue an id, preferring the most recently recycled orphan.
    pub fn create(&mut self) -> Entity {
        let entity = if let Some(entity) = self.orphans.pop() {
            entity
        } else {
            let entity = Entity(self.next);
            self.next += 1;
            entity
        };

        let idx = entity.as_usize();
        if idx >= self.alive.len() {
            self.alive.resize(idx + 1, false);
        }
        self.alive[idx] = true;
        self.alive_count += 1;

        entity
    }

    /// Mark an id as destroyed.
    ///
    /// Returns `false` (and does nothing) if the entity was not alive.
    pub fn release(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }

        self.alive[entity.as_usize()] = false;
        self.alive_count -= 1;
        self.pending.push(entity);
        true
    }

    /// Make every id released since the last call available to [`Self::create`].
    ///
    /// Returns how many ids became reusable.
    pub fn recycle(&mut self) -> usize {
        let count = self.pending.len();
        self.orphans.append(&mut self.pending);
        count
    }

    /// Check if an entity is currently alive.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.alive.get(entity.as_usize()).copied().unwrap_or(false)
    }

    /// Number of currently alive entities.
    #[must_use]
    pub const fn alive_count(&self) -> u32 {
        self.alive_count
    }

    /// One past the highest id ever issued.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.next
    }

    /// Number of ids ready for reuse.
    #[must_use]
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Number of ids destroyed but not yet recycled.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Iterate all alive entities in ascending id order.
    pub fn iter_alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(idx, _)| Entity(idx as u32))
    }

    /// Forget every issued id.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
