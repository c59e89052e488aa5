//! Filter groups and their evaluation.
//!
//! A [`FilterGroup`] is the normalized shape of a query: six sorted,
//! deduplicated key buckets. Evaluating a group against the live registry
//! yields a sorted, unique entity list. The [`FilterCache`] memoizes one
//! result per distinct group and refreshes it incrementally each tick from
//! the set of entities whose components changed.

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    component::ComponentKey,
    container::ComponentContainer,
    entity::{Entity, EntityAllocator},
    registry::ComponentRegistry,
    stage::StageRange,
};

type Keys = SmallVec<[ComponentKey; 4]>;

/// Which bucket a key lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Entity holds the component.
    Filter,
    /// Component was added since the last promotion.
    OnAdd,
    /// Component was removed since the last promotion.
    OnRemove,
    /// Entity does not hold the component.
    Except,
    /// Entity holds every component of the set and at least one was just added.
    OnCombine,
    /// At least one component of the set was just removed and the rest are
    /// still held (or were removed too).
    OnBreak,
}

/// Normalized description of which entities a query matches.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterGroup {
    filters: Keys,
    on_add: Keys,
    on_remove: Keys,
    except: Keys,
    on_combine: Keys,
    on_break: Keys,
}

impl FilterGroup {
    /// An empty group, matching every alive entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add keys to a bucket. Call [`Self::normalize`] afterwards.
    pub fn push(&mut self, selector: Selector, keys: &[ComponentKey]) {
        self.bucket_mut(selector).extend_from_slice(keys);
    }

    /// Sort and deduplicate every bucket, then drop from `filters` any key
    /// already named by another bucket.
    pub fn normalize(&mut self) {
        for selector in Self::SELECTORS {
            let bucket = self.bucket_mut(selector);
            bucket.sort_unstable();
            bucket.dedup();
        }

        let others: Keys = [
            &self.on_add,
            &self.on_remove,
            &self.except,
            &self.on_combine,
            &self.on_break,
        ]
        .into_iter()
        .flatten()
        .copied()
        .collect();
        self.filters.retain(|key| !others.contains(key));
    }

    const SELECTORS: [Selector; 6] = [
        Selector::Filter,
        Selector::OnAdd,
        Selector::OnRemove,
        Selector::Except,
        Selector::OnCombine,
        Selector::OnBreak,
    ];

    /// Keys in a bucket, sorted.
    #[must_use]
    pub fn bucket(&self, selector: Selector) -> &[ComponentKey] {
        match selector {
            Selector::Filter => &self.filters,
            Selector::OnAdd => &self.on_add,
            Selector::OnRemove => &self.on_remove,
            Selector::Except => &self.except,
            Selector::OnCombine => &self.on_combine,
            Selector::OnBreak => &self.on_break,
        }
    }

    fn bucket_mut(&mut self, selector: Selector) -> &mut Keys {
        match selector {
            Selector::Filter => &mut self.filters,
            Selector::OnAdd => &mut self.on_add,
            Selector::OnRemove => &mut self.on_remove,
            Selector::Except => &mut self.except,
            Selector::OnCombine => &mut self.on_combine,
            Selector::OnBreak => &mut self.on_break,
        }
    }

    /// Whether results only hold for one tick (any event selector present).
    #[must_use]
    pub fn clear_every_frame(&self) -> bool {
        !self.on_add.is_empty()
            || !self.on_remove.is_empty()
            || !self.on_combine.is_empty()
            || !self.on_break.is_empty()
    }

    /// Whether the group names no component that an entity must hold or
    /// have changed, so matching needs a separate liveness check.
    #[must_use]
    pub fn needs_liveness(&self) -> bool {
        self.filters.is_empty()
            && self.on_add.is_empty()
            && self.on_remove.is_empty()
            && self.on_combine.is_empty()
            && self.on_break.is_empty()
    }

    /// Whether matching can produce entities whose components were removed.
    #[must_use]
    pub fn includes_removed(&self) -> bool {
        !self.on_remove.is_empty() || !self.on_break.is_empty()
    }

    /// Every bucket of `self` is contained in the same bucket of `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        Self::SELECTORS
            .into_iter()
            .all(|s| is_sorted_subset(self.bucket(s), other.bucket(s)))
    }

    /// Every bucket of `other` is contained in the same bucket of `self`.
    #[must_use]
    pub fn is_superset_of(&self, other: &Self) -> bool {
        other.is_subset_of(self)
    }

    /// The same group with `on_add` and `on_combine` turned into plain
    /// filters, used to let a new system see entities that already existed.
    #[must_use]
    pub fn seeded(&self) -> Self {
        let mut group = self.clone();
        let added = std::mem::take(&mut group.on_add);
        let combined = std::mem::take(&mut group.on_combine);
        group.filters.extend(added);
        group.filters.extend(combined);
        group.normalize();
        group
    }
}

impl fmt::Debug for FilterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("FilterGroup");
        for (name, selector) in [
            ("filters", Selector::Filter),
            ("on_add", Selector::OnAdd),
            ("on_remove", Selector::OnRemove),
            ("except", Selector::Except),
            ("on_combine", Selector::OnCombine),
            ("on_break", Selector::OnBreak),
        ] {
            let bucket = self.bucket(selector);
            if !bucket.is_empty() {
                s.field(name, &bucket);
            }
        }
        s.finish()
    }
}

fn is_sorted_subset(small: &[ComponentKey], large: &[ComponentKey]) -> bool {
    small.iter().all(|key| large.binary_search(key).is_ok())
}

// ==================== Evaluation ====================

/// What filtering reads from the world.
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    /// Component containers.
    pub registry: &'a ComponentRegistry,
    /// Entity liveness.
    pub entities: &'a EntityAllocator,
}

impl<'a> FilterContext<'a> {
    /// Bundle the world parts filtering reads.
    #[must_use]
    pub const fn new(registry: &'a ComponentRegistry, entities: &'a EntityAllocator) -> Self {
        Self { registry, entities }
    }

    fn container(&self, key: ComponentKey) -> Option<&'a dyn ComponentContainer> {
        self.registry.get(key)
    }

    /// Full evaluation: seed from the smallest candidate list, then filter.
    #[must_use]
    pub fn evaluate(&self, group: &FilterGroup) -> Vec<Entity> {
        let Some(seed) = self.seed(group) else {
            return Vec::new();
        };
        let mut entities = seed;
        entities.sort_unstable();
        entities.dedup();
        self.retain(group, &mut entities);
        entities
    }

    /// Evaluate starting from a known superset of the answer.
    #[must_use]
    pub fn evaluate_from(&self, group: &FilterGroup, seed: &[Entity]) -> Vec<Entity> {
        let mut entities = seed.to_vec();
        self.retain(group, &mut entities);
        entities
    }

    /// Candidate list for a full evaluation. `None` when a required
    /// container does not exist, so nothing can match.
    fn seed(&self, group: &FilterGroup) -> Option<Vec<Entity>> {
        let mut best: Option<&[Entity]> = None;
        let mut consider = |candidates: &'a [Entity]| {
            if best.is_none_or(|current| candidates.len() < current.len()) {
                best = Some(candidates);
            }
        };

        let sources = [
            (Selector::OnRemove, StageRange::REMOVED),
            (Selector::OnBreak, StageRange::ALL),
            (Selector::OnAdd, StageRange::ADDED),
            (Selector::OnCombine, StageRange::ALIVE),
            (Selector::Filter, StageRange::ALIVE),
        ];
        for (selector, range) in sources {
            for &key in group.bucket(selector) {
                let container = self.container(key)?;
                consider(container.stage_entities(range));
            }
        }

        Some(match best {
            Some(candidates) => candidates.to_vec(),
            None => self.entities.iter_alive().collect(),
        })
    }

    /// Keep only entities matching every bucket of `group`.
    pub fn retain(&self, group: &FilterGroup, entities: &mut Vec<Entity>) {
        if group.needs_liveness() {
            entities.retain(|&e| self.entities.is_alive(e));
        }

        for &key in group.bucket(Selector::Filter) {
            self.retain_with(key, entities, |c, e| c.has_component(e));
        }
        for &key in group.bucket(Selector::OnAdd) {
            self.retain_with(key, entities, |c, e| c.has_added(e));
        }
        for &key in group.bucket(Selector::OnRemove) {
            self.retain_with(key, entities, |c, e| c.has_removed(e));
        }
        for &key in group.bucket(Selector::Except) {
            if let Some(container) = self.container(key) {
                entities.retain(|&e| !container.has_component(e));
            }
        }

        let combine = group.bucket(Selector::OnCombine);
        if !combine.is_empty() {
            match self.containers(combine) {
                Some(containers) => entities.retain(|&e| {
                    containers.iter().all(|c| c.has_component(e))
                        && containers.iter().any(|c| c.has_added(e))
                }),
                None => entities.clear(),
            }
        }

        let broken = group.bucket(Selector::OnBreak);
        if !broken.is_empty() {
            match self.containers(broken) {
                Some(containers) => entities.retain(|&e| {
                    containers.iter().any(|c| c.has_removed(e))
                        && containers
                            .iter()
                            .all(|c| c.has_component(e) || c.has_removed(e))
                }),
                None => entities.clear(),
            }
        }
    }

    fn retain_with(
        &self,
        key: ComponentKey,
        entities: &mut Vec<Entity>,
        keep: impl Fn(&dyn ComponentContainer, Entity) -> bool,
    ) {
        match self.container(key) {
            Some(container) => entities.retain(|&e| keep(container, e)),
            None => entities.clear(),
        }
    }

    fn containers(&self, keys: &[ComponentKey]) -> Option<SmallVec<[&'a dyn ComponentContainer; 4]>> {
        keys.iter().map(|&key| self.container(key)).collect()
    }
}

// ==================== Sorted set helpers ====================

/// `a \ b` for sorted, unique inputs.
#[must_use]
pub fn sorted_difference(a: &[Entity], b: &[Entity]) -> Vec<Entity> {
    let mut out = Vec::with_capacity(a.len());
    let mut j = 0;
    for &x in a {
        while j < b.len() && b[j] < x {
            j += 1;
        }
        if j >= b.len() || b[j] != x {
            out.push(x);
        }
    }
    out
}

/// `a ∪ b` for sorted, unique inputs.
#[must_use]
pub fn sorted_union(a: &[Entity], b: &[Entity]) -> Vec<Entity> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

// ==================== Cache ====================

struct CachedFilter {
    entities: Vec<Entity>,
    users: usize,
    /// Never evaluated; needs a full pass instead of an incremental one.
    stale: bool,
}

/// One memoized result per distinct filter group.
#[derive(Default)]
pub struct FilterCache {
    entries: FxHashMap<FilterGroup, CachedFilter>,
}

impl FilterCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more user of `group`.
    pub fn acquire(&mut self, group: &FilterGroup) {
        self.entries
            .entry(group.clone())
            .or_insert_with(|| CachedFilter {
                entities: Vec::new(),
                users: 0,
                stale: true,
            })
            .users += 1;
    }

    /// Drop one user of `group`. The entry lingers until [`Self::prune`].
    pub fn release(&mut self, group: &FilterGroup) {
        if let Some(entry) = self.entries.get_mut(group) {
            entry.users = entry.users.saturating_sub(1);
        }
    }

    /// Forget groups nobody uses anymore.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.users > 0);
        before - self.entries.len()
    }

    /// Force a full evaluation of every group on the next refresh.
    pub fn invalidate(&mut self) {
        for entry in self.entries.values_mut() {
            entry.stale = true;
            entry.entities.clear();
        }
    }

    /// Cached result of a group.
    #[must_use]
    pub fn get(&self, group: &FilterGroup) -> Option<&[Entity]> {
        self.entries.get(group).map(|entry| entry.entities.as_slice())
    }

    /// Number of cached groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bring every group up to date.
    ///
    /// `modified` holds, sorted and unique, every entity whose components
    /// changed since the previous refresh.
    pub fn refresh(&mut self, ctx: &FilterContext<'_>, modified: &[Entity]) {
        let mut stale = Vec::new();
        for (group, entry) in &mut self.entries {
            if entry.stale {
                stale.push(group.clone());
                continue;
            }

            let passing = ctx.evaluate_from(group, modified);
            if group.clear_every_frame() {
                entry.entities = passing;
            } else {
                let kept = sorted_difference(&entry.entities, modified);
                entry.entities = sorted_union(&kept, &passing);
            }
        }

        for group in stale {
            let entities = match self.best_seed(&group) {
                Some(seed) => ctx.evaluate_from(&group, seed),
                None => ctx.evaluate(&group),
            };
            trace!("evaluated {:?}: {} entities", group, entities.len());
            if let Some(entry) = self.entries.get_mut(&group) {
                entry.entities = entities;
                entry.stale = false;
            }
        }
    }

    /// Result of a fresh, steady group that every entity matching `group`
    /// must also match.
    fn best_seed(&self, group: &FilterGroup) -> Option<&[Entity]> {
        if group.includes_removed() || !group.bucket(Selector::OnCombine).is_empty() {
            return None;
        }

        self.entries
            .iter()
            .filter(|(candidate, entry)| {
                !entry.stale
                    && !candidate.clear_every_frame()
                    && !candidate.needs_liveness()
                    && candidate.is_subset_of(group)
            })
            .map(|(_, entry)| entry.entities.as_slice())
            .min_by_key(|entities| entities.len())
    }
}
