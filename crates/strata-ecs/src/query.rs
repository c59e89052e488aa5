//! Query descriptions.
//!
//! A [`Query`] names the components a system binds and the filters and
//! transforms that select its entities. Bound components also act as
//! filters. Queries are built once and handed to
//! [`World::declare`](crate::World::declare) or
//! [`World::filter`](crate::World::filter).
//!
//! ```ignore
//! let query = Query::new()
//!     .write::<Position>()
//!     .read::<Velocity>()
//!     .except::<Frozen>()
//!     .order_by::<Position, _>(|a, b| a.x.total_cmp(&b.x))
//!     .partial();
//! ```

use std::{cmp::Ordering, fmt, marker::PhantomData};

use smallvec::SmallVec;

use crate::{
    component::{Component, ComponentInfo, ComponentKey, ComponentSet},
    filter::{FilterGroup, Selector},
    transform::TransformGroup,
};

/// How a bound component is delivered to a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Copied into a contiguous read-only column.
    Read,
    /// Read in place through the container's dense slots.
    ReadIndirect,
    /// Copied into a contiguous column and written back after the system runs.
    Write,
}

impl Access {
    /// Whether the values are written back.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

/// One bound component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Component metadata.
    pub info: ComponentInfo,
    /// Delivery mode.
    pub access: Access,
}

/// Marker: no ordering set yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unordered;

/// Marker: an ordering has been set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ordered;

/// Everything a query describes, independent of its ordering state.
#[derive(Debug, Default)]
pub struct QueryDescriptor {
    pub(crate) group: FilterGroup,
    pub(crate) transform: TransformGroup,
    pub(crate) bindings: SmallVec<[Binding; 4]>,
    pub(crate) partial: bool,
    pub(crate) seed_with_existing: bool,
}

impl QueryDescriptor {
    /// Normalized filter group.
    #[must_use]
    pub const fn group(&self) -> &FilterGroup {
        &self.group
    }

    /// Conditions and ordering.
    #[must_use]
    pub const fn transform(&self) -> &TransformGroup {
        &self.transform
    }

    /// Bound components, in declaration order.
    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Whether the system accepts partial packs.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.partial
    }

    /// Whether event filters match pre-existing entities on the first run.
    #[must_use]
    pub const fn seeds_with_existing(&self) -> bool {
        self.seed_with_existing
    }
}

/// Builder for a [`QueryDescriptor`].
///
/// The `S` parameter tracks whether [`Query::order_by`] was called, so a
/// query can be ordered at most once.
pub struct Query<S = Unordered> {
    desc: QueryDescriptor,
    _order: PhantomData<S>,
}

impl Query<Unordered> {
    /// A query matching every alive entity and binding nothing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            desc: QueryDescriptor::default(),
            _order: PhantomData,
        }
    }

    /// Sort matched entities by their `T`, stably. `T` becomes a filter.
    #[must_use]
    pub fn order_by<T, C>(mut self, cmp: C) -> Query<Ordered>
    where
        T: Component,
        C: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.push(Selector::Filter, &[T::KEY]);
        self.desc.transform.set_order::<T, C>(cmp);
        Query {
            desc: self.desc,
            _order: PhantomData,
        }
    }
}

impl Default for Query<Unordered> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Query<S> {
    fn push(&mut self, selector: Selector, keys: &[ComponentKey]) {
        self.desc.group.push(selector, keys);
        self.desc.group.normalize();
    }

    fn bind<T: Component>(mut self, access: Access) -> Self {
        let info = ComponentInfo::of::<T>();
        match self.desc.bindings.iter_mut().find(|b| b.info.key() == info.key()) {
            Some(existing) if access.is_write() => existing.access = Access::Write,
            Some(existing) if existing.access.is_write() => {}
            Some(existing) => existing.access = access,
            None => self.desc.bindings.push(Binding { info, access }),
        }
        self.push(Selector::Filter, &[info.key()]);
        self
    }

    /// Bind `T` read-only, copied into a contiguous column.
    #[must_use]
    pub fn read<T: Component>(self) -> Self {
        self.bind::<T>(Access::Read)
    }

    /// Bind `T` read-only, read in place without copying.
    #[must_use]
    pub fn read_indirect<T: Component>(self) -> Self {
        self.bind::<T>(Access::ReadIndirect)
    }

    /// Bind `T` for writing. Changes are written back after the system runs.
    #[must_use]
    pub fn write<T: Component>(self) -> Self {
        self.bind::<T>(Access::Write)
    }

    /// Require every component of `C`.
    #[must_use]
    pub fn filter<C: ComponentSet>(mut self) -> Self {
        self.push(Selector::Filter, &C::keys());
        self
    }

    /// Require each component of `C` to have been added since the last tick.
    #[must_use]
    pub fn on_add<C: ComponentSet>(mut self) -> Self {
        self.push(Selector::OnAdd, &C::keys());
        self
    }

    /// Require each component of `C` to have been removed since the last tick.
    #[must_use]
    pub fn on_remove<C: ComponentSet>(mut self) -> Self {
        self.push(Selector::OnRemove, &C::keys());
        self
    }

    /// Exclude entities holding any component of `C`.
    #[must_use]
    pub fn except<C: ComponentSet>(mut self) -> Self {
        self.push(Selector::Except, &C::keys());
        self
    }

    /// Match entities that hold all of `C` now that one of them was just added.
    #[must_use]
    pub fn on_combine<C: ComponentSet>(mut self) -> Self {
        self.push(Selector::OnCombine, &C::keys());
        self
    }

    /// Match entities that held all of `C` until one of them was just removed.
    #[must_use]
    pub fn on_break<C: ComponentSet>(mut self) -> Self {
        self.push(Selector::OnBreak, &C::keys());
        self
    }

    /// Keep only entities whose `T` satisfies `predicate`. `T` becomes a filter.
    #[must_use]
    pub fn on_condition<T, P>(mut self, predicate: P) -> Self
    where
        T: Component,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.push(Selector::Filter, &[T::KEY]);
        self.desc.transform.push_condition::<T, P>(predicate);
        self
    }

    /// Allow the scheduler to hand the system slices of the matched set.
    #[must_use]
    pub fn partial(mut self) -> Self {
        self.desc.partial = true;
        self
    }

    /// On the first run, treat `on_add` and `on_combine` as plain filters so
    /// entities that existed before the system was declared are seen once.
    #[must_use]
    pub fn seed_with_existing(mut self) -> Self {
        self.desc.seed_with_existing = true;
        self
    }

    /// The description built so far.
    #[must_use]
    pub const fn descriptor(&self) -> &QueryDescriptor {
        &self.desc
    }

    pub(crate) fn into_descriptor(self) -> QueryDescriptor {
        self.desc
    }
}

impl<S> fmt::Debug for Query<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Query").field(&self.desc).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Component;

    #[derive(Component, Clone, Copy)]
    struct Position(f32);

    #[derive(Component, Clone, Copy)]
    struct Velocity(f32);

    #[derive(Component, Clone, Copy)]
    struct Frozen;

    #[test]
    fn test_bindings_become_filters() {
        let query = Query::new().write::<Position>().read::<Velocity>();
        let desc = query.descriptor();
        assert_eq!(desc.bindings().len(), 2);
        assert_eq!(desc.group().bucket(Selector::Filter).len(), 2);
    }

    #[test]
    fn test_duplicate_binding_upgrades_to_write() {
        let query = Query::new().read::<Position>().write::<Position>().read::<Position>();
        let desc = query.descriptor();
        assert_eq!(desc.bindings().len(), 1);
        assert_eq!(desc.bindings()[0].access, Access::Write);
    }

    #[test]
    fn test_same_shape_same_group() {
        let a = Query::new().read::<Position>().filter::<(Velocity, Frozen)>();
        let b = Query::new().filter::<Frozen>().write::<Velocity>().read::<Position>();
        assert_eq!(a.descriptor().group(), b.descriptor().group());
    }

    #[test]
    fn test_event_selectors_override_filters() {
        let query = Query::new().read::<Position>().on_remove::<Position>();
        let group = query.descriptor().group();
        assert!(group.bucket(Selector::Filter).is_empty());
        assert_eq!(group.bucket(Selector::OnRemove), &[Position::KEY]);
        assert!(group.clear_every_frame());
    }

    #[test]
    fn test_order_and_conditions() {
        let query = Query::new()
            .on_condition::<Velocity, _>(|v| v.0 > 0.0)
            .order_by::<Position, _>(|a, b| a.0.total_cmp(&b.0))
            .partial()
            .seed_with_existing();
        let desc = query.descriptor();
        assert!(desc.transform().is_ordered());
        assert!(desc.is_partial());
        assert!(desc.seeds_with_existing());
        assert_eq!(desc.group().bucket(Selector::Filter).len(), 2);
    }
}
