//! Packs: the data a system sees.
//!
//! A pack is the matched entity list plus one array per bound component,
//! aligned so element `i` belongs to `entities[i]`. Direct bindings are
//! copied into contiguous [`ByteColumn`]s before the system runs and, for
//! write bindings, copied back afterwards. Indirect bindings read the
//! container's dense storage in place through a slot list.
//!
//! [`PackData`] owns those buffers; [`Pack`] is the borrowed view handed to
//! a system and can be sliced into disjoint sub-packs for parallel work.

use std::{alloc::Layout, fmt, marker::PhantomData, ops::Range, ptr::NonNull};

use smallvec::SmallVec;

use crate::{
    column::ByteColumn,
    component::{Component, ComponentInfo, ComponentKey},
    entity::Entity,
    query::{Access, Binding},
    registry::ComponentRegistry,
};

// ==================== Owned data ====================

enum Backing {
    Direct(ByteColumn),
    Indirect { base: *const u8, slots: Vec<usize> },
}

struct ResolvedBinding {
    info: ComponentInfo,
    access: Access,
    backing: Backing,
}

/// Buffers behind a [`Pack`]. Borrows the registry for indirect bindings.
pub struct PackData<'w> {
    entities: Vec<Entity>,
    bindings: SmallVec<[ResolvedBinding; 4]>,
    partial: bool,
    _registry: PhantomData<&'w ComponentRegistry>,
}

/// Write bindings detached from the registry borrow, ready to be applied.
pub struct PackWrites {
    entities: Vec<Entity>,
    columns: SmallVec<[(ComponentKey, ByteColumn); 4]>,
}

impl<'w> PackData<'w> {
    /// Gather the bound components of `entities`.
    ///
    /// # Panics
    ///
    /// Panics if an entity does not hold a bound component.
    #[must_use]
    pub fn resolve(
        registry: &'w ComponentRegistry,
        bindings: &[Binding],
        entities: Vec<Entity>,
        partial: bool,
    ) -> Self {
        let resolved = bindings
            .iter()
            .map(|binding| {
                let container = registry.get(binding.info.key());
                let backing = match binding.access {
                    Access::Read | Access::Write => {
                        let mut column =
                            ByteColumn::with_capacity(binding.info.layout(), entities.len());
                        if let Some(container) = container {
                            container.copy_to(&entities, &mut column);
                        }
                        Backing::Direct(column)
                    }
                    Access::ReadIndirect => match container {
                        Some(container) => Backing::Indirect {
                            base: container.dense_ptr(),
                            slots: entities
                                .iter()
                                .map(|&e| {
                                    container.slot_of(e).unwrap_or_else(|| {
                                        panic!("{e:?} has no {}", binding.info.name())
                                    })
                                })
                                .collect(),
                        },
                        None => Backing::Indirect {
                            base: NonNull::<u8>::dangling().as_ptr(),
                            slots: Vec::new(),
                        },
                    },
                };
                ResolvedBinding {
                    info: binding.info,
                    access: binding.access,
                    backing,
                }
            })
            .collect();

        Self {
            entities,
            bindings: resolved,
            partial,
            _registry: PhantomData,
        }
    }

    /// Matched entities.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Borrow the buffers as a pack.
    #[must_use]
    pub fn view(&mut self) -> Pack<'_> {
        let len = self.entities.len();
        let columns = self
            .bindings
            .iter_mut()
            .map(|binding| {
                let (ptr, slots) = match &mut binding.backing {
                    Backing::Direct(column) => (column.as_mut_ptr(), std::ptr::null()),
                    Backing::Indirect { base, slots } => (base.cast_mut(), slots.as_ptr()),
                };
                ColumnView {
                    info: binding.info,
                    access: binding.access,
                    ptr,
                    slots,
                }
            })
            .collect();

        Pack {
            entities: &self.entities,
            columns,
            offset: 0,
            len,
            partial: self.partial,
            _marker: PhantomData,
        }
    }

    /// Keep only the write bindings, releasing the registry borrow.
    #[must_use]
    pub fn into_writes(self) -> PackWrites {
        let columns = self
            .bindings
            .into_iter()
            .filter(|binding| binding.access.is_write())
            .filter_map(|binding| match binding.backing {
                Backing::Direct(column) => Some((binding.info.key(), column)),
                Backing::Indirect { .. } => None,
            })
            .collect();
        PackWrites {
            entities: self.entities,
            columns,
        }
    }
}

impl PackWrites {
    /// Copy written values back into their containers. Returns the number of
    /// columns written.
    pub fn apply(&self, registry: &mut ComponentRegistry) -> usize {
        let mut written = 0;
        for (key, column) in &self.columns {
            if let Some(container) = registry.get_mut(*key) {
                container.copy_from(&self.entities, column);
                written += 1;
            }
        }
        written
    }

    /// Whether there is nothing to write back.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ==================== View ====================

#[derive(Clone, Copy)]
struct ColumnView {
    info: ComponentInfo,
    access: Access,
    /// Element 0 of the whole pack for direct columns, or the dense base of
    /// the container for indirect ones.
    ptr: *mut u8,
    /// Slot 0 of the whole pack, indirect columns only.
    slots: *const usize,
}

/// The entities and component arrays a system runs over.
///
/// A full pack covers every matched entity. A partial pack may be cut into
/// disjoint sub-packs with [`Pack::split`] or [`Pack::split_at`].
pub struct Pack<'a> {
    entities: &'a [Entity],
    columns: SmallVec<[ColumnView; 4]>,
    /// First element of this pack within the whole.
    offset: usize,
    len: usize,
    partial: bool,
    _marker: PhantomData<&'a mut ()>,
}

// SAFETY: a pack only hands out access to its own disjoint range of the
// columns, and component types are `Send + Sync`.
unsafe impl Send for Pack<'_> {}

impl<'a> Pack<'a> {
    /// Entities of this pack, aligned with every component array.
    #[must_use]
    pub fn entities(&self) -> &'a [Entity] {
        &self.entities[self.offset..self.offset + self.len]
    }

    /// Number of entities.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the pack is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the pack may be sliced.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.partial
    }

    fn column(&self, key: ComponentKey, name: &str) -> &ColumnView {
        self.columns
            .iter()
            .find(|c| c.info.key() == key)
            .unwrap_or_else(|| panic!("{name} is not bound in this pack"))
    }

    fn check<T: Component>(column: &ColumnView) {
        assert_eq!(
            column.info.layout(),
            Layout::new::<T>(),
            "{} is bound with a different layout",
            T::NAME
        );
    }

    /// Read-only values of a direct binding.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not bound directly.
    #[must_use]
    pub fn read<T: Component>(&self) -> &[T] {
        let column = self.column(T::KEY, T::NAME);
        assert!(
            column.access != Access::ReadIndirect,
            "{} is bound indirectly; use `indirect`",
            T::NAME
        );
        Self::check::<T>(column);
        // SAFETY: the column holds `len` initialized values of `T` starting at
        // `offset`, and the shared borrow of `self` excludes writers.
        unsafe { std::slice::from_raw_parts(self.direct_ptr::<T>(column), self.len) }
    }

    /// Writable values of a write binding.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not bound for writing.
    #[must_use]
    pub fn write<T: Component>(&mut self) -> &mut [T] {
        let column = *self.column(T::KEY, T::NAME);
        assert!(column.access.is_write(), "{} is not bound for writing", T::NAME);
        Self::check::<T>(&column);
        // SAFETY: as in `read`, and the unique borrow of `self` excludes
        // every other view of this range.
        unsafe { std::slice::from_raw_parts_mut(self.direct_ptr::<T>(&column), self.len) }
    }

    /// In-place values of an indirect binding.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not bound indirectly.
    #[must_use]
    pub fn indirect<T: Component>(&self) -> IndirectView<'_, T> {
        let column = self.column(T::KEY, T::NAME);
        assert!(
            column.access == Access::ReadIndirect,
            "{} is not bound indirectly",
            T::NAME
        );
        Self::check::<T>(column);
        // SAFETY: slots were resolved for exactly these entities and index
        // the container's dense storage, which the world keeps alive and
        // unmodified while the pack exists.
        unsafe { self.indirect_view(column) }
    }

    /// Several bindings at once, e.g. `pack.view::<(Write<Position>, Read<Velocity>)>()`.
    ///
    /// # Panics
    ///
    /// Panics if a component is fetched twice with at least one write, or if
    /// a fetch does not match its binding.
    pub fn view<F: Fetch>(&mut self) -> F::Item<'_> {
        let mut keys = SmallVec::new();
        F::collect(&mut keys);
        for (i, (key, write)) in keys.iter().enumerate() {
            for (other, other_write) in &keys[i + 1..] {
                assert!(
                    key != other || !(*write || *other_write),
                    "component {key:?} fetched mutably more than once"
                );
            }
        }
        // SAFETY: writes were checked to be disjoint from every other fetch,
        // and `self` is borrowed uniquely for the lifetime of the items.
        unsafe { F::fetch(self) }
    }

    /// Cut the pack into `count` consecutive sub-packs. The last one takes
    /// the remainder.
    ///
    /// # Panics
    ///
    /// Panics if the pack is full.
    #[must_use]
    pub fn split(self, count: usize) -> Vec<Self> {
        assert!(self.partial, "cannot slice a full pack");
        let count = count.clamp(1, self.len.max(1));
        let batch = self.len / count;

        let mut packs = Vec::with_capacity(count);
        let mut rest = self;
        for _ in 1..count {
            let (head, tail) = rest.split_at(batch);
            packs.push(head);
            rest = tail;
        }
        packs.push(rest);
        packs
    }

    /// Cut the pack in two at `mid`.
    ///
    /// # Panics
    ///
    /// Panics if the pack is full or `mid > len`.
    #[must_use]
    pub fn split_at(self, mid: usize) -> (Self, Self) {
        assert!(self.partial, "cannot slice a full pack");
        assert!(mid <= self.len, "split point {mid} out of bounds");
        let tail = Self {
            entities: self.entities,
            columns: self.columns.clone(),
            offset: self.offset + mid,
            len: self.len - mid,
            partial: true,
            _marker: PhantomData,
        };
        let head = Self { len: mid, ..self };
        (head, tail)
    }

    /// The sub-pack covering `range`.
    ///
    /// # Panics
    ///
    /// Panics if the pack is full or the range is out of bounds.
    #[must_use]
    pub fn slice(self, range: Range<usize>) -> Self {
        assert!(range.start <= range.end, "invalid pack range {range:?}");
        let (_, tail) = self.split_at(range.start);
        let (middle, _) = tail.split_at(range.end - range.start);
        middle
    }

    fn direct_ptr<T>(&self, column: &ColumnView) -> *mut T {
        if std::mem::size_of::<T>() == 0 {
            return NonNull::<T>::dangling().as_ptr();
        }
        // SAFETY: `offset` is within the column the pointer was taken from.
        unsafe { column.ptr.cast::<T>().add(self.offset) }
    }

    unsafe fn indirect_view<T: Component>(&self, column: &ColumnView) -> IndirectView<'_, T> {
        let base = if std::mem::size_of::<T>() == 0 {
            NonNull::<T>::dangling().as_ptr().cast_const()
        } else {
            column.ptr.cast_const().cast::<T>()
        };
        let slots = if self.len == 0 {
            &[][..]
        } else {
            // SAFETY: the slot list covers the whole pack; this pack's range
            // lies inside it.
            unsafe { std::slice::from_raw_parts(column.slots.add(self.offset), self.len) }
        };
        IndirectView {
            base,
            slots,
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for Pack<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pack")
            .field("len", &self.len)
            .field("offset", &self.offset)
            .field("partial", &self.partial)
            .field(
                "bindings",
                &self
                    .columns
                    .iter()
                    .map(|c| (c.info.name(), c.access))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Values read in place from a container's dense storage.
pub struct IndirectView<'a, T> {
    base: *const T,
    slots: &'a [usize],
    _marker: PhantomData<&'a T>,
}

impl<'a, T> IndirectView<'a, T> {
    /// Number of values.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the view is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Value of the `index`th entity of the pack.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a T> {
        let slot = *self.slots.get(index)?;
        // SAFETY: every slot indexes an initialized element of the dense
        // storage `base` points to.
        Some(unsafe { &*self.base.add(slot) })
    }

    /// Values in pack order.
    pub fn iter(&self) -> impl Iterator<Item = &'a T> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}

impl<T> std::ops::Index<usize> for IndirectView<'_, T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        let slot = self.slots[index];
        // SAFETY: as in `get`.
        unsafe { &*self.base.add(slot) }
    }
}

// ==================== Fetch ====================

/// Fetch `T` read-only from a direct binding.
pub struct Read<T>(PhantomData<T>);

/// Fetch `T` mutably from a write binding.
pub struct Write<T>(PhantomData<T>);

/// Fetch `T` from an indirect binding.
pub struct Indirect<T>(PhantomData<T>);

/// Something [`Pack::view`] can produce.
pub trait Fetch {
    /// What the fetch yields.
    type Item<'p>;

    /// Push `(key, is_write)` for every component fetched.
    fn collect(keys: &mut SmallVec<[(ComponentKey, bool); 4]>);

    /// Produce the item.
    ///
    /// # Safety
    ///
    /// No component may be fetched mutably while another fetch of the same
    /// component is alive, and `pack` must stay uniquely borrowed for `'p`.
    unsafe fn fetch<'p>(pack: &'p Pack<'_>) -> Self::Item<'p>;
}

impl<T: Component> Fetch for Read<T> {
    type Item<'p> = &'p [T];

    fn collect(keys: &mut SmallVec<[(ComponentKey, bool); 4]>) {
        keys.push((T::KEY, false));
    }

    unsafe fn fetch<'p>(pack: &'p Pack<'_>) -> Self::Item<'p> {
        pack.read::<T>()
    }
}

impl<T: Component> Fetch for Write<T> {
    type Item<'p> = &'p mut [T];

    fn collect(keys: &mut SmallVec<[(ComponentKey, bool); 4]>) {
        keys.push((T::KEY, true));
    }

    unsafe fn fetch<'p>(pack: &'p Pack<'_>) -> Self::Item<'p> {
        let column = pack.column(T::KEY, T::NAME);
        assert!(column.access.is_write(), "{} is not bound for writing", T::NAME);
        Pack::check::<T>(column);
        // SAFETY: the caller guarantees this is the only live fetch of `T`
        // and that the pack is uniquely borrowed for `'p`.
        unsafe { std::slice::from_raw_parts_mut(pack.direct_ptr::<T>(column), pack.len) }
    }
}

impl<T: Component> Fetch for Indirect<T> {
    type Item<'p> = IndirectView<'p, T>;

    fn collect(keys: &mut SmallVec<[(ComponentKey, bool); 4]>) {
        keys.push((T::KEY, false));
    }

    unsafe fn fetch<'p>(pack: &'p Pack<'_>) -> Self::Item<'p> {
        pack.indirect::<T>()
    }
}

macro_rules! impl_fetch_tuple {
    ($($name:ident),+) => {
        impl<$($name: Fetch),+> Fetch for ($($name,)+) {
            type Item<'p> = ($($name::Item<'p>,)+);

            fn collect(keys: &mut SmallVec<[(ComponentKey, bool); 4]>) {
                $($name::collect(keys);)+
            }

            unsafe fn fetch<'p>(pack: &'p Pack<'_>) -> Self::Item<'p> {
                // SAFETY: forwarded from the caller.
                unsafe { ($($name::fetch(pack),)+) }
            }
        }
    };
}

impl_fetch_tuple!(A);
impl_fetch_tuple!(A, B);
impl_fetch_tuple!(A, B, C);
impl_fetch_tuple!(A, B, C, D);
impl_fetch_tuple!(A, B, C, D, E);
impl_fetch_tuple!(A, B, C, D, E, F);
