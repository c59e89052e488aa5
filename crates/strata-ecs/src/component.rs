//! Component keys and metadata.
//!
//! A component is identified by a [`ComponentKey`] derived from its name at
//! compile time, not by `TypeId`. The key is what storage, filters and pack
//! bindings are tagged with, so type-erased paths (the command buffer's byte
//! storage) can talk about a component without knowing its Rust type.

use std::{alloc::Layout, fmt};

use smallvec::SmallVec;

use crate::container::{ByteContainer, ComponentContainer, FlagContainer, TypedContainer};

/// Plain data that can be attached to entities.
///
/// Components are `Copy`: storage moves them with bitwise copies and never
/// runs destructors. Implement it with `#[derive(Component)]`, which derives
/// [`Component::NAME`] from the module path and type name.
///
/// # Example
///
/// ```ignore
/// #[derive(Component, Clone, Copy)]
/// struct Position { x: f32, y: f32 }
///
/// #[derive(Component, Clone, Copy)]
/// #[component(name = "game::Frozen")]
/// struct Frozen;
/// ```
///
/// Types without `Copy` are rejected:
///
/// ```compile_fail
/// use strata_ecs::Component;
///
/// #[derive(Component, Clone)]
/// struct Health {
///     value: u32,
/// }
/// ```
///
/// # Safety
///
/// [`Component::NAME`] must be unique to the type. Storage is looked up by
/// the key derived from the name and reinterpreted as `Self`, so two types
/// sharing a name are treated as the same component. The type must also be
/// inhabited: tags are conjured from zero bytes.
pub unsafe trait Component: Copy + Send + Sync + 'static {
    /// Globally unique name of the component.
    const NAME: &'static str;

    /// Key derived from [`Component::NAME`].
    const KEY: ComponentKey = ComponentKey::from_name(Self::NAME);
}

/// Compile-time identifier of a component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey(u64);

impl ComponentKey {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    /// Hash a component name (64-bit FNV-1a).
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Create a key from a raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw key value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Key of a component type.
    #[must_use]
    pub const fn of<T: Component>() -> Self {
        T::KEY
    }
}

impl fmt::Debug for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKey({:016x})", self.0)
    }
}

/// Runtime description of a component: key, name, layout and how to build
/// the live container that stores it.
#[derive(Clone, Copy)]
pub struct ComponentInfo {
    key: ComponentKey,
    name: &'static str,
    layout: Layout,
    /// Builds the container the world keeps for this component.
    factory: fn(&ComponentInfo) -> Box<dyn ComponentContainer>,
}

impl ComponentInfo {
    /// Info for a concrete component type.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        let factory: fn(&ComponentInfo) -> Box<dyn ComponentContainer> =
            if std::mem::size_of::<T>() == 0 {
                |info| Box::new(FlagContainer::new(*info))
            } else {
                |_| Box::new(TypedContainer::<T>::new())
            };

        Self {
            key: T::KEY,
            name: T::NAME,
            layout: Layout::new::<T>(),
            factory,
        }
    }

    /// Info for a component known only by name and layout.
    ///
    /// The world stores such components in byte containers.
    #[must_use]
    pub fn raw(name: &'static str, layout: Layout) -> Self {
        Self {
            key: ComponentKey::from_name(name),
            name,
            layout,
            factory: |info| Box::new(ByteContainer::new(*info)),
        }
    }

    /// Get the component key.
    #[must_use]
    pub const fn key(&self) -> ComponentKey {
        self.key
    }

    /// Get the component name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Get the memory layout.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Get the size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.layout.size()
    }

    /// Get the alignment requirement.
    #[must_use]
    pub const fn align(&self) -> usize {
        self.layout.align()
    }

    /// Zero-sized components only track membership.
    #[must_use]
    pub const fn is_tag(&self) -> bool {
        self.layout.size() == 0
    }

    /// Build the container the world uses for this component.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn ComponentContainer> {
        (self.factory)(self)
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .finish()
    }
}

impl PartialEq for ComponentInfo {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.name == other.name && self.layout == other.layout
    }
}

impl Eq for ComponentInfo {}

/// A component or a tuple of components, used wherever a query names a set.
pub trait ComponentSet: 'static {
    /// Infos of every member, in declaration order.
    fn infos() -> SmallVec<[ComponentInfo; 4]>;

    /// Keys of every member, in declaration order.
    fn keys() -> SmallVec<[ComponentKey; 4]> {
        Self::infos().iter().map(ComponentInfo::key).collect()
    }
}

impl<T: Component> ComponentSet for T {
    fn infos() -> SmallVec<[ComponentInfo; 4]> {
        smallvec::smallvec![ComponentInfo::of::<T>()]
    }
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn infos() -> SmallVec<[ComponentInfo; 4]> {
                smallvec::smallvec![$(ComponentInfo::of::<$name>()),+]
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);
