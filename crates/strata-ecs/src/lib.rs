// Allow unsafe code in ECS - necessary for type-erased component storage
#![allow(unsafe_code)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::ptr_as_ptr)]
#![allow(clippy::ref_as_ptr)]
#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::float_cmp)]

//! Strata ECS - staged sparse-set Entity Component System
//!
//! Components live in one sparse set per component type. Every entry sits in
//! one of three stages: *settled*, *added* (since the last tick) or *removed*
//! (since the last tick). Stages make change detection free: filtering for
//! "just added" or "just removed" is a slice of the dense array.
//!
//! # Key Concepts
//!
//! - **Entity**: A numeric id; `0` is never a valid entity
//! - **Component**: `Copy` data keyed by a hash of its name
//! - **Query**: Which components a system binds and which entities it sees
//! - **Pack**: The entities and component arrays handed to a system
//! - **Command buffer**: Structural changes recorded by systems and applied
//!   after they all ran
//!
//! # Example
//!
//! ```ignore
//! #[derive(Component, Clone, Copy)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Component, Clone, Copy)]
//! struct Velocity { x: f32, y: f32 }
//!
//! let mut world = World::new();
//! let e = world.create();
//! world.add_component(e, Position { x: 0.0, y: 0.0 });
//! world.add_component(e, Velocity { x: 1.0, y: 0.0 });
//!
//! world.declare(
//!     Threading::Parallel,
//!     Query::new().write::<Position>().read::<Velocity>().partial(),
//!     |info, pack| {
//!         let dt = info.dt().as_secs_f32();
//!         let (positions, velocities) = pack.view::<(Write<Position>, Read<Velocity>)>();
//!         for (p, v) in positions.iter_mut().zip(velocities) {
//!             p.x += v.x * dt;
//!             p.y += v.y * dt;
//!         }
//!     },
//! );
//!
//! world.tick(Duration::from_millis(50));
//! ```

#[allow(unused_extern_crates)]
extern crate self as strata_ecs;

mod column;
mod command_buffer;
mod component;
mod config;
mod container;
mod entity;
mod error;
mod filter;
mod pack;
mod query;
mod registry;
mod sort;
mod sparse;
mod stage;
mod storage;
mod system;
mod transform;
mod values;
mod world;

pub use column::{ByteColumn, RawValue};
pub use command_buffer::CommandBuffer;
pub use component::{Component, ComponentInfo, ComponentKey, ComponentSet};
pub use config::WorldConfig;
pub use container::{ByteContainer, ComponentContainer, FlagContainer, RawValues, TypedContainer};
pub use entity::{Entity, EntityAllocator};
pub use error::{EcsError, EcsResult};
pub use filter::{FilterCache, FilterContext, FilterGroup, Selector};
pub use pack::{Fetch, Indirect, IndirectView, Pack, PackData, PackWrites, Read, Write};
pub use query::{Access, Binding, Ordered, Query, QueryDescriptor, Unordered};
pub use registry::ComponentRegistry;
pub use sort::{SortOptions, merge_sort_by};
pub use sparse::{CHUNK_SIZE, Placement, SlotSwaps, StagedIndex};
pub use stage::{Stage, StageRange};
pub use storage::{DenseStore, StagedByteArray, StagedSparseArray, StagedSparseSet, StagedStorage};
/// Derive macro for [`Component`].
pub use strata_ecs_derive::Component;
pub use system::{Info, SystemFn, SystemToken, Threading};
pub use transform::TransformGroup;
pub use values::Values;
pub use world::World;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CommandBuffer, Component, Entity, Indirect, Info, Pack, Query, Read, SystemToken,
        Threading, Values, World, WorldConfig, Write,
    };
}
