//! World vocabulary shared by the disclosure engine and its hosts.
//!
//! Coordinates and regions, the material registry with its precomputed
//! classification table, items, block entities, world mutation events, and
//! the [`WorldView`] seam through which the engine reads world truth.

pub mod block_entity;
pub mod catalog;
pub mod coords;
pub mod events;
pub mod item;
pub mod registry;
pub mod store;

pub use block_entity::{BlockEntity, BlockEntityData, BlockEntityKind};
pub use coords::{BlockPos, REGION_SHIFT, REGION_SIZE, RegionPos, WorldId};
pub use events::WorldEvent;
pub use item::ItemStack;
pub use registry::{
    BlockState, Material, MaterialDef, MaterialRegistry, MaterialTraits, ProtectedTypeSet,
    RegistryError,
};
pub use store::{MemoryWorld, WorldView};
