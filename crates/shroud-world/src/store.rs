//! Read access to world truth, and an in-memory world for hosts without one.
//!
//! The engine never mutates the world. It reads block states and block
//! entities through [`WorldView`], from packet-handling threads as well as
//! from background scan workers, so implementations must be shareable.

use dashmap::DashMap;
use rustc_hash::FxHashMap;

use crate::block_entity::BlockEntity;
use crate::coords::{BlockPos, RegionPos, WorldId};
use crate::events::WorldEvent;
use crate::registry::BlockState;

/// The engine's view of the host world.
pub trait WorldView: Send + Sync {
    /// Actual block state at `pos`, or `None` if its region is not loaded.
    fn block_at(&self, world: WorldId, pos: BlockPos) -> Option<BlockState>;

    /// Actual block entity at `pos`, if any.
    fn block_entity(&self, world: WorldId, pos: BlockPos) -> Option<BlockEntity>;

    /// Every non-air block of a loaded region. Empty if not loaded.
    fn region_blocks(&self, world: WorldId, region: RegionPos) -> Vec<(BlockPos, BlockState)>;
}

/// Blocks and block entities of one loaded region.
#[derive(Default)]
struct RegionColumn {
    blocks: FxHashMap<BlockPos, BlockState>,
    entities: FxHashMap<BlockPos, BlockEntity>,
}

/// Sparse in-memory world keyed by `(world, region)`.
///
/// Absent blocks in a loaded region read as air. Mutations report the
/// [`WorldEvent`] the host should forward to the engine.
pub struct MemoryWorld {
    regions: DashMap<(WorldId, RegionPos), RegionColumn>,
}

impl MemoryWorld {
    /// Creates an empty world with no loaded regions.
    pub fn new() -> Self {
        Self {
            regions: DashMap::new(),
        }
    }

    /// Marks a region loaded. Loading twice is a no-op.
    pub fn load_region(&self, world: WorldId, region: RegionPos) {
        self.regions.entry((world, region)).or_default();
    }

    /// Drops a region. Returns the unload event, or `None` if it was not loaded.
    pub fn unload_region(&self, world: WorldId, region: RegionPos) -> Option<WorldEvent> {
        self.regions
            .remove(&(world, region))
            .map(|_| WorldEvent::RegionUnloaded { world, region })
    }

    /// Returns `true` if the region is loaded.
    pub fn is_loaded(&self, world: WorldId, region: RegionPos) -> bool {
        self.regions.contains_key(&(world, region))
    }

    /// Number of loaded regions across all worlds.
    pub fn loaded_count(&self) -> usize {
        self.regions.len()
    }

    /// Sets the block at `pos`, loading its region if needed.
    ///
    /// Replacing a block with a different material discards its block entity.
    /// Returns `None` when nothing changed.
    pub fn set_block(&self, world: WorldId, pos: BlockPos, state: BlockState) -> Option<WorldEvent> {
        let mut column = self.regions.entry((world, pos.region())).or_default();
        let previous = column.blocks.get(&pos).copied().unwrap_or(BlockState::AIR);
        if previous == state {
            return None;
        }
        if previous.material != state.material {
            column.entities.remove(&pos);
        }

        if state.material.is_air() {
            column.blocks.remove(&pos);
            (!previous.material.is_air()).then_some(WorldEvent::BlockBroken {
                world,
                pos,
                previous: previous.material,
            })
        } else {
            column.blocks.insert(pos, state);
            Some(WorldEvent::BlockPlaced {
                world,
                pos,
                material: state.material,
            })
        }
    }

    /// Attaches a block entity to `pos`, loading its region if needed.
    pub fn set_block_entity(&self, world: WorldId, pos: BlockPos, entity: BlockEntity) {
        self.regions
            .entry((world, pos.region()))
            .or_default()
            .entities
            .insert(pos, entity);
    }
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldView for MemoryWorld {
    fn block_at(&self, world: WorldId, pos: BlockPos) -> Option<BlockState> {
        let column = self.regions.get(&(world, pos.region()))?;
        Some(column.blocks.get(&pos).copied().unwrap_or(BlockState::AIR))
    }

    fn block_entity(&self, world: WorldId, pos: BlockPos) -> Option<BlockEntity> {
        self.regions
            .get(&(world, pos.region()))?
            .entities
            .get(&pos)
            .cloned()
    }

    fn region_blocks(&self, world: WorldId, region: RegionPos) -> Vec<(BlockPos, BlockState)> {
        self.regions
            .get(&(world, region))
            .map(|column| column.blocks.iter().map(|(p, s)| (*p, *s)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_entity::BlockEntityKind;
    use crate::registry::Material;

    const W: WorldId = WorldId(0);

    #[test]
    fn test_unloaded_region_reads_none() {
        let world = MemoryWorld::new();
        assert_eq!(world.block_at(W, BlockPos::new(0, 0, 0)), None);
        assert!(world.region_blocks(W, RegionPos::new(0, 0)).is_empty());
    }

    #[test]
    fn test_loaded_region_defaults_to_air() {
        let world = MemoryWorld::new();
        world.load_region(W, RegionPos::new(0, 0));
        assert_eq!(
            world.block_at(W, BlockPos::new(3, 64, 3)),
            Some(BlockState::AIR)
        );
    }

    #[test]
    fn test_set_block_reports_place_and_break() {
        let world = MemoryWorld::new();
        let pos = BlockPos::new(1, 2, 3);
        let chest = BlockState::of(Material(7));

        let placed = world.set_block(W, pos, chest);
        assert_eq!(
            placed,
            Some(WorldEvent::BlockPlaced {
                world: W,
                pos,
                material: Material(7)
            })
        );
        assert_eq!(world.set_block(W, pos, chest), None);

        let broken = world.set_block(W, pos, BlockState::AIR);
        assert_eq!(
            broken,
            Some(WorldEvent::BlockBroken {
                world: W,
                pos,
                previous: Material(7)
            })
        );
        assert_eq!(world.set_block(W, pos, BlockState::AIR), None);
    }

    #[test]
    fn test_material_change_drops_block_entity() {
        let world = MemoryWorld::new();
        let pos = BlockPos::new(0, 0, 0);
        world.set_block(W, pos, BlockState::of(Material(7)));
        world.set_block_entity(W, pos, BlockEntity::container(BlockEntityKind::Chest, vec![]));
        assert!(world.block_entity(W, pos).is_some());

        world.set_block(W, pos, BlockState::of(Material(8)));
        assert!(world.block_entity(W, pos).is_none());
    }

    #[test]
    fn test_unload_region() {
        let world = MemoryWorld::new();
        let pos = BlockPos::new(40, 0, -5);
        world.set_block(W, pos, BlockState::of(Material(1)));
        let region = pos.region();

        assert_eq!(
            world.unload_region(W, region),
            Some(WorldEvent::RegionUnloaded { world: W, region })
        );
        assert_eq!(world.unload_region(W, region), None);
        assert_eq!(world.block_at(W, pos), None);
        assert_eq!(world.loaded_count(), 0);
    }

    #[test]
    fn test_worlds_are_isolated() {
        let world = MemoryWorld::new();
        let pos = BlockPos::new(0, 0, 0);
        world.set_block(W, pos, BlockState::of(Material(1)));
        assert_eq!(world.block_at(WorldId(1), pos), None);
    }
}
