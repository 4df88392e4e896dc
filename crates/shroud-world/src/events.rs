//! World mutation events the host forwards to the engine.

use crate::coords::{BlockPos, RegionPos, WorldId};
use crate::registry::Material;

/// Emitted when world truth changes in a way that can invalidate per-session
/// disclosure records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorldEvent {
    /// A non-air block became air.
    BlockBroken {
        world: WorldId,
        pos: BlockPos,
        previous: Material,
    },
    /// A block was placed or replaced with a non-air material.
    BlockPlaced {
        world: WorldId,
        pos: BlockPos,
        material: Material,
    },
    /// A region was dropped from memory.
    RegionUnloaded { world: WorldId, region: RegionPos },
}

impl WorldEvent {
    /// The world the event happened in.
    pub fn world(&self) -> WorldId {
        match self {
            Self::BlockBroken { world, .. }
            | Self::BlockPlaced { world, .. }
            | Self::RegionUnloaded { world, .. } => *world,
        }
    }
}
