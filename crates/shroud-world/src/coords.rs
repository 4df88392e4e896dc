//! Block and region addressing.
//!
//! A region is a 16×16 column of blocks spanning the full world height. It is
//! the unit of bulk transfer to clients and of invalidation on unload.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Number of bits to shift a block coordinate to get its region coordinate.
pub const REGION_SHIFT: i32 = 4;

/// Width of a region along X and Z, in blocks.
pub const REGION_SIZE: i32 = 1 << REGION_SHIFT;

/// Identifies one loaded world (dimension) on the host server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub u32);

/// Integer block coordinate inside a world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    /// East/west.
    pub x: i32,
    /// Height.
    pub y: i32,
    /// North/south.
    pub z: i32,
}

impl BlockPos {
    /// Creates a block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the position offset by `(dx, dy, dz)`.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// The region containing this block.
    pub fn region(self) -> RegionPos {
        RegionPos::new(self.x >> REGION_SHIFT, self.z >> REGION_SHIFT)
    }

    /// This position as a floating-point vector (block corner).
    pub fn as_dvec3(self) -> DVec3 {
        DVec3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    /// Squared distance from this block to an observer position.
    pub fn distance_sq(self, observer: DVec3) -> f64 {
        self.as_dvec3().distance_squared(observer)
    }

    /// The four horizontally adjacent positions: east, west, south, north.
    ///
    /// Paired containers can only join along these axes.
    pub fn horizontal_neighbors(self) -> [BlockPos; 4] {
        [
            self.offset(1, 0, 0),
            self.offset(-1, 0, 0),
            self.offset(0, 0, 1),
            self.offset(0, 0, -1),
        ]
    }
}

/// Region (column) coordinate: block coordinates shifted by [`REGION_SHIFT`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionPos {
    /// Region-grid X.
    pub x: i32,
    /// Region-grid Z.
    pub z: i32,
}

impl RegionPos {
    /// Creates a region coordinate.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Returns `true` if `pos` lies inside this region.
    pub fn contains(self, pos: BlockPos) -> bool {
        pos.region() == self
    }

    /// The lowest-coordinate block column of this region at height `y`.
    pub fn min_block(self, y: i32) -> BlockPos {
        BlockPos::new(self.x << REGION_SHIFT, y, self.z << REGION_SHIFT)
    }
}
