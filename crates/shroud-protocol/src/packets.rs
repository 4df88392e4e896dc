//! Clientbound packet types.

use serde::{Deserialize, Serialize};
use shroud_world::{BlockEntityData, BlockPos, BlockState, ItemStack, RegionPos, WorldId};

use crate::codec::{CodecError, compress_blocks, decompress_blocks};
use crate::ids::WindowId;

// ---------------------------------------------------------------------------
// Top-level enum
// ---------------------------------------------------------------------------

/// Every packet the engine inspects or originates. The enum discriminant is
/// the type tag on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientboundPacket {
    // --- World ---
    /// Bulk block data for one region.
    RegionData(RegionData),
    /// A single block state change.
    BlockChange(BlockChange),
    /// Block entity record for one position.
    BlockEntityData(BlockEntityUpdate),
    /// Sign text refresh.
    SignUpdate(SignUpdate),

    // --- Windows ---
    /// A container UI opens.
    OpenWindow(OpenWindow),
    /// Full contents of a window.
    WindowItems(WindowItems),
    /// One slot of a window.
    SetSlot(SetSlot),
    /// A container UI closes.
    CloseWindow(CloseWindow),

    // --- Chat ---
    /// Text shown to the player.
    SystemMessage(SystemMessage),
}

impl ClientboundPacket {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegionData(_) => "region_data",
            Self::BlockChange(_) => "block_change",
            Self::BlockEntityData(_) => "block_entity_data",
            Self::SignUpdate(_) => "sign_update",
            Self::OpenWindow(_) => "open_window",
            Self::WindowItems(_) => "window_items",
            Self::SetSlot(_) => "set_slot",
            Self::CloseWindow(_) => "close_window",
            Self::SystemMessage(_) => "system_message",
        }
    }
}

// ---------------------------------------------------------------------------
// Payload structs
// ---------------------------------------------------------------------------

/// One block inside a region payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionBlock {
    /// Absolute block position.
    pub pos: BlockPos,
    /// Block state as sent to the client.
    pub state: BlockState,
}

/// Bulk block data for one region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionData {
    /// World the region belongs to.
    pub world: WorldId,
    /// Region coordinate.
    pub region: RegionPos,
    /// LZ4-compressed postcard list of [`RegionBlock`]s.
    pub blocks: Vec<u8>,
    /// Block entity records delivered with the region.
    pub block_entities: Vec<BlockEntityUpdate>,
}

impl RegionData {
    /// Builds a region packet, compressing `blocks`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Postcard`] if the block list cannot be encoded.
    pub fn new(
        world: WorldId,
        region: RegionPos,
        blocks: &[RegionBlock],
        block_entities: Vec<BlockEntityUpdate>,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            world,
            region,
            blocks: compress_blocks(blocks)?,
            block_entities,
        })
    }

    /// Decompresses and decodes the block list.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the payload is corrupt.
    pub fn decode_blocks(&self) -> Result<Vec<RegionBlock>, CodecError> {
        decompress_blocks(&self.blocks)
    }

    /// Replaces the block list.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Postcard`] if the block list cannot be encoded.
    pub fn set_blocks(&mut self, blocks: &[RegionBlock]) -> Result<(), CodecError> {
        self.blocks = compress_blocks(blocks)?;
        Ok(())
    }
}

/// A single block state change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockChange {
    /// World of the change.
    pub world: WorldId,
    /// Position of the change.
    pub pos: BlockPos,
    /// New state. Its material id is unvalidated on the wire.
    pub state: BlockState,
}

/// Block entity record for one position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockEntityUpdate {
    /// World of the record.
    pub world: WorldId,
    /// Position of the record.
    pub pos: BlockPos,
    /// Namespaced kind tag. Some encodings omit it for signs.
    pub tag: Option<String>,
    /// Payload.
    pub data: BlockEntityData,
}

/// Sign text refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignUpdate {
    /// World of the sign.
    pub world: WorldId,
    /// Position of the sign.
    pub pos: BlockPos,
    /// The four lines.
    pub lines: [String; 4],
}

/// A container UI opens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenWindow {
    /// Window id assigned by the server.
    pub window: WindowId,
    /// Number of container slots.
    pub slots: u16,
    /// Window title.
    pub title: String,
}

/// Full contents of a window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowItems {
    /// Target window.
    pub window: WindowId,
    /// One entry per slot.
    pub items: Vec<Option<ItemStack>>,
}

/// One slot of a window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetSlot {
    /// Target window.
    pub window: WindowId,
    /// Slot index.
    pub slot: u16,
    /// New content, `None` to clear.
    pub item: Option<ItemStack>,
}

/// A container UI closes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloseWindow {
    /// Window being closed.
    pub window: WindowId,
}

/// Text shown to the player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemMessage {
    /// Already colour-translated text.
    pub text: String,
}
