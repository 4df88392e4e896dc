//! Block entities: auxiliary per-block records (container contents, sign
//! text, spawner data) sent alongside block states.

use serde::{Deserialize, Serialize};

use crate::item::ItemStack;

/// The kind of a block entity, identified on the wire by a namespaced tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockEntityKind {
    Chest,
    TrappedChest,
    EnderChest,
    Barrel,
    ShulkerBox,
    Dispenser,
    Dropper,
    Hopper,
    BrewingStand,
    Furnace,
    BlastFurnace,
    Smoker,
    Lectern,
    Sign,
    HangingSign,
    EnchantingTable,
    Beehive,
    Spawner,
    Bed,
    Beacon,
    Jukebox,
}

impl BlockEntityKind {
    /// Every kind, in tag order.
    pub const ALL: [BlockEntityKind; 21] = [
        Self::Chest,
        Self::TrappedChest,
        Self::EnderChest,
        Self::Barrel,
        Self::ShulkerBox,
        Self::Dispenser,
        Self::Dropper,
        Self::Hopper,
        Self::BrewingStand,
        Self::Furnace,
        Self::BlastFurnace,
        Self::Smoker,
        Self::Lectern,
        Self::Sign,
        Self::HangingSign,
        Self::EnchantingTable,
        Self::Beehive,
        Self::Spawner,
        Self::Bed,
        Self::Beacon,
        Self::Jukebox,
    ];

    /// The namespaced wire tag.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Chest => "minecraft:chest",
            Self::TrappedChest => "minecraft:trapped_chest",
            Self::EnderChest => "minecraft:ender_chest",
            Self::Barrel => "minecraft:barrel",
            Self::ShulkerBox => "minecraft:shulker_box",
            Self::Dispenser => "minecraft:dispenser",
            Self::Dropper => "minecraft:dropper",
            Self::Hopper => "minecraft:hopper",
            Self::BrewingStand => "minecraft:brewing_stand",
            Self::Furnace => "minecraft:furnace",
            Self::BlastFurnace => "minecraft:blast_furnace",
            Self::Smoker => "minecraft:smoker",
            Self::Lectern => "minecraft:lectern",
            Self::Sign => "minecraft:sign",
            Self::HangingSign => "minecraft:hanging_sign",
            Self::EnchantingTable => "minecraft:enchanting_table",
            Self::Beehive => "minecraft:beehive",
            Self::Spawner => "minecraft:mob_spawner",
            Self::Bed => "minecraft:bed",
            Self::Beacon => "minecraft:beacon",
            Self::Jukebox => "minecraft:jukebox",
        }
    }

    /// Exact reverse of [`tag`](Self::tag).
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Kinds whose record carries an item inventory.
    pub fn holds_items(self) -> bool {
        matches!(
            self,
            Self::Chest
                | Self::TrappedChest
                | Self::EnderChest
                | Self::Barrel
                | Self::ShulkerBox
                | Self::Dispenser
                | Self::Dropper
                | Self::Hopper
                | Self::BrewingStand
                | Self::Furnace
                | Self::BlastFurnace
                | Self::Smoker
                | Self::Lectern
        )
    }

    /// Sign kinds.
    pub fn is_sign(self) -> bool {
        matches!(self, Self::Sign | Self::HangingSign)
    }
}

/// Payload of a block entity record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockEntityData {
    /// Inventory slots.
    Container { items: Vec<Option<ItemStack>> },
    /// Four text lines.
    Sign { lines: [String; 4] },
    /// Anything the engine does not interpret.
    Opaque(Vec<u8>),
}

/// A block entity as held by the world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntity {
    /// Kind tag.
    pub kind: BlockEntityKind,
    /// Payload.
    pub data: BlockEntityData,
}

impl BlockEntity {
    /// An empty container record of `kind`.
    pub fn container(kind: BlockEntityKind, items: Vec<Option<ItemStack>>) -> Self {
        Self {
            kind,
            data: BlockEntityData::Container { items },
        }
    }

    /// A sign record.
    pub fn sign(lines: [String; 4]) -> Self {
        Self {
            kind: BlockEntityKind::Sign,
            data: BlockEntityData::Sign { lines },
        }
    }

    /// Returns `true` if the payload is an inventory.
    pub fn is_container(&self) -> bool {
        matches!(self.data, BlockEntityData::Container { .. })
    }

    /// Sign text, if this is a sign record.
    pub fn sign_lines(&self) -> Option<&[String; 4]> {
        match &self.data {
            BlockEntityData::Sign { lines } => Some(lines),
            _ => None,
        }
    }
}
