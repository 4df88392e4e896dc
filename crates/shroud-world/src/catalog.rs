//! The built-in material catalog.
//!
//! Materials are listed explicitly or expanded from families (wood variants,
//! dye colours). Every name is spelled out in full so registry lookups can be
//! exact matches; no pattern matching on names ever happens at runtime.

use crate::registry::{MaterialDef, MaterialTraits};

/// Wood families that have sign variants and planks.
pub const WOODS: [&str; 12] = [
    "oak", "spruce", "birch", "jungle", "acacia", "dark_oak", "mangrove", "cherry", "pale_oak",
    "bamboo", "crimson", "warped",
];

/// The sixteen dye colours (shulker boxes, beds).
pub const DYE_COLORS: [&str; 16] = [
    "white",
    "orange",
    "magenta",
    "light_blue",
    "yellow",
    "lime",
    "pink",
    "gray",
    "light_gray",
    "cyan",
    "purple",
    "blue",
    "brown",
    "green",
    "red",
    "black",
];

const CONTAINER: MaterialTraits = MaterialTraits::PLAIN
    .protected()
    .container()
    .block_entity();

const PAIRED_CONTAINER: MaterialTraits = CONTAINER.paired();

const SHULKER: MaterialTraits = CONTAINER.portable();

const SIGN: MaterialTraits = MaterialTraits::PLAIN.protected().sign().block_entity();

const WORKSTATION: MaterialTraits = MaterialTraits::PLAIN.protected().container();

const PROTECTED_ENTITY: MaterialTraits = MaterialTraits::PLAIN.protected().block_entity();

/// Protected storage and processing blocks with inventories.
const PROTECTED_CONTAINERS: [&str; 10] = [
    "barrel",
    "ender_chest",
    "dispenser",
    "dropper",
    "hopper",
    "brewing_stand",
    "furnace",
    "blast_furnace",
    "smoker",
    "lectern",
];

/// Protected workstations: container UI but no block entity.
const PROTECTED_WORKSTATIONS: [&str; 9] = [
    "crafting_table",
    "loom",
    "stonecutter",
    "cartography_table",
    "grindstone",
    "fletching_table",
    "anvil",
    "chipped_anvil",
    "damaged_anvil",
];

/// Protected blocks with block entities but no container UI.
const PROTECTED_ENTITIES: [&str; 4] = ["enchanting_table", "beehive", "bee_nest", "spawner"];

/// Ordinary blocks and items.
const PLAIN: [&str; 30] = [
    "stone",
    "granite",
    "diorite",
    "andesite",
    "deepslate",
    "dirt",
    "grass_block",
    "cobblestone",
    "bedrock",
    "sand",
    "gravel",
    "glass",
    "water",
    "lava",
    "torch",
    "obsidian",
    "netherrack",
    "iron_ore",
    "diamond_ore",
    "diamond",
    "emerald",
    "iron_ingot",
    "gold_ingot",
    "netherite_ingot",
    "stick",
    "bread",
    "ender_pearl",
    "elytra",
    "diamond_sword",
    "diamond_pickaxe",
];

/// Returns every catalog entry in registration order.
pub fn entries() -> Vec<MaterialDef> {
    let mut out = Vec::new();
    let mut push = |name: String, traits: MaterialTraits| out.push(MaterialDef { name, traits });

    for name in PLAIN {
        push(name.to_string(), MaterialTraits::PLAIN);
    }
    for wood in WOODS {
        push(format!("{wood}_planks"), MaterialTraits::PLAIN);
    }

    push("chest".to_string(), PAIRED_CONTAINER);
    push("trapped_chest".to_string(), PAIRED_CONTAINER);
    for name in PROTECTED_CONTAINERS {
        push(name.to_string(), CONTAINER);
    }
    push("shulker_box".to_string(), SHULKER);
    for color in DYE_COLORS {
        push(format!("{color}_shulker_box"), SHULKER);
    }

    for wood in WOODS {
        push(format!("{wood}_sign"), SIGN);
        push(format!("{wood}_wall_sign"), SIGN);
        push(format!("{wood}_hanging_sign"), SIGN);
        push(format!("{wood}_wall_hanging_sign"), SIGN);
    }

    for name in PROTECTED_WORKSTATIONS {
        push(name.to_string(), WORKSTATION);
    }
    for name in PROTECTED_ENTITIES {
        push(name.to_string(), PROTECTED_ENTITY);
    }
    for color in DYE_COLORS {
        push(format!("{color}_bed"), PROTECTED_ENTITY);
    }

    // Unprotected but still recognised by the block entity checks.
    push(
        "beacon".to_string(),
        MaterialTraits::PLAIN.container().block_entity(),
    );
    push("jukebox".to_string(), MaterialTraits::PLAIN.block_entity());
    push("bookshelf".to_string(), MaterialTraits::PLAIN.container());
    push("composter".to_string(), MaterialTraits::PLAIN.container());
    push("smithing_table".to_string(), MaterialTraits::PLAIN.container());

    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_entries_have_unique_names() {
        let entries = entries();
        let names: HashSet<_> = entries.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names.len(), entries.len());
    }

    #[test]
    fn test_every_sign_variant_is_present() {
        let entries = entries();
        let signs = entries.iter().filter(|d| d.traits.sign).count();
        assert_eq!(signs, WOODS.len() * 4);
    }

    #[test]
    fn test_shulker_family_is_portable() {
        let entries = entries();
        let shulkers: Vec<_> = entries
            .iter()
            .filter(|d| d.name.ends_with("shulker_box"))
            .collect();
        assert_eq!(shulkers.len(), DYE_COLORS.len() + 1);
        assert!(shulkers.iter().all(|d| d.traits.portable_container));
    }

    #[test]
    fn test_only_chests_pair() {
        let paired: Vec<_> = entries()
            .into_iter()
            .filter(|d| d.traits.paired)
            .map(|d| d.name)
            .collect();
        assert_eq!(paired, vec!["chest", "trapped_chest"]);
    }
}
