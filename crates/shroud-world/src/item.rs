//! Item stacks as they travel in window contents and slot updates.

use serde::{Deserialize, Serialize};

use crate::registry::{Material, MaterialRegistry};

/// A stack of items, possibly carrying nested contents (a filled shulker box).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item material.
    pub material: Material,
    /// Stack size.
    pub count: u8,
    /// Custom display name, if renamed.
    pub display_name: Option<String>,
    /// Lore lines.
    pub lore: Vec<String>,
    /// Nested slots for portable containers; empty for everything else.
    pub contents: Vec<Option<ItemStack>>,
}

impl ItemStack {
    /// A plain stack with no name, lore, or contents.
    pub fn new(material: Material, count: u8) -> Self {
        Self {
            material,
            count,
            display_name: None,
            lore: Vec::new(),
            contents: Vec::new(),
        }
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the lore lines.
    pub fn with_lore(mut self, lore: Vec<String>) -> Self {
        self.lore = lore;
        self
    }

    /// Sets the nested contents.
    pub fn with_contents(mut self, contents: Vec<Option<ItemStack>>) -> Self {
        self.contents = contents;
        self
    }

    /// Returns `true` if any nested slot holds an item.
    pub fn has_contents(&self) -> bool {
        self.contents.iter().any(Option::is_some)
    }

    /// A risky item is a portable container carrying contents. These are the
    /// items whose transfer is deferred.
    pub fn is_risky(&self, registry: &MaterialRegistry) -> bool {
        registry.is_portable_container(self.material) && self.has_contents()
    }

    /// The stand-in shown while the real item is deferred: same material,
    /// count, name and lore, with the contents stripped.
    pub fn placeholder(&self) -> ItemStack {
        ItemStack {
            material: self.material,
            count: self.count,
            display_name: self.display_name.clone(),
            lore: self.lore.clone(),
            contents: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MaterialRegistry {
        MaterialRegistry::from_catalog().unwrap()
    }

    #[test]
    fn test_filled_shulker_is_risky() {
        let registry = registry();
        let shulker = registry.lookup("blue_shulker_box").unwrap();
        let diamond = registry.lookup("diamond").unwrap();
        let item = ItemStack::new(shulker, 1)
            .with_contents(vec![None, Some(ItemStack::new(diamond, 64))]);
        assert!(item.is_risky(&registry));
    }

    #[test]
    fn test_empty_shulker_is_not_risky() {
        let registry = registry();
        let shulker = registry.lookup("shulker_box").unwrap();
        let item = ItemStack::new(shulker, 1).with_contents(vec![None; 27]);
        assert!(!item.is_risky(&registry));
    }

    #[test]
    fn test_plain_item_with_contents_is_not_risky() {
        let registry = registry();
        let stone = registry.lookup("stone").unwrap();
        let item = ItemStack::new(stone, 1).with_contents(vec![Some(ItemStack::new(stone, 1))]);
        assert!(!item.is_risky(&registry));
    }

    #[test]
    fn test_placeholder_keeps_presentation() {
        let registry = registry();
        let shulker = registry.lookup("red_shulker_box").unwrap();
        let diamond = registry.lookup("diamond").unwrap();
        let item = ItemStack::new(shulker, 1)
            .with_display_name("Loot")
            .with_lore(vec!["spawn base".to_string()])
            .with_contents(vec![Some(ItemStack::new(diamond, 64))]);

        let placeholder = item.placeholder();
        assert_eq!(placeholder.material, shulker);
        assert_eq!(placeholder.count, 1);
        assert_eq!(placeholder.display_name.as_deref(), Some("Loot"));
        assert_eq!(placeholder.lore, vec!["spawn base".to_string()]);
        assert!(!placeholder.has_contents());
        assert!(!placeholder.is_risky(&registry));
    }
}
