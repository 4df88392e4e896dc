//! Consistency Guard: validates block entity payloads against live world
//! truth before they may reach a client.
//!
//! Each step returns `Result<_, Rejection>`; the first failing step decides.
//! There is exactly one permissive exception, [`sign_tag_exemption`].

use shroud_protocol::BlockEntityUpdate;
use shroud_world::{BlockEntityKind, BlockPos, Material, MaterialRegistry, WorldView};

use crate::error::{Inconsistency, Rejection};

/// Sign payloads may be encoded without a kind tag. A tagless or
/// unresolvable payload is let through when, and only when, world truth at
/// the position is a sign.
pub fn sign_tag_exemption(registry: &MaterialRegistry, material: Material) -> bool {
    registry.is_sign(material)
}

/// Read-only validator over the registry and the world.
pub struct ConsistencyGuard<'a> {
    registry: &'a MaterialRegistry,
    world: &'a dyn WorldView,
}

impl<'a> ConsistencyGuard<'a> {
    /// Creates a guard.
    pub fn new(registry: &'a MaterialRegistry, world: &'a dyn WorldView) -> Self {
        Self { registry, world }
    }

    /// Validates one block entity payload.
    pub fn validate(&self, update: &BlockEntityUpdate) -> Result<(), Rejection> {
        let pos = update.pos;
        let material = self.material_at(update)?;

        let kind = match self.resolve_tag(update.tag.as_deref(), pos) {
            Ok(kind) => kind,
            Err(_) if sign_tag_exemption(self.registry, material) => return Ok(()),
            Err(rejection) => return Err(rejection),
        };

        if material.is_air() {
            return Err(Rejection::inconsistent(pos, Inconsistency::NoObject));
        }
        if !self.registry.is_protected(material)
            && !self.registry.is_container(material)
            && !self.registry.is_sign(material)
        {
            return Err(Rejection::inconsistent(
                pos,
                Inconsistency::UntrackedType(material),
            ));
        }
        if !self.registry.has_block_entity(material) {
            return Err(Rejection::inconsistent(
                pos,
                Inconsistency::NoBlockEntity(material),
            ));
        }

        let Some(actual) = self.world.block_entity(update.world, pos) else {
            return Err(Rejection::inconsistent(pos, Inconsistency::NoObject));
        };
        if actual.kind != kind {
            return Err(Rejection::inconsistent(
                pos,
                Inconsistency::TagMismatch {
                    tag: kind.tag().to_string(),
                },
            ));
        }

        if self.registry.is_paired(material) {
            self.check_partners(update, material)?;
        }
        Ok(())
    }

    /// Material at the payload position in world truth. An unloaded region
    /// has no object.
    fn material_at(&self, update: &BlockEntityUpdate) -> Result<Material, Rejection> {
        self.world
            .block_at(update.world, update.pos)
            .map(|state| state.material)
            .ok_or(Rejection::inconsistent(update.pos, Inconsistency::NoObject))
    }

    fn resolve_tag(&self, tag: Option<&str>, pos: BlockPos) -> Result<BlockEntityKind, Rejection> {
        let Some(tag) = tag.filter(|t| !t.is_empty()) else {
            return Err(Rejection::inconsistent(pos, Inconsistency::MissingTag));
        };
        BlockEntityKind::from_tag(tag)
            .ok_or_else(|| Rejection::inconsistent(pos, Inconsistency::UnknownTag(tag.to_string())))
    }

    /// Every same-material horizontal neighbour must carry a container block
    /// entity, or the client would build half of a double container.
    fn check_partners(&self, update: &BlockEntityUpdate, material: Material) -> Result<(), Rejection> {
        for neighbor in update.pos.horizontal_neighbors() {
            let same = self
                .world
                .block_at(update.world, neighbor)
                .is_some_and(|s| s.material == material);
            if !same {
                continue;
            }
            let consistent = self
                .world
                .block_entity(update.world, neighbor)
                .is_some_and(|entity| entity.is_container());
            if !consistent {
                return Err(Rejection::inconsistent(
                    update.pos,
                    Inconsistency::PartialComposite(neighbor),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use shroud_world::{
        BlockEntity, BlockEntityData, BlockState, MemoryWorld, WorldId,
    };

    use super::*;

    const W: WorldId = WorldId(0);

    struct Fixture {
        registry: MaterialRegistry,
        world: MemoryWorld,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: MaterialRegistry::from_catalog().unwrap(),
                world: MemoryWorld::new(),
            }
        }

        fn place(&self, name: &str, pos: BlockPos) {
            let material = self.registry.lookup(name).unwrap();
            self.world.set_block(W, pos, BlockState::of(material));
        }

        fn guard(&self) -> ConsistencyGuard<'_> {
            ConsistencyGuard::new(&self.registry, &self.world)
        }
    }

    fn chest_update(pos: BlockPos, tag: Option<&str>) -> BlockEntityUpdate {
        BlockEntityUpdate {
            world: W,
            pos,
            tag: tag.map(str::to_string),
            data: BlockEntityData::Container { items: vec![None; 27] },
        }
    }

    fn sign_update(pos: BlockPos, tag: Option<&str>) -> BlockEntityUpdate {
        BlockEntityUpdate {
            world: W,
            pos,
            tag: tag.map(str::to_string),
            data: BlockEntityData::Sign {
                lines: ["hi".into(), String::new(), String::new(), String::new()],
            },
        }
    }

    fn violation(result: Result<(), Rejection>) -> Inconsistency {
        match result {
            Err(Rejection::ConsistencyViolation { kind, .. }) => kind,
            other => panic!("expected consistency violation, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_chest_passes() {
        let fx = Fixture::new();
        let pos = BlockPos::new(0, 64, 0);
        fx.place("chest", pos);
        fx.world
            .set_block_entity(W, pos, BlockEntity::container(BlockEntityKind::Chest, vec![]));
        assert!(fx.guard().validate(&chest_update(pos, Some("minecraft:chest"))).is_ok());
    }

    #[test]
    fn test_empty_position_rejected() {
        let fx = Fixture::new();
        let pos = BlockPos::new(0, 64, 0);
        fx.world.load_region(W, pos.region());
        assert_eq!(
            violation(fx.guard().validate(&chest_update(pos, Some("minecraft:chest")))),
            Inconsistency::NoObject
        );
    }

    #[test]
    fn test_unloaded_position_rejected() {
        let fx = Fixture::new();
        assert_eq!(
            violation(
                fx.guard()
                    .validate(&chest_update(BlockPos::new(0, 0, 0), Some("minecraft:chest")))
            ),
            Inconsistency::NoObject
        );
    }

    #[test]
    fn test_untracked_type_rejected() {
        let fx = Fixture::new();
        let pos = BlockPos::new(0, 64, 0);
        fx.place("stone", pos);
        let stone = fx.registry.lookup("stone").unwrap();
        assert_eq!(
            violation(fx.guard().validate(&chest_update(pos, Some("minecraft:chest")))),
            Inconsistency::UntrackedType(stone)
        );
    }

    #[test]
    fn test_tag_mismatch_rejected() {
        let fx = Fixture::new();
        let pos = BlockPos::new(0, 64, 0);
        fx.place("barrel", pos);
        fx.world
            .set_block_entity(W, pos, BlockEntity::container(BlockEntityKind::Barrel, vec![]));
        assert!(matches!(
            violation(fx.guard().validate(&chest_update(pos, Some("minecraft:chest")))),
            Inconsistency::TagMismatch { .. }
        ));
    }

    #[test]
    fn test_missing_tag_rejected_for_non_sign() {
        let fx = Fixture::new();
        let pos = BlockPos::new(0, 64, 0);
        fx.place("chest", pos);
        assert_eq!(
            violation(fx.guard().validate(&chest_update(pos, None))),
            Inconsistency::MissingTag
        );
        assert_eq!(
            violation(fx.guard().validate(&chest_update(pos, Some("")))),
            Inconsistency::MissingTag
        );
    }

    #[test]
    fn test_unknown_tag_rejected_for_non_sign() {
        let fx = Fixture::new();
        let pos = BlockPos::new(0, 64, 0);
        fx.place("hopper", pos);
        assert_eq!(
            violation(fx.guard().validate(&chest_update(pos, Some("minecraft:nonsense")))),
            Inconsistency::UnknownTag("minecraft:nonsense".to_string())
        );
    }

    #[test]
    fn test_sign_tag_exemption_passes_tagless_sign() {
        let fx = Fixture::new();
        let pos = BlockPos::new(3, 70, 3);
        fx.place("oak_wall_sign", pos);
        assert!(fx.guard().validate(&sign_update(pos, None)).is_ok());
        assert!(fx.guard().validate(&sign_update(pos, Some("garbage"))).is_ok());
    }

    #[test]
    fn test_sign_exemption_needs_a_sign_in_world() {
        let fx = Fixture::new();
        let pos = BlockPos::new(3, 70, 3);
        fx.world.load_region(W, pos.region());
        assert_eq!(
            violation(fx.guard().validate(&sign_update(pos, None))),
            Inconsistency::MissingTag
        );
    }

    #[test]
    fn test_half_formed_double_chest_rejected() {
        let fx = Fixture::new();
        let pos = BlockPos::new(0, 64, 0);
        let partner = pos.offset(1, 0, 0);
        fx.place("chest", pos);
        fx.place("chest", partner);
        fx.world
            .set_block_entity(W, pos, BlockEntity::container(BlockEntityKind::Chest, vec![]));

        assert_eq!(
            violation(fx.guard().validate(&chest_update(pos, Some("minecraft:chest")))),
            Inconsistency::PartialComposite(partner)
        );

        fx.world
            .set_block_entity(W, partner, BlockEntity::container(BlockEntityKind::Chest, vec![]));
        assert!(fx.guard().validate(&chest_update(pos, Some("minecraft:chest"))).is_ok());
    }

    #[test]
    fn test_workstation_without_block_entity_rejected() {
        let fx = Fixture::new();
        let pos = BlockPos::new(0, 64, 0);
        fx.place("crafting_table", pos);
        let table = fx.registry.lookup("crafting_table").unwrap();
        assert_eq!(
            violation(fx.guard().validate(&chest_update(pos, Some("minecraft:chest")))),
            Inconsistency::NoBlockEntity(table)
        );
    }
}
