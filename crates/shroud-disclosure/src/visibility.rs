//! Visibility Filter: conceals protected objects beyond the disclosure
//! radius in region, block change, and block entity packets.
//!
//! Concealing means the client is sent air in place of the object, its block
//! entity payload is withheld, and a hidden record is left in the session so
//! the scheduler can reveal it later. Region and block change packets are
//! rewritten rather than dropped so the client's view of the region stays
//! complete.

use rustc_hash::{FxHashMap, FxHashSet};
use shroud_protocol::{
    BlockChange, BlockEntityUpdate, ClientboundPacket, RegionBlock, RegionData, SignUpdate,
};
use shroud_world::{BlockPos, BlockState, Material, MaterialRegistry, WorldId, WorldView};

use crate::error::{DecodeFailure, Inconsistency, Rejection};
use crate::guard::ConsistencyGuard;
use crate::session::{HideOutcome, Session};
use crate::verdict::{CancelReason, Verdict};

/// The packet sent to show the neutral form at `pos`.
pub fn neutral_block(world: WorldId, pos: BlockPos) -> ClientboundPacket {
    ClientboundPacket::BlockChange(BlockChange {
        world,
        pos,
        state: BlockState::AIR,
    })
}

/// Result of filtering a region packet.
#[derive(Debug)]
pub struct RegionOutcome {
    /// What to do with the packet.
    pub verdict: Verdict,
    /// `true` the first time this region reached the connection.
    pub newly_processed: bool,
    /// New hidden records created.
    pub hidden: usize,
}

/// Result of filtering a block entity packet.
#[derive(Debug)]
pub struct DetailOutcome {
    /// What to do with the packet.
    pub verdict: Verdict,
    /// Neutral block to send when the object was concealed just now.
    pub hide: Option<ClientboundPacket>,
}

/// Per-packet filter over one registry, one world, and one radius.
pub struct VisibilityFilter<'a> {
    registry: &'a MaterialRegistry,
    world: &'a dyn WorldView,
    radius_sq: f64,
}

impl<'a> VisibilityFilter<'a> {
    /// Creates a filter concealing beyond `radius_sq` (squared blocks).
    pub fn new(registry: &'a MaterialRegistry, world: &'a dyn WorldView, radius_sq: f64) -> Self {
        Self {
            registry,
            world,
            radius_sq,
        }
    }

    fn beyond(&self, session: &Session, world: WorldId, pos: BlockPos) -> bool {
        session.distance_sq(world, pos) > self.radius_sq
    }

    /// Neutralises every protected block beyond the radius, keeping paired
    /// containers in lockstep, and withholds the block entities of concealed
    /// or inconsistent positions.
    pub fn filter_region(&self, session: &mut Session, mut packet: RegionData) -> RegionOutcome {
        let world = packet.world;
        let newly_processed = session.mark_processed(world, packet.region);
        let cancelled = |rejection: Rejection| RegionOutcome {
            verdict: rejection.into(),
            newly_processed,
            hidden: 0,
        };

        let mut blocks = match packet.decode_blocks() {
            Ok(blocks) => blocks,
            Err(err) => return cancelled(DecodeFailure::from(err).into()),
        };
        if let Some(unknown) = blocks
            .iter()
            .find(|b| !self.registry.is_known(b.state.material))
        {
            return cancelled(DecodeFailure::UnknownMaterial(unknown.state.material).into());
        }

        let conceal = self.concealed_positions(session, world, &blocks);

        let mut hidden = 0;
        for block in &mut blocks {
            let material = block.state.material;
            if conceal.contains(&block.pos) {
                if session.hide(world, block.pos, material) == HideOutcome::Recorded {
                    hidden += 1;
                    tracing::debug!(
                        connection = session.connection().0,
                        pos = ?block.pos,
                        material = self.registry.name(material),
                        "concealed in region"
                    );
                }
                block.state = BlockState::AIR;
            } else if self.registry.is_protected(material) {
                // The client is about to receive the truth here.
                session.take_hidden(world, block.pos);
            }
        }

        let entities_before = packet.block_entities.len();
        let guard = ConsistencyGuard::new(self.registry, self.world);
        packet.block_entities.retain(|entity| {
            !conceal.contains(&entity.pos)
                && !session.is_hidden(world, entity.pos)
                && guard.validate(entity).is_ok()
        });
        let entities_changed = packet.block_entities.len() != entities_before;

        if conceal.is_empty() && !entities_changed {
            return RegionOutcome {
                verdict: Verdict::Pass,
                newly_processed,
                hidden,
            };
        }
        if let Err(err) = packet.set_blocks(&blocks) {
            return cancelled(DecodeFailure::from(err).into());
        }
        RegionOutcome {
            verdict: Verdict::Rewrite(ClientboundPacket::RegionData(packet)),
            newly_processed,
            hidden,
        }
    }

    /// Positions to neutralise: protected blocks beyond the radius, plus
    /// same-material neighbours of concealed paired containers.
    fn concealed_positions(
        &self,
        session: &Session,
        world: WorldId,
        blocks: &[RegionBlock],
    ) -> FxHashSet<BlockPos> {
        let mut conceal: FxHashSet<BlockPos> = blocks
            .iter()
            .filter(|b| {
                self.registry.is_protected(b.state.material) && self.beyond(session, world, b.pos)
            })
            .map(|b| b.pos)
            .collect();

        let materials: FxHashMap<BlockPos, Material> =
            blocks.iter().map(|b| (b.pos, b.state.material)).collect();
        let by_pos = &materials;
        let partners: Vec<BlockPos> = conceal
            .iter()
            .filter(|pos| by_pos.get(pos).is_some_and(|m| self.registry.is_paired(*m)))
            .flat_map(|pos| {
                let material = by_pos.get(pos).copied();
                pos.horizontal_neighbors()
                    .into_iter()
                    .filter(move |n| by_pos.get(n).copied() == material)
            })
            .collect();
        conceal.extend(partners);
        conceal
    }

    /// Rewrites a protected block beyond the radius to air. A repeat for an
    /// already-hidden position is cancelled so the client never gets two
    /// hides for one record.
    pub fn filter_block_change(&self, session: &mut Session, packet: &BlockChange) -> Verdict {
        let material = packet.state.material;
        if !self.registry.is_known(material) {
            return Rejection::from(DecodeFailure::UnknownMaterial(material)).into();
        }

        if self.registry.is_protected(material) && self.beyond(session, packet.world, packet.pos) {
            return match session.hide(packet.world, packet.pos, material) {
                HideOutcome::Recorded => {
                    tracing::debug!(
                        connection = session.connection().0,
                        pos = ?packet.pos,
                        material = self.registry.name(material),
                        "concealed block change"
                    );
                    Verdict::Rewrite(neutral_block(packet.world, packet.pos))
                }
                HideOutcome::AlreadyHidden => Verdict::Cancel(CancelReason::AlreadyHidden),
            };
        }

        // Visible now, or no longer protected: the client gets the truth.
        session.take_hidden(packet.world, packet.pos);
        Verdict::Pass
    }

    /// Withholds block entity payloads of hidden positions, conceals
    /// protected objects beyond the radius, and runs everything else through
    /// the Consistency Guard.
    pub fn filter_detail(&self, session: &mut Session, update: &BlockEntityUpdate) -> DetailOutcome {
        let world = update.world;
        let pos = update.pos;
        if session.is_hidden(world, pos) {
            return DetailOutcome {
                verdict: Verdict::Cancel(CancelReason::Concealed),
                hide: None,
            };
        }

        let material = self.world.block_at(world, pos).map(|s| s.material);
        if let Some(material) = material
            && self.registry.is_protected(material)
            && self.beyond(session, world, pos)
        {
            let hide = (session.hide(world, pos, material) == HideOutcome::Recorded)
                .then(|| neutral_block(world, pos));
            return DetailOutcome {
                verdict: Verdict::Cancel(CancelReason::Concealed),
                hide,
            };
        }

        let verdict = match ConsistencyGuard::new(self.registry, self.world).validate(update) {
            Ok(()) => Verdict::Pass,
            Err(rejection) => rejection.into(),
        };
        DetailOutcome {
            verdict,
            hide: None,
        }
    }

    /// Sign text follows the same concealment as block entity payloads, and
    /// is only delivered where world truth holds a sign.
    pub fn filter_sign(&self, session: &mut Session, packet: &SignUpdate) -> DetailOutcome {
        let (world, pos) = (packet.world, packet.pos);
        if session.is_hidden(world, pos) {
            return DetailOutcome {
                verdict: Verdict::Cancel(CancelReason::Concealed),
                hide: None,
            };
        }

        let Some(material) = self
            .world
            .block_at(world, pos)
            .map(|s| s.material)
            .filter(|m| self.registry.is_sign(*m))
        else {
            return DetailOutcome {
                verdict: Rejection::inconsistent(pos, Inconsistency::NoObject).into(),
                hide: None,
            };
        };
        if self.registry.is_protected(material) && self.beyond(session, world, pos) {
            let hide = (session.hide(world, pos, material) == HideOutcome::Recorded)
                .then(|| neutral_block(world, pos));
            return DetailOutcome {
                verdict: Verdict::Cancel(CancelReason::Concealed),
                hide,
            };
        }
        DetailOutcome {
            verdict: Verdict::Pass,
            hide: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use shroud_protocol::ConnectionId;
    use shroud_world::{BlockEntity, BlockEntityData, BlockEntityKind, MemoryWorld, RegionPos};

    use super::*;
    use crate::session::SessionStore;

    const CONN: ConnectionId = ConnectionId(1);
    const W: WorldId = WorldId(0);

    struct Fixture {
        registry: MaterialRegistry,
        world: MemoryWorld,
        store: SessionStore,
    }

    impl Fixture {
        fn new() -> Self {
            let store = SessionStore::new();
            store.open(CONN, W, DVec3::new(0.0, 64.0, 0.0), false);
            Self {
                registry: MaterialRegistry::from_catalog().unwrap(),
                world: MemoryWorld::new(),
                store,
            }
        }

        fn id(&self, name: &str) -> Material {
            self.registry.lookup(name).unwrap()
        }

        fn filter(&self) -> VisibilityFilter<'_> {
            VisibilityFilter::new(&self.registry, &self.world, 256.0)
        }

        fn place_chest(&self, pos: BlockPos) -> RegionBlock {
            let state = BlockState::of(self.id("chest"));
            self.world.set_block(W, pos, state);
            self.world
                .set_block_entity(W, pos, BlockEntity::container(BlockEntityKind::Chest, vec![]));
            RegionBlock { pos, state }
        }

        fn with<R>(&self, f: impl FnOnce(&VisibilityFilter<'_>, &mut Session) -> R) -> R {
            let filter = self.filter();
            self.store.with_session(CONN, |s| f(&filter, s)).unwrap()
        }
    }

    fn chest_entity(pos: BlockPos) -> BlockEntityUpdate {
        BlockEntityUpdate {
            world: W,
            pos,
            tag: Some("minecraft:chest".to_string()),
            data: BlockEntityData::Container { items: vec![None; 27] },
        }
    }

    fn region_packet(blocks: &[RegionBlock], entities: Vec<BlockEntityUpdate>) -> RegionData {
        RegionData::new(W, RegionPos::new(1, 0), blocks, entities).unwrap()
    }

    #[test]
    fn test_region_conceals_far_protected_blocks() {
        let fx = Fixture::new();
        let far = fx.place_chest(BlockPos::new(20, 64, 0));
        let stone = RegionBlock {
            pos: BlockPos::new(21, 64, 0),
            state: BlockState::of(fx.id("stone")),
        };
        let packet = region_packet(&[far, stone], vec![chest_entity(far.pos)]);

        let outcome = fx.with(|f, s| f.filter_region(s, packet));
        assert!(outcome.newly_processed);
        assert_eq!(outcome.hidden, 1);
        let Some(ClientboundPacket::RegionData(region)) = outcome.verdict.rewritten() else {
            panic!("expected rewrite");
        };
        let blocks = region.decode_blocks().unwrap();
        assert_eq!(blocks[0].state, BlockState::AIR);
        assert_eq!(blocks[1], stone);
        assert!(region.block_entities.is_empty());
        assert!(fx.with(|_, s| s.is_hidden(W, far.pos)));
    }

    #[test]
    fn test_region_within_radius_passes() {
        let fx = Fixture::new();
        let near = fx.place_chest(BlockPos::new(5, 64, 0));
        let packet = region_packet(&[near], vec![chest_entity(near.pos)]);
        let outcome = fx.with(|f, s| f.filter_region(s, packet));
        assert!(outcome.verdict.is_pass());
        assert_eq!(fx.store.hidden_total(), 0);
    }

    #[test]
    fn test_region_refilter_does_not_duplicate_records() {
        let fx = Fixture::new();
        let far = fx.place_chest(BlockPos::new(20, 64, 0));
        let packet = region_packet(&[far], vec![]);
        let first = fx.with(|f, s| f.filter_region(s, packet.clone()));
        let second = fx.with(|f, s| f.filter_region(s, packet));
        assert_eq!(first.hidden, 1);
        assert_eq!(second.hidden, 0);
        assert!(!second.newly_processed);
        assert!(second.verdict.rewritten().is_some());
        assert_eq!(fx.store.hidden_total(), 1);
    }

    #[test]
    fn test_region_conceals_paired_partner_in_lockstep() {
        let fx = Fixture::new();
        // 16.0 is inside the radius, 17.0 is not.
        let inside = fx.place_chest(BlockPos::new(16, 64, 0));
        let outside = fx.place_chest(BlockPos::new(17, 64, 0));
        let packet = region_packet(&[inside, outside], vec![]);
        let outcome = fx.with(|f, s| f.filter_region(s, packet));
        assert_eq!(outcome.hidden, 2);
        assert!(fx.with(|_, s| s.is_hidden(W, inside.pos)));
    }

    #[test]
    fn test_region_drops_inconsistent_entities() {
        let fx = Fixture::new();
        let pos = BlockPos::new(3, 64, 3);
        fx.world.set_block(W, pos, BlockState::of(fx.id("stone")));
        let stone = RegionBlock {
            pos,
            state: BlockState::of(fx.id("stone")),
        };
        let packet = region_packet(&[stone], vec![chest_entity(pos)]);
        let outcome = fx.with(|f, s| f.filter_region(s, packet));
        let Some(ClientboundPacket::RegionData(region)) = outcome.verdict.rewritten() else {
            panic!("expected rewrite");
        };
        assert!(region.block_entities.is_empty());
        assert_eq!(fx.store.hidden_total(), 0);
    }

    #[test]
    fn test_corrupt_region_cancelled() {
        let fx = Fixture::new();
        let mut packet = region_packet(&[], vec![]);
        packet.blocks = vec![10, 0, 0, 0, 0xff, 0xff];
        let outcome = fx.with(|f, s| f.filter_region(s, packet));
        assert!(matches!(
            outcome.verdict,
            Verdict::Cancel(CancelReason::Rejected(Rejection::DecodeFailure(_)))
        ));
    }

    #[test]
    fn test_block_change_hide_is_idempotent() {
        let fx = Fixture::new();
        let packet = BlockChange {
            world: W,
            pos: BlockPos::new(40, 64, 0),
            state: BlockState::of(fx.id("barrel")),
        };
        let first = fx.with(|f, s| f.filter_block_change(s, &packet));
        let second = fx.with(|f, s| f.filter_block_change(s, &packet));
        assert_eq!(
            first.rewritten(),
            Some(&neutral_block(W, BlockPos::new(40, 64, 0)))
        );
        assert!(matches!(second, Verdict::Cancel(CancelReason::AlreadyHidden)));
        assert_eq!(fx.store.hidden_total(), 1);
    }

    #[test]
    fn test_block_change_unknown_material_cancelled() {
        let fx = Fixture::new();
        let packet = BlockChange {
            world: W,
            pos: BlockPos::new(0, 64, 0),
            state: BlockState::of(Material(60_000)),
        };
        let verdict = fx.with(|f, s| f.filter_block_change(s, &packet));
        assert!(verdict.is_cancel());
    }

    #[test]
    fn test_block_change_over_hidden_position_drops_record() {
        let fx = Fixture::new();
        let pos = BlockPos::new(40, 64, 0);
        fx.with(|_, s| s.hide(W, pos, fx.id("chest")));
        let packet = BlockChange {
            world: W,
            pos,
            state: BlockState::of(fx.id("stone")),
        };
        assert!(fx.with(|f, s| f.filter_block_change(s, &packet)).is_pass());
        assert_eq!(fx.store.hidden_total(), 0);
    }

    #[test]
    fn test_detail_for_hidden_position_cancelled() {
        let fx = Fixture::new();
        let pos = fx.place_chest(BlockPos::new(30, 64, 0)).pos;
        fx.with(|_, s| s.hide(W, pos, fx.id("chest")));
        let outcome = fx.with(|f, s| f.filter_detail(s, &chest_entity(pos)));
        assert!(matches!(outcome.verdict, Verdict::Cancel(CancelReason::Concealed)));
        assert!(outcome.hide.is_none());
    }

    #[test]
    fn test_detail_beyond_radius_conceals() {
        let fx = Fixture::new();
        let pos = fx.place_chest(BlockPos::new(30, 64, 0)).pos;
        let outcome = fx.with(|f, s| f.filter_detail(s, &chest_entity(pos)));
        assert!(outcome.verdict.is_cancel());
        assert_eq!(outcome.hide, Some(neutral_block(W, pos)));
        assert!(fx.with(|_, s| s.is_hidden(W, pos)));
    }

    #[test]
    fn test_detail_nearby_valid_passes() {
        let fx = Fixture::new();
        let pos = fx.place_chest(BlockPos::new(3, 64, 0)).pos;
        let outcome = fx.with(|f, s| f.filter_detail(s, &chest_entity(pos)));
        assert!(outcome.verdict.is_pass());
    }

    fn sign_text(pos: BlockPos) -> SignUpdate {
        SignUpdate {
            world: W,
            pos,
            lines: ["for sale".into(), String::new(), String::new(), String::new()],
        }
    }

    #[test]
    fn test_sign_text_nearby_passes() {
        let fx = Fixture::new();
        let pos = BlockPos::new(2, 64, 2);
        fx.world.set_block(W, pos, BlockState::of(fx.id("oak_sign")));
        let outcome = fx.with(|f, s| f.filter_sign(s, &sign_text(pos)));
        assert!(outcome.verdict.is_pass());
        assert!(outcome.hide.is_none());
    }

    #[test]
    fn test_sign_text_beyond_radius_conceals_once() {
        let fx = Fixture::new();
        let pos = BlockPos::new(40, 64, 0);
        fx.world.set_block(W, pos, BlockState::of(fx.id("oak_sign")));

        let first = fx.with(|f, s| f.filter_sign(s, &sign_text(pos)));
        assert!(first.verdict.is_cancel());
        assert_eq!(first.hide, Some(neutral_block(W, pos)));

        let second = fx.with(|f, s| f.filter_sign(s, &sign_text(pos)));
        assert!(second.verdict.is_cancel());
        assert!(second.hide.is_none());
        assert_eq!(fx.with(|_, s| s.hidden_count()), 1);
    }

    #[test]
    fn test_sign_text_without_sign_rejected() {
        let fx = Fixture::new();
        let pos = BlockPos::new(2, 64, 2);
        fx.world.set_block(W, pos, BlockState::of(fx.id("stone")));
        let outcome = fx.with(|f, s| f.filter_sign(s, &sign_text(pos)));
        assert!(matches!(
            outcome.verdict,
            Verdict::Cancel(CancelReason::Rejected(Rejection::ConsistencyViolation { .. }))
        ));
    }
}
