//! A scripted session against an in-memory world, used by `shroud demo`.
//!
//! One player joins at the origin, receives three regions holding a chest,
//! a double chest, and a sign beyond the radius, opens a container with a
//! filled shulker box, and walks to each object in turn.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use glam::DVec3;
use shroud_disclosure::{
    DisclosureEngine, EngineError, EngineSettings, EngineStatus, FrameVerdict, HostEvent,
    PacketSink,
};
use shroud_protocol::{
    BlockEntityUpdate, ClientboundPacket, ConnectionId, IdGenerator, OpenWindow, RegionBlock,
    RegionData, WindowId, WindowItems, encode_packet,
};
use shroud_world::{
    BlockEntity, BlockEntityKind, BlockPos, BlockState, ItemStack, MaterialRegistry, MemoryWorld,
    RegionPos, RegistryError, WorldId, WorldView,
};

/// Errors the demo can hit while scripting packets.
#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    /// The engine did not start.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The built-in catalog did not load.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The scripted world is missing a material.
    #[error("unknown material {0}")]
    UnknownMaterial(&'static str),
    /// A scripted packet could not be encoded.
    #[error("failed to encode demo packet: {0}")]
    Codec(#[from] shroud_protocol::CodecError),
}

/// A sink that logs every packet and counts the interesting kinds.
#[derive(Default)]
pub struct LoggingSink {
    total: AtomicUsize,
    block_changes: AtomicUsize,
    slot_updates: AtomicUsize,
}

impl LoggingSink {
    /// Creates a sink with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets sent so far.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Block change packets sent so far.
    pub fn block_changes(&self) -> usize {
        self.block_changes.load(Ordering::Relaxed)
    }

    /// Slot update packets sent so far.
    pub fn slot_updates(&self) -> usize {
        self.slot_updates.load(Ordering::Relaxed)
    }
}

impl PacketSink for LoggingSink {
    fn send(&self, connection: ConnectionId, packet: ClientboundPacket) {
        tracing::debug!(connection = connection.0, packet = packet.name(), "sent");
        self.total.fetch_add(1, Ordering::Relaxed);
        match packet {
            ClientboundPacket::BlockChange(_) => {
                self.block_changes.fetch_add(1, Ordering::Relaxed);
            }
            ClientboundPacket::SetSlot(_) => {
                self.slot_updates.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

/// What happened during the demo.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoReport {
    /// Objects concealed on region delivery.
    pub concealed: usize,
    /// Hidden records left after the walk.
    pub still_hidden: usize,
    /// Block changes the engine originated.
    pub block_changes: usize,
    /// Slot updates the engine originated.
    pub slot_updates: usize,
    /// Engine state at the end.
    pub status: EngineStatus,
}

const WORLD: WorldId = WorldId(0);

/// Runs the scripted session.
pub fn run_demo(settings: EngineSettings) -> Result<DemoReport, DemoError> {
    let registry = Arc::new(MaterialRegistry::from_catalog()?);
    let material =
        |name: &'static str| registry.lookup(name).ok_or(DemoError::UnknownMaterial(name));
    let chest = material("chest")?;
    let sign = material("oak_sign")?;
    let shulker = material("shulker_box")?;
    let diamond = material("diamond")?;
    let bread = material("bread")?;

    let world = Arc::new(MemoryWorld::new());
    let place_chest = |pos: BlockPos| {
        world.set_block(WORLD, pos, BlockState::of(chest));
        world.set_block_entity(
            WORLD,
            pos,
            BlockEntity::container(BlockEntityKind::Chest, vec![Some(ItemStack::new(diamond, 8))]),
        );
    };
    place_chest(BlockPos::new(24, 64, 0));
    place_chest(BlockPos::new(0, 64, 30));
    place_chest(BlockPos::new(1, 64, 30));
    let sign_pos = BlockPos::new(-28, 64, 0);
    world.set_block(WORLD, sign_pos, BlockState::of(sign));
    world.set_block_entity(
        WORLD,
        sign_pos,
        BlockEntity::sign([
            "Welcome".to_string(),
            String::new(),
            String::new(),
            String::new(),
        ]),
    );

    let sink = Arc::new(LoggingSink::new());
    let engine =
        DisclosureEngine::new(Arc::clone(&registry), world.clone(), sink.clone(), settings)?;
    let connection = IdGenerator::new().next_id();
    engine.handle_event(HostEvent::Joined {
        connection,
        world: WORLD,
        position: DVec3::new(0.0, 64.0, 0.0),
        bypass: false,
    });

    for region in [RegionPos::new(1, 0), RegionPos::new(0, 1), RegionPos::new(-2, 0)] {
        let frame = encode_packet(&region_packet(world.as_ref(), region)?)?;
        match engine.intercept_frame(connection, &frame) {
            FrameVerdict::Rewrite(bytes) => {
                tracing::info!(?region, bytes = bytes.len(), "region rewritten");
            }
            other => tracing::info!(?region, verdict = ?other, "region delivered"),
        }
    }
    let concealed = engine.sessions().hidden_total();
    engine.scanner().wait_idle(Duration::from_secs(2));
    tick(&engine, 3);

    let window = WindowId(1);
    engine.intercept(
        connection,
        ClientboundPacket::OpenWindow(OpenWindow {
            window,
            slots: 27,
            title: "Chest".to_string(),
        }),
    );
    let mut items = vec![None; 27];
    items[0] = Some(
        ItemStack::new(shulker, 1)
            .with_display_name("Stash")
            .with_contents(vec![Some(ItemStack::new(diamond, 64))]),
    );
    items[1] = Some(ItemStack::new(bread, 16));
    engine.intercept(
        connection,
        ClientboundPacket::WindowItems(WindowItems { window, items }),
    );

    for (x, z) in [(22.0, 0.0), (0.0, 28.0), (-26.0, 0.0)] {
        engine.handle_event(HostEvent::Moved {
            connection,
            position: DVec3::new(x, 64.0, z),
        });
        tick(&engine, 5);
    }

    let report = DemoReport {
        concealed,
        still_hidden: engine.sessions().hidden_total(),
        block_changes: sink.block_changes(),
        slot_updates: sink.slot_updates(),
        status: engine.status(),
    };
    tracing::info!(
        concealed = report.concealed,
        block_changes = report.block_changes,
        slot_updates = report.slot_updates,
        packets = sink.total(),
        "demo finished"
    );
    engine.handle_event(HostEvent::Left { connection });
    engine.shutdown();
    Ok(report)
}

fn tick(engine: &DisclosureEngine, n: usize) {
    for _ in 0..n {
        engine.tick();
    }
}

/// The region as a host would send it, built from world truth.
fn region_packet(world: &dyn WorldView, region: RegionPos) -> Result<ClientboundPacket, DemoError> {
    let mut blocks: Vec<RegionBlock> = world
        .region_blocks(WORLD, region)
        .into_iter()
        .map(|(pos, state)| RegionBlock { pos, state })
        .collect();
    blocks.sort_by_key(|b| (b.pos.y, b.pos.z, b.pos.x));
    let entities = blocks
        .iter()
        .filter_map(|b| {
            world.block_entity(WORLD, b.pos).map(|entity| BlockEntityUpdate {
                world: WORLD,
                pos: b.pos,
                tag: Some(entity.kind.tag().to_string()),
                data: entity.data,
            })
        })
        .collect();
    Ok(ClientboundPacket::RegionData(RegionData::new(
        WORLD, region, &blocks, entities,
    )?))
}
