//! Disclosure Scheduler: budgeted, recurring per-connection tasks that hide
//! background-scan findings, reveal hidden objects that came into range, and
//! drain deferred items.
//!
//! Each task is an explicit [`DisclosureTask`] record driven by the tick
//! counter; nothing is captured in closures. A task whose connection has no
//! session at the start of a run is dropped without sending anything, and a
//! task with no remaining work cancels itself.

use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use shroud_protocol::{BlockChange, BlockEntityUpdate, ClientboundPacket, ConnectionId, SignUpdate};
use shroud_world::{BlockPos, BlockState, Material, MaterialRegistry, WorldId, WorldView};

use crate::container::drain_deferred;
use crate::session::{HideOutcome, Session};
use crate::visibility::neutral_block;

// ---------------------------------------------------------------------------
// Task records
// ---------------------------------------------------------------------------

/// What a task works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    /// Pending hides and hidden-object reveals.
    Blocks,
    /// Deferred item queues.
    Items,
}

/// State of one recurring task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisclosureTask {
    /// Connection the task serves.
    pub connection: ConnectionId,
    /// What it works on.
    pub kind: TaskKind,
    /// Tick of the next run.
    pub next_run: u64,
    /// Ticks between runs.
    pub interval: u64,
    /// Runs completed so far.
    pub runs: u64,
    /// Packets sent so far.
    pub delivered: u64,
}

/// An immediate-radius check waiting for its tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DelayedCheck {
    connection: ConnectionId,
    due: u64,
}

/// Registry of running tasks and pending delayed checks.
pub struct DisclosureScheduler {
    tasks: DashMap<(ConnectionId, TaskKind), DisclosureTask>,
    delayed: Mutex<Vec<DelayedCheck>>,
}

impl DisclosureScheduler {
    /// Creates an idle scheduler.
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            delayed: Mutex::new(Vec::new()),
        }
    }

    /// Starts a task unless one of the same kind already runs for the
    /// connection. The first run happens `interval` ticks after `now`.
    pub fn ensure(&self, connection: ConnectionId, kind: TaskKind, now: u64, interval: u64) {
        let interval = interval.max(1);
        self.tasks
            .entry((connection, kind))
            .or_insert_with(|| DisclosureTask {
                connection,
                kind,
                next_run: now + interval,
                interval,
                runs: 0,
                delivered: 0,
            });
    }

    /// Returns `true` if the task is running.
    pub fn is_active(&self, connection: ConnectionId, kind: TaskKind) -> bool {
        self.tasks.contains_key(&(connection, kind))
    }

    /// Snapshot of a task record.
    pub fn task(&self, connection: ConnectionId, kind: TaskKind) -> Option<DisclosureTask> {
        self.tasks.get(&(connection, kind)).map(|t| t.value().clone())
    }

    /// Number of running tasks of `kind`.
    pub fn active_count(&self, kind: TaskKind) -> usize {
        self.tasks.iter().filter(|t| t.kind == kind).count()
    }

    /// Tasks due at `now`, in a stable order.
    pub fn due(&self, now: u64) -> Vec<(ConnectionId, TaskKind)> {
        let mut due: Vec<_> = self
            .tasks
            .iter()
            .filter(|t| t.next_run <= now)
            .map(|t| *t.key())
            .collect();
        due.sort();
        due
    }

    /// Records a finished run. A task without remaining work is removed.
    pub fn finish_run(
        &self,
        connection: ConnectionId,
        kind: TaskKind,
        now: u64,
        delivered: usize,
        more_work: bool,
    ) {
        if !more_work {
            self.tasks.remove(&(connection, kind));
            return;
        }
        if let Some(mut task) = self.tasks.get_mut(&(connection, kind)) {
            task.runs += 1;
            task.delivered += delivered as u64;
            task.next_run = now + task.interval;
        }
    }

    /// Drops a single task.
    pub fn stop(&self, connection: ConnectionId, kind: TaskKind) {
        self.tasks.remove(&(connection, kind));
    }

    /// Schedules an immediate-radius check for tick `due`.
    pub fn schedule_check(&self, connection: ConnectionId, due: u64) {
        let mut delayed = self.delayed.lock().unwrap_or_else(PoisonError::into_inner);
        if !delayed.iter().any(|c| c.connection == connection && c.due == due) {
            delayed.push(DelayedCheck { connection, due });
        }
    }

    /// Removes and returns the connections whose delayed checks are due.
    pub fn take_due_checks(&self, now: u64) -> Vec<ConnectionId> {
        let mut delayed = self.delayed.lock().unwrap_or_else(PoisonError::into_inner);
        let mut due: Vec<ConnectionId> = delayed
            .iter()
            .filter(|c| c.due <= now)
            .map(|c| c.connection)
            .collect();
        delayed.retain(|c| c.due > now);
        due.sort();
        due.dedup();
        due
    }

    /// Number of pending delayed checks.
    pub fn pending_checks(&self) -> usize {
        self.delayed.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drops every task and delayed check of a connection.
    pub fn cancel(&self, connection: ConnectionId) {
        self.tasks.retain(|(conn, _), _| *conn != connection);
        self.delayed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|c| c.connection != connection);
    }

    /// Drops everything.
    pub fn clear(&self) {
        self.tasks.clear();
        self.delayed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for DisclosureScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Reveal and hide passes
// ---------------------------------------------------------------------------

/// Radii and budgets for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    /// Squared disclosure radius.
    pub radius_sq: f64,
    /// Squared immediate sub-radius.
    pub immediate_sq: f64,
    /// Block operations per run.
    pub blocks: usize,
    /// Slot updates per run.
    pub items: usize,
}

/// Builds reveal and hide packets from world truth.
pub struct Revealer<'a> {
    registry: &'a MaterialRegistry,
    world: &'a dyn WorldView,
}

impl<'a> Revealer<'a> {
    /// Creates a revealer.
    pub fn new(registry: &'a MaterialRegistry, world: &'a dyn WorldView) -> Self {
        Self { registry, world }
    }

    /// Reveals the hidden object at `pos` with its current world state.
    /// Paired containers also refresh every same-material neighbour.
    /// Returns `false` if there was no record to reveal.
    pub fn reveal(
        &self,
        session: &mut Session,
        world: WorldId,
        pos: BlockPos,
        out: &mut Vec<ClientboundPacket>,
    ) -> bool {
        let Some(recorded) = session.take_hidden(world, pos) else {
            return false;
        };
        let Some(state) = self.world.block_at(world, pos) else {
            tracing::trace!(
                connection = session.connection().0,
                ?pos,
                "region unloaded before reveal"
            );
            return true;
        };
        if state.material != recorded {
            tracing::debug!(
                connection = session.connection().0,
                ?pos,
                recorded = self.registry.name(recorded),
                actual = self.registry.name(state.material),
                "type changed while hidden, revealing actual state"
            );
        }

        self.push_state(world, pos, state, out);
        tracing::debug!(
            connection = session.connection().0,
            ?pos,
            material = self.registry.name(state.material),
            "revealed"
        );

        if self.registry.is_paired(state.material) {
            for neighbor in pos.horizontal_neighbors() {
                let Some(partner) = self.world.block_at(world, neighbor) else {
                    continue;
                };
                if partner.material == state.material {
                    session.take_hidden(world, neighbor);
                    self.push_state(world, neighbor, partner, out);
                }
            }
        }
        true
    }

    /// Block state, block entity, and non-blank sign text for one position.
    fn push_state(
        &self,
        world: WorldId,
        pos: BlockPos,
        state: BlockState,
        out: &mut Vec<ClientboundPacket>,
    ) {
        out.push(ClientboundPacket::BlockChange(BlockChange { world, pos, state }));
        let Some(entity) = self.world.block_entity(world, pos) else {
            return;
        };
        if let Some(lines) = entity.sign_lines()
            && lines.iter().any(|line| !line.is_empty())
        {
            out.push(ClientboundPacket::SignUpdate(SignUpdate {
                world,
                pos,
                lines: lines.clone(),
            }));
        }
        out.push(ClientboundPacket::BlockEntityData(BlockEntityUpdate {
            world,
            pos,
            tag: Some(entity.kind.tag().to_string()),
            data: entity.data,
        }));
    }

    /// Hidden positions in the session's world within `limit_sq`, ordered:
    /// immediate band first, then nearest, then highest. A paired container
    /// qualifies only once every hidden half is within the radius, matching
    /// the rule that conceals both halves when either is beyond it.
    pub fn candidates(&self, session: &Session, limits: &RunLimits, limit_sq: f64) -> Vec<BlockPos> {
        let world = session.world();
        let hidden: FxHashMap<BlockPos, Material> = session.hidden_in(world).into_iter().collect();
        let in_radius = |pos: BlockPos| session.distance_sq(world, pos) <= limits.radius_sq;
        let mut ranked: Vec<(bool, f64, BlockPos)> = hidden
            .iter()
            .map(|(&pos, &material)| (pos, material, session.distance_sq(world, pos)))
            .filter(|&(_, _, d)| d <= limit_sq)
            .filter(|&(pos, material, _)| {
                !self.registry.is_paired(material)
                    || pos
                        .horizontal_neighbors()
                        .into_iter()
                        .filter(|n| hidden.get(n) == Some(&material))
                        .all(|n| in_radius(n))
            })
            .map(|(pos, _, d)| (d > limits.immediate_sq, d, pos))
            .collect();
        ranked.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.total_cmp(&b.1))
                .then(b.2.y.cmp(&a.2.y))
        });
        ranked.into_iter().map(|(_, _, pos)| pos).collect()
    }

    /// Reveals everything within the immediate sub-radius, unbudgeted.
    pub fn reveal_immediate(&self, session: &mut Session, limits: &RunLimits) -> Vec<ClientboundPacket> {
        let world = session.world();
        let mut out = Vec::new();
        for pos in self.candidates(session, limits, limits.immediate_sq) {
            self.reveal(session, world, pos, &mut out);
        }
        out
    }

    /// Reveals up to `budget` hidden objects within the radius.
    pub fn reveal_batch(
        &self,
        session: &mut Session,
        limits: &RunLimits,
        budget: usize,
    ) -> Vec<ClientboundPacket> {
        let world = session.world();
        let mut out = Vec::new();
        let mut revealed = 0;
        for pos in self.candidates(session, limits, limits.radius_sq) {
            if revealed >= budget {
                break;
            }
            // A partner refresh earlier in the batch may have taken it.
            if self.reveal(session, world, pos, &mut out) {
                revealed += 1;
            }
        }
        out
    }

    /// Hides up to `budget` background-scan findings that are still
    /// protected, still in the session's world, and still beyond the radius.
    /// Returns the packets and the number of findings consumed.
    pub fn hide_pending(
        &self,
        session: &mut Session,
        limits: &RunLimits,
        budget: usize,
    ) -> (Vec<ClientboundPacket>, usize) {
        let batch = session.take_pending_hides(budget);
        let consumed = batch.len();
        let mut out = Vec::new();
        for (world, pos, _) in batch {
            if world != session.world() || session.distance_sq(world, pos) <= limits.radius_sq {
                continue;
            }
            let Some(material) = self
                .world
                .block_at(world, pos)
                .map(|s| s.material)
                .filter(|m| self.registry.is_protected(*m))
            else {
                continue;
            };
            if session.hide(world, pos, material) == HideOutcome::Recorded {
                tracing::debug!(
                    connection = session.connection().0,
                    ?pos,
                    material = self.registry.name(material),
                    "concealed by region scan"
                );
                out.push(neutral_block(world, pos));
            }
        }
        (out, consumed)
    }

    /// Returns `true` if any hidden object is ready to be revealed.
    pub fn has_reveals(&self, session: &Session, limits: &RunLimits) -> bool {
        !self.candidates(session, limits, limits.radius_sq).is_empty()
    }
}

/// One run of a block task: pending hides first, then reveals, sharing the
/// block budget. Returns the packets and whether work remains.
pub fn run_block_task(
    revealer: &Revealer<'_>,
    session: &mut Session,
    limits: &RunLimits,
) -> (Vec<ClientboundPacket>, bool) {
    let (mut out, consumed) = revealer.hide_pending(session, limits, limits.blocks);
    let remaining = limits.blocks.saturating_sub(consumed);
    out.extend(revealer.reveal_batch(session, limits, remaining));
    let more = session.pending_hide_count() > 0 || revealer.has_reveals(session, limits);
    (out, more)
}

/// One run of an item task. Returns the packets and whether work remains.
pub fn run_item_task(session: &mut Session, limits: &RunLimits) -> (Vec<ClientboundPacket>, bool) {
    let out = drain_deferred(session, limits.items);
    let more = session.deferred_count() > 0;
    (out, more)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use shroud_world::{BlockEntity, BlockEntityKind, MemoryWorld};

    use super::*;
    use crate::session::SessionStore;

    const CONN: ConnectionId = ConnectionId(1);
    const W: WorldId = WorldId(0);

    const LIMITS: RunLimits = RunLimits {
        radius_sq: 256.0,
        immediate_sq: 64.0,
        blocks: 50,
        items: 3,
    };

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

        fn hidden_chest(&self, pos: BlockPos) {
            self.world.set_block(W, pos, BlockState::of(self.id("chest")));
            self.world
                .set_block_entity(W, pos, BlockEntity::container(BlockEntityKind::Chest, vec![]));
            self.store
                .with_session(CONN, |s| s.hide(W, pos, self.id("chest")));
        }

        fn with<R>(&self, f: impl FnOnce(&Revealer<'_>, &mut Session) -> R) -> R {
            let revealer = Revealer::new(&self.registry, &self.world);
            self.store.with_session(CONN, |s| f(&revealer, s)).unwrap()
        }
    }

    fn revealed_positions(packets: &[ClientboundPacket]) -> Vec<BlockPos> {
        packets
            .iter()
            .filter_map(|p| match p {
                ClientboundPacket::BlockChange(change) => Some(change.pos),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let scheduler = DisclosureScheduler::new();
        scheduler.ensure(CONN, TaskKind::Blocks, 10, 1);
        scheduler.ensure(CONN, TaskKind::Blocks, 20, 5);
        let task = scheduler.task(CONN, TaskKind::Blocks).unwrap();
        assert_eq!(task.next_run, 11);
        assert_eq!(task.interval, 1);
    }

    #[test]
    fn test_due_and_finish_run() {
        let scheduler = DisclosureScheduler::new();
        scheduler.ensure(CONN, TaskKind::Items, 0, 3);
        assert!(scheduler.due(2).is_empty());
        assert_eq!(scheduler.due(3), vec![(CONN, TaskKind::Items)]);

        scheduler.finish_run(CONN, TaskKind::Items, 3, 3, true);
        let task = scheduler.task(CONN, TaskKind::Items).unwrap();
        assert_eq!((task.runs, task.delivered, task.next_run), (1, 3, 6));

        scheduler.finish_run(CONN, TaskKind::Items, 6, 0, false);
        assert!(!scheduler.is_active(CONN, TaskKind::Items));
    }

    #[test]
    fn test_delayed_checks_fire_once() {
        let scheduler = DisclosureScheduler::new();
        scheduler.schedule_check(CONN, 5);
        scheduler.schedule_check(CONN, 5);
        scheduler.schedule_check(ConnectionId(2), 7);
        assert!(scheduler.take_due_checks(4).is_empty());
        assert_eq!(scheduler.take_due_checks(5), vec![CONN]);
        assert!(scheduler.take_due_checks(6).is_empty());
        assert_eq!(scheduler.pending_checks(), 1);
    }

    #[test]
    fn test_cancel_drops_everything_for_connection() {
        let scheduler = DisclosureScheduler::new();
        scheduler.ensure(CONN, TaskKind::Blocks, 0, 1);
        scheduler.ensure(CONN, TaskKind::Items, 0, 3);
        scheduler.ensure(ConnectionId(2), TaskKind::Items, 0, 3);
        scheduler.schedule_check(CONN, 2);
        scheduler.cancel(CONN);
        assert_eq!(scheduler.active_count(TaskKind::Items), 1);
        assert_eq!(scheduler.active_count(TaskKind::Blocks), 0);
        assert_eq!(scheduler.pending_checks(), 0);
    }

    #[test]
    fn test_candidates_order_immediate_then_distance_then_height() {
        let fx = Fixture::new();
        let far_low = BlockPos::new(12, 60, 0);
        let far_high = BlockPos::new(12, 68, 0);
        let near = BlockPos::new(6, 64, 0);
        let out_of_range = BlockPos::new(40, 64, 0);
        for pos in [far_low, far_high, near, out_of_range] {
            fx.hidden_chest(pos);
        }
        let order = fx.with(|r, s| r.candidates(s, &LIMITS, LIMITS.radius_sq));
        assert_eq!(order, vec![near, far_high, far_low]);
    }

    #[test]
    fn test_reveal_batch_respects_budget() {
        let fx = Fixture::new();
        for x in 0..5 {
            fx.hidden_chest(BlockPos::new(x * 2, 64, 10));
        }
        let packets = fx.with(|r, s| r.reveal_batch(s, &LIMITS, 2));
        assert_eq!(revealed_positions(&packets).len(), 2);
        assert_eq!(fx.store.hidden_total(), 3);
    }

    #[test]
    fn test_reveal_sends_truth_and_block_entity() {
        let fx = Fixture::new();
        let pos = BlockPos::new(4, 64, 0);
        fx.hidden_chest(pos);
        let packets = fx.with(|r, s| r.reveal_immediate(s, &LIMITS));
        assert_eq!(
            packets[0],
            ClientboundPacket::BlockChange(BlockChange {
                world: W,
                pos,
                state: BlockState::of(fx.id("chest")),
            })
        );
        assert!(matches!(&packets[1], ClientboundPacket::BlockEntityData(e) if e.pos == pos));
    }

    #[test]
    fn test_reveal_uses_actual_type_on_mismatch() {
        let fx = Fixture::new();
        let pos = BlockPos::new(4, 64, 0);
        fx.hidden_chest(pos);
        fx.world.set_block(W, pos, BlockState::of(fx.id("barrel")));
        let packets = fx.with(|r, s| r.reveal_immediate(s, &LIMITS));
        assert!(matches!(
            &packets[0],
            ClientboundPacket::BlockChange(c) if c.state.material == fx.id("barrel")
        ));
    }

    #[test]
    fn test_reveal_sign_sends_text_unless_blank() {
        let fx = Fixture::new();
        let written = BlockPos::new(2, 64, 0);
        let blank = BlockPos::new(-2, 64, 0);
        let sign = fx.id("oak_sign");
        for (pos, first) in [(written, "Base"), (blank, "")] {
            fx.world.set_block(W, pos, BlockState::of(sign));
            fx.world.set_block_entity(
                W,
                pos,
                BlockEntity::sign([first.into(), String::new(), String::new(), String::new()]),
            );
            fx.store.with_session(CONN, |s| s.hide(W, pos, sign));
        }

        let packets = fx.with(|r, s| r.reveal_immediate(s, &LIMITS));
        let sign_updates: Vec<_> = packets
            .iter()
            .filter_map(|p| match p {
                ClientboundPacket::SignUpdate(u) => Some(u.pos),
                _ => None,
            })
            .collect();
        assert_eq!(sign_updates, vec![written]);
    }

    #[test]
    fn test_reveal_refreshes_paired_partner() {
        let fx = Fixture::new();
        let pos = BlockPos::new(4, 64, 0);
        let partner = BlockPos::new(4, 64, 1);
        fx.hidden_chest(pos);
        fx.hidden_chest(partner);

        let packets = fx.with(|r, s| r.reveal_batch(s, &LIMITS, 1));
        let revealed = revealed_positions(&packets);
        assert!(revealed.contains(&pos));
        assert!(revealed.contains(&partner));
        assert_eq!(fx.store.hidden_total(), 0);
    }

    #[test]
    fn test_straddling_pair_stays_hidden_until_both_in_radius() {
        let fx = Fixture::new();
        let inside = BlockPos::new(16, 64, 0);
        let outside = BlockPos::new(17, 64, 0);
        fx.hidden_chest(inside);
        fx.hidden_chest(outside);

        let (packets, more) = fx.with(|r, s| run_block_task(r, s, &LIMITS));
        assert!(packets.is_empty());
        assert!(!more);
        assert_eq!(fx.store.hidden_total(), 2);

        fx.store
            .with_session(CONN, |s| s.set_position(DVec3::new(4.0, 64.0, 0.0)));
        let packets = fx.with(|r, s| r.reveal_batch(s, &LIMITS, 1));
        assert_eq!(revealed_positions(&packets), vec![inside, outside]);
    }

    #[test]
    fn test_hide_pending_skips_stale_findings() {
        let fx = Fixture::new();
        let chest = fx.id("chest");
        let far = BlockPos::new(40, 64, 0);
        let near = BlockPos::new(3, 64, 0);
        let gone = BlockPos::new(0, 64, 40);
        fx.world.set_block(W, far, BlockState::of(chest));
        fx.world.set_block(W, near, BlockState::of(chest));
        fx.world.load_region(W, gone.region());

        let (packets, consumed) = fx.with(|r, s| {
            s.queue_hides([(W, far, chest), (W, near, chest), (W, gone, chest)]);
            r.hide_pending(s, &LIMITS, 10)
        });
        assert_eq!(consumed, 3);
        assert_eq!(packets, vec![neutral_block(W, far)]);
        assert_eq!(fx.store.hidden_total(), 1);
    }

    #[test]
    fn test_block_task_reports_remaining_work() {
        let fx = Fixture::new();
        fx.hidden_chest(BlockPos::new(10, 64, 0));
        fx.hidden_chest(BlockPos::new(12, 64, 5));
        fx.hidden_chest(BlockPos::new(100, 64, 0));
        let limits = RunLimits { blocks: 1, ..LIMITS };

        let (_, more) = fx.with(|r, s| run_block_task(r, s, &limits));
        assert!(more);
        let (_, more) = fx.with(|r, s| run_block_task(r, s, &limits));
        assert!(!more);
        assert_eq!(fx.store.hidden_total(), 1);
    }
}
