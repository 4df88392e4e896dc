//! The engine facade: packet interception, the tick loop, and telemetry.
//!
//! Two contexts call in. The packet context calls [`DisclosureEngine::intercept`]
//! (or [`intercept_frame`](DisclosureEngine::intercept_frame)) in the
//! delivery path and never blocks on anything but the one session it
//! touches. The tick context calls [`DisclosureEngine::tick`] at a fixed
//! cadence. Session state is only mutated inside
//! [`SessionStore::with_session`], and packets are only handed to the sink
//! after that lock is released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use shroud_protocol::{ClientboundPacket, ConnectionId, decode_packet, encode_packet};
use shroud_world::{MaterialRegistry, WorldView};

use crate::container::ContainerDeferral;
use crate::error::{DecodeFailure, EngineError, Rejection, TransientState, log_rejection};
use crate::guard::ConsistencyGuard;
use crate::scan::{RegionScanner, ScanRequest};
use crate::scheduler::{DisclosureScheduler, Revealer, RunLimits, TaskKind, run_block_task, run_item_task};
use crate::session::{Session, SessionStore};
use crate::settings::EngineSettings;
use crate::sink::PacketSink;
use crate::verdict::{CancelReason, Verdict};
use crate::visibility::VisibilityFilter;

/// Capacity of the region scan request and result queues.
const SCAN_QUEUE_CAPACITY: usize = 1024;

/// Verdict on a raw encoded frame.
#[derive(Debug)]
pub enum FrameVerdict {
    /// Deliver the frame unchanged.
    Pass,
    /// Deliver these bytes instead.
    Rewrite(Vec<u8>),
    /// Drop the frame.
    Cancel(CancelReason),
}

/// Read-only snapshot for the admin surface.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    /// Size of the Protected-Type Registry.
    pub protected_types: usize,
    /// Master switch.
    pub enable_protection: bool,
    /// Own-inventory deferral switch.
    pub deferred_inventory_loading: bool,
    /// Container deferral switch.
    pub deferred_container_loading: bool,
    /// Block concealment switch.
    pub deferred_block_loading: bool,
    /// Disclosure radius in blocks.
    pub visibility_radius: f64,
    /// Open sessions.
    pub sessions: usize,
    /// Hidden records across all sessions.
    pub hidden_records: usize,
    /// Deferred items across all sessions.
    pub deferred_items: usize,
    /// Running block tasks.
    pub block_tasks: usize,
    /// Running item tasks.
    pub item_tasks: usize,
    /// Current tick.
    pub tick: u64,
}

/// Follow-up work collected while a session is locked.
#[derive(Default)]
struct Effects {
    scan: Option<ScanRequest>,
    blocks: bool,
    items: bool,
    outbound: Vec<ClientboundPacket>,
}

/// Progressive-disclosure engine over one world and one packet sink.
pub struct DisclosureEngine {
    pub(crate) registry: Arc<MaterialRegistry>,
    pub(crate) world: Arc<dyn WorldView>,
    pub(crate) sink: Arc<dyn PacketSink>,
    settings: RwLock<EngineSettings>,
    pub(crate) sessions: SessionStore,
    pub(crate) scheduler: DisclosureScheduler,
    pub(crate) scanner: RegionScanner,
    clock: AtomicU64,
}

impl DisclosureEngine {
    /// Starts the engine and its scan workers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SubstrateUnavailable`] if the scan workers
    /// cannot be started. This is the only error that disables the engine.
    pub fn new(
        registry: Arc<MaterialRegistry>,
        world: Arc<dyn WorldView>,
        sink: Arc<dyn PacketSink>,
        settings: EngineSettings,
    ) -> Result<Self, EngineError> {
        let workers = settings.resolved_scan_workers();
        let scanner = RegionScanner::new(
            workers,
            SCAN_QUEUE_CAPACITY,
            Arc::clone(&world),
            Arc::clone(&registry),
        )
        .inspect_err(|e| tracing::error!("disclosure engine disabled: {e}"))?;

        tracing::info!(
            protected_types = registry.protected_types().len(),
            radius = settings.visibility_radius,
            workers,
            "disclosure engine started"
        );
        Ok(Self {
            registry,
            world,
            sink,
            settings: RwLock::new(settings),
            sessions: SessionStore::new(),
            scheduler: DisclosureScheduler::new(),
            scanner,
            clock: AtomicU64::new(0),
        })
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> EngineSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps the settings. Sessions, records, and queues are kept; running
    /// tasks pick up new budgets and radii on their next run, and every
    /// session gets a check on the next tick so a wider radius reveals
    /// without waiting for movement.
    pub fn update_settings(&self, settings: EngineSettings) {
        tracing::info!(radius = settings.visibility_radius, "engine settings updated");
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        let due = self.now() + 1;
        for connection in self.sessions.connections() {
            self.scheduler.schedule_check(connection, due);
        }
    }

    /// Current tick.
    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    /// The session store, read-only for hosts and tests.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// The task scheduler, read-only for hosts and tests.
    pub fn scheduler(&self) -> &DisclosureScheduler {
        &self.scheduler
    }

    /// The region scanner.
    pub fn scanner(&self) -> &RegionScanner {
        &self.scanner
    }

    pub(crate) fn limits(settings: &EngineSettings) -> RunLimits {
        RunLimits {
            radius_sq: settings.radius_sq(),
            immediate_sq: settings.immediate_radius_sq(),
            blocks: settings.blocks_per_tick,
            items: settings.items_per_tick,
        }
    }

    pub(crate) fn send_all(&self, connection: ConnectionId, packets: Vec<ClientboundPacket>) {
        for packet in packets {
            self.sink.send(connection, packet);
        }
    }

    pub(crate) fn ensure_block_task(&self, connection: ConnectionId, settings: &EngineSettings) {
        self.scheduler.ensure(
            connection,
            TaskKind::Blocks,
            self.now(),
            settings.block_interval_ticks,
        );
    }

    // -----------------------------------------------------------------------
    // Packet context
    // -----------------------------------------------------------------------

    /// Decides the fate of one outbound packet.
    pub fn intercept(&self, connection: ConnectionId, packet: ClientboundPacket) -> Verdict {
        let name = packet.name();
        let settings = self.settings();
        let mut effects = Effects::default();

        let verdict = self.sessions.with_session(connection, |session| {
            if session.is_bypass() {
                return Verdict::Pass;
            }
            self.filter(session, packet, &settings, &mut effects)
        });
        let Some(verdict) = verdict else {
            tracing::trace!(
                connection = connection.0,
                packet = name,
                "{}",
                TransientState::UnknownConnection(connection)
            );
            return Verdict::Pass;
        };

        self.apply_effects(connection, effects, &settings);
        if let Verdict::Cancel(CancelReason::Rejected(rejection)) = &verdict {
            log_rejection(connection, name, rejection);
        }
        verdict
    }

    /// Decodes a raw frame and intercepts it. A frame that cannot be decoded
    /// is cancelled.
    pub fn intercept_frame(&self, connection: ConnectionId, frame: &[u8]) -> FrameVerdict {
        let packet = match decode_packet(frame) {
            Ok(packet) => packet,
            Err(e) => {
                let rejection = Rejection::from(DecodeFailure::from(e));
                log_rejection(connection, "frame", &rejection);
                return FrameVerdict::Cancel(CancelReason::Rejected(rejection));
            }
        };
        match self.intercept(connection, packet) {
            Verdict::Pass => FrameVerdict::Pass,
            Verdict::Cancel(reason) => FrameVerdict::Cancel(reason),
            Verdict::Rewrite(packet) => match encode_packet(&packet) {
                Ok(bytes) => FrameVerdict::Rewrite(bytes),
                Err(e) => {
                    let rejection = Rejection::from(DecodeFailure::from(e));
                    log_rejection(connection, packet.name(), &rejection);
                    FrameVerdict::Cancel(CancelReason::Rejected(rejection))
                }
            },
        }
    }

    fn filter(
        &self,
        session: &mut Session,
        packet: ClientboundPacket,
        settings: &EngineSettings,
        effects: &mut Effects,
    ) -> Verdict {
        let blocks = settings.deferred_block_loading;
        let visibility = VisibilityFilter::new(&self.registry, self.world.as_ref(), settings.radius_sq());
        let containers = ContainerDeferral::new(
            &self.registry,
            settings.deferred_inventory_loading,
            settings.deferred_container_loading,
        );

        match packet {
            ClientboundPacket::RegionData(data) if blocks => {
                let request = ScanRequest {
                    connection: session.connection(),
                    world: data.world,
                    region: data.region,
                };
                let outcome = visibility.filter_region(session, data);
                if outcome.newly_processed {
                    effects.scan = Some(request);
                }
                effects.blocks |= outcome.hidden > 0;
                outcome.verdict
            }
            ClientboundPacket::BlockChange(change) if blocks => {
                let verdict = visibility.filter_block_change(session, &change);
                effects.blocks |= verdict.rewritten().is_some();
                verdict
            }
            ClientboundPacket::BlockEntityData(update) if blocks => {
                let outcome = visibility.filter_detail(session, &update);
                if let Some(hide) = outcome.hide {
                    effects.outbound.push(hide);
                    effects.blocks = true;
                }
                outcome.verdict
            }
            ClientboundPacket::BlockEntityData(update) => {
                match ConsistencyGuard::new(&self.registry, self.world.as_ref()).validate(&update) {
                    Ok(()) => Verdict::Pass,
                    Err(rejection) => rejection.into(),
                }
            }
            ClientboundPacket::SignUpdate(sign) if blocks => {
                let outcome = visibility.filter_sign(session, &sign);
                if let Some(hide) = outcome.hide {
                    effects.outbound.push(hide);
                    effects.blocks = true;
                }
                outcome.verdict
            }
            ClientboundPacket::OpenWindow(open) => containers.on_open(session, &open),
            ClientboundPacket::WindowItems(items) => {
                let verdict = containers.on_window_items(session, items);
                effects.items |= session.deferred_count() > 0;
                verdict
            }
            ClientboundPacket::SetSlot(slot) => {
                let verdict = containers.on_set_slot(session, slot);
                effects.items |= session.deferred_count() > 0;
                verdict
            }
            ClientboundPacket::CloseWindow(close) => containers.on_close(session, &close),
            _ => Verdict::Pass,
        }
    }

    fn apply_effects(&self, connection: ConnectionId, effects: Effects, settings: &EngineSettings) {
        let now = self.now();
        if let Some(request) = effects.scan {
            self.scanner.submit(request);
            self.scheduler
                .schedule_check(connection, now + settings.region_settle_ticks);
        }
        if effects.blocks {
            self.ensure_block_task(connection, settings);
        }
        if effects.items {
            self.scheduler.ensure(
                connection,
                TaskKind::Items,
                now,
                settings.item_interval_ticks,
            );
        }
        self.send_all(connection, effects.outbound);
    }

    // -----------------------------------------------------------------------
    // Tick context
    // -----------------------------------------------------------------------

    /// Advances the clock by one tick: applies region scan findings, runs
    /// due immediate checks, then runs due tasks.
    pub fn tick(&self) {
        let now = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        let settings = self.settings();
        let limits = Self::limits(&settings);
        let revealer = Revealer::new(&self.registry, self.world.as_ref());

        for result in self.scanner.drain_results() {
            let request = result.request;
            let queued = self.sessions.with_session(request.connection, |session| {
                if session.world() != request.world || session.is_bypass() {
                    return false;
                }
                let before = session.pending_hide_count();
                session.queue_hides(
                    result
                        .found
                        .into_iter()
                        .map(|(pos, material)| (request.world, pos, material)),
                );
                session.pending_hide_count() > before
            });
            if queued == Some(true) {
                self.ensure_block_task(request.connection, &settings);
            }
        }

        for connection in self.scheduler.take_due_checks(now) {
            let checked = self.sessions.with_session(connection, |session| {
                let packets = revealer.reveal_immediate(session, &limits);
                session.anchor_check();
                (packets, revealer.has_reveals(session, &limits))
            });
            let Some((packets, more)) = checked else {
                continue;
            };
            self.send_all(connection, packets);
            if more {
                self.ensure_block_task(connection, &settings);
            }
        }

        for (connection, kind) in self.scheduler.due(now) {
            let run = self.sessions.with_session(connection, |session| match kind {
                TaskKind::Blocks => run_block_task(&revealer, session, &limits),
                TaskKind::Items => run_item_task(session, &limits),
            });
            let Some((packets, more)) = run else {
                tracing::trace!(connection = connection.0, ?kind, "session gone, task stopped");
                self.scheduler.stop(connection, kind);
                continue;
            };
            let delivered = packets.len();
            self.send_all(connection, packets);
            self.scheduler.finish_run(connection, kind, now, delivered, more);
        }
    }

    /// Read-only telemetry.
    pub fn status(&self) -> EngineStatus {
        let settings = self.settings();
        EngineStatus {
            protected_types: self.registry.protected_types().len(),
            enable_protection: settings.enable_protection,
            deferred_inventory_loading: settings.deferred_inventory_loading,
            deferred_container_loading: settings.deferred_container_loading,
            deferred_block_loading: settings.deferred_block_loading,
            visibility_radius: settings.visibility_radius,
            sessions: self.sessions.len(),
            hidden_records: self.sessions.hidden_total(),
            deferred_items: self.sessions.deferred_total(),
            block_tasks: self.scheduler.active_count(TaskKind::Blocks),
            item_tasks: self.scheduler.active_count(TaskKind::Items),
            tick: self.now(),
        }
    }

    /// Stops the scan workers and drops every session and task.
    pub fn shutdown(&self) {
        self.scanner.shutdown();
        self.scheduler.clear();
        self.sessions.clear();
        tracing::info!("disclosure engine stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
