//! Event Bridge: maps host lifecycle, movement, world, and UI events onto
//! session operations, and vetoes inventory actions while contents load.

use glam::DVec3;
use shroud_protocol::{ClientboundPacket, ConnectionId, SystemMessage, WindowId};
use shroud_world::{BlockPos, ItemStack, RegionPos, WorldEvent, WorldId};

use crate::engine::DisclosureEngine;
use crate::error::TransientState;
use crate::scheduler::Revealer;
use crate::settings::MOVE_THRESHOLD_SQ;
use crate::verdict::ActionVerdict;

/// Events the host raises.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A connection entered the game.
    Joined {
        connection: ConnectionId,
        world: WorldId,
        position: DVec3,
        bypass: bool,
    },
    /// A connection quit or was disconnected.
    Left { connection: ConnectionId },
    /// A connection walked.
    Moved {
        connection: ConnectionId,
        position: DVec3,
    },
    /// A connection was teleported within its world.
    Teleported {
        connection: ConnectionId,
        position: DVec3,
    },
    /// A connection moved to another world.
    WorldChanged {
        connection: ConnectionId,
        world: WorldId,
        position: DVec3,
    },
    /// A region was dropped from memory.
    RegionUnloaded { world: WorldId, region: RegionPos },
    /// A block was broken.
    BlockBroken { world: WorldId, pos: BlockPos },
    /// A block was placed.
    BlockPlaced { world: WorldId, pos: BlockPos },
    /// The player opened a container.
    ContainerOpened {
        connection: ConnectionId,
        window: WindowId,
    },
    /// The player closed a container.
    ContainerClosed {
        connection: ConnectionId,
        window: WindowId,
    },
}

impl From<WorldEvent> for HostEvent {
    fn from(event: WorldEvent) -> Self {
        match event {
            WorldEvent::BlockBroken { world, pos, .. } => Self::BlockBroken { world, pos },
            WorldEvent::BlockPlaced { world, pos, .. } => Self::BlockPlaced { world, pos },
            WorldEvent::RegionUnloaded { world, region } => Self::RegionUnloaded { world, region },
        }
    }
}

/// Host inventory operations used to hand a refused cursor item back.
pub trait InventoryAccess {
    /// Adds `item` to the player's inventory. Returns what did not fit.
    fn add_item(&self, connection: ConnectionId, item: ItemStack) -> Option<ItemStack>;
    /// Drops `item` at the player's feet.
    fn drop_at_feet(&self, connection: ConnectionId, item: ItemStack);
}

impl DisclosureEngine {
    /// Applies one host event.
    pub fn handle_event(&self, event: HostEvent) {
        let settings = self.settings();
        match event {
            HostEvent::Joined {
                connection,
                world,
                position,
                bypass,
            } => {
                let bypass = bypass || !settings.enable_protection;
                if self.sessions.open(connection, world, position, bypass) {
                    tracing::debug!(connection = connection.0, bypass, "session opened");
                } else {
                    tracing::debug!(connection = connection.0, "session already open");
                }
            }
            HostEvent::Left { connection } => {
                self.scheduler.cancel(connection);
                self.scanner.cancel_connection(connection);
                if let Some(session) = self.sessions.close(connection) {
                    tracing::debug!(
                        connection = connection.0,
                        hidden = session.hidden_count(),
                        deferred = session.deferred_count(),
                        "session closed"
                    );
                }
            }
            HostEvent::Moved {
                connection,
                position,
            } => {
                let limits = Self::limits(&settings);
                let revealer = Revealer::new(&self.registry, self.world.as_ref());
                let checked = self.sessions.with_session(connection, |session| {
                    session.set_position(position);
                    if session.is_bypass() || session.displacement_since_check() <= MOVE_THRESHOLD_SQ {
                        return None;
                    }
                    let packets = revealer.reveal_immediate(session, &limits);
                    session.anchor_check();
                    Some((packets, revealer.has_reveals(session, &limits)))
                });
                if let Some(Some((packets, more))) = checked {
                    self.send_all(connection, packets);
                    if more {
                        self.ensure_block_task(connection, &settings);
                    }
                }
            }
            HostEvent::Teleported {
                connection,
                position,
            } => {
                // Same world: records stay valid, the client keeps its regions.
                let moved = self.sessions.with_session(connection, |session| {
                    session.set_position(position);
                    session.anchor_check();
                });
                if moved.is_some() {
                    self.scanner.cancel_connection(connection);
                    self.scheduler
                        .schedule_check(connection, self.now() + settings.settle_delay_ticks);
                }
            }
            HostEvent::WorldChanged {
                connection,
                world,
                position,
            } => {
                let moved = self
                    .sessions
                    .with_session(connection, |session| session.change_world(world, position));
                if moved.is_some() {
                    self.scanner.cancel_connection(connection);
                    self.scheduler
                        .schedule_check(connection, self.now() + settings.settle_delay_ticks);
                    tracing::debug!(connection = connection.0, world = world.0, "world changed");
                }
            }
            HostEvent::RegionUnloaded { world, region } => {
                let purged = self.sessions.purge_region(world, region);
                if purged > 0 {
                    tracing::trace!(?region, purged, "region unloaded, records purged");
                }
            }
            HostEvent::BlockBroken { world, pos } | HostEvent::BlockPlaced { world, pos } => {
                let purged = self.sessions.purge_position(world, pos);
                if purged > 0 {
                    tracing::trace!(?pos, purged, "block changed, records purged");
                }
            }
            HostEvent::ContainerOpened { connection, window } => {
                if settings.deferred_container_loading && !window.is_player_inventory() {
                    self.sessions
                        .with_session(connection, |session| session.bind_window(window));
                }
            }
            HostEvent::ContainerClosed { connection, window } => {
                self.sessions
                    .with_session(connection, |session| session.unbind_window(window));
            }
        }
    }

    /// Vetoes a click while the clicked inventory is loading. A refused
    /// cursor item goes back into the player's inventory, or to their feet
    /// if it does not fit.
    pub fn on_inventory_click(
        &self,
        connection: ConnectionId,
        window: WindowId,
        in_own_inventory: bool,
        cursor: Option<ItemStack>,
        inventory: &dyn InventoryAccess,
    ) -> ActionVerdict {
        let state = self.sessions.with_session(connection, |session| {
            (
                session.is_bypass(),
                session.inventory_loading(),
                session.container_loading(window),
            )
        });
        let Some((bypass, inventory_loading, container_loading)) = state else {
            tracing::trace!("{}", TransientState::UnknownConnection(connection));
            return ActionVerdict::Allow;
        };
        if bypass {
            return ActionVerdict::Allow;
        }

        let settings = self.settings();
        let message = if inventory_loading && (in_own_inventory || window.is_player_inventory()) {
            &settings.messages.inventory_loading
        } else if !window.is_player_inventory() && !in_own_inventory && container_loading {
            &settings.messages.container_loading
        } else {
            return ActionVerdict::Allow;
        };

        if let Some(item) = cursor
            && let Some(remainder) = inventory.add_item(connection, item)
        {
            inventory.drop_at_feet(connection, remainder);
        }
        self.notify(connection, message, settings.messages.enabled);
        tracing::debug!(connection = connection.0, window = window.0, "click refused while loading");
        ActionVerdict::Deny
    }

    /// Vetoes picking up ground items while the own inventory is loading.
    pub fn on_item_pickup(&self, connection: ConnectionId) -> ActionVerdict {
        let loading = self
            .sessions
            .with_session(connection, |session| {
                !session.is_bypass() && session.inventory_loading()
            })
            .unwrap_or(false);
        if !loading {
            return ActionVerdict::Allow;
        }
        let settings = self.settings();
        self.notify(
            connection,
            &settings.messages.inventory_loading,
            settings.messages.enabled,
        );
        ActionVerdict::Deny
    }

    fn notify(&self, connection: ConnectionId, text: &str, enabled: bool) {
        if enabled && !text.is_empty() {
            self.sink.send(
                connection,
                ClientboundPacket::SystemMessage(SystemMessage {
                    text: text.to_string(),
                }),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
