//! Container Deferral Engine.
//!
//! Per connection and window: an open packet binds the window as loading,
//! contents packets have their risky slots (portable containers with
//! contents) replaced by placeholders while the real items are queued, the
//! scheduler drains the queue one slot update at a time, and a close
//! discards whatever is left. The player's own inventory (window 0) follows
//! the same path without a binding.

use std::collections::VecDeque;

use shroud_protocol::{ClientboundPacket, CloseWindow, OpenWindow, SetSlot, WindowId, WindowItems};
use shroud_world::{ItemStack, MaterialRegistry};

use crate::error::{DecodeFailure, Rejection, TransientState};
use crate::session::{DeferredItem, Session};
use crate::verdict::Verdict;

/// Contents filter for one registry and the two deferral switches.
pub struct ContainerDeferral<'a> {
    registry: &'a MaterialRegistry,
    inventory: bool,
    containers: bool,
}

impl<'a> ContainerDeferral<'a> {
    /// Creates a filter. `inventory` and `containers` enable deferral for
    /// the own inventory and for opened containers respectively.
    pub fn new(registry: &'a MaterialRegistry, inventory: bool, containers: bool) -> Self {
        Self {
            registry,
            inventory,
            containers,
        }
    }

    /// Whether deferral applies to `window` for this session right now.
    fn tracks(&self, session: &Session, window: WindowId) -> bool {
        if window.is_player_inventory() {
            self.inventory
        } else {
            self.containers && session.is_bound(window)
        }
    }

    /// Binds the opened window and marks it loading. An open packet for the
    /// bound window id starts a new window, so the old queue goes.
    pub fn on_open(&self, session: &mut Session, packet: &OpenWindow) -> Verdict {
        if self.containers && !packet.window.is_player_inventory() {
            session.unbind_window(packet.window);
            session.bind_window(packet.window);
            tracing::debug!(
                connection = session.connection().0,
                window = packet.window.0,
                "container window bound"
            );
        }
        Verdict::Pass
    }

    /// Replaces risky slots with placeholders and queues the real items.
    ///
    /// Contents for a container window that is not bound are cancelled; the
    /// client has no such window. A drained container passes through.
    pub fn on_window_items(&self, session: &mut Session, packet: WindowItems) -> Verdict {
        let window = packet.window;
        if window.is_player_inventory() {
            if !self.inventory {
                return Verdict::Pass;
            }
        } else {
            if !self.containers {
                return Verdict::Pass;
            }
            if !session.is_bound(window) {
                return Rejection::from(TransientState::WindowNotOpen(window)).into();
            }
            if !session.container_loading(window) {
                return Verdict::Pass;
            }
        }

        let (items, queue) = match self.split_risky(window, packet.items) {
            Ok(split) => split,
            Err(failure) => return Rejection::from(failure).into(),
        };
        let deferred = queue.len();
        session.replace_deferred(window, queue);
        if deferred == 0 {
            return Verdict::Pass;
        }

        tracing::debug!(
            connection = session.connection().0,
            window = window.0,
            deferred,
            "window contents deferred"
        );
        Verdict::Rewrite(ClientboundPacket::WindowItems(WindowItems { window, items }))
    }

    /// A server slot update supersedes the deferred item for the same slot,
    /// and is itself deferred if risky.
    pub fn on_set_slot(&self, session: &mut Session, packet: SetSlot) -> Verdict {
        let window = packet.window;
        if !self.tracks(session, window) {
            return Verdict::Pass;
        }
        if session.remove_deferred_slot(window, packet.slot).is_none() {
            return Verdict::Pass;
        }

        match packet.item {
            Some(item) if item.is_risky(self.registry) => {
                let placeholder = item.placeholder();
                session.push_deferred(DeferredItem {
                    window,
                    slot: packet.slot,
                    item,
                    risky: true,
                });
                Verdict::Rewrite(ClientboundPacket::SetSlot(SetSlot {
                    window,
                    slot: packet.slot,
                    item: Some(placeholder),
                }))
            }
            _ => Verdict::Pass,
        }
    }

    /// Discards the binding and queue of the closed window.
    pub fn on_close(&self, session: &mut Session, packet: &CloseWindow) -> Verdict {
        if session.unbind_window(packet.window) {
            tracing::debug!(
                connection = session.connection().0,
                window = packet.window.0,
                "container window released"
            );
        }
        Verdict::Pass
    }

    fn split_risky(
        &self,
        window: WindowId,
        items: Vec<Option<ItemStack>>,
    ) -> Result<(Vec<Option<ItemStack>>, VecDeque<DeferredItem>), DecodeFailure> {
        let mut queue = VecDeque::new();
        let mut shown = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let slot = u16::try_from(index).map_err(|_| DecodeFailure::SlotOutOfRange(index))?;
            match item {
                Some(item) if item.is_risky(self.registry) => {
                    shown.push(Some(item.placeholder()));
                    queue.push_back(DeferredItem {
                        window,
                        slot,
                        item,
                        risky: true,
                    });
                }
                other => shown.push(other),
            }
        }
        Ok((shown, queue))
    }
}

/// Pops up to `budget` deferred items, own inventory first, as slot updates.
/// Queues of windows that are no longer open are dropped unsent.
pub fn drain_deferred(session: &mut Session, budget: usize) -> Vec<ClientboundPacket> {
    let mut out = Vec::new();
    for window in session.deferred_windows() {
        if !window.is_player_inventory() && !session.is_bound(window) {
            tracing::trace!(
                connection = session.connection().0,
                window = window.0,
                "{}",
                TransientState::WindowNotOpen(window)
            );
            while session.pop_deferred(window).is_some() {}
            continue;
        }
        while out.len() < budget {
            let Some(deferred) = session.pop_deferred(window) else {
                break;
            };
            out.push(ClientboundPacket::SetSlot(SetSlot {
                window: deferred.window,
                slot: deferred.slot,
                item: Some(deferred.item),
            }));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
