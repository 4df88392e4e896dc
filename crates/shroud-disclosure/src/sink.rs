//! Outbound seam for packets the engine originates.

use std::sync::{Mutex, PoisonError};

use shroud_protocol::{ClientboundPacket, ConnectionId};

/// Delivers engine-originated packets (reveals, hides, slot updates,
/// messages) to one connection. Called from packet and tick contexts alike.
pub trait PacketSink: Send + Sync {
    /// Queue `packet` for `connection`.
    fn send(&self, connection: ConnectionId, packet: ClientboundPacket);
}

/// A sink that keeps everything it is given.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(ConnectionId, ClientboundPacket)>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<(ConnectionId, ClientboundPacket)> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Removes and returns the packets recorded for `connection`.
    pub fn take_for(&self, connection: ConnectionId) -> Vec<ClientboundPacket> {
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        let (mine, rest): (Vec<_>, Vec<_>) =
            sent.drain(..).partition(|(conn, _)| *conn == connection);
        *sent = rest;
        mine.into_iter().map(|(_, packet)| packet).collect()
    }

    /// Number of packets recorded.
    pub fn len(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PacketSink for RecordingSink {
    fn send(&self, connection: ConnectionId, packet: ClientboundPacket) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((connection, packet));
    }
}
