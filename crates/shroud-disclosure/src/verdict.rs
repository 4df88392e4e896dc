//! Interception outcomes.

use shroud_protocol::ClientboundPacket;

use crate::error::Rejection;

/// What the host does with an intercepted packet.
#[derive(Debug)]
pub enum Verdict {
    /// Deliver the packet unchanged.
    Pass,
    /// Deliver this packet instead.
    Rewrite(ClientboundPacket),
    /// Drop the packet.
    Cancel(CancelReason),
}

impl Verdict {
    /// Returns `true` for [`Verdict::Pass`].
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Returns `true` for [`Verdict::Cancel`].
    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancel(_))
    }

    /// The replacement packet, if rewritten.
    pub fn rewritten(&self) -> Option<&ClientboundPacket> {
        match self {
            Self::Rewrite(packet) => Some(packet),
            _ => None,
        }
    }
}

/// Why a packet was dropped.
#[derive(Debug)]
pub enum CancelReason {
    /// The packet describes an object currently concealed from this client.
    Concealed,
    /// A repeat of a hide the client already received.
    AlreadyHidden,
    /// Validation failed.
    Rejected(Rejection),
}

impl From<Rejection> for Verdict {
    fn from(rejection: Rejection) -> Self {
        Self::Cancel(CancelReason::Rejected(rejection))
    }
}

/// Outcome of a player action the engine may veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionVerdict {
    /// Let the action happen.
    Allow,
    /// Cancel the action.
    Deny,
}
