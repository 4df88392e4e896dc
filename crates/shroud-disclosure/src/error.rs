//! Failure taxonomy.
//!
//! Every validation step returns `Result<_, Rejection>`. The engine applies a
//! single policy to any `Err`: the packet is cancelled (or its object
//! neutralised), never forwarded. Only [`EngineError`] escapes to the host,
//! and only at construction.

use shroud_protocol::{CodecError, ConnectionId, WindowId};
use shroud_world::{BlockPos, Material};
use thiserror::Error;

/// Why a packet was refused.
#[derive(Debug, Error)]
pub enum Rejection {
    /// A packet field could not be read.
    #[error("decode failure: {0}")]
    DecodeFailure(#[from] DecodeFailure),

    /// The payload disagrees with live world truth.
    #[error("consistency violation at {pos:?}: {kind}")]
    ConsistencyViolation {
        /// Position the payload refers to.
        pos: BlockPos,
        /// What disagreed.
        kind: Inconsistency,
    },

    /// The connection or window the packet refers to no longer exists.
    #[error("stale state: {0}")]
    TransientState(#[from] TransientState),
}

impl Rejection {
    /// Shorthand for a [`Rejection::ConsistencyViolation`].
    pub fn inconsistent(pos: BlockPos, kind: Inconsistency) -> Self {
        Self::ConsistencyViolation { pos, kind }
    }
}

/// Unreadable packet content.
#[derive(Debug, Error)]
pub enum DecodeFailure {
    /// The frame or an embedded compressed payload is malformed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A material id outside the registry.
    #[error("unknown material {0:?}")]
    UnknownMaterial(Material),

    /// A window contents list with more slots than a slot index can address.
    #[error("slot index {0} out of range")]
    SlotOutOfRange(usize),
}

/// Ways a block entity payload can disagree with the world.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Inconsistency {
    /// The payload carries no kind tag and the block is not a sign.
    #[error("missing kind tag")]
    MissingTag,

    /// The kind tag does not name any known block entity.
    #[error("unresolvable kind tag {0:?}")]
    UnknownTag(String),

    /// Nothing (or air) at the position in world truth.
    #[error("no object in world")]
    NoObject,

    /// The block at the position is neither protected, a container, nor a sign.
    #[error("untracked type {0:?}")]
    UntrackedType(Material),

    /// The block never carries a block entity.
    #[error("type {0:?} has no block entity")]
    NoBlockEntity(Material),

    /// The payload kind differs from the block entity in world truth.
    #[error("kind tag {tag:?} does not match world")]
    TagMismatch {
        /// Tag carried by the payload.
        tag: String,
    },

    /// A paired container's partner is not a consistent instance.
    #[error("partner at {0:?} is incomplete")]
    PartialComposite(BlockPos),
}

/// A lookup for state that disappeared between scheduling and execution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransientState {
    /// The connection has no session (never joined or already left).
    #[error("no session for connection {0:?}")]
    UnknownConnection(ConnectionId),

    /// The window is not the connection's bound window.
    #[error("window {0:?} is not open")]
    WindowNotOpen(WindowId),
}

/// Errors that abort the engine as a whole.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The scan worker pool could not be started.
    #[error("interception substrate unavailable: {0}")]
    SubstrateUnavailable(String),
}

/// Logs a rejection at the level its class calls for.
pub(crate) fn log_rejection(connection: ConnectionId, packet: &str, rejection: &Rejection) {
    match rejection {
        Rejection::DecodeFailure(_) => {
            tracing::debug!(connection = connection.0, packet, %rejection, "packet cancelled");
        }
        Rejection::ConsistencyViolation { .. } | Rejection::TransientState(_) => {
            tracing::trace!(connection = connection.0, packet, %rejection, "packet cancelled");
        }
    }
}
