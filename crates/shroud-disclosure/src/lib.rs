//! Packet-level progressive disclosure and sanitisation.
//!
//! Sits between world truth and the per-connection packet stream. Protected
//! objects beyond the disclosure radius are sent as air and revealed a
//! bounded batch per tick as the player approaches; nested container items
//! are sent as placeholders and restored slot by slot; block entity payloads
//! that disagree with world truth are dropped before they reach the client.
//!
//! Hosts drive a [`DisclosureEngine`]: packets go through
//! [`intercept`](DisclosureEngine::intercept), host events through
//! [`handle_event`](DisclosureEngine::handle_event), and the scheduler
//! through [`tick`](DisclosureEngine::tick).

pub mod bridge;
pub mod container;
pub mod engine;
pub mod error;
pub mod guard;
pub mod scan;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod sink;
pub mod verdict;
pub mod visibility;


pub use bridge::{HostEvent, InventoryAccess};
pub use container::ContainerDeferral;
pub use engine::{DisclosureEngine, EngineStatus, FrameVerdict};
pub use error::{DecodeFailure, EngineError, Inconsistency, Rejection, TransientState};
pub use guard::{ConsistencyGuard, sign_tag_exemption};
pub use scan::{RegionScanner, ScanRequest, ScanResult};
pub use scheduler::{DisclosureScheduler, DisclosureTask, RunLimits, TaskKind};
pub use session::{DeferredItem, HideOutcome, Session, SessionStore, WindowBinding};
pub use settings::{EngineSettings, MessageSettings, TICK_MILLIS, millis_to_ticks};
pub use sink::{PacketSink, RecordingSink};
pub use verdict::{ActionVerdict, CancelReason, Verdict};
pub use visibility::VisibilityFilter;
