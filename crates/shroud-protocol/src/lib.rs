//! Outbound packet model and the versioned wire codec.
//!
//! The engine works on typed [`ClientboundPacket`] values. Hosts that only
//! have encoded frames use [`decode_packet`] / [`encode_packet`]; the region
//! block list inside [`RegionData`] is LZ4-compressed separately so filters
//! can rewrite it without touching the rest of the frame.

pub mod codec;
pub mod ids;
pub mod packets;

pub use codec::{
    CodecError, PROTOCOL_VERSION, compress_blocks, decode_packet, decompress_blocks,
    encode_packet,
};
pub use ids::{ConnectionId, IdGenerator, WindowId};
pub use packets::{
    BlockChange, BlockEntityUpdate, ClientboundPacket, CloseWindow, OpenWindow, RegionBlock,
    RegionData, SetSlot, SignUpdate, SystemMessage, WindowItems,
};
