//! Frame encoding and region block compression.
//!
//! Wire format of a frame: `[version: u8] [postcard-encoded ClientboundPacket]`.
//! The block list of a region packet is itself a postcard list compressed
//! with LZ4 (size-prepended).

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::packets::{ClientboundPacket, RegionBlock};

/// Current wire-protocol version. Prepended to every encoded frame.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Postcard (de)serialization failed.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),

    /// LZ4 decompression failed.
    #[error("LZ4 decompression failed: {0}")]
    Lz4(String),
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Encode a packet into a versioned frame.
pub fn encode_packet(packet: &ClientboundPacket) -> Result<Vec<u8>, CodecError> {
    let body = postcard::to_allocvec(packet)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a versioned frame.
///
/// Returns an error if the version is unsupported or the payload is malformed.
pub fn decode_packet(data: &[u8]) -> Result<ClientboundPacket, CodecError> {
    let Some((&version, body)) = data.split_first() else {
        return Err(CodecError::EmptyPayload);
    };
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}

// ---------------------------------------------------------------------------
// Region blocks
// ---------------------------------------------------------------------------

/// Encode and LZ4-compress a region block list.
pub fn compress_blocks(blocks: &[RegionBlock]) -> Result<Vec<u8>, CodecError> {
    let raw = postcard::to_allocvec(blocks)?;
    Ok(compress_prepend_size(&raw))
}

/// Decompress and decode a region block list.
pub fn decompress_blocks(compressed: &[u8]) -> Result<Vec<RegionBlock>, CodecError> {
    let raw = decompress_size_prepended(compressed).map_err(|e| CodecError::Lz4(e.to_string()))?;
    Ok(postcard::from_bytes(&raw)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
