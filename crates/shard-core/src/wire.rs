//! Shard wire format: the framed chunk.
//!
//! Every field here is part of the protocol. All integers are big-endian
//! and fixed width:
//!
//! ```text
//! [4 bytes: outer_length]            = 12 + payload_length + 32
//! [4 bytes: sequence_index]
//! [4 bytes: total_chunks]
//! [4 bytes: payload_length]
//! [payload_length bytes: data]
//! [32 bytes: digest]
//! ```
//!
//! The outer length belongs to the stream layer and covers the whole
//! serialized chunk. `payload_length` covers `data` only.

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::crypto::DIGEST_LEN;
use crate::error::TransferError;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Size of the stream-layer length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Size of the fixed chunk header.
pub const HEADER_LEN: usize = 12;

/// Bytes a serialized chunk carries beyond its data.
pub const CHUNK_OVERHEAD: usize = HEADER_LEN + DIGEST_LEN;

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Largest chunk data segment accepted in either direction.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Largest outer length accepted by default.
pub const MAX_FRAME_LEN: usize = MAX_CHUNK_SIZE + CHUNK_OVERHEAD;

// ── Chunk Header ──────────────────────────────────────────────────────────────

/// Fixed header at the front of every serialized chunk.
///
/// Wire size: 12 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct ChunkHeader {
    /// 0-based position of this chunk within the encoded payload.
    pub sequence_index: U32<BigEndian>,

    /// Number of chunks the encoded payload was split into.
    pub total_chunks: U32<BigEndian>,

    /// Length of `data` in bytes.
    pub payload_length: U32<BigEndian>,
}

assert_eq_size!(ChunkHeader, [u8; HEADER_LEN]);

// ── Chunk ─────────────────────────────────────────────────────────────────────

/// One addressable fragment of an encoded payload.
///
/// `total_chunks` and `digest` are shared by every chunk of a transfer. The
/// digest covers the entire encoded payload, not this chunk alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence_index: u32,
    pub total_chunks: u32,
    pub data: Bytes,
    pub digest: [u8; DIGEST_LEN],
}

impl Chunk {
    /// Byte length of `data`, as written in the header.
    pub fn payload_length(&self) -> usize {
        self.data.len()
    }

    /// Size of this chunk once serialized, excluding the stream prefix.
    pub fn serialized_len(&self) -> usize {
        CHUNK_OVERHEAD + self.data.len()
    }

    fn header(&self) -> Result<ChunkHeader, TransferError> {
        if self.data.len() > MAX_CHUNK_SIZE {
            return Err(TransferError::FrameTooLarge {
                len: self.serialized_len(),
                max: MAX_FRAME_LEN,
            });
        }
        Ok(ChunkHeader {
            sequence_index: U32::new(self.sequence_index),
            total_chunks: U32::new(self.total_chunks),
            payload_length: U32::new(self.data.len() as u32),
        })
    }
}

// ── Serialization ─────────────────────────────────────────────────────────────

/// Serialize a chunk as `[header][data][digest]`, without the stream prefix.
pub fn serialize_chunk(chunk: &Chunk) -> Result<Bytes, TransferError> {
    let header = chunk.header()?;
    let mut buf = BytesMut::with_capacity(chunk.serialized_len());
    buf.put_slice(header.as_bytes());
    buf.put_slice(&chunk.data);
    buf.put_slice(&chunk.digest);
    Ok(buf.freeze())
}

/// Serialize a chunk and prefix it with its big-endian outer length.
pub fn frame(chunk: &Chunk) -> Result<Bytes, TransferError> {
    let header = chunk.header()?;
    let outer_len = chunk.serialized_len();
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + outer_len);
    buf.put_u32(outer_len as u32);
    buf.put_slice(header.as_bytes());
    buf.put_slice(&chunk.data);
    buf.put_slice(&chunk.digest);
    Ok(buf.freeze())
}

/// Parse one serialized chunk (the bytes covered by the outer length).
///
/// The buffer must hold exactly `12 + payload_length + 32` bytes.
pub fn parse_chunk(bytes: Bytes) -> Result<Chunk, TransferError> {
    if bytes.len() < CHUNK_OVERHEAD {
        return Err(TransferError::MalformedFrame(format!(
            "{} bytes is shorter than the {CHUNK_OVERHEAD}-byte chunk overhead",
            bytes.len()
        )));
    }

    let header = ChunkHeader::read_from_prefix(&bytes[..HEADER_LEN])
        .ok_or_else(|| TransferError::MalformedFrame("unreadable chunk header".into()))?;
    let payload_length = header.payload_length.get() as usize;

    if bytes.len() != CHUNK_OVERHEAD + payload_length {
        return Err(TransferError::MalformedFrame(format!(
            "outer length {} disagrees with payload_length {payload_length}",
            bytes.len()
        )));
    }

    let data_end = HEADER_LEN + payload_length;
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&bytes[data_end..]);

    Ok(Chunk {
        sequence_index: header.sequence_index.get(),
        total_chunks: header.total_chunks.get(),
        data: bytes.slice(HEADER_LEN..data_end),
        digest,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
