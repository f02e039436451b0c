//! Chunk codec: payload to chunks and back.
//!
//! Encoding transforms the payload, hashes the encoded bytes once, and
//! splits them into fixed-size segments. Decoding accepts chunks in any
//! order, rebuilds the encoded bytes by ascending `sequence_index`, checks
//! the digest, and inverts the transform.
//!
//! An empty encoded payload is carried as exactly one chunk with empty data
//! (`total_chunks = 1`). Duplicate indices are resolved last-write-wins.
//! `total_chunks` and `digest` are latched from the first chunk and every
//! later chunk must agree with them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::crypto::{hash, short_hex, Hasher, DIGEST_LEN};
use crate::error::TransferError;
use crate::transform::{ContentTransform, Zstd};
use crate::wire::{Chunk, MAX_CHUNK_SIZE};

/// Reject chunk sizes the wire format cannot carry.
pub fn validate_chunk_size(chunk_size: usize) -> Result<(), TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidConfig(
            "chunk size must be positive".into(),
        ));
    }
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(TransferError::InvalidConfig(format!(
            "chunk size {chunk_size} exceeds maximum {MAX_CHUNK_SIZE}"
        )));
    }
    Ok(())
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Stateless encoder/decoder bound to one content transform.
#[derive(Clone)]
pub struct ChunkCodec {
    transform: Arc<dyn ContentTransform>,
}

impl ChunkCodec {
    pub fn new(transform: Arc<dyn ContentTransform>) -> Self {
        Self { transform }
    }

    pub fn transform(&self) -> &dyn ContentTransform {
        self.transform.as_ref()
    }

    /// Split `payload` into chunks of at most `chunk_size` encoded bytes.
    ///
    /// Chunks are returned in ascending `sequence_index` order; callers may
    /// send them in any order.
    pub fn encode(&self, payload: &[u8], chunk_size: usize) -> Result<Vec<Chunk>, TransferError> {
        validate_chunk_size(chunk_size)?;

        let encoded = self
            .transform
            .apply(payload)
            .map_err(TransferError::Transform)?;
        let digest = hash(&encoded);
        let encoded = Bytes::from(encoded);

        if encoded.is_empty() {
            return Ok(vec![Chunk {
                sequence_index: 0,
                total_chunks: 1,
                data: Bytes::new(),
                digest,
            }]);
        }

        let count = encoded.len().div_ceil(chunk_size);
        let total_chunks = u32::try_from(count).map_err(|_| {
            TransferError::InvalidConfig(format!(
                "{count} chunks exceeds the u32 range; use a larger chunk size"
            ))
        })?;

        let chunks: Vec<Chunk> = (0..count)
            .map(|i| {
                let start = i * chunk_size;
                let end = (start + chunk_size).min(encoded.len());
                Chunk {
                    sequence_index: i as u32,
                    total_chunks,
                    data: encoded.slice(start..end),
                    digest,
                }
            })
            .collect();

        tracing::debug!(
            transform = self.transform.name(),
            payload_len = payload.len(),
            encoded_len = encoded.len(),
            chunk_size,
            total_chunks,
            digest = short_hex(&digest),
            "payload encoded"
        );

        Ok(chunks)
    }

    /// Reassemble a payload from chunks in arbitrary order.
    pub fn decode<I>(&self, chunks: I) -> Result<Vec<u8>, TransferError>
    where
        I: IntoIterator<Item = Chunk>,
    {
        let mut buffer = ReassemblyBuffer::new();
        for chunk in chunks {
            buffer.insert(chunk)?;
        }
        buffer.finish(self.transform())
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new(Arc::new(Zstd::default()))
    }
}

impl fmt::Debug for ChunkCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkCodec")
            .field("transform", &self.transform.name())
            .finish()
    }
}

/// Encode with the default zstd transform.
pub fn encode_transfer(payload: &[u8], chunk_size: usize) -> Result<Vec<Chunk>, TransferError> {
    ChunkCodec::default().encode(payload, chunk_size)
}

/// Decode with the default zstd transform.
pub fn decode_transfer<I>(chunks: I) -> Result<Vec<u8>, TransferError>
where
    I: IntoIterator<Item = Chunk>,
{
    ChunkCodec::default().decode(chunks)
}

// ── Reassembly ────────────────────────────────────────────────────────────────

/// Receiver-side state for one transfer.
///
/// Maps `sequence_index` to chunk data and holds the `total_chunks` and
/// `digest` latched from the first chunk. Consumed by [`finish`].
///
/// [`finish`]: ReassemblyBuffer::finish
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    segments: HashMap<u32, Bytes>,
    total_chunks: Option<u32>,
    digest: Option<[u8; DIGEST_LEN]>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one chunk. Returns `true` if it replaced an earlier chunk with the
    /// same index.
    pub fn insert(&mut self, chunk: Chunk) -> Result<bool, TransferError> {
        let total_chunks = self.total_chunks.unwrap_or(chunk.total_chunks);

        if chunk.total_chunks != total_chunks {
            return Err(TransferError::InconsistentChunk {
                sequence_index: chunk.sequence_index,
                field: "total_chunks",
            });
        }
        if let Some(digest) = self.digest {
            if chunk.digest != digest {
                return Err(TransferError::InconsistentChunk {
                    sequence_index: chunk.sequence_index,
                    field: "digest",
                });
            }
        }
        if chunk.sequence_index >= total_chunks {
            return Err(TransferError::IndexOutOfRange {
                sequence_index: chunk.sequence_index,
                total_chunks,
            });
        }

        self.total_chunks = Some(total_chunks);
        self.digest = Some(chunk.digest);

        let replaced = self
            .segments
            .insert(chunk.sequence_index, chunk.data)
            .is_some();
        if replaced {
            tracing::debug!(
                sequence_index = chunk.sequence_index,
                "duplicate chunk index, keeping the latest"
            );
        }
        Ok(replaced)
    }

    /// Number of distinct indices held.
    pub fn received(&self) -> usize {
        self.segments.len()
    }

    pub fn total_chunks(&self) -> Option<u32> {
        self.total_chunks
    }

    pub fn digest(&self) -> Option<[u8; DIGEST_LEN]> {
        self.digest
    }

    pub fn is_complete(&self) -> bool {
        self.total_chunks
            .is_some_and(|total| self.segments.len() == total as usize)
    }

    /// Concatenate, verify, and invert the transform.
    pub fn finish(mut self, transform: &dyn ContentTransform) -> Result<Vec<u8>, TransferError> {
        let (Some(total_chunks), Some(expected)) = (self.total_chunks, self.digest) else {
            return Err(TransferError::IncompleteTransfer {
                received: 0,
                expected: 1,
            });
        };

        if self.segments.len() < total_chunks as usize {
            return Err(TransferError::IncompleteTransfer {
                received: self.segments.len(),
                expected: total_chunks,
            });
        }

        let encoded_len = self.segments.values().map(Bytes::len).sum();
        let mut encoded = BytesMut::with_capacity(encoded_len);
        let mut hasher = Hasher::new();
        for index in 0..total_chunks {
            // Indices are bounded by total_chunks on insert, so a full count
            // means every index is present.
            let segment = self.segments.remove(&index).ok_or(
                TransferError::IncompleteTransfer {
                    received: index as usize,
                    expected: total_chunks,
                },
            )?;
            hasher.update(&segment);
            encoded.extend_from_slice(&segment);
        }

        let computed = hasher.finalize();
        if computed != expected {
            return Err(TransferError::IntegrityMismatch { expected, computed });
        }

        let payload = transform
            .invert(&encoded)
            .map_err(TransferError::DecodeError)?;

        tracing::debug!(
            transform = transform.name(),
            total_chunks,
            encoded_len = encoded.len(),
            payload_len = payload.len(),
            digest = short_hex(&expected),
            "payload reassembled"
        );

        Ok(payload)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
