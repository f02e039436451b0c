//! Error taxonomy for a single transfer.
//!
//! Every variant is local to one transfer. Callers decide whether to log,
//! retry the whole transfer, or propagate; nothing in shard retries on its
//! own.

use std::time::Duration;

use crate::transform::TransformError;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Rejected before anything is encoded or transmitted.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The peer closed the connection part-way through a frame.
    #[error("stream truncated: expected {expected} bytes, received {received}")]
    TruncatedStream { expected: usize, received: usize },

    #[error("incomplete transfer: received {received} of {expected} chunks")]
    IncompleteTransfer { received: usize, expected: u32 },

    #[error(
        "integrity mismatch: expected digest {}, computed {}",
        hex::encode(.expected),
        hex::encode(.computed)
    )]
    IntegrityMismatch {
        expected: [u8; 32],
        computed: [u8; 32],
    },

    /// The inverse content transform rejected the reassembled bytes.
    #[error("decode failed: {0}")]
    DecodeError(#[source] TransformError),

    /// The forward content transform failed while encoding.
    #[error("transform failed: {0}")]
    Transform(#[source] TransformError),

    /// A chunk's shared metadata disagrees with the first chunk observed.
    #[error("chunk {sequence_index} disagrees with transfer metadata: {field}")]
    InconsistentChunk {
        sequence_index: u32,
        field: &'static str,
    },

    #[error("chunk index {sequence_index} out of range for {total_chunks} chunks")]
    IndexOutOfRange {
        sequence_index: u32,
        total_chunks: u32,
    },

    /// The session already reached a terminal state and takes no more input.
    #[error("session already {0}")]
    SessionClosed(&'static str),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("frame length {len} exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("no data for {}s, connection presumed dead", .0.as_secs())]
    TimedOut(Duration),

    #[error("connection i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// True for failures detected after the stream ended cleanly, i.e. at
    /// reassembly time rather than while reading frames.
    pub fn is_reassembly_failure(&self) -> bool {
        matches!(
            self,
            TransferError::IncompleteTransfer { .. }
                | TransferError::IntegrityMismatch { .. }
                | TransferError::DecodeError(_)
                | TransferError::InconsistentChunk { .. }
                | TransferError::IndexOutOfRange { .. }
        )
    }
}
