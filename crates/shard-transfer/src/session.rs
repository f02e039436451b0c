//! Receiver-side transfer session.
//!
//! One session per connection. The session owns its reassembly buffer
//! outright; nothing is shared between sessions.
//!
//! ```text
//! AwaitingFrame ──frame──▶ AwaitingFrame
//!      │ clean EOF                │ truncated / bad frame
//!      ▼                          ▼
//! Reassembling ──▶ Done | Failed  Failed
//! ```

use tokio::io::AsyncRead;

use shard_core::crypto::short_hex;
use shard_core::{Chunk, ChunkCodec, ReassemblyBuffer, TransferError};

use crate::framing::{read_frame, FrameLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingFrame,
    Reassembling,
    Done,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::AwaitingFrame => "awaiting frame",
            SessionState::Reassembling => "reassembling",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        }
    }
}

/// A payload reassembled from one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedTransfer {
    pub payload: Vec<u8>,
    pub digest: [u8; 32],
    pub total_chunks: u32,
}

pub struct TransferSession {
    peer: String,
    codec: ChunkCodec,
    limits: FrameLimits,
    buffer: ReassemblyBuffer,
    state: SessionState,
    frames: usize,
}

impl TransferSession {
    pub fn new(peer: impl Into<String>, codec: ChunkCodec, limits: FrameLimits) -> Self {
        Self {
            peer: peer.into(),
            codec,
            limits,
            buffer: ReassemblyBuffer::new(),
            state: SessionState::AwaitingFrame,
            frames: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames parsed so far, duplicates included.
    pub fn frames_received(&self) -> usize {
        self.frames
    }

    /// Record one parsed chunk.
    ///
    /// Metadata that disagrees with the first chunk fails the session
    /// immediately rather than at reassembly.
    pub fn accept(&mut self, chunk: Chunk) -> Result<(), TransferError> {
        if self.state != SessionState::AwaitingFrame {
            return Err(TransferError::SessionClosed(self.state.as_str()));
        }

        let sequence_index = chunk.sequence_index;
        let payload_len = chunk.payload_length();
        self.frames += 1;
        if let Err(e) = self.buffer.insert(chunk) {
            return Err(self.fail(e));
        }

        tracing::debug!(
            peer = %self.peer,
            sequence_index,
            payload_len,
            received = self.buffer.received(),
            total_chunks = self.buffer.total_chunks(),
            "chunk received"
        );
        Ok(())
    }

    /// Reassemble everything accepted so far. Consumes the session.
    pub fn finish(mut self) -> Result<ReceivedTransfer, TransferError> {
        if self.state != SessionState::AwaitingFrame {
            return Err(TransferError::SessionClosed(self.state.as_str()));
        }
        self.state = SessionState::Reassembling;

        let digest = self.buffer.digest();
        let total_chunks = self.buffer.total_chunks();
        let buffer = std::mem::take(&mut self.buffer);

        let result = buffer
            .finish(self.codec.transform())
            .and_then(|payload| match (digest, total_chunks) {
                (Some(digest), Some(total_chunks)) => Ok(ReceivedTransfer {
                    payload,
                    digest,
                    total_chunks,
                }),
                _ => Err(TransferError::IncompleteTransfer {
                    received: 0,
                    expected: 1,
                }),
            });

        match result {
            Ok(received) => {
                self.state = SessionState::Done;
                tracing::info!(
                    peer = %self.peer,
                    frames = self.frames,
                    total_chunks = received.total_chunks,
                    bytes = received.payload.len(),
                    digest = short_hex(&received.digest),
                    "transfer reassembled"
                );
                Ok(received)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Read frames until a clean end of stream, then reassemble.
    pub async fn run<R>(mut self, conn: &mut R) -> Result<ReceivedTransfer, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            match read_frame(conn, &self.limits).await {
                Ok(Some(chunk)) => self.accept(chunk)?,
                Ok(None) => break,
                Err(e) => return Err(self.fail(e)),
            }
        }
        tracing::debug!(peer = %self.peer, frames = self.frames, "stream ended cleanly");
        self.finish()
    }

    /// Callers own the user-facing report; this only traces the transition.
    fn fail(&mut self, error: TransferError) -> TransferError {
        self.state = SessionState::Failed;
        tracing::debug!(
            peer = %self.peer,
            frames = self.frames,
            error = %error,
            "transfer failed"
        );
        error
    }
}

/// Receive one transfer from `conn` with the default codec and limits.
///
/// The connection is dropped, and so closed, whether or not reassembly
/// succeeds.
pub async fn run_receiver<R>(mut conn: R) -> Result<Vec<u8>, TransferError>
where
    R: AsyncRead + Unpin,
{
    let session = TransferSession::new("stream", ChunkCodec::default(), FrameLimits::default());
    session.run(&mut conn).await.map(|received| received.payload)
}
