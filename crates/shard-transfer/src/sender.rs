//! Sender role: frame every chunk onto the connection, then close.

use rand::seq::SliceRandom;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use shard_core::{Chunk, TransferError};

use crate::framing::write_frame;

/// Randomize send order. The receiver does not depend on order.
pub fn shuffle_chunks(chunks: &mut [Chunk]) {
    chunks.shuffle(&mut rand::thread_rng());
}

/// Write one frame per chunk, then shut down the write side so the receiver
/// sees a clean end of stream. Returns total bytes written.
pub async fn send_transfer<W>(conn: &mut W, chunks: &[Chunk]) -> Result<usize, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = 0;
    for chunk in chunks {
        bytes += write_frame(conn, chunk).await?;
        tracing::trace!(
            sequence_index = chunk.sequence_index,
            payload_len = chunk.payload_length(),
            "chunk sent"
        );
    }
    conn.flush().await?;
    conn.shutdown().await?;

    tracing::info!(chunks = chunks.len(), bytes, "transfer sent");
    Ok(bytes)
}

/// Connect to `addr` and send one transfer over a fresh connection.
pub async fn send_to(addr: &str, chunks: &[Chunk]) -> Result<usize, TransferError> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    tracing::debug!(%addr, "connected");
    send_transfer(&mut stream, chunks).await
}
