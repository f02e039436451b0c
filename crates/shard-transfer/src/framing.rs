//! Stream framing: one length-prefixed chunk per frame.
//!
//! A clean end of stream is the peer closing its write side exactly on a
//! frame boundary, i.e. zero bytes of the next length prefix read. Running
//! out of bytes anywhere else is a truncated stream.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use shard_core::wire::{frame, parse_chunk, LENGTH_PREFIX_LEN, MAX_FRAME_LEN};
use shard_core::{Chunk, TransferError};

/// Limits applied while reading frames from one connection.
#[derive(Debug, Clone, Copy)]
pub struct FrameLimits {
    /// Largest outer length accepted before allocating the frame buffer.
    pub max_frame_len: usize,
    /// Deadline for each individual read. `None` blocks until data or EOF.
    pub read_timeout: Option<Duration>,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_frame_len: MAX_FRAME_LEN,
            read_timeout: None,
        }
    }
}

/// Read until `buf` is full or the stream ends. Returns bytes read.
async fn read_full<R>(
    reader: &mut R,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..]);
        let n = match timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| TransferError::TimedOut(limit))??,
            None => read.await?,
        };
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read one frame. `Ok(None)` means the stream ended cleanly between frames.
pub async fn read_frame<R>(reader: &mut R, limits: &FrameLimits) -> Result<Option<Chunk>, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    match read_full(reader, &mut prefix, limits.read_timeout).await? {
        0 => return Ok(None),
        LENGTH_PREFIX_LEN => {}
        received => {
            return Err(TransferError::TruncatedStream {
                expected: LENGTH_PREFIX_LEN,
                received,
            })
        }
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > limits.max_frame_len {
        return Err(TransferError::FrameTooLarge {
            len,
            max: limits.max_frame_len,
        });
    }

    let mut body = BytesMut::zeroed(len);
    let received = read_full(reader, &mut body, limits.read_timeout).await?;
    if received < len {
        return Err(TransferError::TruncatedStream {
            expected: len,
            received,
        });
    }

    parse_chunk(body.freeze()).map(Some)
}

/// Write one framed chunk. Returns the number of bytes written.
pub async fn write_frame<W>(writer: &mut W, chunk: &Chunk) -> Result<usize, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let framed = frame(chunk)?;
    writer.write_all(&framed).await?;
    Ok(framed.len())
}
