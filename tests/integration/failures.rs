use crate::*;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use shard_core::encode_transfer;
use shard_core::wire::frame;
use shard_transfer::send_to;

/// A connection cut mid-frame fails only its own session.
#[tokio::test]
async fn test_truncated_connection_is_isolated() -> Result<()> {
    let mut harness = Harness::start().await?;
    let data = payload(4000, 3);
    let chunks = encode_transfer(&data, 1024)?;

    // Open the good connection first and leave it half-sent.
    let mut good = TcpStream::connect(harness.addr).await?;
    good.write_all(&frame(&chunks[0])?).await?;

    let mut bad = TcpStream::connect(harness.addr).await?;
    let framed = frame(&chunks[1])?;
    bad.write_all(&framed[..framed.len() - 10]).await?;
    bad.shutdown().await?;

    let first = harness.next().await?;
    assert!(matches!(
        first.result,
        Err(TransferError::TruncatedStream { .. })
    ));

    for chunk in &chunks[1..] {
        good.write_all(&frame(chunk)?).await?;
    }
    good.shutdown().await?;

    let second = harness.next().await?;
    assert_eq!(second.result?.payload, data);

    harness.stop().await
}

#[tokio::test]
async fn test_missing_chunk_reports_incomplete() -> Result<()> {
    let mut harness = Harness::start().await?;
    let chunks = encode_transfer(&payload(5000, 4), 1000)?;
    send_to(&harness.addr.to_string(), &chunks[..chunks.len() - 1]).await?;

    let done = harness.next().await?;
    match done.result {
        Err(TransferError::IncompleteTransfer { received, expected }) => {
            assert_eq!(received, chunks.len() - 1);
            assert_eq!(expected as usize, chunks.len());
        }
        other => panic!("expected IncompleteTransfer, got {other:?}"),
    }

    harness.stop().await
}

#[tokio::test]
async fn test_corruption_in_transit_is_detected() -> Result<()> {
    let mut harness = Harness::start().await?;
    let mut chunks = encode_transfer(&payload(3000, 5), 1024)?;

    let mut data = chunks[1].data.to_vec();
    data[100] ^= 0x80;
    chunks[1].data = data.into();
    send_to(&harness.addr.to_string(), &chunks).await?;

    let done = harness.next().await?;
    assert!(matches!(
        done.result,
        Err(TransferError::IntegrityMismatch { .. })
    ));

    harness.stop().await
}

#[tokio::test]
async fn test_silent_peer_times_out() -> Result<()> {
    let mut harness = Harness::start_with(FrameLimits {
        read_timeout: Some(Duration::from_millis(100)),
        ..FrameLimits::default()
    })
    .await?;

    let _idle = TcpStream::connect(harness.addr).await?;
    let done = harness.next().await?;
    assert!(matches!(done.result, Err(TransferError::TimedOut(_))));

    harness.stop().await
}
