use crate::*;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use shard_core::encode_transfer;
use shard_core::wire::frame;
use shard_transfer::send_to;

/// End-to-end: 2500 bytes in 1024-byte chunks, shuffled, over TCP.
#[tokio::test]
async fn test_shuffled_transfer_over_tcp() -> Result<()> {
    let mut harness = Harness::start().await?;
    let data = payload(2500, 1);

    let mut chunks = encode_transfer(&data, 1024)?;
    assert_eq!(chunks.len(), 3);
    chunks.shuffle(&mut rand::rngs::StdRng::seed_from_u64(99));
    send_to(&harness.addr.to_string(), &chunks).await?;

    let done = harness.next().await?;
    let received = done.result?;
    assert_eq!(received.payload, data);
    assert_eq!(received.total_chunks, 3);
    assert_eq!(received.digest, chunks[0].digest);

    harness.stop().await
}

/// Two connections whose frames arrive interleaved must each reassemble
/// their own payload.
#[tokio::test]
async fn test_interleaved_sessions_stay_isolated() -> Result<()> {
    let mut harness = Harness::start().await?;

    let data_a = payload(6000, 10);
    let data_b = payload(9000, 20);
    let chunks_a = encode_transfer(&data_a, 512)?;
    let mut chunks_b = encode_transfer(&data_b, 512)?;
    chunks_b.reverse();

    let mut conn_a = TcpStream::connect(harness.addr).await?;
    let mut conn_b = TcpStream::connect(harness.addr).await?;
    let addr_a = conn_a.local_addr()?;
    let addr_b = conn_b.local_addr()?;

    let rounds = chunks_a.len().max(chunks_b.len());
    for i in 0..rounds {
        if let Some(chunk) = chunks_a.get(i) {
            conn_a.write_all(&frame(chunk)?).await?;
            conn_a.flush().await?;
        }
        if let Some(chunk) = chunks_b.get(i) {
            conn_b.write_all(&frame(chunk)?).await?;
            conn_b.flush().await?;
        }
    }
    conn_b.shutdown().await?;
    conn_a.shutdown().await?;

    let mut seen = 0;
    for _ in 0..2 {
        let done = harness.next().await?;
        let received = done.result?;
        if done.peer == addr_a {
            assert_eq!(received.payload, data_a);
        } else {
            assert_eq!(done.peer, addr_b);
            assert_eq!(received.payload, data_b);
        }
        seen += 1;
    }
    assert_eq!(seen, 2);

    harness.stop().await
}

/// Many concurrent senders, each with its own payload.
#[tokio::test]
async fn test_concurrent_senders() -> Result<()> {
    let mut harness = Harness::start().await?;
    let addr = harness.addr.to_string();

    let mut expected = Vec::new();
    let mut senders = Vec::new();
    for seed in 0..8u64 {
        let data = payload(1000 + seed as usize * 700, seed);
        let mut chunks = encode_transfer(&data, 256)?;
        chunks.shuffle(&mut rand::rngs::StdRng::seed_from_u64(seed));
        expected.push(data);
        let addr = addr.clone();
        senders.push(tokio::spawn(async move { send_to(&addr, &chunks).await }));
    }
    for sender in senders {
        sender.await??;
    }

    let mut received = Vec::new();
    for _ in 0..expected.len() {
        received.push(harness.next().await?.result?.payload);
    }
    received.sort();
    expected.sort();
    assert_eq!(received, expected);

    harness.stop().await
}

/// An empty payload still travels as one chunk.
#[tokio::test]
async fn test_empty_payload_transfer() -> Result<()> {
    let mut harness = Harness::start().await?;
    let chunks = encode_transfer(b"", 1024)?;
    assert_eq!(chunks.len(), 1);
    send_to(&harness.addr.to_string(), &chunks).await?;

    let received = harness.next().await?.result?;
    assert!(received.payload.is_empty());

    harness.stop().await
}
