//! Shard integration test harness.
//!
//! Every test starts its own listener on 127.0.0.1:0 and talks to it over
//! real TCP connections. Tests share nothing and may run in parallel.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use shard_core::{ChunkCodec, TransferError};
use shard_transfer::{CompletedTransfer, FrameLimits, TransferListener};

mod failures;
mod transfers;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Upper bound on how long any test waits for a completion.
pub const WAIT: Duration = Duration::from_secs(10);

/// A running listener and the handles needed to observe and stop it.
pub struct Harness {
    pub addr: SocketAddr,
    pub completed: mpsc::Receiver<CompletedTransfer>,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<(), TransferError>>,
}

impl Harness {
    pub async fn start() -> Result<Self> {
        Self::start_with(FrameLimits::default()).await
    }

    pub async fn start_with(limits: FrameLimits) -> Result<Self> {
        let socket = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind loopback listener")?;
        let (completed_tx, completed) = mpsc::channel(16);
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let listener = TransferListener::new(
            socket,
            ChunkCodec::default(),
            limits,
            completed_tx,
            shutdown_rx,
        );
        let addr = listener.local_addr()?;
        let task = tokio::spawn(listener.run());
        Ok(Self {
            addr,
            completed,
            shutdown,
            task,
        })
    }

    /// Wait for the next finished session.
    pub async fn next(&mut self) -> Result<CompletedTransfer> {
        tokio::time::timeout(WAIT, self.completed.recv())
            .await
            .context("timed out waiting for a transfer")?
            .context("listener dropped its completion channel")
    }

    pub async fn stop(self) -> Result<()> {
        self.shutdown.send(()).ok();
        self.task.await??;
        Ok(())
    }
}

/// Deterministic pseudo-random payload.
pub fn payload(len: usize, seed: u64) -> Vec<u8> {
    use rand::{RngCore, SeedableRng};
    let mut data = vec![0u8; len];
    rand::rngs::StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}
