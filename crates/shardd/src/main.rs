//! shardd: receives chunked transfers and writes them to disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use shard_core::config::ShardConfig;
use shard_core::crypto::short_hex;
use shard_transfer::{CompletedTransfer, FrameLimits, ReceivedTransfer, TransferListener};

/// Extra time allowed to flush queued transfers to disk on shutdown.
const WRITER_DRAIN: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = ShardConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = ShardConfig::load().context("failed to load config")?;

    // First positional argument overrides the output directory.
    if let Some(dir) = std::env::args().nth(1) {
        config.storage.output_dir = PathBuf::from(dir);
    }

    let output_dir = config.storage.output_dir.clone();
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    tracing::info!(path = %output_dir.display(), "output directory");

    let endpoint = config.endpoint();
    let socket = TcpListener::bind(&endpoint)
        .await
        .with_context(|| format!("failed to bind {endpoint}"))?;
    tracing::info!(
        addr = %socket.local_addr()?,
        transform = ?config.transfer.transform,
        "shardd listening"
    );

    let (completed_tx, completed_rx) = mpsc::channel::<CompletedTransfer>(64);
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let limits = FrameLimits {
        max_frame_len: config.transfer.max_frame_len,
        read_timeout: config.transfer.read_timeout(),
    };
    let grace = config.transfer.shutdown_grace();
    let listener = TransferListener::new(
        socket,
        config.transfer.codec(),
        limits,
        completed_tx,
        shutdown_rx,
    )
    .with_shutdown_grace(grace);
    let listener_task = tokio::spawn(listener.run());
    let writer_task = tokio::spawn(store_completed(completed_rx, output_dir));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(());

    // The listener returns only after its sessions finished or were
    // aborted, so every completion sender is gone by then.
    listener_task.await??;
    match tokio::time::timeout(grace + WRITER_DRAIN, writer_task).await {
        Ok(joined) => joined.context("writer task failed")?,
        Err(_) => tracing::warn!("timed out writing queued transfers"),
    }
    tracing::info!("shardd stopped");
    Ok(())
}

/// Write every successful transfer to `output_dir`; log every failure.
async fn store_completed(mut completed: mpsc::Receiver<CompletedTransfer>, output_dir: PathBuf) {
    while let Some(CompletedTransfer { peer, result }) = completed.recv().await {
        match result {
            Ok(received) => match write_payload(&output_dir, &received) {
                Ok(path) => tracing::info!(
                    %peer,
                    bytes = received.payload.len(),
                    chunks = received.total_chunks,
                    path = %path.display(),
                    "transfer saved"
                ),
                Err(e) => tracing::warn!(%peer, error = %e, "failed to save transfer"),
            },
            Err(e) => tracing::warn!(%peer, error = %e, "transfer failed"),
        }
    }
}

fn write_payload(output_dir: &Path, received: &ReceivedTransfer) -> Result<PathBuf> {
    let path = output_dir.join(output_name(&received.digest));
    std::fs::write(&path, &received.payload)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Named by digest so concurrent transfers never collide and a repeated
/// transfer overwrites its earlier copy.
fn output_name(digest: &[u8; 32]) -> String {
    format!("received-{}.bin", short_hex(digest))
}
