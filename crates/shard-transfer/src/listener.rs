//! Inbound transfer listener.
//!
//! Accepts connections in a loop and hands each one to its own task running
//! a fresh [`TransferSession`]. Results are reported on a channel; a failed
//! transfer never stops the loop. On shutdown the listener stops accepting
//! and gives in-flight sessions a bounded grace period to finish.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use shard_core::{ChunkCodec, TransferError};

use crate::framing::FrameLimits;
use crate::session::{ReceivedTransfer, TransferSession};

/// Outcome of one inbound connection.
#[derive(Debug)]
pub struct CompletedTransfer {
    pub peer: SocketAddr,
    pub result: Result<ReceivedTransfer, TransferError>,
}

pub struct TransferListener {
    listener: TcpListener,
    codec: ChunkCodec,
    limits: FrameLimits,
    completed: mpsc::Sender<CompletedTransfer>,
    shutdown: broadcast::Receiver<()>,
    shutdown_grace: Duration,
}

/// How long in-flight sessions may run after shutdown is requested.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

impl TransferListener {
    pub fn new(
        listener: TcpListener,
        codec: ChunkCodec,
        limits: FrameLimits,
        completed: mpsc::Sender<CompletedTransfer>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            codec,
            limits,
            completed,
            shutdown,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until shutdown, then drain sessions. Returns once every
    /// session has finished or been aborted, at which point this listener's
    /// completion senders are all dropped.
    pub async fn run(mut self) -> Result<(), TransferError> {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "transfer listener started");
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!(in_flight = sessions.len(), "transfer listener shutting down");
                    break;
                }

                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_join(joined);
                }

                result = self.listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    tracing::info!(%peer, "connection accepted");

                    let codec = self.codec.clone();
                    let limits = self.limits;
                    let completed = self.completed.clone();
                    sessions.spawn(async move {
                        let result = handle_connection(stream, peer, codec, limits).await;
                        if completed.send(CompletedTransfer { peer, result }).await.is_err() {
                            tracing::debug!(%peer, "completion receiver dropped");
                        }
                    });
                }
            }
        }

        drain(&mut sessions, self.shutdown_grace).await;
        Ok(())
    }
}

/// Wait up to `grace` for sessions to finish, then abort the rest.
async fn drain(sessions: &mut JoinSet<()>, grace: Duration) {
    let finished = tokio::time::timeout(grace, async {
        while let Some(joined) = sessions.join_next().await {
            log_join(joined);
        }
    })
    .await;

    if finished.is_err() {
        tracing::warn!(
            remaining = sessions.len(),
            grace_secs = grace.as_secs_f64(),
            "shutdown grace expired, aborting sessions"
        );
        sessions.shutdown().await;
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::warn!(error = %e, "transfer session panicked");
        }
    }
}

/// Run one session to completion. The stream is dropped on return, closing
/// the connection on success and failure alike.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    codec: ChunkCodec,
    limits: FrameLimits,
) -> Result<ReceivedTransfer, TransferError> {
    let session = TransferSession::new(peer.to_string(), codec, limits);
    session.run(&mut stream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use shard_core::encode_transfer;
    use shard_core::wire::frame;
    use tokio::io::AsyncWriteExt;

    use crate::sender::send_to;

    async fn start() -> (
        SocketAddr,
        mpsc::Receiver<CompletedTransfer>,
        broadcast::Sender<()>,
        tokio::task::JoinHandle<Result<(), TransferError>>,
    ) {
        let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (done_tx, done_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let listener = TransferListener::new(
            socket,
            ChunkCodec::default(),
            FrameLimits::default(),
            done_tx,
            shutdown_rx,
        );
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(listener.run());
        (addr, done_rx, shutdown_tx, handle)
    }

    #[tokio::test]
    async fn failed_transfer_does_not_stop_listener() {
        let (addr, mut done, shutdown, handle) = start().await;

        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(&[0, 0, 0]).await.unwrap();
        drop(bad);
        let first = done.recv().await.unwrap();
        assert!(matches!(
            first.result,
            Err(TransferError::TruncatedStream { .. })
        ));

        let chunks = encode_transfer(b"still listening", 8).unwrap();
        send_to(&addr.to_string(), &chunks).await.unwrap();
        let second = done.recv().await.unwrap();
        assert_eq!(second.result.unwrap().payload, b"still listening");

        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_lets_in_flight_session_finish() {
        let (addr, mut done, shutdown, handle) = start().await;
        let chunks = encode_transfer(b"finish me after shutdown", 4).unwrap();

        let mut conn = TcpStream::connect(addr).await.unwrap();
        conn.write_all(&frame(&chunks[0]).unwrap()).await.unwrap();
        conn.flush().await.unwrap();
        // Let the listener accept before shutdown arrives.
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.send(()).unwrap();

        for chunk in &chunks[1..] {
            conn.write_all(&frame(chunk).unwrap()).await.unwrap();
        }
        conn.shutdown().await.unwrap();

        handle.await.unwrap().unwrap();
        let finished = done.recv().await.unwrap();
        assert_eq!(finished.result.unwrap().payload, b"finish me after shutdown");
        // Every sender is gone once run() returns.
        assert!(done.recv().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_grace_bounds_stalled_sessions() {
        let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (done_tx, mut done_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let listener = TransferListener::new(
            socket,
            ChunkCodec::default(),
            FrameLimits::default(),
            done_tx,
            shutdown_rx,
        )
        .with_shutdown_grace(Duration::from_millis(100));
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(listener.run());

        let _stalled = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("listener should stop after the grace period")
            .unwrap()
            .unwrap();
        assert!(done_rx.recv().await.is_none());
    }
}
