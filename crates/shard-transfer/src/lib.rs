//! shard-transfer: moving chunks over a byte stream.
//!
//! The framer turns chunks into length-prefixed frames and back. A
//! [`TransferSession`] owns the reassembly state for exactly one inbound
//! connection; the [`TransferListener`] runs one session per accepted
//! connection in its own task.

pub mod framing;
pub mod listener;
pub mod sender;
pub mod session;

pub use framing::{read_frame, write_frame, FrameLimits};
pub use listener::{CompletedTransfer, TransferListener, DEFAULT_SHUTDOWN_GRACE};
pub use sender::{send_to, send_transfer, shuffle_chunks};
pub use session::{run_receiver, ReceivedTransfer, SessionState, TransferSession};
