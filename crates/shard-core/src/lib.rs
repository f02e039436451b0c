//! shard-core: chunk codec, wire format, and content transforms.
//! The transfer and daemon crates depend on this one. Nothing here touches
//! the network.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod transform;
pub mod wire;

pub use codec::{decode_transfer, encode_transfer, ChunkCodec, ReassemblyBuffer};
pub use error::TransferError;
pub use transform::{ContentTransform, Identity, TransformError, Zstd};
pub use wire::Chunk;
