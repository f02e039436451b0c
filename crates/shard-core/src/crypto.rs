//! BLAKE3 digests for whole-payload integrity.
//!
//! The digest detects accidental corruption in transit. It is not keyed and
//! gives no protection against a peer that rewrites both data and digest.

/// Length of every digest carried on the wire.
pub const DIGEST_LEN: usize = 32;

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
pub fn hash(data: &[u8]) -> [u8; DIGEST_LEN] {
    *blake3::hash(data).as_bytes()
}

/// Incremental BLAKE3 hasher for payloads that arrive in pieces.
///
/// # Example
/// ```
/// use shard_core::crypto::Hasher;
/// let mut h = Hasher::new();
/// h.update(b"hello ");
/// h.update(b"world");
/// let digest = h.finalize();
/// assert_eq!(digest, shard_core::crypto::hash(b"hello world"));
/// ```
pub struct Hasher(blake3::Hasher);

impl Hasher {
    pub fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> [u8; DIGEST_LEN] {
        *self.0.finalize().as_bytes()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Short hex prefix of a digest, for log lines and file names.
pub fn short_hex(digest: &[u8; DIGEST_LEN]) -> String {
    hex::encode(&digest[..8])
}
