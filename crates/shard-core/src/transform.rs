//! Reversible content transforms applied before chunking.
//!
//! The digest is computed over the transformed ("encoded") bytes, so a
//! transform only has to be deterministic and lossless. Zstd is the default.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Default zstd level. Levels 1-3 are fast with moderate ratio.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("{name} encode failed: {source}")]
    Encode {
        name: &'static str,
        source: std::io::Error,
    },
    #[error("{name} decode failed: {source}")]
    Decode {
        name: &'static str,
        source: std::io::Error,
    },
}

/// A lossless byte transform with an inverse.
pub trait ContentTransform: Send + Sync {
    /// Stable name for logs.
    fn name(&self) -> &'static str;

    fn apply(&self, data: &[u8]) -> Result<Vec<u8>, TransformError>;

    fn invert(&self, data: &[u8]) -> Result<Vec<u8>, TransformError>;
}

/// zstd compression.
#[derive(Debug, Clone, Copy)]
pub struct Zstd {
    level: i32,
}

impl Zstd {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Default for Zstd {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl ContentTransform for Zstd {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn apply(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        zstd::encode_all(data, self.level).map_err(|source| TransformError::Encode {
            name: self.name(),
            source,
        })
    }

    fn invert(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        zstd::decode_all(data).map_err(|source| TransformError::Decode {
            name: self.name(),
            source,
        })
    }
}

/// Pass-through. Encoded bytes equal the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl ContentTransform for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn apply(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        Ok(data.to_vec())
    }

    fn invert(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        Ok(data.to_vec())
    }
}

/// Transform selector as it appears in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    Zstd,
    Identity,
}

impl TransformKind {
    /// Build the transform this kind names. `level` only applies to zstd.
    pub fn build(self, level: i32) -> Arc<dyn ContentTransform> {
        match self {
            TransformKind::Zstd => Arc::new(Zstd::new(level)),
            TransformKind::Identity => Arc::new(Identity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_round_trip() {
        let z = Zstd::default();
        let data = b"shard shard shard shard shard shard".repeat(40);
        let encoded = z.apply(&data).unwrap();
        assert!(encoded.len() < data.len());
        assert_eq!(z.invert(&encoded).unwrap(), data);
    }

    #[test]
    fn zstd_empty_input_encodes_to_frame() {
        let z = Zstd::default();
        let encoded = z.apply(b"").unwrap();
        assert!(!encoded.is_empty());
        assert!(z.invert(&encoded).unwrap().is_empty());
    }

    #[test]
    fn zstd_rejects_garbage() {
        let err = Zstd::default().invert(b"definitely not zstd").unwrap_err();
        assert!(matches!(err, TransformError::Decode { name: "zstd", .. }));
    }

    #[test]
    fn identity_is_pass_through() {
        assert_eq!(Identity.apply(b"abc").unwrap(), b"abc");
        assert_eq!(Identity.invert(b"abc").unwrap(), b"abc");
    }

    #[test]
    fn kind_builds_named_transform() {
        assert_eq!(TransformKind::Zstd.build(1).name(), "zstd");
        assert_eq!(TransformKind::Identity.build(1).name(), "identity");
    }
}
