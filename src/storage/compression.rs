//! Batch compression for log frames

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compression algorithm applied to frame payloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    None,
    #[default]
    Zstd,
}

impl CompressionAlgorithm {
    /// Tag stored in each frame header
    pub fn tag(self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Zstd => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(CompressionAlgorithm::None),
            1 => Ok(CompressionAlgorithm::Zstd),
            other => Err(Error::Corruption(format!(
                "Unknown compression tag {}",
                other
            ))),
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionAlgorithm::None => write!(f, "none"),
            CompressionAlgorithm::Zstd => write!(f, "zstd"),
        }
    }
}

/// Payloads smaller than this are stored uncompressed regardless of setting
pub const MIN_COMPRESS_LEN: usize = 256;

/// zstd level for log frames; keys are short and repetitive
const ZSTD_LEVEL: i32 = 3;

/// Encode a frame payload
pub fn compress(payload: &[u8], algorithm: CompressionAlgorithm) -> Result<Vec<u8>> {
    if algorithm == CompressionAlgorithm::None {
        return Ok(payload.to_vec());
    }
    zstd::bulk::compress(payload, ZSTD_LEVEL).map_err(|e| {
        Error::StorageUnavailable(format!(
            "zstd could not encode a {}-byte payload: {}",
            payload.len(),
            e
        ))
    })
}

/// Decode a frame payload
///
/// Undecodable input means the frame on disk is damaged.
pub fn decompress(stored: &[u8], algorithm: CompressionAlgorithm) -> Result<Vec<u8>> {
    if algorithm == CompressionAlgorithm::None {
        return Ok(stored.to_vec());
    }
    zstd::stream::decode_all(stored)
        .map_err(|e| Error::Corruption(format!("Bad {} frame payload: {}", algorithm, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_none() -> Result<()> {
        let data = b"lib/a.java[main";
        let compressed = compress(data, CompressionAlgorithm::None)?;
        assert_eq!(compressed, data);
        assert_eq!(decompress(&compressed, CompressionAlgorithm::None)?, data);
        Ok(())
    }

    #[test]
    fn test_compression_zstd() -> Result<()> {
        let data = b"lib/src/Widget.java[build -> lib/src/State.java[".repeat(20);
        let compressed = compress(&data, CompressionAlgorithm::Zstd)?;

        // Repetitive keys compress well
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed, CompressionAlgorithm::Zstd)?, data);
        Ok(())
    }

    #[test]
    fn test_garbage_is_corruption() {
        let err = decompress(b"not zstd at all", CompressionAlgorithm::Zstd).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_tags() -> Result<()> {
        for algorithm in [CompressionAlgorithm::None, CompressionAlgorithm::Zstd] {
            assert_eq!(CompressionAlgorithm::from_tag(algorithm.tag())?, algorithm);
        }
        assert!(CompressionAlgorithm::from_tag(9).is_err());
        assert_eq!(
            serde_json::to_string(&CompressionAlgorithm::Zstd).unwrap(),
            "\"zstd\""
        );
        Ok(())
    }
}
