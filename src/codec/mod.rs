//! String codecs
//!
//! Converts in-memory strings to the byte encoding stored inside a
//! [`ByteArray`]. Two profiles trade space for time:
//!
//! ```text
//! Plain      unit unit 1 hi lo unit ... 0
//! Optimized  [pool id: i32][plain suffix]     "a/b/C.java[" interned
//!            [-2: i32][plain full string]     no shared prefix found
//! ```
//!
//! The optimized profile exploits the fact that most keys share a long
//! qualified-name prefix (the defining file) and stores that prefix once
//! in a [`StringPool`].

pub mod optimized;
pub mod plain;
pub mod pool;

pub use optimized::OptimizedStringCodec;
pub use plain::PlainStringCodec;
pub use pool::StringPool;

use crate::buffer::ByteArray;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Encoding profile, recorded in the version marker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecProfile {
    Plain,
    #[default]
    Optimized,
}

impl fmt::Display for CodecProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecProfile::Plain => write!(f, "plain"),
            CodecProfile::Optimized => write!(f, "optimized"),
        }
    }
}

/// Encodes strings into, and decodes them out of, binary buffers
pub trait StringCodec: Send + Sync {
    /// Append the encoding of `value` to `out`
    ///
    /// On error `out` is left exactly as it was.
    fn encode(&self, value: &str, out: &mut ByteArray) -> Result<()>;

    /// Decode one string starting at `*offset`, advancing the offset past it
    fn decode(&self, data: &[u8], offset: &mut usize) -> Result<String>;

    /// Approximate bytes held by auxiliary structures (diagnostics only)
    fn mem_used(&self) -> usize;

    fn profile(&self) -> CodecProfile;

    /// Encode `value` into a standalone byte vector
    fn encode_to_vec(&self, value: &str) -> Result<Vec<u8>> {
        let mut out = ByteArray::with_capacity(value.len() + 8);
        self.encode(value, &mut out)?;
        Ok(out.into_vec())
    }

    /// Encode `value` for a lookup without touching shared state
    ///
    /// `None` means no stored key can have this encoding.
    fn encode_lookup(&self, value: &str) -> Result<Option<Vec<u8>>> {
        self.encode_to_vec(value).map(Some)
    }

    /// Decode a byte vector produced by [`StringCodec::encode_to_vec`]
    fn decode_from(&self, data: &[u8]) -> Result<String> {
        let mut offset = 0;
        self.decode(data, &mut offset)
    }
}

/// Build the codec for `profile`
///
/// The pool is only consulted by the optimized profile.
pub fn codec_for(profile: CodecProfile, pool: Arc<StringPool>) -> Arc<dyn StringCodec> {
    match profile {
        CodecProfile::Plain => Arc::new(PlainStringCodec),
        CodecProfile::Optimized => Arc::new(OptimizedStringCodec::new(pool)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "plain ascii",
        "lib/src/Widget.java[build",
        "lib/src/Widget.class[State",
        "pkg/Caf\u{e9}.java[na\u{ef}ve",
        "\u{65e5}\u{672c}\u{8a9e}",
        "emoji \u{1F600} outside the BMP",
        "control \u{0} and \u{1} and \u{7f}",
    ];

    #[test]
    fn test_round_trip_every_profile() -> Result<()> {
        for profile in [CodecProfile::Plain, CodecProfile::Optimized] {
            let codec = codec_for(profile, Arc::new(StringPool::new()));
            assert_eq!(codec.profile(), profile);
            for sample in SAMPLES {
                let bytes = codec.encode_to_vec(sample)?;
                assert_eq!(codec.decode_from(&bytes)?, *sample, "profile {}", profile);
            }
        }
        Ok(())
    }

    #[test]
    fn test_sequential_decoding_advances_offset() -> Result<()> {
        let codec = codec_for(CodecProfile::Optimized, Arc::new(StringPool::new()));
        let mut out = ByteArray::new();
        for sample in SAMPLES {
            codec.encode(sample, &mut out)?;
        }

        let mut offset = 0;
        for sample in SAMPLES {
            assert_eq!(codec.decode(out.data(), &mut offset)?, *sample);
        }
        assert_eq!(offset, out.len());
        Ok(())
    }

    #[test]
    fn test_profile_serialization() {
        assert_eq!(
            serde_json::to_string(&CodecProfile::Optimized).unwrap(),
            "\"optimized\""
        );
        assert_eq!(CodecProfile::default(), CodecProfile::Optimized);
    }
}
