//! Prefix-sharing codec for qualified names
//!
//! Keys look like `<defining file>.java[<member>` or
//! `<defining file>.class[<member>`. Everything up to and including the
//! marker is interned once; each key then costs four bytes plus its member
//! suffix.

use super::plain::PlainStringCodec;
use super::pool::StringPool;
use super::{CodecProfile, StringCodec};
use crate::buffer::ByteArray;
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::warn;

/// Written instead of a pool id when the string has no shared prefix
pub const NO_PREFIX: i32 = -2;

const PREFIX_MARKERS: [&str; 2] = [".java[", ".class["];

/// Optimized string codec backed by a shared [`StringPool`]
#[derive(Debug, Clone)]
pub struct OptimizedStringCodec {
    pool: Arc<StringPool>,
    plain: PlainStringCodec,
}

impl OptimizedStringCodec {
    pub fn new(pool: Arc<StringPool>) -> Self {
        Self {
            pool,
            plain: PlainStringCodec,
        }
    }

    pub fn pool(&self) -> &Arc<StringPool> {
        &self.pool
    }

    /// Byte index just past the earliest marker, if any
    fn prefix_end(value: &str) -> Option<usize> {
        PREFIX_MARKERS
            .iter()
            .filter_map(|marker| value.find(marker).map(|start| (start, start + marker.len())))
            .min_by_key(|&(start, _)| start)
            .map(|(_, end)| end)
    }
}

impl StringCodec for OptimizedStringCodec {
    fn encode(&self, value: &str, out: &mut ByteArray) -> Result<()> {
        let mark = out.len();
        let result = match Self::prefix_end(value) {
            Some(end) => {
                let id = self.pool.intern(&value[..end]).map_err(|e| {
                    warn!(prefix = %&value[..end], error = %e, "Failed to intern key prefix");
                    e
                })?;
                out.add_int(id);
                self.plain.encode(&value[end..], out)
            }
            None => {
                out.add_int(NO_PREFIX);
                self.plain.encode(value, out)
            }
        };
        if result.is_err() {
            out.truncate(mark);
        }
        result
    }

    fn encode_lookup(&self, value: &str) -> Result<Option<Vec<u8>>> {
        let (id, rest) = match Self::prefix_end(value) {
            Some(end) => match self.pool.id_of(&value[..end]) {
                Some(id) => (id, &value[end..]),
                None => return Ok(None),
            },
            None => (NO_PREFIX, value),
        };
        let mut out = ByteArray::with_capacity(rest.len() + 8);
        out.add_int(id);
        self.plain.encode(rest, &mut out)?;
        Ok(Some(out.into_vec()))
    }

    fn decode(&self, data: &[u8], offset: &mut usize) -> Result<String> {
        let start = *offset;
        let header = data.get(start..start + 4).ok_or_else(|| {
            Error::Corruption(format!("Missing pool reference at offset {}", start))
        })?;
        let id = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);

        let mut pos = start + 4;
        let decoded = if id == NO_PREFIX {
            self.plain.decode(data, &mut pos)?
        } else {
            let prefix = self.pool.resolve(id).ok_or_else(|| {
                Error::Corruption(format!("Unknown pool id {} at offset {}", id, start))
            })?;
            let suffix = self.plain.decode(data, &mut pos)?;
            let mut full = String::with_capacity(prefix.len() + suffix.len());
            full.push_str(&prefix);
            full.push_str(&suffix);
            full
        };

        *offset = pos;
        Ok(decoded)
    }

    fn mem_used(&self) -> usize {
        self.pool.mem_used()
    }

    fn profile(&self) -> CodecProfile {
        CodecProfile::Optimized
    }
}
