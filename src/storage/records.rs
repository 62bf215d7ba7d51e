//! Payload formats of the three kinds of log
//!
//! ```text
//! layer   [i32 n] n × ([i32 delta][key source][key target])
//! files   [i32 n] n × ([u8 3][str path][i64 stamp][i32 m] m × [i32 ordinal][key source][key target]
//!                    | [u8 4][str path])
//! pool    [i32 first id][ByteArrayList of new strings]
//! ```
//!
//! `key` is an `i32` length followed by codec-encoded bytes, `str` the same
//! with UTF-8. Integers are big-endian, matching [`ByteArray`].

use crate::buffer::{ByteArray, ByteArrayList};
use crate::error::{Error, Result};
use bytes::Buf;

const OP_PUT_FILE: u8 = 3;
const OP_REMOVE_FILE: u8 = 4;

/// Codec-encoded location bytes
pub type Key = Box<[u8]>;

/// Reference-count change of one edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeOp {
    pub delta: i32,
    pub source: Key,
    pub target: Key,
}

/// A fact as stored: layer ordinal plus encoded endpoints
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoredFact {
    pub ordinal: u32,
    pub source: Key,
    pub target: Key,
}

/// Change to the file table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Put {
        path: String,
        mod_stamp: i64,
        facts: Vec<StoredFact>,
    },
    Remove {
        path: String,
    },
}

impl FileOp {
    pub fn path(&self) -> &str {
        match self {
            FileOp::Put { path, .. } | FileOp::Remove { path } => path,
        }
    }
}

/// New pool strings, starting at id `first_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolBatch {
    pub first_id: usize,
    pub strings: Vec<String>,
}

pub fn encode_edges(ops: &[EdgeOp]) -> Result<Vec<u8>> {
    let mut out = ByteArray::with_capacity(4 + ops.len() * 24);
    out.add_int(count(ops.len())?);
    for op in ops {
        out.add_int(op.delta);
        put_bytes(&mut out, &op.source)?;
        put_bytes(&mut out, &op.target)?;
    }
    Ok(out.into_vec())
}

pub fn decode_edges(payload: &[u8]) -> Result<Vec<EdgeOp>> {
    let mut buf = payload;
    let n = get_count(&mut buf)?;
    let mut ops = Vec::with_capacity(n.min(buf.remaining() / 12));
    for _ in 0..n {
        let delta = get_i32(&mut buf)?;
        let source = get_bytes(&mut buf)?;
        let target = get_bytes(&mut buf)?;
        ops.push(EdgeOp {
            delta,
            source,
            target,
        });
    }
    expect_end(buf, "layer batch")?;
    Ok(ops)
}

pub fn encode_files(ops: &[FileOp]) -> Result<Vec<u8>> {
    let mut out = ByteArray::new();
    out.add_int(count(ops.len())?);
    for op in ops {
        match op {
            FileOp::Put {
                path,
                mod_stamp,
                facts,
            } => {
                out.add(OP_PUT_FILE);
                put_bytes(&mut out, path.as_bytes())?;
                out.add_long(*mod_stamp);
                out.add_int(count(facts.len())?);
                for fact in facts {
                    out.add_int(fact.ordinal as i32);
                    put_bytes(&mut out, &fact.source)?;
                    put_bytes(&mut out, &fact.target)?;
                }
            }
            FileOp::Remove { path } => {
                out.add(OP_REMOVE_FILE);
                put_bytes(&mut out, path.as_bytes())?;
            }
        }
    }
    Ok(out.into_vec())
}

pub fn decode_files(payload: &[u8]) -> Result<Vec<FileOp>> {
    let mut buf = payload;
    let n = get_count(&mut buf)?;
    let mut ops = Vec::with_capacity(n.min(buf.remaining() / 5));
    for _ in 0..n {
        if !buf.has_remaining() {
            return Err(Error::Corruption("File batch truncated".to_string()));
        }
        let op = match buf.get_u8() {
            OP_PUT_FILE => {
                let path = get_string(&mut buf)?;
                let mod_stamp = get_i64(&mut buf)?;
                let m = get_count(&mut buf)?;
                let mut facts = Vec::with_capacity(m.min(buf.remaining() / 12));
                for _ in 0..m {
                    let ordinal = get_i32(&mut buf)?;
                    let ordinal = u32::try_from(ordinal).map_err(|_| {
                        Error::Corruption(format!("Negative layer ordinal {}", ordinal))
                    })?;
                    facts.push(StoredFact {
                        ordinal,
                        source: get_bytes(&mut buf)?,
                        target: get_bytes(&mut buf)?,
                    });
                }
                FileOp::Put {
                    path,
                    mod_stamp,
                    facts,
                }
            }
            OP_REMOVE_FILE => FileOp::Remove {
                path: get_string(&mut buf)?,
            },
            other => {
                return Err(Error::Corruption(format!("Unknown file op {}", other)));
            }
        };
        ops.push(op);
    }
    expect_end(buf, "file batch")?;
    Ok(ops)
}

pub fn encode_pool(batch: &PoolBatch) -> Result<Vec<u8>> {
    let list: ByteArrayList = batch
        .strings
        .iter()
        .map(|s| s.as_bytes().to_vec())
        .collect();
    let mut out = ByteArray::with_capacity(4 + list.serialized_len());
    out.add_int(count(batch.first_id)?);
    out.add_bytes(&list.to_bytes()?);
    Ok(out.into_vec())
}

pub fn decode_pool(payload: &[u8]) -> Result<PoolBatch> {
    let mut buf = payload;
    let first_id = get_count(&mut buf)?;
    let list = ByteArrayList::read_from(&mut buf)?;
    expect_end(buf, "pool batch")?;

    let strings = list
        .iter()
        .map(|entry| {
            String::from_utf8(entry.map(<[u8]>::to_vec).unwrap_or_default())
                .map_err(|e| Error::Corruption(format!("Pool entry is not UTF-8: {}", e)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PoolBatch { first_id, strings })
}

fn count(n: usize) -> Result<i32> {
    i32::try_from(n).map_err(|_| Error::InvalidArgument(format!("Batch count {} too large", n)))
}

fn put_bytes(out: &mut ByteArray, bytes: &[u8]) -> Result<()> {
    out.add_int(count(bytes.len())?);
    out.add_bytes(bytes);
    Ok(())
}

fn get_i32(buf: &mut &[u8]) -> Result<i32> {
    if buf.remaining() < 4 {
        return Err(Error::Corruption("Batch truncated reading i32".to_string()));
    }
    Ok(buf.get_i32())
}

fn get_i64(buf: &mut &[u8]) -> Result<i64> {
    if buf.remaining() < 8 {
        return Err(Error::Corruption("Batch truncated reading i64".to_string()));
    }
    Ok(buf.get_i64())
}

fn get_count(buf: &mut &[u8]) -> Result<usize> {
    let n = get_i32(buf)?;
    usize::try_from(n).map_err(|_| Error::Corruption(format!("Negative count {}", n)))
}

fn get_bytes(buf: &mut &[u8]) -> Result<Key> {
    let len = get_count(buf)?;
    if buf.remaining() < len {
        return Err(Error::Corruption(format!(
            "Batch truncated: need {} bytes, have {}",
            len,
            buf.remaining()
        )));
    }
    let bytes: Key = buf[..len].into();
    buf.advance(len);
    Ok(bytes)
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    String::from_utf8(get_bytes(buf)?.into_vec())
        .map_err(|e| Error::Corruption(format!("Path is not UTF-8: {}", e)))
}

fn expect_end(buf: &[u8], what: &str) -> Result<()> {
    if buf.is_empty() {
        Ok(())
    } else {
        Err(Error::Corruption(format!(
            "{} bytes of trailing data in {}",
            buf.len(),
            what
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        s.as_bytes().into()
    }

    #[test]
    fn test_edge_batch() -> Result<()> {
        let ops = vec![
            EdgeOp {
                delta: 1,
                source: key("a"),
                target: key("b"),
            },
            EdgeOp {
                delta: -2,
                source: key(""),
                target: key("c"),
            },
        ];
        assert_eq!(decode_edges(&encode_edges(&ops)?)?, ops);
        Ok(())
    }

    #[test]
    fn test_file_batch() -> Result<()> {
        let ops = vec![
            FileOp::Put {
                path: "lib/a.dart".to_string(),
                mod_stamp: -5,
                facts: vec![StoredFact {
                    ordinal: 1,
                    source: key("s"),
                    target: key("t"),
                }],
            },
            FileOp::Remove {
                path: "lib/\u{e9}.dart".to_string(),
            },
        ];
        assert_eq!(decode_files(&encode_files(&ops)?)?, ops);
        Ok(())
    }

    #[test]
    fn test_pool_batch() -> Result<()> {
        let batch = PoolBatch {
            first_id: 3,
            strings: vec!["a.java[".to_string(), "b.class[".to_string()],
        };
        assert_eq!(decode_pool(&encode_pool(&batch)?)?, batch);
        Ok(())
    }

    #[test]
    fn test_truncated_and_trailing_data() -> Result<()> {
        let bytes = encode_edges(&[EdgeOp {
            delta: 1,
            source: key("src"),
            target: key("dst"),
        }])?;
        assert!(matches!(
            decode_edges(&bytes[..bytes.len() - 1]),
            Err(Error::Corruption(_))
        ));

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(decode_edges(&padded), Err(Error::Corruption(_))));

        assert!(matches!(decode_files(&[0, 0, 0, 1, 9]), Err(Error::Corruption(_))));
        Ok(())
    }
}
