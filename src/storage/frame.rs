//! Checksummed frame log
//!
//! Every storage file is a sequence of frames appended atomically per
//! commit, in the manner of a metadata batch log:
//!
//! ```text
//! [u32 len][u8 compression][u64 sequence][stored payload: len][u32 checksum]
//! ```
//!
//! Integers are little-endian. The checksum covers the compression tag,
//! the sequence and the stored payload. Recovery reads frames in order and
//! stops at the first one that is short or fails its checksum. Only a bad
//! frame reaching the end of the file is a torn tail; a bad frame with
//! more data behind it is corruption.

use super::compression::{compress, decompress, CompressionAlgorithm, MIN_COMPRESS_LEN};
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const FRAME_HEADER_LEN: usize = 4 + 1 + 8;
pub const FRAME_TRAILER_LEN: usize = 4;

/// Stored payloads above this size are treated as a damaged header
pub const MAX_FRAME_LEN: usize = 1 << 30;

/// One decoded batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(sequence: u64, payload: Vec<u8>) -> Self {
        Self { sequence, payload }
    }

    /// Serialize with header and checksum
    pub fn to_bytes(&self, compression: CompressionAlgorithm) -> Result<Vec<u8>> {
        let algorithm = if self.payload.len() < MIN_COMPRESS_LEN {
            CompressionAlgorithm::None
        } else {
            compression
        };
        let stored = compress(&self.payload, algorithm)?;
        if stored.len() > MAX_FRAME_LEN {
            return Err(Error::InvalidArgument(format!(
                "Batch of {} bytes exceeds the frame limit",
                stored.len()
            )));
        }

        let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + stored.len() + FRAME_TRAILER_LEN);
        out.put_u32_le(stored.len() as u32);
        out.put_u8(algorithm.tag());
        out.put_u64_le(self.sequence);
        out.put_slice(&stored);
        out.put_u32_le(checksum(algorithm.tag(), self.sequence, &stored));
        Ok(out.to_vec())
    }

    /// Parse the frame at the front of `bytes`, returning it and its encoded length
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut buf = bytes;
        if buf.remaining() < FRAME_HEADER_LEN {
            return Err(Error::Corruption(format!(
                "Frame header truncated: {} bytes",
                buf.remaining()
            )));
        }

        let len = buf.get_u32_le() as usize;
        let tag = buf.get_u8();
        let sequence = buf.get_u64_le();
        if len > MAX_FRAME_LEN {
            return Err(Error::Corruption(format!("Implausible frame length {}", len)));
        }
        if buf.remaining() < len + FRAME_TRAILER_LEN {
            return Err(Error::Corruption(format!(
                "Incomplete frame: expected {} bytes, got {}",
                len + FRAME_TRAILER_LEN,
                buf.remaining()
            )));
        }

        let stored = &buf[..len];
        buf.advance(len);
        let stored_checksum = buf.get_u32_le();
        let computed = checksum(tag, sequence, stored);
        if stored_checksum != computed {
            return Err(Error::Corruption(format!(
                "Checksum mismatch in frame {}: stored {:08x}, computed {:08x}",
                sequence, stored_checksum, computed
            )));
        }

        let payload = decompress(stored, CompressionAlgorithm::from_tag(tag)?)?;
        Ok((
            Self { sequence, payload },
            FRAME_HEADER_LEN + len + FRAME_TRAILER_LEN,
        ))
    }
}

/// 32-bit FNV-1a over the checksummed fields
fn checksum(tag: u8, sequence: u64, payload: &[u8]) -> u32 {
    std::iter::once(tag)
        .chain(sequence.to_le_bytes())
        .chain(payload.iter().copied())
        .fold(0x811c_9dc5u32, |acc, b| (acc ^ b as u32).wrapping_mul(0x0100_0193))
}

/// Outcome of reading a log from the start
#[derive(Debug, Default)]
pub struct ScanResult {
    pub frames: Vec<Frame>,
    /// Length of the intact prefix
    pub valid_len: u64,
    /// Why reading stopped early, if it did
    pub damage: Option<String>,
    /// The damaged frame runs to the end of the input
    pub torn_tail: bool,
}

/// Whether a frame starting at the front of `rest` claims every remaining byte
fn reaches_end(rest: &[u8]) -> bool {
    if rest.len() < FRAME_HEADER_LEN {
        return true;
    }
    let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
    FRAME_HEADER_LEN + len + FRAME_TRAILER_LEN >= rest.len()
}

/// Decode every intact frame in `bytes`
pub fn scan(bytes: &[u8]) -> ScanResult {
    let mut result = ScanResult::default();
    let mut offset = 0usize;
    while offset < bytes.len() {
        match Frame::from_bytes(&bytes[offset..]) {
            Ok((frame, consumed)) => {
                result.frames.push(frame);
                offset += consumed;
            }
            Err(e) => {
                result.damage = Some(e.to_string());
                result.torn_tail = reaches_end(&bytes[offset..]);
                break;
            }
        }
    }
    result.valid_len = offset as u64;
    result
}

/// Read and scan the log at `path` without modifying it
///
/// A missing file reads as empty.
pub fn scan_file(path: &Path) -> Result<ScanResult> {
    match fs::read(path) {
        Ok(bytes) => Ok(scan(&bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(ScanResult::default()),
        Err(e) => Err(e.into()),
    }
}

/// Append-only log of frames
#[derive(Debug)]
pub struct FrameLog {
    path: PathBuf,
    file: File,
    len: u64,
}

impl FrameLog {
    /// Open or create the log, returning every frame that survived recovery
    ///
    /// A torn tail is truncated so later appends start on a frame boundary.
    /// Damage followed by further data is `Corruption` and leaves the file
    /// untouched.
    pub fn open(path: &Path) -> Result<(Self, Vec<Frame>)> {
        let scanned = scan_file(path)?;
        if let (Some(reason), false) = (&scanned.damage, scanned.torn_tail) {
            return Err(Error::Corruption(format!(
                "{}: damaged frame at byte {} is not at the end of the log: {}",
                path.display(),
                scanned.valid_len,
                reason
            )));
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();

        if let Some(reason) = &scanned.damage {
            warn!(
                path = ?path,
                valid = scanned.valid_len,
                discarded = on_disk.saturating_sub(scanned.valid_len),
                reason = %reason,
                "Truncating torn log tail"
            );
            file.set_len(scanned.valid_len)?;
            file.sync_all()?;
        }

        debug!(path = ?path, frames = scanned.frames.len(), "Opened frame log");
        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                len: scanned.valid_len,
            },
            scanned.frames,
        ))
    }

    /// Create a log at `path` holding exactly `contents`, synced to disk
    pub fn create(path: &Path, contents: &[u8]) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: contents.len() as u64,
        })
    }

    /// Append encoded frames
    ///
    /// On error part of `bytes` may have reached the file; the caller
    /// restores the previous length with [`FrameLog::truncate_to`].
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    pub fn truncate_to(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        self.len = len;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn encoded(sequence: u64, payload: &[u8]) -> Result<Vec<u8>> {
        Frame::new(sequence, payload.to_vec()).to_bytes(CompressionAlgorithm::Zstd)
    }

    #[test]
    fn test_frame_serialization() -> Result<()> {
        let big = b"lib/a.java[x".repeat(100);
        for payload in [&b"small"[..], &big[..], &[][..]] {
            let bytes = encoded(42, payload)?;
            let (frame, consumed) = Frame::from_bytes(&bytes)?;
            assert_eq!(consumed, bytes.len());
            assert_eq!(frame.sequence, 42);
            assert_eq!(frame.payload, payload);
        }
        Ok(())
    }

    #[test]
    fn test_checksum_detects_bit_flip() -> Result<()> {
        let mut bytes = encoded(7, b"payload")?;
        bytes[FRAME_HEADER_LEN + 2] ^= 0x01;
        assert!(matches!(Frame::from_bytes(&bytes), Err(Error::Corruption(_))));
        Ok(())
    }

    #[test]
    fn test_log_recovery() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("files.log");

        {
            let (mut log, frames) = FrameLog::open(&path)?;
            assert!(frames.is_empty());
            log.append(&encoded(1, b"one")?)?;
            log.append(&encoded(2, b"two")?)?;
            log.sync()?;
        }

        let (log, frames) = FrameLog::open(&path)?;
        assert_eq!(frames.iter().map(|f| f.sequence).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(log.len(), fs::metadata(&path)?.len());
        Ok(())
    }

    #[test]
    fn test_torn_tail_is_truncated() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("layer.log");
        let good = encoded(1, b"complete")?;
        let torn = encoded(2, b"never finished")?;

        let mut contents = good.clone();
        contents.extend_from_slice(&torn[..torn.len() / 2]);
        fs::write(&path, &contents)?;

        let (mut log, frames) = FrameLog::open(&path)?;
        assert_eq!(frames.len(), 1);
        assert_eq!(fs::metadata(&path)?.len(), good.len() as u64);

        // Appends after recovery land on a clean boundary
        log.append(&encoded(3, b"after")?)?;
        drop(log);
        let (_, frames) = FrameLog::open(&path)?;
        assert_eq!(frames.iter().map(|f| f.sequence).collect::<Vec<_>>(), vec![1, 3]);
        Ok(())
    }

    #[test]
    fn test_truncate_to_rolls_back() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("strings.pool");
        let (mut log, _) = FrameLog::open(&path)?;
        log.append(&encoded(1, b"kept")?)?;
        let mark = log.len();
        log.append(&encoded(2, b"dropped")?)?;
        log.truncate_to(mark)?;
        drop(log);

        let scanned = scan_file(&path)?;
        assert_eq!(scanned.frames.len(), 1);
        assert!(scanned.damage.is_none());
        Ok(())
    }

    #[test]
    fn test_damage_before_the_tail_is_corruption() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("files.log");
        let mut contents = encoded(1, b"first commit")?;
        contents.extend(encoded(2, b"second commit")?);
        contents.extend(encoded(3, b"third commit")?);
        contents[FRAME_HEADER_LEN + 3] ^= 0x40;
        fs::write(&path, &contents)?;

        let scanned = scan_file(&path)?;
        assert!(scanned.damage.is_some());
        assert!(!scanned.torn_tail);

        assert!(matches!(FrameLog::open(&path), Err(Error::Corruption(_))));
        // The evidence stays on disk
        assert_eq!(fs::read(&path)?, contents);
        Ok(())
    }

    #[test]
    fn test_bad_checksum_in_last_frame_is_a_torn_tail() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("files.log");
        let good = encoded(1, b"kept")?;
        let mut last = encoded(2, b"garbled on the way down")?;
        let end = last.len() - 1;
        last[end] ^= 0xff;
        let mut contents = good.clone();
        contents.extend(last);
        fs::write(&path, &contents)?;

        let (_, frames) = FrameLog::open(&path)?;
        assert_eq!(frames.len(), 1);
        assert_eq!(fs::metadata(&path)?.len(), good.len() as u64);
        Ok(())
    }
}
