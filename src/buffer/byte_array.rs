//! Append-only byte buffer with doubling growth

use crate::error::{Error, Result};

/// Capacity of a freshly created buffer
pub const INITIAL_CAPACITY: usize = 16;

/// Append-only, growable byte buffer
///
/// The backing storage always has `capacity()` bytes; only the first
/// `len()` of them are populated. Growth doubles the capacity so appends
/// are amortized O(1).
#[derive(Debug, Clone)]
pub struct ByteArray {
    data: Vec<u8>,
    count: usize,
}

impl ByteArray {
    /// Create an empty buffer with the default initial capacity
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Create an empty buffer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            count: 0,
        }
    }

    /// Wrap already populated bytes
    pub fn from_vec(data: Vec<u8>) -> Self {
        let count = data.len();
        Self { data, count }
    }

    /// Append a single byte
    pub fn add(&mut self, byte: u8) {
        self.reserve(1);
        self.data[self.count] = byte;
        self.count += 1;
    }

    /// Append a run of bytes
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.data[self.count..self.count + bytes.len()].copy_from_slice(bytes);
        self.count += bytes.len();
    }

    /// Append a 32-bit integer
    pub fn add_int(&mut self, value: i32) {
        self.add_bytes(&value.to_be_bytes());
    }

    /// Append a 64-bit integer
    pub fn add_long(&mut self, value: i64) {
        self.add_bytes(&value.to_be_bytes());
    }

    /// Populated bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.count]
    }

    /// Number of populated bytes
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Size of the backing storage
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Trim the backing storage to the populated length
    ///
    /// The first call compacts, later calls return the same slice.
    pub fn to_array(&mut self) -> &[u8] {
        if self.data.len() != self.count {
            self.data.truncate(self.count);
            self.data.shrink_to_fit();
        }
        &self.data
    }

    /// Consume the buffer, returning only the populated bytes
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.count);
        self.data
    }

    /// Drop everything after `len` bytes
    pub fn truncate(&mut self, len: usize) {
        self.count = self.count.min(len);
    }

    /// Read the byte at `offset`
    pub fn byte_at(&self, offset: usize) -> Result<u8> {
        self.data()
            .get(offset)
            .copied()
            .ok_or_else(|| out_of_bounds(offset, 1, self.count))
    }

    /// Read a 32-bit integer starting at `offset`
    pub fn int_at(&self, offset: usize) -> Result<i32> {
        let bytes = self.slice(offset, 4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 64-bit integer starting at `offset`
    pub fn long_at(&self, offset: usize) -> Result<i64> {
        let bytes = self.slice(offset, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(raw))
    }

    /// Borrow `len` populated bytes starting at `offset`
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data().get(offset..end))
            .ok_or_else(|| out_of_bounds(offset, len, self.count))
    }

    fn reserve(&mut self, additional: usize) {
        let needed = self.count + additional;
        if needed <= self.data.len() {
            return;
        }
        let mut capacity = self.data.len().max(1);
        while capacity < needed {
            capacity *= 2;
        }
        self.data.resize(capacity, 0);
    }
}

fn out_of_bounds(offset: usize, len: usize, count: usize) -> Error {
    Error::Corruption(format!(
        "Read of {} bytes at offset {} past end of {}-byte buffer",
        len, offset, count
    ))
}

impl Default for ByteArray {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ByteArray {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}

impl Eq for ByteArray {}

impl AsRef<[u8]> for ByteArray {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}
