//! Array of byte arrays with a length-prefixed serialization
//!
//! Format: `i32 count`, then for each entry `i32 length` followed by
//! `length` raw bytes. A stored length of 0 reads back as an absent entry,
//! so an empty entry and an absent one are indistinguishable on disk.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut};

/// Ordered list of optional byte arrays
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteArrayList {
    items: Vec<Option<Vec<u8>>>,
}

impl ByteArrayList {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Append an entry
    pub fn push(&mut self, item: Option<Vec<u8>>) {
        self.items.push(item);
    }

    /// Entry at `index`; `None` for both absent entries and out-of-range indices
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.items.get(index).and_then(|item| item.as_deref())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&[u8]>> + '_ {
        self.items.iter().map(|item| item.as_deref())
    }

    /// Number of bytes `write_to` will produce
    pub fn serialized_len(&self) -> usize {
        4 + self
            .items
            .iter()
            .map(|item| 4 + item.as_ref().map_or(0, Vec::len))
            .sum::<usize>()
    }

    /// Serialize into `out`
    pub fn write_to<B: BufMut>(&self, out: &mut B) -> Result<()> {
        out.put_i32(to_i32(self.items.len(), "entry count")?);
        for item in &self.items {
            match item {
                Some(bytes) => {
                    out.put_i32(to_i32(bytes.len(), "entry length")?);
                    out.put_slice(bytes);
                }
                None => out.put_i32(0),
            }
        }
        Ok(())
    }

    /// Serialize into a fresh vector
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.serialized_len());
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Deserialize exactly one list from the front of `buf`
    pub fn read_from<B: Buf>(buf: &mut B) -> Result<Self> {
        let count = read_len(buf, "entry count")?;
        // Never trust the count for preallocation beyond what the input can hold
        let mut items = Vec::with_capacity(count.min(buf.remaining() / 4));
        for index in 0..count {
            let len = read_len(buf, "entry length").map_err(|_| {
                Error::Corruption(format!(
                    "Byte array list truncated: expected {} entries, found {}",
                    count, index
                ))
            })?;
            if len == 0 {
                items.push(None);
                continue;
            }
            if buf.remaining() < len {
                return Err(Error::Corruption(format!(
                    "Entry {} declares {} bytes but only {} remain",
                    index,
                    len,
                    buf.remaining()
                )));
            }
            let mut bytes = vec![0u8; len];
            buf.copy_to_slice(&mut bytes);
            items.push(Some(bytes));
        }
        Ok(Self { items })
    }

    /// Deserialize from a byte slice
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        Self::read_from(&mut bytes)
    }
}

impl From<Vec<Option<Vec<u8>>>> for ByteArrayList {
    fn from(items: Vec<Option<Vec<u8>>>) -> Self {
        Self { items }
    }
}

impl FromIterator<Vec<u8>> for ByteArrayList {
    fn from_iter<T: IntoIterator<Item = Vec<u8>>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().map(Some).collect(),
        }
    }
}

fn to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::InvalidArgument(format!("{} {} exceeds i32 range", what, value)))
}

fn read_len<B: Buf>(buf: &mut B, what: &str) -> Result<usize> {
    if buf.remaining() < 4 {
        return Err(Error::Corruption(format!("Missing {}", what)));
    }
    let value = buf.get_i32();
    usize::try_from(value).map_err(|_| Error::Corruption(format!("Negative {}: {}", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_with_absent_and_empty_entries() -> Result<()> {
        let list = ByteArrayList::from(vec![
            Some(b"first".to_vec()),
            None,
            Some(Vec::new()),
            Some(vec![0, 1, 2, 255]),
            Some(b"last".to_vec()),
        ]);

        let bytes = list.to_bytes()?;
        assert_eq!(bytes.len(), list.serialized_len());

        let recovered = ByteArrayList::from_bytes(&bytes)?;
        assert_eq!(recovered.len(), 5);
        assert_eq!(recovered.get(0), Some(&b"first"[..]));
        assert_eq!(recovered.get(1), None);
        // Empty entries come back absent
        assert_eq!(recovered.get(2), None);
        assert_eq!(recovered.get(3), Some(&[0u8, 1, 2, 255][..]));
        assert_eq!(recovered.get(4), Some(&b"last"[..]));
        Ok(())
    }

    #[test]
    fn test_wire_layout() -> Result<()> {
        let list: ByteArrayList = vec![b"ab".to_vec()].into_iter().collect();
        assert_eq!(list.to_bytes()?, vec![0, 0, 0, 1, 0, 0, 0, 2, b'a', b'b']);
        Ok(())
    }

    #[test]
    fn test_truncated_input_is_corruption() -> Result<()> {
        let list: ByteArrayList = vec![b"one".to_vec(), b"two".to_vec()].into_iter().collect();
        let bytes = list.to_bytes()?;

        // Lose the second entry's payload
        let err = ByteArrayList::from_bytes(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));

        // Lose the second entry entirely
        let err = ByteArrayList::from_bytes(&bytes[..4 + 4 + 3]).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));

        // Missing count
        assert!(matches!(
            ByteArrayList::from_bytes(&[0, 0]),
            Err(Error::Corruption(_))
        ));
        Ok(())
    }

    #[test]
    fn test_negative_count_is_corruption() {
        let bytes = (-1i32).to_be_bytes();
        assert!(matches!(
            ByteArrayList::from_bytes(&bytes),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_read_from_leaves_trailing_bytes() -> Result<()> {
        let list: ByteArrayList = vec![b"x".to_vec()].into_iter().collect();
        let mut bytes = list.to_bytes()?;
        bytes.extend_from_slice(b"tail");

        let mut cursor = &bytes[..];
        let recovered = ByteArrayList::read_from(&mut cursor)?;
        assert_eq!(recovered, list);
        assert_eq!(cursor, b"tail");
        Ok(())
    }
}
