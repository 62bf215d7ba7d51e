//! Deduplicating string pool
//!
//! Hands out dense, non-negative ids for distinct strings. Storage persists
//! newly interned strings before any record that references them, so ids
//! stay valid across restarts.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::mem::size_of;
use std::sync::Arc;

/// Default maximum number of pooled strings
pub const DEFAULT_POOL_CAPACITY: usize = 1 << 24;

const ENTRY_OVERHEAD: usize = 2 * size_of::<Arc<str>>() + size_of::<i32>();

/// Shared pool of interned prefix strings
#[derive(Debug)]
pub struct StringPool {
    inner: RwLock<PoolInner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct PoolInner {
    ids: HashMap<Arc<str>, i32>,
    strings: Vec<Arc<str>>,
    string_bytes: usize,
    /// Entries below this index are already on disk
    persisted: usize,
}

impl StringPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }

    /// Create a pool holding at most `capacity` strings
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(PoolInner::default()),
            capacity: capacity.min(i32::MAX as usize),
        }
    }

    /// Return the id of `value`, adding it if it is new
    pub fn intern(&self, value: &str) -> Result<i32> {
        if let Some(&id) = self.inner.read().ids.get(value) {
            return Ok(id);
        }

        let mut inner = self.inner.write();
        // Another writer may have added it between the two locks
        if let Some(&id) = inner.ids.get(value) {
            return Ok(id);
        }
        if inner.strings.len() >= self.capacity {
            return Err(Error::Codec(format!(
                "String pool is full ({} entries)",
                self.capacity
            )));
        }

        let id = inner.strings.len() as i32;
        let shared: Arc<str> = Arc::from(value);
        inner.ids.insert(shared.clone(), id);
        inner.strings.push(shared);
        inner.string_bytes += value.len();
        Ok(id)
    }

    /// Id of `value` if it is already pooled
    pub fn id_of(&self, value: &str) -> Option<i32> {
        self.inner.read().ids.get(value).copied()
    }

    /// Look up the string behind `id`
    pub fn resolve(&self, id: i32) -> Option<Arc<str>> {
        let index = usize::try_from(id).ok()?;
        self.inner.read().strings.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate memory footprint in bytes
    pub fn mem_used(&self) -> usize {
        let inner = self.inner.read();
        inner.string_bytes + inner.strings.len() * ENTRY_OVERHEAD
    }

    /// Strings interned since the last [`StringPool::mark_persisted`], with the id of the first
    pub fn unpersisted(&self) -> (usize, Vec<Arc<str>>) {
        let inner = self.inner.read();
        (inner.persisted, inner.strings[inner.persisted..].to_vec())
    }

    /// Record that every entry below `count` is on disk
    pub fn mark_persisted(&self, count: usize) {
        let mut inner = self.inner.write();
        inner.persisted = count.min(inner.strings.len()).max(inner.persisted);
    }

    /// Every entry in id order
    pub fn snapshot(&self) -> Vec<Arc<str>> {
        self.inner.read().strings.clone()
    }

    /// Replace the contents with strings recovered from disk
    ///
    /// Duplicates are a sign of a damaged pool file.
    pub fn restore<I>(&self, strings: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let mut restored = PoolInner::default();
        for value in strings {
            let shared: Arc<str> = Arc::from(value);
            let id = restored.strings.len() as i32;
            if restored.ids.insert(shared.clone(), id).is_some() {
                return Err(Error::Corruption(format!(
                    "Duplicate pool entry '{}' at id {}",
                    shared, id
                )));
            }
            restored.string_bytes += shared.len();
            restored.strings.push(shared);
        }
        restored.persisted = restored.strings.len();
        *self.inner.write() = restored;
        Ok(())
    }

    /// Forget every entry
    pub fn clear(&self) {
        *self.inner.write() = PoolInner::default();
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() -> Result<()> {
        let pool = StringPool::new();
        let a = pool.intern("lib/a.java[")?;
        let b = pool.intern("lib/b.java[")?;
        assert_eq!(pool.intern("lib/a.java[")?, a);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.resolve(b).as_deref(), Some("lib/b.java["));
        assert!(pool.resolve(-1).is_none());
        assert!(pool.resolve(2).is_none());
        Ok(())
    }

    #[test]
    fn test_capacity_limit() -> Result<()> {
        let pool = StringPool::with_capacity(1);
        pool.intern("first")?;
        assert!(matches!(pool.intern("second"), Err(Error::Codec(_))));
        // Existing entries still resolve
        assert_eq!(pool.intern("first")?, 0);
        Ok(())
    }

    #[test]
    fn test_persistence_tracking() -> Result<()> {
        let pool = StringPool::new();
        pool.intern("one")?;
        pool.intern("two")?;
        let (start, pending) = pool.unpersisted();
        assert_eq!(start, 0);
        assert_eq!(pending.len(), 2);

        pool.mark_persisted(2);
        pool.intern("three")?;
        let (start, pending) = pool.unpersisted();
        assert_eq!(start, 2);
        assert_eq!(pending.iter().map(|s| &**s).collect::<Vec<_>>(), vec!["three"]);
        Ok(())
    }

    #[test]
    fn test_restore_rejects_duplicates() {
        let pool = StringPool::new();
        let err = pool
            .restore(vec!["x".to_string(), "x".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_restore_marks_everything_persisted() -> Result<()> {
        let pool = StringPool::new();
        pool.restore(vec!["a".to_string(), "b".to_string()])?;
        assert_eq!(pool.intern("b")?, 1);
        assert!(pool.unpersisted().1.is_empty());
        Ok(())
    }
}
