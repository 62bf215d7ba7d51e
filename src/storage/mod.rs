//! Storage layer
//!
//! # Architecture
//!
//! ```text
//! <root>/
//!   index.version              VersionMarker (JSON)
//!   data/
//!     strings.pool             new pool strings per commit
//!     layers/000-refs.log      edge reference-count deltas per layer
//!     files.log                file table changes = commit records
//! ```
//!
//! Every file is a [`frame`] log. A commit with sequence `n` appends at
//! most one frame to the pool log and to each touched layer log, then one
//! frame to `files.log`. Only sequences present in `files.log` are
//! committed; recovery skips frames of any other sequence and truncates
//! torn tails, so an interrupted commit leaves no trace.
//!
//! Compaction writes a fresh `data.compact/` directory and swaps it in.
//!
//! ## Storage Engine
//!
//! The [`IndexStorage`] trait is what a session talks to; a
//! [`StorageFactory`] chooses the implementation. [`IntegratedStorage`]
//! keeps the whole index in memory and the logs above on disk.

pub mod cache;
pub mod check;
pub mod compression;
pub mod frame;
pub mod integrated;
pub mod marker;
pub mod records;
pub mod state;

pub use cache::{CacheStats, Direction, ReadCache};
pub use check::{ConsistencyProblem, ConsistencyReport};
pub use compression::CompressionAlgorithm;
pub use integrated::{IntegratedStorage, LayerStats, StorageStats};
pub use marker::VersionMarker;

use crate::config::{Configuration, Fact, Layer};
use crate::error::Result;
use crate::progress::ProgressMonitor;
use crate::settings::IndexSettings;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// What one indexed source file contributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub path: String,
    pub mod_stamp: i64,
    /// Sorted
    pub facts: Vec<Fact>,
}

/// A change to one file's facts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileUpdate {
    /// Replace whatever the file contributed before
    Put {
        path: String,
        mod_stamp: i64,
        facts: Vec<Fact>,
    },
    Remove {
        path: String,
    },
}

/// Updates applied together by [`IndexStorage::commit`], in issue order
#[derive(Debug, Clone, Default)]
pub struct StorageTransaction {
    updates: Vec<FileUpdate>,
}

impl StorageTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_file(&mut self, path: impl Into<String>, mod_stamp: i64, facts: Vec<Fact>) {
        self.updates.push(FileUpdate::Put {
            path: path.into(),
            mod_stamp,
            facts,
        });
    }

    pub fn remove_file(&mut self, path: impl Into<String>) {
        self.updates.push(FileUpdate::Remove { path: path.into() });
    }

    pub fn updates(&self) -> &[FileUpdate] {
        &self.updates
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Outcome of a commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    /// Sequence number recorded on disk; that of the last commit if nothing changed
    pub sequence: u64,
    pub files_written: usize,
    pub files_removed: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
}

/// Persistent store behind an index session
///
/// Reads may run on any number of threads while one commit is in
/// progress. Every operation other than [`IndexStorage::load`],
/// [`IndexStorage::reset`] and [`IndexStorage::destroy`] requires loaded
/// storage and otherwise fails with `StorageUnavailable`.
pub trait IndexStorage: Send + Sync {
    fn root(&self) -> &Path;

    fn is_loaded(&self) -> bool;

    /// Recover the index from disk
    fn load(&self) -> Result<()>;

    /// Discard everything and start loaded and empty
    fn reset(&self) -> Result<()>;

    /// Delete the on-disk data; storage ends up unloaded
    fn destroy(&self) -> Result<()>;

    /// Persist outstanding writes and unload
    fn close(&self) -> Result<()>;

    fn commit(&self, transaction: StorageTransaction) -> Result<CommitSummary>;

    /// Sorted targets of edges leaving `source`
    fn targets(&self, layer: &Layer, source: &str) -> Result<Vec<String>>;

    /// Sorted sources of edges reaching `target`; reverse-edge layers only
    fn sources(&self, layer: &Layer, target: &str) -> Result<Vec<String>>;

    fn file_info(&self, path: &str) -> Result<Option<FileInfo>>;

    /// Sorted paths of every indexed file
    fn indexed_files(&self) -> Result<Vec<String>>;

    /// Force written logs to disk and drop cached reads
    fn flush(&self) -> Result<()>;

    /// Rewrite the logs without superseded records
    fn compact(&self) -> Result<()>;

    fn check_consistency(&self, monitor: &dyn ProgressMonitor) -> ConsistencyReport;

    fn stats(&self) -> StorageStats;
}

/// Chooses and creates the storage for a session
pub trait StorageFactory: Send + Sync {
    fn create(
        &self,
        root: &Path,
        configuration: Arc<Configuration>,
        settings: &IndexSettings,
    ) -> Result<Arc<dyn IndexStorage>>;
}

/// Creates an [`IntegratedStorage`]
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegratedStorageFactory;

impl StorageFactory for IntegratedStorageFactory {
    fn create(
        &self,
        root: &Path,
        configuration: Arc<Configuration>,
        settings: &IndexSettings,
    ) -> Result<Arc<dyn IndexStorage>> {
        settings.validate()?;
        Ok(Arc::new(IntegratedStorage::new(
            root,
            configuration,
            settings.clone(),
        )))
    }
}
