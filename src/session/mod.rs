//! Index sessions
//!
//! # Architecture
//!
//! ```text
//! SessionRegistry ── at most one live lease
//!   └─→ IndexSession (absent → live → disposed)
//!        ├─→ Index             read handle, any number of threads
//!        ├─→ IndexTransaction  buffered writes, one commit at a time
//!        └─→ IndexStorage      from a StorageFactory
//! ```
//!
//! Every operation on a disposed session fails with `SessionDisposed`.

pub mod index;
pub mod registry;
pub mod transaction;

pub use index::Index;
pub use registry::{SessionLease, SessionRegistry};
pub use transaction::IndexTransaction;

use crate::config::{Configuration, ProcessorTimingSnapshot};
use crate::error::{Error, Result};
use crate::progress::ProgressMonitor;
use crate::settings::IndexSettings;
use crate::storage::{
    ConsistencyReport, IndexStorage, IntegratedStorageFactory, StorageFactory, StorageStats,
    VersionMarker,
};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Statistics gathered from a live session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: u64,
    pub root: PathBuf,
    pub storage: StorageStats,
    pub processors: Vec<ProcessorTimingSnapshot>,
}

struct Live {
    storage: Arc<dyn IndexStorage>,
    _lease: SessionLease,
}

/// The single live connection to an on-disk index
pub struct IndexSession {
    id: u64,
    root: PathBuf,
    configuration: Arc<Configuration>,
    settings: IndexSettings,
    live: Option<Live>,
}

impl IndexSession {
    /// Open a session on the process-wide registry with default storage
    pub fn open(root: impl AsRef<Path>, configuration: Arc<Configuration>) -> Result<Self> {
        Self::open_with(
            &SessionRegistry::process(),
            root,
            configuration,
            &IntegratedStorageFactory,
            IndexSettings::default(),
        )
    }

    /// Open a session with an explicit registry, storage factory and settings
    pub fn open_with(
        registry: &Arc<SessionRegistry>,
        root: impl AsRef<Path>,
        configuration: Arc<Configuration>,
        factory: &dyn StorageFactory,
        settings: IndexSettings,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let lease = registry.try_acquire()?;
        let storage = factory.create(&root, configuration.clone(), &settings)?;
        let id = lease.session_id();

        info!(
            session_id = id,
            root = ?root,
            layers = configuration.layers().len(),
            processors = configuration.processors().len(),
            "Opened index session"
        );
        Ok(Self {
            id,
            root,
            configuration,
            settings,
            live: Some(Live {
                storage,
                _lease: lease,
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn is_disposed(&self) -> bool {
        self.live.is_none()
    }

    fn storage(&self) -> Result<&Arc<dyn IndexStorage>> {
        self.live
            .as_ref()
            .map(|live| &live.storage)
            .ok_or(Error::SessionDisposed(self.id))
    }

    fn expected_marker(&self) -> VersionMarker {
        VersionMarker::for_configuration(&self.configuration, self.settings.codec)
    }

    /// A read-only index with no contents; does no I/O
    pub fn create_empty_index(&self) -> Result<Index> {
        self.storage()?;
        Ok(Index::empty(self.configuration.clone()))
    }

    /// Destroy whatever is on disk and start a fresh index
    ///
    /// The marker is removed first and written last, so an interruption
    /// leaves an index that asks to be rebuilt.
    pub fn create_new_index(&self) -> Result<Index> {
        let storage = self.storage()?;
        VersionMarker::remove(&self.root).map_err(unavailable)?;
        storage.reset().map_err(unavailable)?;
        self.expected_marker().write(&self.root)?;

        info!(session_id = self.id, root = ?self.root, "Created new index");
        Ok(Index::new(storage.clone(), self.configuration.clone()))
    }

    /// Open the index on disk if it was written with this exact configuration
    pub fn open_existing_index(&self) -> Result<Index> {
        let storage = self.storage()?;
        let marker = VersionMarker::read(&self.root)?
            .ok_or_else(|| Error::RequiresFullRebuild("no version marker".to_string()))?;
        if let Some(reason) = marker.mismatch(&self.expected_marker()) {
            warn!(session_id = self.id, root = ?self.root, reason = %reason, "Index needs a rebuild");
            return Err(Error::RequiresFullRebuild(reason));
        }

        storage.load().map_err(|e| match e {
            Error::Corruption(reason) => {
                warn!(session_id = self.id, reason = %reason, "Index is corrupted");
                Error::RequiresFullRebuild(reason)
            }
            Error::Io(io) => Error::StorageUnavailable(io.to_string()),
            other => other,
        })?;

        info!(
            session_id = self.id,
            root = ?self.root,
            created_at = %marker.created_at,
            "Opened existing index"
        );
        Ok(Index::new(storage.clone(), self.configuration.clone()))
    }

    /// Start buffering changes; the index must be loaded
    pub fn create_transaction(&self) -> Result<IndexTransaction> {
        let storage = self.storage()?;
        if !storage.is_loaded() {
            return Err(Error::StorageUnavailable("index is not loaded".to_string()));
        }
        Ok(IndexTransaction::new(
            self.id,
            storage.clone(),
            self.configuration.clone(),
        ))
    }

    /// Delete the index data and its marker
    pub fn destroy_index(&self) -> Result<()> {
        let storage = self.storage()?;
        storage.destroy()?;
        VersionMarker::remove(&self.root)?;
        info!(session_id = self.id, root = ?self.root, "Destroyed index");
        Ok(())
    }

    /// Force written data to disk and drop cached reads
    pub fn flush_caches(&self) -> Result<()> {
        self.storage()?.flush()
    }

    /// Rewrite the logs without superseded records
    pub fn compact(&self) -> Result<()> {
        self.storage()?.compact()
    }

    /// Check the index, reporting rather than failing on damage
    pub fn run_consistency_check(&self, monitor: &dyn ProgressMonitor) -> Result<ConsistencyReport> {
        Ok(self.storage()?.check_consistency(monitor))
    }

    /// Run the consistency check on the blocking thread pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_consistency_check(
        &self,
        monitor: Arc<dyn ProgressMonitor>,
    ) -> Result<JoinHandle<ConsistencyReport>> {
        let storage = self.storage()?.clone();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::InvalidArgument(format!("no tokio runtime: {}", e)))?;
        Ok(runtime.spawn_blocking(move || storage.check_consistency(monitor.as_ref())))
    }

    pub fn gather_statistics(&self) -> Result<SessionStats> {
        Ok(SessionStats {
            session_id: self.id,
            root: self.root.clone(),
            storage: self.storage()?.stats(),
            processors: self.configuration.processor_timings(),
        })
    }

    /// Release storage and the live-session slot
    ///
    /// Storage is released even when closing it fails.
    pub fn dispose(&mut self) -> Result<()> {
        let live = self.live.take().ok_or(Error::SessionDisposed(self.id))?;
        let closed = live.storage.close();
        drop(live);
        info!(session_id = self.id, "Disposed index session");
        closed
    }
}

fn unavailable(e: Error) -> Error {
    match e {
        Error::Io(io) => Error::StorageUnavailable(io.to_string()),
        other => other,
    }
}

impl Drop for IndexSession {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            if let Err(e) = live.storage.close() {
                warn!(session_id = self.id, error = %e, "Failed to close storage of dropped session");
            }
        }
    }
}

impl fmt::Debug for IndexSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSession")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigurationBuilder, Fact, LayerInfo};
    use crate::progress::{CancellationMonitor, NullMonitor};
    use tempfile::TempDir;

    fn configuration() -> Result<Arc<Configuration>> {
        let mut builder = ConfigurationBuilder::new();
        builder.add_layer(LayerInfo::new("refs"))?;
        Ok(Arc::new(builder.build()?))
    }

    fn session(registry: &Arc<SessionRegistry>, root: &Path) -> Result<IndexSession> {
        IndexSession::open_with(
            registry,
            root,
            configuration()?,
            &IntegratedStorageFactory,
            IndexSettings::default(),
        )
    }

    #[test]
    fn test_single_live_session() -> Result<()> {
        let dir = TempDir::new()?;
        let registry = Arc::new(SessionRegistry::new());
        let mut first = session(&registry, dir.path())?;
        assert!(matches!(
            session(&registry, dir.path()),
            Err(Error::ConcurrentSession)
        ));

        first.dispose()?;
        let second = session(&registry, dir.path())?;
        assert!(second.id() > first.id());
        Ok(())
    }

    #[test]
    fn test_disposed_session_rejects_everything() -> Result<()> {
        let dir = TempDir::new()?;
        let registry = Arc::new(SessionRegistry::new());
        let mut session = session(&registry, dir.path())?;
        let id = session.id();
        session.dispose()?;

        assert!(matches!(session.dispose(), Err(Error::SessionDisposed(n)) if n == id));
        assert!(matches!(session.create_empty_index(), Err(Error::SessionDisposed(_))));
        assert!(matches!(session.create_new_index(), Err(Error::SessionDisposed(_))));
        assert!(matches!(session.create_transaction(), Err(Error::SessionDisposed(_))));
        assert!(matches!(session.flush_caches(), Err(Error::SessionDisposed(_))));
        assert!(matches!(session.gather_statistics(), Err(Error::SessionDisposed(_))));
        assert!(matches!(
            session.run_consistency_check(&NullMonitor),
            Err(Error::SessionDisposed(_))
        ));
        Ok(())
    }

    #[test]
    fn test_dropping_a_session_releases_the_slot() -> Result<()> {
        let dir = TempDir::new()?;
        let registry = Arc::new(SessionRegistry::new());
        drop(session(&registry, dir.path())?);
        assert_eq!(registry.live_sessions(), 0);
        Ok(())
    }

    #[test]
    fn test_empty_index_does_no_io() -> Result<()> {
        let dir = TempDir::new()?;
        let root = dir.path().join("never-created");
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, &root)?;

        let index = session.create_empty_index()?;
        assert!(index.is_empty_view());
        assert!(index.targets("refs", "a")?.is_empty());
        assert!(index.indexed_files()?.is_empty());
        assert!(!root.exists());
        Ok(())
    }

    #[test]
    fn test_transactions_need_a_loaded_index() -> Result<()> {
        let dir = TempDir::new()?;
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, dir.path())?;
        assert!(matches!(
            session.create_transaction(),
            Err(Error::StorageUnavailable(_))
        ));

        session.create_new_index()?;
        let mut txn = session.create_transaction()?;
        txn.write_file_facts("a.dart", 1, vec![Fact::new("refs", "a", "b")])?;
        assert!(matches!(
            txn.write_file_facts("a.dart", 1, vec![Fact::new("nope", "a", "b")]),
            Err(Error::UnknownLayer(_))
        ));
        assert_eq!(txn.len(), 1);
        txn.abort();
        assert!(session.create_new_index()?.indexed_files()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_marker_write_failure_is_unavailable() -> Result<()> {
        let dir = TempDir::new()?;
        // A regular file where the index directory should be
        let root = dir.path().join("occupied");
        std::fs::write(&root, b"not a directory")?;

        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, &root)?;
        assert!(matches!(
            session.create_new_index(),
            Err(Error::StorageUnavailable(_))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_marker_requires_rebuild() -> Result<()> {
        let dir = TempDir::new()?;
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, dir.path())?;
        let err = session.open_existing_index().unwrap_err();
        assert!(err.requires_rebuild());
        Ok(())
    }

    #[tokio::test]
    async fn test_background_consistency_check() -> Result<()> {
        let dir = TempDir::new()?;
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, dir.path())?;
        session.create_new_index()?;

        let monitor = CancellationMonitor::new();
        let handle = session.spawn_consistency_check(monitor.clone())?;
        let report = handle
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        assert!(report.is_consistent(), "{:?}", report.problems);
        assert!(monitor.is_finished());
        Ok(())
    }

    #[test]
    fn test_background_check_needs_runtime() -> Result<()> {
        let dir = TempDir::new()?;
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, dir.path())?;
        assert!(matches!(
            session.spawn_consistency_check(Arc::new(NullMonitor)),
            Err(Error::InvalidArgument(_))
        ));
        Ok(())
    }
}
