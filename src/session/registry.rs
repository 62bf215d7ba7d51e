//! Live-session bookkeeping
//!
//! At most one session may be live per registry. Production code shares
//! the process-wide registry; tests create their own so they can run in
//! parallel.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

lazy_static::lazy_static! {
    /// Registry shared by every session in this process
    static ref PROCESS_REGISTRY: Arc<SessionRegistry> = Arc::new(SessionRegistry::new());
}

/// Counts live sessions and hands out session ids
#[derive(Debug, Default)]
pub struct SessionRegistry {
    live: AtomicUsize,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn process() -> Arc<SessionRegistry> {
        PROCESS_REGISTRY.clone()
    }

    /// Claim the single live slot
    pub fn try_acquire(self: &Arc<Self>) -> Result<SessionLease> {
        self.live
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::ConcurrentSession)?;
        let session_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(session_id, "Acquired session lease");
        Ok(SessionLease {
            registry: Arc::clone(self),
            session_id,
        })
    }

    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

/// Proof of being the live session; releases the slot when dropped
#[derive(Debug)]
pub struct SessionLease {
    registry: Arc<SessionRegistry>,
    session_id: u64,
}

impl SessionLease {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.live.store(0, Ordering::Release);
        debug!(session_id = self.session_id, "Released session lease");
    }
}
