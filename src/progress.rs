//! Progress reporting and cancellation for long-running storage work

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Receives progress from a long-running operation
///
/// Implementations must be cheap to call from tight loops and safe to
/// share with a background thread.
pub trait ProgressMonitor: Send + Sync {
    /// Announce the total amount of work
    fn begin(&self, task: &str, total: u64);

    /// Report `amount` more units done
    fn worked(&self, amount: u64);

    /// Whether the operation should stop early
    fn is_cancelled(&self) -> bool {
        false
    }

    fn done(&self) {}
}

/// Monitor that ignores progress and never cancels
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl ProgressMonitor for NullMonitor {
    fn begin(&self, _task: &str, _total: u64) {}

    fn worked(&self, _amount: u64) {}
}

/// Atomic progress counters plus a cancellation flag
#[derive(Debug, Default)]
pub struct CancellationMonitor {
    total: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicBool,
    finished: AtomicBool,
}

impl CancellationMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ask the running operation to stop at its next check
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Completion in percent, 0 until `begin` has been called
    pub fn percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.completed().min(total) as f64 / total as f64) * 100.0
    }
}

impl ProgressMonitor for CancellationMonitor {
    fn begin(&self, task: &str, total: u64) {
        tracing::debug!(task, total, "Progress started");
        self.total.store(total, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
    }

    fn worked(&self, amount: u64) {
        self.completed.fetch_add(amount, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn done(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

impl<T: ProgressMonitor + ?Sized> ProgressMonitor for Arc<T> {
    fn begin(&self, task: &str, total: u64) {
        (**self).begin(task, total)
    }

    fn worked(&self, amount: u64) {
        (**self).worked(amount)
    }

    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }

    fn done(&self) {
        (**self).done()
    }
}
