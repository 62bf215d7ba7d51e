//! Write handle over an index

use crate::config::{Configuration, Fact, FactSink, SourceUnit};
use crate::error::{Error, Result};
use crate::storage::{CommitSummary, IndexStorage, StorageTransaction};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Buffered changes to an index
///
/// Nothing reaches storage until [`IndexTransaction::commit`]; dropping
/// the transaction discards it.
pub struct IndexTransaction {
    session_id: u64,
    storage: Arc<dyn IndexStorage>,
    configuration: Arc<Configuration>,
    pending: StorageTransaction,
}

impl IndexTransaction {
    pub(crate) fn new(
        session_id: u64,
        storage: Arc<dyn IndexStorage>,
        configuration: Arc<Configuration>,
    ) -> Self {
        Self {
            session_id,
            storage,
            configuration,
            pending: StorageTransaction::new(),
        }
    }

    /// Run every processor handling `path` and replace the file's facts
    ///
    /// Returns the number of facts extracted.
    pub fn index_file(&mut self, path: &str, mod_stamp: i64, contents: &[u8]) -> Result<usize> {
        let unit = SourceUnit { path, contents };
        let mut facts = Vec::new();

        for processor in self.configuration.processors_for_path(path) {
            let started = Instant::now();
            for contributor in &processor.contributors {
                let layer = self
                    .configuration
                    .layer_by_ordinal(contributor.layer_ordinal)
                    .ok_or_else(|| Error::UnknownLayer(contributor.info.layer_id.clone()))?;
                let mut instance = contributor.info.create();
                instance.contribute(&unit, &mut FactSink::new(layer, &mut facts))?;
            }
            let elapsed = started.elapsed();
            processor.record_run(elapsed);
            trace!(
                path,
                processor = processor.id(),
                elapsed_us = elapsed.as_micros() as u64,
                "Ran processor"
            );
        }

        let extracted = facts.len();
        self.pending.put_file(path, mod_stamp, facts);
        Ok(extracted)
    }

    /// Replace the facts of `path` with facts extracted elsewhere
    pub fn write_file_facts(&mut self, path: &str, mod_stamp: i64, facts: Vec<Fact>) -> Result<()> {
        if let Some(fact) = facts
            .iter()
            .find(|fact| self.configuration.layer(&fact.layer).is_none())
        {
            return Err(Error::UnknownLayer(fact.layer.clone()));
        }
        self.pending.put_file(path, mod_stamp, facts);
        Ok(())
    }

    /// Retract everything `path` contributed
    pub fn remove_file(&mut self, path: &str) {
        self.pending.remove_file(path);
    }

    /// Number of buffered file updates
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply the buffered updates atomically
    pub fn commit(self) -> Result<CommitSummary> {
        let updates = self.pending.len();
        let summary = self.storage.commit(self.pending)?;
        debug!(
            session_id = self.session_id,
            updates,
            sequence = summary.sequence,
            "Committed index transaction"
        );
        Ok(summary)
    }

    /// Discard the buffered updates
    pub fn abort(self) {
        debug!(
            session_id = self.session_id,
            updates = self.pending.len(),
            "Aborted index transaction"
        );
    }
}
