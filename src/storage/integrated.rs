//! Integrated storage
//!
//! Keeps every layer and the file table in memory and appends each commit
//! to the frame logs described in the [module docs](super). Recovery
//! replays the committed frames; compaction rewrites the logs as a single
//! snapshot.

use super::cache::{CacheStats, Direction, ReadCache};
use super::check::{self, CheckInput, ConsistencyReport, LogExtent};
use super::frame::{Frame, FrameLog};
use super::records::{self, EdgeOp, FileOp, Key, PoolBatch, StoredFact};
use super::state::{EdgeTable, FileRecord, StoreState};
use super::{CommitSummary, FileInfo, FileUpdate, IndexStorage, StorageTransaction};
use crate::codec::{codec_for, CodecProfile, StringCodec, StringPool};
use crate::config::{Configuration, Fact, Layer, LayerKind};
use crate::error::{Error, Result};
use crate::progress::ProgressMonitor;
use crate::settings::IndexSettings;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const DATA_DIR: &str = "data";
pub const POOL_LOG: &str = "strings.pool";
pub const FILES_LOG: &str = "files.log";
pub const LAYERS_DIR: &str = "layers";

const COMPACT_DIR: &str = "data.compact";
const RETIRED_DIR: &str = "data.old";
const COMPLETE_FILE: &str = "COMPLETE";

/// File name of a layer's log, e.g. `001-refs.log`
pub fn layer_log_name(layer: &Layer) -> String {
    let id: String = layer
        .id()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{:03}-{}.log", layer.ordinal(), id)
}

fn not_loaded() -> Error {
    Error::StorageUnavailable("index is not loaded".to_string())
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Open handles of every log
struct Logs {
    pool: FrameLog,
    files: FrameLog,
    /// Indexed by layer ordinal
    layers: Vec<FrameLog>,
}

impl Logs {
    fn all(&self) -> impl Iterator<Item = &FrameLog> + '_ {
        std::iter::once(&self.pool)
            .chain(self.layers.iter())
            .chain(std::iter::once(&self.files))
    }

    fn extents(&self) -> Vec<LogExtent> {
        self.all()
            .map(|log| LogExtent {
                path: log.path().to_path_buf(),
                committed_len: log.len(),
            })
            .collect()
    }

    fn total_len(&self) -> u64 {
        self.all().map(FrameLog::len).sum()
    }

    fn lengths(&self) -> Vec<u64> {
        self.all().map(FrameLog::len).collect()
    }

    /// Truncate every log back to `lengths` as returned by [`Logs::lengths`]
    fn restore_lengths(&mut self, lengths: &[u64]) -> Result<()> {
        let logs = std::iter::once(&mut self.pool)
            .chain(self.layers.iter_mut())
            .chain(std::iter::once(&mut self.files));
        for (log, &len) in logs.zip(lengths) {
            if log.len() != len {
                log.truncate_to(len)?;
            }
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        for log in self.all() {
            log.sync()?;
        }
        Ok(())
    }
}

struct Writer {
    logs: Option<Logs>,
    next_sequence: u64,
    /// Set when the logs may hold a partial commit that could not be rolled back
    poisoned: Option<String>,
}

impl Writer {
    fn usable(&mut self) -> Result<&mut Logs> {
        if let Some(reason) = &self.poisoned {
            return Err(Error::StorageUnavailable(format!(
                "storage must be reloaded: {}",
                reason
            )));
        }
        self.logs.as_mut().ok_or_else(not_loaded)
    }
}

/// What a transaction turns into once diffed against the current state
#[derive(Debug, Default)]
struct CommitPlan {
    files: Vec<FileOp>,
    edges: BTreeMap<u32, Vec<EdgeOp>>,
    pool: Option<PoolBatch>,
    /// Pool entries below this id are on disk once the commit lands
    pool_end: usize,
    summary: CommitSummary,
}

struct EncodedCommit {
    pool: Option<Vec<u8>>,
    layers: Vec<(usize, Vec<u8>)>,
    files: Vec<u8>,
}

struct Recovered {
    logs: Logs,
    state: StoreState,
    pool: Vec<String>,
    next_sequence: u64,
    skipped: usize,
}

/// Storage statistics
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub loaded: bool,
    pub layers: Vec<LayerStats>,
    pub files: usize,
    pub facts: usize,
    pub pool_entries: usize,
    pub codec: CodecProfile,
    pub codec_mem_used: usize,
    pub log_bytes: u64,
    pub commits: u64,
    pub last_sequence: u64,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerStats {
    pub id: String,
    pub ordinal: u32,
    pub kind: LayerKind,
    pub sources: usize,
    pub edges: usize,
}

/// In-memory index over append-only frame logs
pub struct IntegratedStorage {
    root: PathBuf,
    configuration: Arc<Configuration>,
    settings: IndexSettings,
    pool: Arc<StringPool>,
    codec: Arc<dyn StringCodec>,
    state: RwLock<StoreState>,
    /// Serializes commits and owns the log handles; taken before `state`
    writer: Mutex<Writer>,
    cache: ReadCache,
    commits: AtomicU64,
}

impl IntegratedStorage {
    /// Create an unloaded storage rooted at `root`; nothing touches disk yet
    pub fn new(root: &Path, configuration: Arc<Configuration>, settings: IndexSettings) -> Self {
        let pool = Arc::new(StringPool::with_capacity(settings.pool_capacity));
        let codec = codec_for(settings.codec, pool.clone());
        Self {
            root: root.to_path_buf(),
            configuration,
            cache: ReadCache::new(settings.cache_capacity),
            settings,
            pool,
            codec,
            state: RwLock::new(StoreState::default()),
            writer: Mutex::new(Writer {
                logs: None,
                next_sequence: 1,
                poisoned: None,
            }),
            commits: AtomicU64::new(0),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn layer_log_path(dir: &Path, layer: &Layer) -> PathBuf {
        dir.join(LAYERS_DIR).join(layer_log_name(layer))
    }

    pub fn codec(&self) -> &Arc<dyn StringCodec> {
        &self.codec
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    fn loaded_state(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        let state = self.state.read();
        if !state.loaded {
            return Err(not_loaded());
        }
        Ok(state)
    }

    fn encode_key(&self, value: &str) -> Result<Key> {
        Ok(self.codec.encode_to_vec(value)?.into_boxed_slice())
    }

    fn decode_fact(&self, fact: &StoredFact) -> Result<Fact> {
        let layer = self
            .configuration
            .layer_by_ordinal(fact.ordinal)
            .ok_or_else(|| Error::Corruption(format!("Unknown layer ordinal {}", fact.ordinal)))?;
        Ok(Fact::new(
            layer.id(),
            self.codec.decode_from(&fact.source)?,
            self.codec.decode_from(&fact.target)?,
        ))
    }

    /// Encode a file's facts, sorted and without duplicates
    fn store_facts(&self, facts: &[Fact]) -> Result<Vec<StoredFact>> {
        let mut stored = BTreeSet::new();
        for fact in facts {
            let layer = self
                .configuration
                .layer(&fact.layer)
                .ok_or_else(|| Error::UnknownLayer(fact.layer.clone()))?;
            stored.insert(StoredFact {
                ordinal: layer.ordinal(),
                source: self.encode_key(&fact.source)?,
                target: self.encode_key(&fact.target)?,
            });
        }
        Ok(stored.into_iter().collect())
    }

    fn lookup(&self, layer: &Layer, direction: Direction, location: &str) -> Result<Vec<String>> {
        if let Some(hit) = self.cache.get(layer.ordinal(), direction, location) {
            return Ok(hit.as_ref().clone());
        }

        let (generation, answer) = {
            let state = self.loaded_state()?;
            let generation = self.cache.generation();
            let table = state
                .layers
                .get(layer.ordinal() as usize)
                .ok_or_else(|| Error::UnknownLayer(layer.id().to_string()))?;

            let neighbours = match self.codec.encode_lookup(location)? {
                Some(key) => match direction {
                    Direction::Forward => table.targets(&key),
                    Direction::Reverse => table.sources(&key),
                },
                None => None,
            };
            let mut answer = neighbours
                .into_iter()
                .flat_map(|map| map.keys())
                .map(|key| self.codec.decode_from(key))
                .collect::<Result<Vec<_>>>()?;
            answer.sort();
            (generation, Arc::new(answer))
        };

        self.cache
            .put(generation, layer.ordinal(), direction, location, answer.clone());
        Ok(answer.as_ref().clone())
    }

    /// Diff `transaction` against the current state
    fn plan(&self, transaction: &StorageTransaction) -> Result<CommitPlan> {
        let state = self.loaded_state()?;
        let mut plan = CommitPlan::default();
        // Facts of files already touched by this transaction
        let mut touched: HashMap<&str, Option<Vec<StoredFact>>> = HashMap::new();
        let mut deltas: BTreeMap<StoredFact, i32> = BTreeMap::new();

        for update in transaction.updates() {
            let path = match update {
                FileUpdate::Put { path, .. } | FileUpdate::Remove { path } => path.as_str(),
            };
            let previous = match touched.get(path) {
                Some(facts) => facts.clone(),
                None => state.files.get(path).map(|record| record.facts.clone()),
            };

            let next = match update {
                FileUpdate::Put {
                    path,
                    mod_stamp,
                    facts,
                } => {
                    let stored = self.store_facts(facts)?;
                    plan.files.push(FileOp::Put {
                        path: path.clone(),
                        mod_stamp: *mod_stamp,
                        facts: stored.clone(),
                    });
                    plan.summary.files_written += 1;
                    Some(stored)
                }
                FileUpdate::Remove { path } => {
                    if previous.is_none() {
                        continue;
                    }
                    plan.files.push(FileOp::Remove { path: path.clone() });
                    plan.summary.files_removed += 1;
                    None
                }
            };

            for fact in previous.iter().flatten() {
                *deltas.entry(fact.clone()).or_insert(0) -= 1;
            }
            for fact in next.iter().flatten() {
                *deltas.entry(fact.clone()).or_insert(0) += 1;
            }
            touched.insert(path, next);
        }

        for (fact, delta) in deltas {
            match delta {
                0 => continue,
                d if d > 0 => plan.summary.edges_added += 1,
                _ => plan.summary.edges_removed += 1,
            }
            plan.edges.entry(fact.ordinal).or_default().push(EdgeOp {
                delta,
                source: fact.source,
                target: fact.target,
            });
        }

        let (first_id, pending) = self.pool.unpersisted();
        plan.pool_end = first_id + pending.len();
        if !pending.is_empty() {
            plan.pool = Some(PoolBatch {
                first_id,
                strings: pending.iter().map(|s| s.to_string()).collect(),
            });
        }
        Ok(plan)
    }

    fn encode(&self, plan: &CommitPlan, sequence: u64) -> Result<EncodedCommit> {
        let compression = self.settings.compression;
        let pool = plan
            .pool
            .as_ref()
            .map(|batch| Frame::new(sequence, records::encode_pool(batch)?).to_bytes(compression))
            .transpose()?;
        let layers = plan
            .edges
            .iter()
            .map(|(ordinal, ops)| {
                let bytes = Frame::new(sequence, records::encode_edges(ops)?).to_bytes(compression)?;
                Ok((*ordinal as usize, bytes))
            })
            .collect::<Result<Vec<_>>>()?;
        let files = Frame::new(sequence, records::encode_files(&plan.files)?).to_bytes(compression)?;
        Ok(EncodedCommit { pool, layers, files })
    }

    /// Append a commit; the `files.log` frame goes last and makes it visible
    fn append_commit(&self, logs: &mut Logs, encoded: &EncodedCommit) -> Result<()> {
        let sync = self.settings.sync_on_commit;
        if let Some(bytes) = &encoded.pool {
            logs.pool.append(bytes)?;
            if sync {
                logs.pool.sync()?;
            }
        }
        for (ordinal, bytes) in &encoded.layers {
            let log = logs
                .layers
                .get_mut(*ordinal)
                .ok_or_else(|| Error::Corruption(format!("No log for layer ordinal {}", ordinal)))?;
            log.append(bytes)?;
            if sync {
                log.sync()?;
            }
        }
        logs.files.append(&encoded.files)?;
        if sync {
            logs.files.sync()?;
        }
        Ok(())
    }

    fn apply_plan(state: &mut StoreState, plan: CommitPlan) -> Result<()> {
        for (ordinal, ops) in &plan.edges {
            let table = state
                .layers
                .get_mut(*ordinal as usize)
                .ok_or_else(|| Error::Corruption(format!("No table for layer ordinal {}", ordinal)))?;
            for op in ops {
                table.apply(op)?;
            }
        }
        for op in plan.files {
            match op {
                FileOp::Put {
                    path,
                    mod_stamp,
                    facts,
                } => {
                    state.files.insert(path, FileRecord { mod_stamp, facts });
                }
                FileOp::Remove { path } => {
                    state.files.remove(&path);
                }
            }
        }
        Ok(())
    }

    /// Replay the committed frames under `dir`
    fn recover(&self, dir: &Path) -> Result<Recovered> {
        fs::create_dir_all(dir.join(LAYERS_DIR))?;

        let (files, file_frames) = FrameLog::open(&dir.join(FILES_LOG))?;
        let committed: HashSet<u64> = file_frames.iter().map(|f| f.sequence).collect();
        let mut last = file_frames.iter().map(|f| f.sequence).max().unwrap_or(0);
        let mut skipped = 0usize;

        let (pool, pool_frames) = FrameLog::open(&dir.join(POOL_LOG))?;
        let mut strings: Vec<String> = Vec::new();
        for frame in pool_frames {
            last = last.max(frame.sequence);
            if !committed.contains(&frame.sequence) {
                skipped += 1;
                continue;
            }
            let batch = records::decode_pool(&frame.payload)?;
            if batch.first_id != strings.len() {
                return Err(Error::Corruption(format!(
                    "Pool batch {} starts at id {}, expected {}",
                    frame.sequence,
                    batch.first_id,
                    strings.len()
                )));
            }
            strings.extend(batch.strings);
        }

        let layer_count = self.configuration.layers().len();
        let mut layer_logs = Vec::with_capacity(layer_count);
        let mut tables = Vec::with_capacity(layer_count);
        for layer in self.configuration.layers() {
            let (log, frames) = FrameLog::open(&Self::layer_log_path(dir, layer))?;
            let mut table = EdgeTable::new(layer.kind().keeps_reverse_edges());
            for frame in frames {
                last = last.max(frame.sequence);
                if !committed.contains(&frame.sequence) {
                    skipped += 1;
                    continue;
                }
                for op in records::decode_edges(&frame.payload)? {
                    table.apply(&op).map_err(|e| {
                        Error::Corruption(format!(
                            "Layer '{}' batch {}: {}",
                            layer.id(),
                            frame.sequence,
                            e
                        ))
                    })?;
                }
            }
            layer_logs.push(log);
            tables.push(table);
        }

        let mut file_table = HashMap::new();
        for frame in &file_frames {
            for op in records::decode_files(&frame.payload)? {
                match op {
                    FileOp::Put {
                        path,
                        mod_stamp,
                        facts,
                    } => {
                        if let Some(bad) = facts.iter().find(|f| f.ordinal as usize >= layer_count) {
                            return Err(Error::Corruption(format!(
                                "File '{}' refers to layer ordinal {}",
                                path, bad.ordinal
                            )));
                        }
                        file_table.insert(path, FileRecord { mod_stamp, facts });
                    }
                    FileOp::Remove { path } => {
                        file_table.remove(&path);
                    }
                }
            }
        }

        Ok(Recovered {
            logs: Logs {
                pool,
                files,
                layers: layer_logs,
            },
            state: StoreState {
                loaded: true,
                layers: tables,
                files: file_table,
            },
            pool: strings,
            next_sequence: last + 1,
            skipped,
        })
    }

    /// Settle a compaction that was interrupted between its steps
    fn finish_interrupted_compaction(&self) -> Result<()> {
        let data = self.data_dir();
        let compacted = self.root.join(COMPACT_DIR);
        let retired = self.root.join(RETIRED_DIR);

        if compacted.exists() {
            if compacted.join(COMPLETE_FILE).exists() && !data.exists() {
                warn!(root = ?self.root, "Completing interrupted compaction");
                fs::rename(&compacted, &data)?;
            } else {
                warn!(root = ?self.root, "Discarding incomplete compaction");
                fs::remove_dir_all(&compacted)?;
            }
        }
        if retired.exists() {
            if data.exists() {
                fs::remove_dir_all(&retired)?;
            } else {
                warn!(root = ?self.root, "Restoring data retired by an interrupted compaction");
                fs::rename(&retired, &data)?;
            }
        }
        Ok(())
    }

    /// Write the whole state as one frame per log into `dir`
    fn write_snapshot(&self, dir: &Path, state: &StoreState, sequence: u64) -> Result<()> {
        remove_dir_if_exists(dir)?;
        fs::create_dir_all(dir.join(LAYERS_DIR))?;
        let compression = self.settings.compression;

        let strings = self.pool.snapshot().iter().map(|s| s.to_string()).collect();
        let pool = records::encode_pool(&PoolBatch {
            first_id: 0,
            strings,
        })?;
        FrameLog::create(
            &dir.join(POOL_LOG),
            &Frame::new(sequence, pool).to_bytes(compression)?,
        )?;

        for layer in self.configuration.layers() {
            let ops = state
                .layers
                .get(layer.ordinal() as usize)
                .map(EdgeTable::snapshot_ops)
                .unwrap_or_default();
            let bytes = if ops.is_empty() {
                Vec::new()
            } else {
                Frame::new(sequence, records::encode_edges(&ops)?).to_bytes(compression)?
            };
            FrameLog::create(&Self::layer_log_path(dir, layer), &bytes)?;
        }

        let mut paths: Vec<&String> = state.files.keys().collect();
        paths.sort();
        let files: Vec<FileOp> = paths
            .into_iter()
            .map(|path| {
                let record = &state.files[path];
                FileOp::Put {
                    path: path.clone(),
                    mod_stamp: record.mod_stamp,
                    facts: record.facts.clone(),
                }
            })
            .collect();
        FrameLog::create(
            &dir.join(FILES_LOG),
            &Frame::new(sequence, records::encode_files(&files)?).to_bytes(compression)?,
        )?;

        FrameLog::create(&dir.join(COMPLETE_FILE), sequence.to_string().as_bytes())?;
        Ok(())
    }

    /// Replace the live data directory with a finished snapshot
    fn swap_in(&self, compacted: &Path) -> Result<Logs> {
        let data = self.data_dir();
        let retired = self.root.join(RETIRED_DIR);
        remove_dir_if_exists(&retired)?;
        fs::rename(&data, &retired)?;
        fs::rename(compacted, &data)?;
        fs::remove_file(data.join(COMPLETE_FILE))?;
        fs::remove_dir_all(&retired)?;

        let (pool, _) = FrameLog::open(&data.join(POOL_LOG))?;
        let (files, _) = FrameLog::open(&data.join(FILES_LOG))?;
        let layers = self
            .configuration
            .layers()
            .iter()
            .map(|layer| FrameLog::open(&Self::layer_log_path(&data, layer)).map(|(log, _)| log))
            .collect::<Result<Vec<_>>>()?;
        Ok(Logs { pool, files, layers })
    }
}

impl fmt::Debug for IntegratedStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegratedStorage")
            .field("root", &self.root)
            .field("settings", &self.settings)
            .field("loaded", &self.state.read().loaded)
            .finish()
    }
}

impl IndexStorage for IntegratedStorage {
    fn root(&self) -> &Path {
        &self.root
    }

    fn is_loaded(&self) -> bool {
        self.state.read().loaded
    }

    fn load(&self) -> Result<()> {
        let started = Instant::now();
        let mut writer = self.writer.lock();
        self.finish_interrupted_compaction()?;

        let recovered = self.recover(&self.data_dir())?;
        self.pool.restore(recovered.pool)?;

        let (files, edges) = {
            let mut state = self.state.write();
            *state = recovered.state;
            let edges: usize = state.layers.iter().map(EdgeTable::edge_count).sum();
            (state.files.len(), edges)
        };
        writer.logs = Some(recovered.logs);
        writer.next_sequence = recovered.next_sequence;
        writer.poisoned = None;
        self.cache.clear();

        if recovered.skipped > 0 {
            warn!(
                batches = recovered.skipped,
                "Ignored batches of transactions that never committed"
            );
        }
        info!(
            root = ?self.root,
            files,
            edges,
            pool_entries = self.pool.len(),
            next_sequence = recovered.next_sequence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded index"
        );
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.destroy()?;
        self.load()
    }

    fn destroy(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.logs = None;
        writer.poisoned = None;
        writer.next_sequence = 1;
        *self.state.write() = StoreState::default();
        self.pool.clear();
        self.cache.clear();

        for dir in [DATA_DIR, COMPACT_DIR, RETIRED_DIR] {
            remove_dir_if_exists(&self.root.join(dir))?;
        }
        info!(root = ?self.root, "Destroyed index data");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        let synced = match writer.logs.take() {
            Some(logs) => logs.sync(),
            None => Ok(()),
        };
        *self.state.write() = StoreState::default();
        self.pool.clear();
        self.cache.clear();
        debug!(root = ?self.root, "Closed index storage");
        synced
    }

    fn commit(&self, transaction: StorageTransaction) -> Result<CommitSummary> {
        let mut writer = self.writer.lock();
        writer.usable()?;
        let sequence = writer.next_sequence;

        let plan = self.plan(&transaction)?;
        if plan.files.is_empty() {
            return Ok(CommitSummary {
                sequence: sequence - 1,
                ..CommitSummary::default()
            });
        }
        let encoded = self.encode(&plan, sequence)?;

        let logs = writer.usable()?;
        let marks = logs.lengths();
        if let Err(e) = self.append_commit(logs, &encoded) {
            error!(sequence, error = %e, "Commit failed, rolling back logs");
            if let Err(rollback) = logs.restore_lengths(&marks) {
                error!(sequence, error = %rollback, "Failed to roll back logs");
                writer.poisoned = Some(format!("rollback of commit {} failed: {}", sequence, rollback));
            }
            return Err(Error::StorageUnavailable(format!(
                "commit {} failed: {}",
                sequence, e
            )));
        }
        writer.next_sequence += 1;

        let summary = CommitSummary {
            sequence,
            ..plan.summary
        };
        let pool_end = plan.pool_end;
        {
            let mut state = self.state.write();
            if let Err(e) = Self::apply_plan(&mut state, plan) {
                error!(sequence, error = %e, "Committed batch does not apply to memory");
                state.loaded = false;
                writer.poisoned = Some(e.to_string());
                return Err(e);
            }
        }
        self.pool.mark_persisted(pool_end);
        self.cache.clear();
        self.commits.fetch_add(1, Ordering::Relaxed);

        debug!(
            sequence,
            files_written = summary.files_written,
            files_removed = summary.files_removed,
            edges_added = summary.edges_added,
            edges_removed = summary.edges_removed,
            "Committed transaction"
        );
        Ok(summary)
    }

    fn targets(&self, layer: &Layer, source: &str) -> Result<Vec<String>> {
        self.lookup(layer, Direction::Forward, source)
    }

    fn sources(&self, layer: &Layer, target: &str) -> Result<Vec<String>> {
        if !layer.kind().keeps_reverse_edges() {
            return Err(Error::InvalidArgument(format!(
                "layer '{}' does not keep reverse edges",
                layer.id()
            )));
        }
        self.lookup(layer, Direction::Reverse, target)
    }

    fn file_info(&self, path: &str) -> Result<Option<FileInfo>> {
        let state = self.loaded_state()?;
        let Some(record) = state.files.get(path) else {
            return Ok(None);
        };
        let mut facts = record
            .facts
            .iter()
            .map(|fact| self.decode_fact(fact))
            .collect::<Result<Vec<_>>>()?;
        facts.sort();
        Ok(Some(FileInfo {
            path: path.to_string(),
            mod_stamp: record.mod_stamp,
            facts,
        }))
    }

    fn indexed_files(&self) -> Result<Vec<String>> {
        let state = self.loaded_state()?;
        let mut paths: Vec<String> = state.files.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }

    fn flush(&self) -> Result<()> {
        let writer = self.writer.lock();
        let logs = writer.logs.as_ref().ok_or_else(not_loaded)?;
        logs.sync()?;
        self.cache.clear();
        debug!(root = ?self.root, bytes = logs.total_len(), "Flushed index logs");
        Ok(())
    }

    fn compact(&self) -> Result<()> {
        let started = Instant::now();
        let mut writer = self.writer.lock();
        let before = writer.usable()?.total_len();
        let sequence = writer.next_sequence;
        let compacted = self.root.join(COMPACT_DIR);

        {
            let state = self.loaded_state()?;
            if let Err(e) = self.write_snapshot(&compacted, &state, sequence) {
                remove_dir_if_exists(&compacted).ok();
                return Err(e);
            }
        }

        writer.logs = None;
        let logs = match self.swap_in(&compacted) {
            Ok(logs) => logs,
            Err(e) => {
                error!(error = %e, "Compaction interrupted while swapping directories");
                writer.poisoned = Some(format!("compaction interrupted: {}", e));
                return Err(Error::StorageUnavailable(format!(
                    "compaction interrupted: {}",
                    e
                )));
            }
        };
        let after = logs.total_len();
        writer.logs = Some(logs);
        writer.next_sequence = sequence + 1;
        self.pool.mark_persisted(self.pool.len());

        info!(
            before,
            after,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Compacted index logs"
        );
        Ok(())
    }

    fn check_consistency(&self, monitor: &dyn ProgressMonitor) -> ConsistencyReport {
        // Snapshot the committed log lengths, then let commits proceed while
        // the check reads. A commit waits only for the state lock to apply.
        let (state, logs) = {
            let writer = self.writer.lock();
            let state = self.state.read();
            let logs = writer.logs.as_ref().map(Logs::extents).unwrap_or_default();
            (state, logs)
        };
        if !state.loaded {
            return ConsistencyReport::not_loaded();
        }
        check::run(
            &CheckInput {
                configuration: &self.configuration,
                state: &state,
                codec: &*self.codec,
                pool: &self.pool,
                logs: &logs,
            },
            monitor,
        )
    }

    fn stats(&self) -> StorageStats {
        let writer = self.writer.lock();
        let state = self.state.read();
        let layers = self
            .configuration
            .layers()
            .iter()
            .map(|layer| {
                let table = state.layers.get(layer.ordinal() as usize);
                LayerStats {
                    id: layer.id().to_string(),
                    ordinal: layer.ordinal(),
                    kind: layer.kind(),
                    sources: table.map_or(0, EdgeTable::source_count),
                    edges: table.map_or(0, EdgeTable::edge_count),
                }
            })
            .collect();

        StorageStats {
            loaded: state.loaded,
            layers,
            files: state.files.len(),
            facts: state.fact_count(),
            pool_entries: self.pool.len(),
            codec: self.codec.profile(),
            codec_mem_used: self.codec.mem_used(),
            log_bytes: writer.logs.as_ref().map_or(0, Logs::total_len),
            commits: self.commits.load(Ordering::Relaxed),
            last_sequence: writer.next_sequence.saturating_sub(1),
            cache: self.cache.stats(),
        }
    }
}
