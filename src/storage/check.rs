//! Consistency check
//!
//! Walks the in-memory tables and the log files on disk looking for damage:
//!
//! - pool entries that the codec could never have produced
//! - frames on disk that are torn or fail their checksum
//! - keys that do not decode, or decode to something encoding differently
//! - reverse edges that disagree with the forward edges
//! - edges whose reference count differs from the facts of indexed files
//!
//! Findings are collected into a [`ConsistencyReport`]; the check itself
//! never fails. Layers and log files are checked in parallel.

use super::frame::scan;
use super::records::Key;
use super::state::{EdgeTable, StoreState};
use crate::codec::{CodecProfile, StringCodec, StringPool};
use crate::config::{Configuration, Layer};
use crate::progress::ProgressMonitor;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{info, warn};

/// Findings reported per area before the rest are summarized
pub const MAX_PROBLEMS_PER_AREA: usize = 100;

const PREFIX_MARKERS: [&str; 2] = [".java[", ".class["];

/// One thing found wrong
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyProblem {
    /// Layer id, log file name, `pool` or `files`
    pub area: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsistencyReport {
    pub problems: Vec<ConsistencyProblem>,
    pub units_checked: u64,
    pub cancelled: bool,
}

impl ConsistencyReport {
    /// Completed without finding anything
    pub fn is_consistent(&self) -> bool {
        self.problems.is_empty() && !self.cancelled
    }

    pub(crate) fn not_loaded() -> Self {
        Self {
            problems: vec![ConsistencyProblem {
                area: "storage".to_string(),
                message: "index is not loaded".to_string(),
            }],
            ..Self::default()
        }
    }
}

/// Collects problems for one area, keeping at most [`MAX_PROBLEMS_PER_AREA`]
struct Findings {
    area: String,
    problems: Vec<ConsistencyProblem>,
    suppressed: usize,
}

impl Findings {
    fn new(area: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            problems: Vec::new(),
            suppressed: 0,
        }
    }

    fn report(&mut self, message: String) {
        if self.problems.len() < MAX_PROBLEMS_PER_AREA {
            self.problems.push(ConsistencyProblem {
                area: self.area.clone(),
                message,
            });
        } else {
            self.suppressed += 1;
        }
    }

    fn finish(mut self) -> Vec<ConsistencyProblem> {
        if self.suppressed > 0 {
            let message = format!("{} further problems not listed", self.suppressed);
            self.problems.push(ConsistencyProblem {
                area: self.area,
                message,
            });
        }
        self.problems
    }
}

pub(crate) struct CheckInput<'a> {
    pub configuration: &'a Configuration,
    pub state: &'a StoreState,
    pub codec: &'a dyn StringCodec,
    pub pool: &'a StringPool,
    pub logs: &'a [LogExtent],
}

/// A log file and the length it had when the check started
///
/// Bytes past `committed_len` belong to commits that began afterwards.
#[derive(Debug, Clone)]
pub(crate) struct LogExtent {
    pub path: PathBuf,
    pub committed_len: u64,
}

pub(crate) fn run(input: &CheckInput<'_>, monitor: &dyn ProgressMonitor) -> ConsistencyReport {
    let layers = input.configuration.layers();
    let total = 2 + input.logs.len() + layers.len();
    monitor.begin("Checking index consistency", total as u64);

    let mut report = ConsistencyReport::default();
    let result = run_phases(input, monitor, &mut report);
    report.cancelled = result.is_none();
    monitor.done();

    if report.cancelled {
        info!(units = report.units_checked, "Consistency check cancelled");
    } else if report.problems.is_empty() {
        info!(units = report.units_checked, "Index is consistent");
    } else {
        warn!(problems = report.problems.len(), "Index is inconsistent");
    }
    report
}

/// `None` once the monitor asks to stop
fn run_phases(
    input: &CheckInput<'_>,
    monitor: &dyn ProgressMonitor,
    report: &mut ConsistencyReport,
) -> Option<()> {
    if monitor.is_cancelled() {
        return None;
    }
    report.problems.extend(check_pool(input));
    report.units_checked += 1;
    monitor.worked(1);

    let logs: Vec<Option<Vec<ConsistencyProblem>>> = input
        .logs
        .par_iter()
        .map(|extent| {
            if monitor.is_cancelled() {
                return None;
            }
            let problems = check_log(extent);
            monitor.worked(1);
            Some(problems)
        })
        .collect();
    absorb(report, logs)?;

    let layers: Vec<Option<Vec<ConsistencyProblem>>> = input
        .configuration
        .layers()
        .par_iter()
        .map(|layer| {
            if monitor.is_cancelled() {
                return None;
            }
            let problems = match input.state.layers.get(layer.ordinal() as usize) {
                Some(table) => check_layer(input.codec, layer, table),
                None => vec![ConsistencyProblem {
                    area: layer.id().to_string(),
                    message: "no edge table loaded".to_string(),
                }],
            };
            monitor.worked(1);
            Some(problems)
        })
        .collect();
    absorb(report, layers)?;

    if monitor.is_cancelled() {
        return None;
    }
    report.problems.extend(check_files(input));
    report.units_checked += 1;
    monitor.worked(1);
    Some(())
}

fn absorb(
    report: &mut ConsistencyReport,
    results: Vec<Option<Vec<ConsistencyProblem>>>,
) -> Option<()> {
    let mut complete = true;
    for result in results {
        match result {
            Some(problems) => {
                report.units_checked += 1;
                report.problems.extend(problems);
            }
            None => complete = false,
        }
    }
    complete.then_some(())
}

fn check_pool(input: &CheckInput<'_>) -> Vec<ConsistencyProblem> {
    let mut findings = Findings::new("pool");
    let entries = input.pool.snapshot();
    if input.codec.profile() == CodecProfile::Plain && !entries.is_empty() {
        findings.report(format!(
            "{} entries present although the plain codec never pools",
            entries.len()
        ));
    }
    for (id, entry) in entries.iter().enumerate() {
        if !PREFIX_MARKERS.iter().any(|marker| entry.ends_with(marker)) {
            findings.report(format!("entry {} '{}' is not a key prefix", id, entry));
        }
    }
    findings.finish()
}

fn check_log(extent: &LogExtent) -> Vec<ConsistencyProblem> {
    let path = &extent.path;
    let area = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mut findings = Findings::new(area);

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound && extent.committed_len == 0 => Vec::new(),
        Err(e) => {
            findings.report(format!("unreadable: {}", e));
            return findings.finish();
        }
    };
    let committed = usize::try_from(extent.committed_len).unwrap_or(usize::MAX);
    if bytes.len() < committed {
        findings.report(format!(
            "holds {} bytes but {} were committed",
            bytes.len(),
            committed
        ));
        return findings.finish();
    }

    let scanned = scan(&bytes[..committed]);
    if let Some(reason) = scanned.damage {
        findings.report(format!(
            "damaged frame at byte {}: {}",
            scanned.valid_len, reason
        ));
    }
    let out_of_order = scanned
        .frames
        .windows(2)
        .filter(|pair| pair[1].sequence < pair[0].sequence)
        .count();
    if out_of_order > 0 {
        findings.report(format!("{} frames out of sequence order", out_of_order));
    }
    findings.finish()
}

fn check_layer(codec: &dyn StringCodec, layer: &Layer, table: &EdgeTable) -> Vec<ConsistencyProblem> {
    let mut findings = Findings::new(layer.id());

    for (source, target, count) in table.edges() {
        for key in [source, target] {
            if let Err(message) = check_key(codec, key) {
                findings.report(message);
            }
        }
        if count == 0 {
            findings.report("edge stored with a zero count".to_string());
        }
        if let Some(reverse) = table.reverse() {
            let mirrored = reverse.get(target).and_then(|sources| sources.get(source));
            if mirrored != Some(&count) {
                findings.report(format!(
                    "reverse edge count {:?} differs from forward count {}",
                    mirrored, count
                ));
            }
        }
    }

    match (layer.kind().keeps_reverse_edges(), table.reverse()) {
        (true, Some(reverse)) => {
            let reverse_edges: usize = reverse.values().map(|sources| sources.len()).sum();
            if reverse_edges != table.edge_count() {
                findings.report(format!(
                    "{} reverse edges for {} forward edges",
                    reverse_edges,
                    table.edge_count()
                ));
            }
        }
        (true, None) => findings.report("reverse edges missing".to_string()),
        (false, Some(_)) => findings.report("unexpected reverse edges".to_string()),
        (false, None) => {}
    }
    findings.finish()
}

/// A stored key must decode, and encode back to the same bytes
fn check_key(codec: &dyn StringCodec, key: &Key) -> std::result::Result<(), String> {
    let mut offset = 0;
    let decoded = codec
        .decode(key, &mut offset)
        .map_err(|e| format!("undecodable key: {}", e))?;
    if offset != key.len() {
        return Err(format!("key '{}' has {} trailing bytes", decoded, key.len() - offset));
    }
    match codec.encode_lookup(&decoded) {
        Ok(Some(encoded)) if encoded[..] == key[..] => Ok(()),
        _ => Err(format!("key '{}' does not re-encode to its stored form", decoded)),
    }
}

fn check_files(input: &CheckInput<'_>) -> Vec<ConsistencyProblem> {
    let mut findings = Findings::new("files");
    let layer_count = input.state.layers.len();

    let mut expected: HashMap<(u32, &Key, &Key), u32> = HashMap::new();
    for (path, record) in &input.state.files {
        for fact in &record.facts {
            if fact.ordinal as usize >= layer_count {
                findings.report(format!(
                    "'{}' has a fact in unknown layer ordinal {}",
                    path, fact.ordinal
                ));
                continue;
            }
            *expected
                .entry((fact.ordinal, &fact.source, &fact.target))
                .or_insert(0) += 1;
        }
    }

    for (ordinal, table) in input.state.layers.iter().enumerate() {
        let ordinal = ordinal as u32;
        let id = input
            .configuration
            .layer_by_ordinal(ordinal)
            .map(|layer| layer.id().to_string())
            .unwrap_or_else(|| ordinal.to_string());
        for (source, target, count) in table.edges() {
            match expected.remove(&(ordinal, source, target)) {
                Some(backed) if backed == count => {}
                Some(backed) => findings.report(format!(
                    "edge {} in '{}' counted {} times but asserted by {} files",
                    describe_edge(input.codec, source, target),
                    id,
                    count,
                    backed
                )),
                None => findings.report(format!(
                    "edge {} in '{}' not asserted by any indexed file",
                    describe_edge(input.codec, source, target),
                    id
                )),
            }
        }
    }

    for ((ordinal, source, target), _) in expected {
        findings.report(format!(
            "file fact {} in layer ordinal {} has no stored edge",
            describe_edge(input.codec, source, target),
            ordinal
        ));
    }
    findings.finish()
}

fn describe_edge(codec: &dyn StringCodec, source: &[u8], target: &[u8]) -> String {
    let name = |key: &[u8]| {
        codec
            .decode_from(key)
            .unwrap_or_else(|_| format!("<{} undecodable bytes>", key.len()))
    };
    format!("'{}' -> '{}'", name(source), name(target))
}
