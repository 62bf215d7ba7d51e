//! In-memory image of the committed logs

use super::records::{EdgeOp, Key, StoredFact};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// key → neighbour → number of files asserting the edge
pub type Adjacency = HashMap<Key, HashMap<Key, u32>>;

/// Edges of one layer
///
/// Several files may assert the same edge, so each edge carries a
/// reference count and disappears when it drops to zero.
#[derive(Debug, Default)]
pub struct EdgeTable {
    forward: Adjacency,
    reverse: Option<Adjacency>,
    edges: usize,
}

impl EdgeTable {
    pub fn new(keeps_reverse_edges: bool) -> Self {
        Self {
            forward: Adjacency::new(),
            reverse: keeps_reverse_edges.then(Adjacency::new),
            edges: 0,
        }
    }

    pub fn apply(&mut self, op: &EdgeOp) -> Result<()> {
        if op.delta == 0 {
            return Ok(());
        }
        let had = self
            .forward
            .get(&op.source)
            .and_then(|targets| targets.get(&op.target))
            .copied()
            .unwrap_or(0);
        let now = i64::from(had) + i64::from(op.delta);
        let now = u32::try_from(now).map_err(|_| {
            Error::Corruption(format!(
                "Edge count out of range: {} {:+}",
                had, op.delta
            ))
        })?;

        set_count(&mut self.forward, &op.source, &op.target, now);
        if let Some(reverse) = self.reverse.as_mut() {
            set_count(reverse, &op.target, &op.source, now);
        }
        match (had, now) {
            (0, n) if n > 0 => self.edges += 1,
            (h, 0) if h > 0 => self.edges -= 1,
            _ => {}
        }
        Ok(())
    }

    pub fn targets(&self, source: &[u8]) -> Option<&HashMap<Key, u32>> {
        self.forward.get(source)
    }

    /// `None` both for unknown keys and layers without reverse edges
    pub fn sources(&self, target: &[u8]) -> Option<&HashMap<Key, u32>> {
        self.reverse.as_ref().and_then(|reverse| reverse.get(target))
    }

    pub fn forward(&self) -> &Adjacency {
        &self.forward
    }

    pub fn reverse(&self) -> Option<&Adjacency> {
        self.reverse.as_ref()
    }

    /// Every edge as `(source, target, count)`
    pub fn edges(&self) -> impl Iterator<Item = (&Key, &Key, u32)> + '_ {
        self.forward.iter().flat_map(|(source, targets)| {
            targets
                .iter()
                .map(move |(target, &count)| (source, target, count))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edges
    }

    pub fn source_count(&self) -> usize {
        self.forward.len()
    }

    /// Operations that rebuild this table from empty
    pub fn snapshot_ops(&self) -> Vec<EdgeOp> {
        self.edges()
            .map(|(source, target, count)| EdgeOp {
                delta: i32::try_from(count).unwrap_or(i32::MAX),
                source: source.clone(),
                target: target.clone(),
            })
            .collect()
    }
}

fn set_count(map: &mut Adjacency, from: &Key, to: &Key, count: u32) {
    if count == 0 {
        if let Some(neighbours) = map.get_mut(from) {
            neighbours.remove(to);
            if neighbours.is_empty() {
                map.remove(from);
            }
        }
    } else {
        map.entry(from.clone())
            .or_default()
            .insert(to.clone(), count);
    }
}

/// Facts recorded for one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub mod_stamp: i64,
    /// Sorted and free of duplicates
    pub facts: Vec<StoredFact>,
}

/// Everything a loaded storage keeps in memory
#[derive(Debug, Default)]
pub struct StoreState {
    pub loaded: bool,
    /// Indexed by layer ordinal
    pub layers: Vec<EdgeTable>,
    pub files: HashMap<String, FileRecord>,
}

impl StoreState {
    pub fn fact_count(&self) -> usize {
        self.files.values().map(|record| record.facts.len()).sum()
    }
}
