//! Layer and processor configuration
//!
//! # Architecture
//!
//! ```text
//! ConfigurationBuilder (empty → building → built)
//!   ├─→ LayerInfo        "refs", "types"          → Layer { ordinal }
//!   ├─→ ProcessorInfo    "dart" (.dart, uses [])  → ProcessorRegistration
//!   └─→ ContributorInfo  "dart" → "types"             └─→ contributors
//! ```
//!
//! A built [`Configuration`] is immutable and shared by a session and all
//! of its transactions.

pub mod builder;
pub mod contributor;
pub mod descriptor;
pub mod ordinal;

pub use builder::{BuildState, ConfigurationBuilder};
pub use contributor::{Contributor, Fact, FactSink, InertContributor, SourceUnit};
pub use descriptor::{ContributorFactory, ContributorInfo, LayerInfo, LayerKind, ProcessorInfo};
pub use ordinal::{StableOrdinalBuilder, StableOrdinals};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A layer with its ordinal fixed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layer {
    id: String,
    ordinal: u32,
    kind: LayerKind,
}

impl Layer {
    pub fn new(id: impl Into<String>, ordinal: u32, kind: LayerKind) -> Self {
        Self {
            id: id.into(),
            ordinal,
            kind,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }
}

impl PartialOrd for Layer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Layer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordinal
            .cmp(&other.ordinal)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// A contributor bound to its layer's ordinal
#[derive(Debug, Clone)]
pub struct ContributorRegistration {
    pub info: ContributorInfo,
    pub layer_ordinal: u32,
}

/// A processor and its contributors, in registration order
#[derive(Debug)]
pub struct ProcessorRegistration {
    pub info: ProcessorInfo,
    pub contributors: Vec<ContributorRegistration>,
    timing: ProcessorTiming,
}

impl ProcessorRegistration {
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Account one extraction run
    pub fn record_run(&self, elapsed: Duration) {
        self.timing.record(elapsed);
    }

    pub fn timing(&self) -> ProcessorTimingSnapshot {
        self.timing.snapshot(&self.info.id)
    }
}

/// Cumulative extraction time of one processor
#[derive(Debug, Default)]
struct ProcessorTiming {
    nanos: AtomicU64,
    runs: AtomicU64,
}

impl ProcessorTiming {
    fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, id: &str) -> ProcessorTimingSnapshot {
        ProcessorTimingSnapshot {
            processor: id.to_string(),
            total: Duration::from_nanos(self.nanos.load(Ordering::Relaxed)),
            runs: self.runs.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a processor's timing counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessorTimingSnapshot {
    pub processor: String,
    pub total: Duration,
    pub runs: u64,
}

/// Immutable index configuration
#[derive(Debug)]
pub struct Configuration {
    /// In dependency order: every processor follows the ones it uses
    processors: Vec<ProcessorRegistration>,
    /// Sorted by ordinal, so `layers[n].ordinal() == n`
    layers: Vec<Layer>,
    layer_index: HashMap<String, usize>,
}

impl Configuration {
    pub(crate) fn new(processors: Vec<ProcessorRegistration>, layers: Vec<Layer>) -> Self {
        let layer_index = layers
            .iter()
            .enumerate()
            .map(|(index, layer)| (layer.id.clone(), index))
            .collect();
        Self {
            processors,
            layers,
            layer_index,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layer_index.get(id).map(|&index| &self.layers[index])
    }

    pub fn layer_by_ordinal(&self, ordinal: u32) -> Option<&Layer> {
        self.layers.get(ordinal as usize)
    }

    pub fn processors(&self) -> &[ProcessorRegistration] {
        &self.processors
    }

    pub fn processor(&self, id: &str) -> Option<&ProcessorRegistration> {
        self.processors.iter().find(|p| p.info.id == id)
    }

    /// Processors handling `path`, dependencies first
    pub fn processors_for_path<'a>(
        &'a self,
        path: &'a str,
    ) -> impl Iterator<Item = &'a ProcessorRegistration> + 'a {
        self.processors.iter().filter(move |p| p.info.handles(path))
    }

    /// Timing counters of every processor
    pub fn processor_timings(&self) -> Vec<ProcessorTimingSnapshot> {
        self.processors.iter().map(|p| p.timing()).collect()
    }

    /// Registration-order independent description, recorded on disk
    pub fn shape(&self) -> ConfigurationShape {
        let layers = self
            .layers
            .iter()
            .map(|layer| LayerShape {
                id: layer.id.clone(),
                ordinal: layer.ordinal,
                kind: layer.kind,
            })
            .collect();

        let mut processors: Vec<ProcessorShape> = self
            .processors
            .iter()
            .map(|p| ProcessorShape {
                id: p.info.id.clone(),
                version: p.info.version,
                contributors: p
                    .contributors
                    .iter()
                    .map(|c| ContributorShape {
                        id: c.info.id.clone(),
                        version: c.info.version,
                        layer: c.info.layer_id.clone(),
                    })
                    .collect(),
            })
            .collect();
        processors.sort_by(|a, b| a.id.cmp(&b.id));

        ConfigurationShape { layers, processors }
    }
}

/// The parts of a configuration that determine the on-disk format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationShape {
    pub layers: Vec<LayerShape>,
    pub processors: Vec<ProcessorShape>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerShape {
    pub id: String,
    pub ordinal: u32,
    pub kind: LayerKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorShape {
    pub id: String,
    pub version: u32,
    pub contributors: Vec<ContributorShape>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorShape {
    pub id: String,
    pub version: u32,
    pub layer: String,
}

impl ProcessorRegistration {
    pub(crate) fn new(info: ProcessorInfo, contributors: Vec<ContributorRegistration>) -> Self {
        Self {
            info,
            contributors,
            timing: ProcessorTiming::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_order_by_ordinal() {
        let mut layers = vec![
            Layer::new("types", 2, LayerKind::ReverseEdges),
            Layer::new("decls", 0, LayerKind::ForwardEdges),
            Layer::new("refs", 1, LayerKind::ReverseEdges),
        ];
        layers.sort();
        let ids: Vec<&str> = layers.iter().map(Layer::id).collect();
        assert_eq!(ids, vec!["decls", "refs", "types"]);
    }

    #[test]
    fn test_processor_timing_accumulates() {
        let registration = ProcessorRegistration::new(ProcessorInfo::new("p1", 1), Vec::new());
        registration.record_run(Duration::from_millis(3));
        registration.record_run(Duration::from_millis(4));

        let timing = registration.timing();
        assert_eq!(timing.processor, "p1");
        assert_eq!(timing.runs, 2);
        assert_eq!(timing.total, Duration::from_millis(7));
    }
}
