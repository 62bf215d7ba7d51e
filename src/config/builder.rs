//! Configuration builder
//!
//! Registration is only possible while building; `build()` validates the
//! whole set, fixes layer ordinals and freezes the result.

use super::descriptor::{ContributorInfo, LayerInfo, ProcessorInfo};
use super::ordinal::StableOrdinalBuilder;
use super::{Configuration, ContributorRegistration, Layer, ProcessorRegistration};
use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Builder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Empty,
    Building,
    Built,
}

/// Assembles a [`Configuration`]
#[derive(Debug)]
pub struct ConfigurationBuilder {
    state: BuildState,
    layers: Vec<LayerInfo>,
    layer_ids: StableOrdinalBuilder,
    processors: Vec<ProcessorInfo>,
    processor_index: HashMap<String, usize>,
    contributors: Vec<Vec<ContributorInfo>>,
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self {
            state: BuildState::Empty,
            layers: Vec::new(),
            layer_ids: StableOrdinalBuilder::new(),
            processors: Vec::new(),
            processor_index: HashMap::new(),
            contributors: Vec::new(),
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Register a layer
    pub fn add_layer(&mut self, info: LayerInfo) -> Result<&mut Self> {
        self.ensure_building()?;
        if !self.layer_ids.add(info.id.clone()) {
            return Err(Error::DuplicateLayer(info.id));
        }
        self.layers.push(info);
        Ok(self)
    }

    /// Register a processor with an empty contributor list
    pub fn add_processor(&mut self, info: ProcessorInfo) -> Result<&mut Self> {
        self.ensure_building()?;
        if self.processor_index.contains_key(&info.id) {
            return Err(Error::DuplicateProcessor(info.id));
        }
        self.processor_index
            .insert(info.id.clone(), self.processors.len());
        self.processors.push(info);
        self.contributors.push(Vec::new());
        Ok(self)
    }

    /// Append a contributor to an already registered processor
    pub fn add_contributor(&mut self, processor_id: &str, info: ContributorInfo) -> Result<&mut Self> {
        self.ensure_building()?;
        let index = *self
            .processor_index
            .get(processor_id)
            .ok_or_else(|| Error::UnknownProcessor(processor_id.to_string()))?;
        self.contributors[index].push(info);
        Ok(self)
    }

    /// Validate, assign ordinals and freeze
    pub fn build(&mut self) -> Result<Configuration> {
        if self.state == BuildState::Built {
            return Err(Error::AlreadyBuilt);
        }

        // Validate everything before consuming the registrations
        let order = self.dependency_order()?;
        if let Some(missing) = self
            .contributors
            .iter()
            .flatten()
            .find(|c| !self.layer_ids.contains(&c.layer_id))
        {
            return Err(Error::UnknownLayer(missing.layer_id.clone()));
        }

        let ordinals = std::mem::take(&mut self.layer_ids).build();
        let ordinal_of = |id: &str| ordinals.ordinal(id).unwrap_or_default();

        let mut layers: Vec<Layer> = self
            .layers
            .drain(..)
            .map(|info| Layer::new(info.id.clone(), ordinal_of(&info.id), info.kind))
            .collect();
        layers.sort();

        let mut registrations: Vec<Option<ProcessorRegistration>> = self
            .processors
            .drain(..)
            .zip(self.contributors.drain(..))
            .map(|(info, contributors)| {
                let contributors = contributors
                    .into_iter()
                    .map(|contributor| ContributorRegistration {
                        layer_ordinal: ordinal_of(&contributor.layer_id),
                        info: contributor,
                    })
                    .collect();
                Some(ProcessorRegistration::new(info, contributors))
            })
            .collect();

        let processors: Vec<ProcessorRegistration> = order
            .into_iter()
            .filter_map(|index| registrations[index].take())
            .collect();

        self.processor_index.clear();
        self.state = BuildState::Built;

        debug!(
            layers = layers.len(),
            processors = processors.len(),
            "Built index configuration"
        );
        Ok(Configuration::new(processors, layers))
    }

    fn ensure_building(&mut self) -> Result<()> {
        match self.state {
            BuildState::Built => Err(Error::AlreadyBuilt),
            _ => {
                self.state = BuildState::Building;
                Ok(())
            }
        }
    }

    /// Processor indices such that every processor follows those it uses
    ///
    /// Ties keep registration order.
    fn dependency_order(&self) -> Result<Vec<usize>> {
        let count = self.processors.len();
        let mut pending_deps = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

        for (index, info) in self.processors.iter().enumerate() {
            for used in &info.uses {
                let dep = *self
                    .processor_index
                    .get(used)
                    .ok_or_else(|| Error::UnknownProcessor(used.clone()))?;
                pending_deps[index] += 1;
                dependents[dep].push(index);
            }
        }

        let mut ready: VecDeque<usize> = (0..count).filter(|&i| pending_deps[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(index) = ready.pop_front() {
            order.push(index);
            for &dependent in &dependents[index] {
                pending_deps[dependent] -= 1;
                if pending_deps[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if order.len() != count {
            let stuck = (0..count)
                .find(|&i| pending_deps[i] > 0)
                .map(|i| self.processors[i].id.clone())
                .unwrap_or_default();
            return Err(Error::InvalidArgument(format!(
                "Processor dependency cycle involving '{}'",
                stuck
            )));
        }
        Ok(order)
    }
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
