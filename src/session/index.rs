//! Read handle over an index

use crate::config::{Configuration, Layer};
use crate::error::{Error, Result};
use crate::storage::{FileInfo, IndexStorage};
use std::fmt;
use std::sync::Arc;

/// Read-only view of an index
///
/// Cheap to clone and safe to share across threads. An empty view answers
/// every query with nothing and never touches storage.
#[derive(Clone)]
pub struct Index {
    storage: Option<Arc<dyn IndexStorage>>,
    configuration: Arc<Configuration>,
}

impl Index {
    pub(crate) fn empty(configuration: Arc<Configuration>) -> Self {
        Self {
            storage: None,
            configuration,
        }
    }

    pub(crate) fn new(storage: Arc<dyn IndexStorage>, configuration: Arc<Configuration>) -> Self {
        Self {
            storage: Some(storage),
            configuration,
        }
    }

    pub fn is_empty_view(&self) -> bool {
        self.storage.is_none()
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    fn layer(&self, id: &str) -> Result<&Layer> {
        self.configuration
            .layer(id)
            .ok_or_else(|| Error::UnknownLayer(id.to_string()))
    }

    /// Sorted targets of `source` in layer `layer_id`
    pub fn targets(&self, layer_id: &str, source: &str) -> Result<Vec<String>> {
        let layer = self.layer(layer_id)?;
        match &self.storage {
            Some(storage) => storage.targets(layer, source),
            None => Ok(Vec::new()),
        }
    }

    /// Sorted sources of `target` in layer `layer_id`
    ///
    /// Only layers that keep reverse edges answer; others are `InvalidArgument`.
    pub fn sources(&self, layer_id: &str, target: &str) -> Result<Vec<String>> {
        let layer = self.layer(layer_id)?;
        if !layer.kind().keeps_reverse_edges() {
            return Err(Error::InvalidArgument(format!(
                "layer '{}' does not keep reverse edges",
                layer_id
            )));
        }
        match &self.storage {
            Some(storage) => storage.sources(layer, target),
            None => Ok(Vec::new()),
        }
    }

    pub fn file_info(&self, path: &str) -> Result<Option<FileInfo>> {
        match &self.storage {
            Some(storage) => storage.file_info(path),
            None => Ok(None),
        }
    }

    pub fn indexed_files(&self) -> Result<Vec<String>> {
        match &self.storage {
            Some(storage) => storage.indexed_files(),
            None => Ok(Vec::new()),
        }
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("empty", &self.is_empty_view())
            .field("layers", &self.configuration.layers().len())
            .finish()
    }
}
