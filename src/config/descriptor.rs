//! Registration descriptors for layers, processors and contributors
//!
//! Descriptors carry identifying data plus, for contributors, an explicit
//! factory. They know nothing about how the host discovered them.

use super::contributor::Contributor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What a layer keeps for each stored edge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    /// Source → target and target → source lookups
    #[default]
    ReverseEdges,
    /// Source → target lookups only
    ForwardEdges,
}

impl LayerKind {
    pub fn keeps_reverse_edges(self) -> bool {
        matches!(self, LayerKind::ReverseEdges)
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::ReverseEdges => write!(f, "reverse-edges"),
            LayerKind::ForwardEdges => write!(f, "forward-edges"),
        }
    }
}

/// Layer registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    pub id: String,
    pub kind: LayerKind,
}

impl LayerInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: LayerKind::default(),
        }
    }

    pub fn with_kind(mut self, kind: LayerKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Processor registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorInfo {
    pub id: String,
    pub version: u32,
    /// Tag restricting which contributors the host offers this processor
    pub contributor_type: Option<String>,
    /// File extensions handled, without the leading dot
    pub extensions: Vec<String>,
    /// Processors that must run before this one
    pub uses: Vec<String>,
}

impl ProcessorInfo {
    pub fn new(id: impl Into<String>, version: u32) -> Self {
        Self {
            id: id.into(),
            version,
            contributor_type: None,
            extensions: Vec::new(),
            uses: Vec::new(),
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    pub fn with_uses<I, S>(mut self, uses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uses = uses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_contributor_type(mut self, tag: impl Into<String>) -> Self {
        self.contributor_type = Some(tag.into());
        self
    }

    /// Whether a file at `path` is handled by this processor
    pub fn handles(&self, path: &str) -> bool {
        let extension = match std::path::Path::new(path).extension() {
            Some(ext) => ext.to_string_lossy(),
            None => return false,
        };
        self.extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(&extension))
    }
}

/// Produces a fresh contributor instance for one extraction run
pub type ContributorFactory = Arc<dyn Fn() -> Box<dyn Contributor> + Send + Sync>;

/// Contributor registration
#[derive(Clone)]
pub struct ContributorInfo {
    pub id: String,
    pub version: u32,
    /// Layer this contributor writes into
    pub layer_id: String,
    pub factory: ContributorFactory,
}

impl ContributorInfo {
    pub fn new<F>(id: impl Into<String>, version: u32, layer_id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Contributor> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            version,
            layer_id: layer_id.into(),
            factory: Arc::new(factory),
        }
    }

    /// Instantiate the contributor
    pub fn create(&self) -> Box<dyn Contributor> {
        (self.factory)()
    }
}

impl fmt::Debug for ContributorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContributorInfo")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("layer_id", &self.layer_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_matching() {
        let info = ProcessorInfo::new("dart", 1).with_extensions([".dart", "DART2"]);
        assert_eq!(info.extensions, vec!["dart", "DART2"]);
        assert!(info.handles("lib/main.dart"));
        assert!(info.handles("lib/Legacy.dart2"));
        assert!(!info.handles("lib/main.java"));
        assert!(!info.handles("Makefile"));
    }

    #[test]
    fn test_layer_kind_names() {
        assert_eq!(LayerKind::default(), LayerKind::ReverseEdges);
        assert_eq!(LayerKind::ForwardEdges.to_string(), "forward-edges");
        assert!(!LayerKind::ForwardEdges.keeps_reverse_edges());
    }
}
