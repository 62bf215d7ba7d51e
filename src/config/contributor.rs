//! Fact extraction seam
//!
//! Processors hand each source file to their contributors; a contributor
//! writes facts into the one layer it was registered against.

use super::Layer;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A source file presented for extraction
#[derive(Debug, Clone, Copy)]
pub struct SourceUnit<'a> {
    pub path: &'a str,
    pub contents: &'a [u8],
}

/// A single cross-reference edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fact {
    pub layer: String,
    pub source: String,
    pub target: String,
}

impl Fact {
    pub fn new(
        layer: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            layer: layer.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Collects the facts one contributor emits for its layer
pub struct FactSink<'a> {
    layer: &'a Layer,
    facts: &'a mut Vec<Fact>,
}

impl<'a> FactSink<'a> {
    pub fn new(layer: &'a Layer, facts: &'a mut Vec<Fact>) -> Self {
        Self { layer, facts }
    }

    pub fn layer(&self) -> &Layer {
        self.layer
    }

    /// Record an edge from `source` to `target`
    pub fn add(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.facts.push(Fact {
            layer: self.layer.id().to_string(),
            source: source.into(),
            target: target.into(),
        });
    }
}

/// Extracts facts from a source file
pub trait Contributor: Send {
    fn contribute(&mut self, unit: &SourceUnit<'_>, sink: &mut FactSink<'_>) -> Result<()>;
}

/// Contributor that emits nothing
///
/// Inspection tools use it when the real extraction code is not loaded.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertContributor;

impl Contributor for InertContributor {
    fn contribute(&mut self, _unit: &SourceUnit<'_>, _sink: &mut FactSink<'_>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerKind;

    struct ExtendsObject;

    impl Contributor for ExtendsObject {
        fn contribute(&mut self, unit: &SourceUnit<'_>, sink: &mut FactSink<'_>) -> Result<()> {
            sink.add(unit.path, "Object");
            Ok(())
        }
    }

    #[test]
    fn test_sink_tags_facts_with_layer() -> Result<()> {
        let layer = Layer::new("types", 1, LayerKind::ReverseEdges);
        let mut facts = Vec::new();
        let mut contributor = ExtendsObject;

        let unit = SourceUnit {
            path: "a.dart",
            contents: b"",
        };
        contributor.contribute(&unit, &mut FactSink::new(&layer, &mut facts))?;
        InertContributor.contribute(&unit, &mut FactSink::new(&layer, &mut facts))?;

        assert_eq!(facts, vec![Fact::new("types", "a.dart", "Object")]);
        Ok(())
    }
}
