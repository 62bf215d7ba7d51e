//! Registry adapter
//!
//! Translates the flat records produced by a host's plugin mechanism into
//! [`ConfigurationBuilder`] calls. The adapter only validates attributes
//! and forwards; every failure is tagged with the contributing plugin.
//!
//! Records are applied in dependency order regardless of input order:
//! layers, then processors (with their `uses` merged in), then
//! contributors.

pub mod catalog;
pub mod record;

pub use catalog::FactoryCatalog;
pub use record::{parse_manifest, RecordKind, RegistryRecord};

use crate::config::{ConfigurationBuilder, ContributorInfo, LayerInfo, LayerKind, ProcessorInfo};
use crate::error::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Feeds registry records into a configuration builder
#[derive(Debug)]
pub struct RegistryAdapter<'a> {
    catalog: &'a FactoryCatalog,
}

impl<'a> RegistryAdapter<'a> {
    pub fn new(catalog: &'a FactoryCatalog) -> Self {
        Self { catalog }
    }

    /// Register every record with `builder`
    pub fn apply(&self, records: &[RegistryRecord], builder: &mut ConfigurationBuilder) -> Result<()> {
        let uses = Self::collect_uses(records)?;

        for record in Self::of_kind(records, RecordKind::Layer) {
            Self::attributed(record, self.apply_layer(record, builder))?;
        }

        for record in Self::of_kind(records, RecordKind::Processor) {
            Self::attributed(record, self.apply_processor(record, &uses, builder))?;
        }

        // A uses record naming a processor nobody registered is a configuration error
        for (processor, entries) in &uses {
            let registered = Self::of_kind(records, RecordKind::Processor)
                .any(|r| r.optional("id") == Some(processor.as_str()));
            if !registered {
                if let Some((plugin, _)) = entries.first() {
                    return Err(Self::wrap(plugin, Error::UnknownProcessor(processor.clone())));
                }
            }
        }

        for record in Self::of_kind(records, RecordKind::Contributor) {
            Self::attributed(record, self.apply_contributor(record, builder))?;
        }

        debug!(records = records.len(), "Applied registry records");
        Ok(())
    }

    fn apply_layer(&self, record: &RegistryRecord, builder: &mut ConfigurationBuilder) -> Result<()> {
        let id = record.required("id")?;
        let kind = match record.optional("kind") {
            None | Some("reverse-edges") => LayerKind::ReverseEdges,
            Some("forward-edges") => LayerKind::ForwardEdges,
            Some(other) => {
                return Err(Error::MalformedRecord(format!(
                    "layer '{}' has unknown kind '{}'",
                    id, other
                )))
            }
        };
        builder.add_layer(LayerInfo::new(id).with_kind(kind))?;
        Ok(())
    }

    fn apply_processor(
        &self,
        record: &RegistryRecord,
        uses: &HashMap<String, Vec<(String, String)>>,
        builder: &mut ConfigurationBuilder,
    ) -> Result<()> {
        let id = record.required("id")?;
        let mut info = ProcessorInfo::new(id, record.version()?)
            .with_extensions(record.list("extensions"))
            .with_uses(
                uses.get(id)
                    .into_iter()
                    .flatten()
                    .map(|(_, used)| used.clone()),
            );
        if let Some(tag) = record.optional("contributor-type") {
            info = info.with_contributor_type(tag);
        }
        builder.add_processor(info)?;
        Ok(())
    }

    fn apply_contributor(
        &self,
        record: &RegistryRecord,
        builder: &mut ConfigurationBuilder,
    ) -> Result<()> {
        let id = record.required("id")?;
        let version = record.version()?;
        let processor = record.required("processor")?;
        let layer = record.required("layer")?;
        let class = record.required("class")?;

        let factory = self.catalog.resolve(class).ok_or_else(|| {
            Error::MalformedRecord(format!(
                "contributor '{}' names unknown class '{}'",
                id, class
            ))
        })?;

        builder.add_contributor(
            processor,
            ContributorInfo {
                id: id.to_string(),
                version,
                layer_id: layer.to_string(),
                factory,
            },
        )?;
        Ok(())
    }

    /// processor id → [(plugin, used processor id)]
    fn collect_uses(records: &[RegistryRecord]) -> Result<HashMap<String, Vec<(String, String)>>> {
        let mut uses: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for record in Self::of_kind(records, RecordKind::Uses) {
            let processor = Self::attributed(record, record.required("processor"))?;
            for used in record.list("uses") {
                uses.entry(processor.to_string())
                    .or_default()
                    .push((record.plugin.clone(), used));
            }
            if record.list("uses").is_empty() {
                return Err(Self::wrap(
                    &record.plugin,
                    Error::MalformedRecord("uses record is missing required attribute 'uses'".to_string()),
                ));
            }
        }
        Ok(uses)
    }

    fn of_kind(
        records: &[RegistryRecord],
        kind: RecordKind,
    ) -> impl Iterator<Item = &RegistryRecord> + '_ {
        records.iter().filter(move |r| r.kind == kind)
    }

    fn attributed<T>(record: &RegistryRecord, result: Result<T>) -> Result<T> {
        result.map_err(|e| Self::wrap(&record.plugin, e))
    }

    fn wrap(plugin: &str, error: Error) -> Error {
        warn!(plugin, error = %error, "Rejected registry contribution");
        Error::Registry {
            plugin: plugin.to_string(),
            source: Box::new(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Contributor, InertContributor};

    fn catalog() -> FactoryCatalog {
        let mut catalog = FactoryCatalog::new();
        catalog.register("Inert", || Box::new(InertContributor) as Box<dyn Contributor>);
        catalog
    }

    fn sample_records() -> Vec<RegistryRecord> {
        vec![
            // Deliberately out of order
            RegistryRecord::new("org.example.dart", RecordKind::Contributor)
                .with("id", "dart-types")
                .with("version", "2")
                .with("processor", "dart")
                .with("layer", "types")
                .with("class", "Inert"),
            RegistryRecord::new("org.example.dart", RecordKind::Uses)
                .with("processor", "dart")
                .with("uses", "parser"),
            RegistryRecord::new("org.example.dart", RecordKind::Processor)
                .with("id", "dart")
                .with("version", "1")
                .with("extensions", "dart"),
            RegistryRecord::new("org.example.core", RecordKind::Processor)
                .with("id", "parser")
                .with("version", "1")
                .with("extensions", "dart"),
            RegistryRecord::new("org.example.core", RecordKind::Layer).with("id", "types"),
            RegistryRecord::new("org.example.core", RecordKind::Layer)
                .with("id", "refs")
                .with("kind", "forward-edges"),
        ]
    }

    fn unwrap_registry(err: Error) -> (String, Error) {
        match err {
            Error::Registry { plugin, source } => (plugin, *source),
            other => panic!("expected a registry error, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_builds_configuration() -> Result<()> {
        let catalog = catalog();
        let mut builder = ConfigurationBuilder::new();
        RegistryAdapter::new(&catalog).apply(&sample_records(), &mut builder)?;
        let config = builder.build()?;

        assert_eq!(config.layer("refs").map(|l| l.kind()), Some(LayerKind::ForwardEdges));
        assert_eq!(config.layer("types").map(|l| l.ordinal()), Some(1));

        let dart = config.processor("dart").expect("registered");
        assert_eq!(dart.info.uses, vec!["parser"]);
        assert_eq!(dart.contributors[0].info.version, 2);

        let order: Vec<&str> = config.processors_for_path("a.dart").map(|p| p.id()).collect();
        assert_eq!(order, vec!["parser", "dart"]);
        Ok(())
    }

    #[test]
    fn test_missing_attribute_names_plugin() {
        let catalog = catalog();
        let mut builder = ConfigurationBuilder::new();
        let records = vec![RegistryRecord::new("org.example.bad", RecordKind::Layer).with("id", " ")];

        let err = RegistryAdapter::new(&catalog)
            .apply(&records, &mut builder)
            .unwrap_err();
        let (plugin, source) = unwrap_registry(err);
        assert_eq!(plugin, "org.example.bad");
        assert!(matches!(source, Error::MalformedRecord(_)));
    }

    #[test]
    fn test_duplicate_layer_names_second_plugin() {
        let catalog = catalog();
        let mut builder = ConfigurationBuilder::new();
        let records = vec![
            RegistryRecord::new("first", RecordKind::Layer).with("id", "refs"),
            RegistryRecord::new("second", RecordKind::Layer).with("id", "refs"),
        ];

        let err = RegistryAdapter::new(&catalog)
            .apply(&records, &mut builder)
            .unwrap_err();
        let (plugin, source) = unwrap_registry(err);
        assert_eq!(plugin, "second");
        assert!(matches!(source, Error::DuplicateLayer(id) if id == "refs"));
    }

    #[test]
    fn test_contributor_for_unknown_processor() {
        let catalog = catalog();
        let mut builder = ConfigurationBuilder::new();
        let records = vec![RegistryRecord::new("lonely", RecordKind::Contributor)
            .with("id", "c")
            .with("version", "1")
            .with("processor", "ghost")
            .with("layer", "refs")
            .with("class", "Inert")];

        let err = RegistryAdapter::new(&catalog)
            .apply(&records, &mut builder)
            .unwrap_err();
        let (plugin, source) = unwrap_registry(err);
        assert_eq!(plugin, "lonely");
        assert!(matches!(source, Error::UnknownProcessor(id) if id == "ghost"));
    }

    #[test]
    fn test_unknown_class_and_dangling_uses() {
        let catalog = catalog();

        let mut builder = ConfigurationBuilder::new();
        let mut records = sample_records();
        records[0].attributes.insert("class".to_string(), "Missing".to_string());
        let (_, source) = unwrap_registry(
            RegistryAdapter::new(&catalog)
                .apply(&records, &mut builder)
                .unwrap_err(),
        );
        assert!(matches!(source, Error::MalformedRecord(_)));

        let mut builder = ConfigurationBuilder::new();
        let records = vec![RegistryRecord::new("dangling", RecordKind::Uses)
            .with("processor", "nobody")
            .with("uses", "parser")];
        let (plugin, source) = unwrap_registry(
            RegistryAdapter::new(&catalog)
                .apply(&records, &mut builder)
                .unwrap_err(),
        );
        assert_eq!(plugin, "dangling");
        assert!(matches!(source, Error::UnknownProcessor(id) if id == "nobody"));
    }
}
