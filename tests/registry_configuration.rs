//! Registry manifests feeding a live session

use photon_index::config::{Contributor, FactSink, LayerKind, SourceUnit};
use photon_index::error::{Error, Result};
use photon_index::registry::{parse_manifest, FactoryCatalog, RegistryAdapter};
use photon_index::session::{IndexSession, SessionRegistry};
use photon_index::storage::IntegratedStorageFactory;
use photon_index::{ConfigurationBuilder, IndexSettings};
use std::sync::Arc;
use tempfile::TempDir;

const MANIFEST: &str = r#"
[[record]]
plugin = "org.example.java"
kind = "contributor"
attributes = { id = "supertypes", version = "1", processor = "java", layer = "types", class = "org.example.Supertypes" }

[[record]]
plugin = "org.example.java"
kind = "processor"
attributes = { id = "java", version = "2", extensions = "java" }

[[record]]
plugin = "org.example.java"
kind = "layer"
attributes = { id = "types" }

[[record]]
plugin = "org.example.calls"
kind = "layer"
attributes = { id = "calls", kind = "forward-edges" }
"#;

/// Every file extends `java/lang/Object.class[`
struct Supertypes;

impl Contributor for Supertypes {
    fn contribute(&mut self, unit: &SourceUnit<'_>, sink: &mut FactSink<'_>) -> Result<()> {
        sink.add(format!("{}[", unit.path), "java/lang/Object.class[");
        Ok(())
    }
}

fn catalog() -> FactoryCatalog {
    let mut catalog = FactoryCatalog::new();
    catalog.register("org.example.Supertypes", || Box::new(Supertypes) as Box<dyn Contributor>);
    catalog
}

#[test]
fn test_manifest_drives_indexing() -> Result<()> {
    let records = parse_manifest(MANIFEST)?;
    let catalog = catalog();
    let mut builder = ConfigurationBuilder::new();
    RegistryAdapter::new(&catalog).apply(&records, &mut builder)?;
    let configuration = Arc::new(builder.build()?);

    let calls = configuration
        .layer("calls")
        .ok_or_else(|| Error::UnknownLayer("calls".into()))?;
    assert_eq!(calls.kind(), LayerKind::ForwardEdges);
    assert_eq!(configuration.processors().len(), 1);

    let dir = TempDir::new()?;
    let session = IndexSession::open_with(
        &Arc::new(SessionRegistry::new()),
        dir.path(),
        configuration,
        &IntegratedStorageFactory,
        IndexSettings::default(),
    )?;
    let index = session.create_new_index()?;

    let mut txn = session.create_transaction()?;
    assert_eq!(txn.index_file("src/Main.java", 1, b"class Main {}")?, 1);
    txn.commit()?;

    assert_eq!(
        index.sources("types", "java/lang/Object.class[")?,
        vec!["src/Main.java["]
    );
    // Forward-only layers cannot answer reverse lookups
    assert!(matches!(
        index.sources("calls", "anything"),
        Err(Error::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn test_unknown_contributor_class_names_the_plugin() -> Result<()> {
    let records = parse_manifest(MANIFEST)?;
    let mut builder = ConfigurationBuilder::new();
    let err = RegistryAdapter::new(&FactoryCatalog::new())
        .apply(&records, &mut builder)
        .unwrap_err();

    match err {
        Error::Registry { plugin, .. } => assert_eq!(plugin, "org.example.java"),
        other => panic!("expected a registry error, got {}", other),
    }
    Ok(())
}

#[test]
fn test_inert_catalog_builds_any_manifest() -> Result<()> {
    let records = parse_manifest(MANIFEST)?;
    let catalog = FactoryCatalog::inert();
    let mut builder = ConfigurationBuilder::new();
    RegistryAdapter::new(&catalog).apply(&records, &mut builder)?;
    let configuration = builder.build()?;
    assert_eq!(configuration.layers().len(), 2);
    Ok(())
}
