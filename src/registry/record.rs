//! Flat registry records and their TOML manifest form
//!
//! ```toml
//! [[record]]
//! plugin = "org.example.dart"
//! kind = "contributor"
//! attributes = { id = "dart-types", version = "1", processor = "dart", layer = "types", class = "TypeHierarchy" }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of registry contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Processor,
    Layer,
    Contributor,
    Uses,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Processor => "processor",
            RecordKind::Layer => "layer",
            RecordKind::Contributor => "contributor",
            RecordKind::Uses => "uses",
        };
        f.write_str(name)
    }
}

/// One contribution from a host plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    /// Identity of the contributing plugin, used in diagnostics
    pub plugin: String,
    pub kind: RecordKind,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl RegistryRecord {
    pub fn new(plugin: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            plugin: plugin.into(),
            kind,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute that must be present and non-blank
    pub fn required(&self, key: &str) -> Result<&str> {
        match self.optional(key) {
            Some(value) => Ok(value),
            None => Err(Error::MalformedRecord(format!(
                "{} record is missing required attribute '{}'",
                self.kind, key
            ))),
        }
    }

    /// Attribute value, treating blank as absent
    pub fn optional(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Required attribute parsed as a version number
    pub fn version(&self) -> Result<u32> {
        let raw = self.required("version")?;
        raw.parse().map_err(|_| {
            Error::MalformedRecord(format!(
                "{} record has non-numeric version '{}'",
                self.kind, raw
            ))
        })
    }

    /// Comma separated attribute as a list
    pub fn list(&self, key: &str) -> Vec<String> {
        self.optional(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    record: Vec<RegistryRecord>,
}

/// Read records from a TOML manifest
pub fn parse_manifest(text: &str) -> Result<Vec<RegistryRecord>> {
    let manifest: Manifest =
        toml::from_str(text).map_err(|e| Error::Serialization(format!("Invalid manifest: {}", e)))?;
    Ok(manifest.record)
}
