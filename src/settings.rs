//! Index settings
//!
//! Loaded from an optional TOML file and `PHOTON_INDEX_*` environment
//! variables, e.g. `PHOTON_INDEX_CACHE_CAPACITY=5000`.

use crate::codec::pool::DEFAULT_POOL_CAPACITY;
use crate::codec::CodecProfile;
use crate::error::{Error, Result};
use crate::storage::compression::CompressionAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for settings overrides
pub const ENV_PREFIX: &str = "PHOTON_INDEX";

/// Tunables for the storage engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// String codec used for keys
    pub codec: CodecProfile,
    /// Compression applied to log batches
    pub compression: CompressionAlgorithm,
    /// Entries kept in the decoded read cache
    pub cache_capacity: usize,
    /// Maximum number of pooled key prefixes
    pub pool_capacity: usize,
    /// fsync every commit instead of only on flush
    pub sync_on_commit: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            codec: CodecProfile::Optimized,
            compression: CompressionAlgorithm::Zstd,
            cache_capacity: 1000,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            sync_on_commit: true,
        }
    }
}

impl IndexSettings {
    /// Load settings from `file` (if given) with environment overrides
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize::<IndexSettings>())
            .map_err(|e| Error::Settings(e.to_string()))
    }

    /// Parse settings from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Settings(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::Settings("cache_capacity must be positive".to_string()));
        }
        if self.pool_capacity == 0 && self.codec == CodecProfile::Optimized {
            return Err(Error::Settings(
                "pool_capacity must be positive for the optimized codec".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = IndexSettings::default();
        assert_eq!(settings.codec, CodecProfile::Optimized);
        assert_eq!(settings.compression, CompressionAlgorithm::Zstd);
        assert_eq!(settings.cache_capacity, 1000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let settings = IndexSettings::from_toml(
            r#"
            codec = "plain"
            compression = "none"
            "#,
        )?;
        assert_eq!(settings.codec, CodecProfile::Plain);
        assert_eq!(settings.compression, CompressionAlgorithm::None);
        assert_eq!(settings.cache_capacity, 1000);
        assert!(settings.sync_on_commit);
        Ok(())
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("index.toml");
        std::fs::write(&path, "cache_capacity = 42\nsync_on_commit = false\n")?;

        let settings = IndexSettings::load(Some(&path))?;
        assert_eq!(settings.cache_capacity, 42);
        assert!(!settings.sync_on_commit);
        Ok(())
    }

    #[test]
    fn test_environment_overrides_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("index.toml");
        std::fs::write(&path, "pool_capacity = 10\n")?;

        // Only this test touches pool_capacity, so parallel loads are unaffected
        std::env::set_var("PHOTON_INDEX_POOL_CAPACITY", "5000");
        let loaded = IndexSettings::load(Some(&path));
        std::env::remove_var("PHOTON_INDEX_POOL_CAPACITY");

        assert_eq!(loaded?.pool_capacity, 5000);
        Ok(())
    }

    #[test]
    fn test_validation() {
        let settings = IndexSettings {
            cache_capacity: 0,
            ..IndexSettings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Settings(_))));
    }
}
