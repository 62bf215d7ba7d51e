//! Version marker
//!
//! `index.version` records what the data on disk was written with. An index
//! is only reused when its marker matches the running configuration, codec
//! and format exactly; anything else means a full rebuild.

use crate::codec::CodecProfile;
use crate::config::{Configuration, ConfigurationShape};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bumped whenever the log or payload formats change
pub const FORMAT_VERSION: u32 = 1;

pub const MARKER_FILE: &str = "index.version";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMarker {
    pub format_version: u32,
    pub codec: CodecProfile,
    pub shape: ConfigurationShape,
    pub created_at: DateTime<Utc>,
}

impl VersionMarker {
    pub fn for_configuration(configuration: &Configuration, codec: CodecProfile) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            codec,
            shape: configuration.shape(),
            created_at: Utc::now(),
        }
    }

    pub fn path(root: &Path) -> PathBuf {
        root.join(MARKER_FILE)
    }

    /// Describe why `self` (on disk) cannot serve `expected`, if it cannot
    ///
    /// Creation time is informational and never compared.
    pub fn mismatch(&self, expected: &VersionMarker) -> Option<String> {
        if self.format_version != expected.format_version {
            return Some(format!(
                "format version {} on disk, {} expected",
                self.format_version, expected.format_version
            ));
        }
        if self.codec != expected.codec {
            return Some(format!(
                "codec {} on disk, {} expected",
                self.codec, expected.codec
            ));
        }
        if self.shape != expected.shape {
            return Some("layer or processor configuration changed".to_string());
        }
        None
    }

    /// Read the marker under `root`
    ///
    /// A missing marker is `Ok(None)`; an unreadable one requires a rebuild.
    pub fn read(root: &Path) -> Result<Option<Self>> {
        let path = Self::path(root);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::RequiresFullRebuild(format!(
                    "Unreadable version marker {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| Error::RequiresFullRebuild(format!("Unreadable version marker: {}", e)))
    }

    /// Write the marker under `root` atomically (temp file + rename)
    pub fn write(&self, root: &Path) -> Result<()> {
        self.write_inner(root).map_err(|e| {
            Error::StorageUnavailable(format!("Failed to write version marker: {}", e))
        })
    }

    fn write_inner(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(root)?;
        let path = Self::path(root);
        let temp_path = path.with_extension("version.tmp");
        let json = serde_json::to_vec_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        info!(path = ?path, format_version = self.format_version, codec = %self.codec, "Wrote version marker");
        Ok(())
    }

    pub fn remove(root: &Path) -> Result<()> {
        let path = Self::path(root);
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removed {
            Ok(()) => {
                debug!(root = ?root, "Removed version marker");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigurationBuilder, LayerInfo};
    use tempfile::TempDir;

    fn configuration(layers: &[&str]) -> Result<Configuration> {
        let mut builder = ConfigurationBuilder::new();
        for id in layers {
            builder.add_layer(LayerInfo::new(*id))?;
        }
        builder.build()
    }

    #[test]
    fn test_write_then_read() -> Result<()> {
        let dir = TempDir::new()?;
        let marker = VersionMarker::for_configuration(&configuration(&["refs"])?, CodecProfile::Optimized);
        marker.write(dir.path())?;

        let read = VersionMarker::read(dir.path())?.expect("marker written");
        assert_eq!(read.mismatch(&marker), None);
        assert!(!dir.path().join("index.version.tmp").exists());
        Ok(())
    }

    #[test]
    fn test_mismatches() -> Result<()> {
        let base = VersionMarker::for_configuration(&configuration(&["refs"])?, CodecProfile::Optimized);

        let mut other = base.clone();
        other.format_version += 1;
        assert!(other.mismatch(&base).is_some());

        let plain = VersionMarker::for_configuration(&configuration(&["refs"])?, CodecProfile::Plain);
        assert!(plain.mismatch(&base).is_some());

        let more = VersionMarker::for_configuration(&configuration(&["refs", "types"])?, CodecProfile::Optimized);
        assert!(more.mismatch(&base).is_some());
        Ok(())
    }

    #[test]
    fn test_missing_and_garbled() -> Result<()> {
        let dir = TempDir::new()?;
        assert!(VersionMarker::read(dir.path())?.is_none());

        fs::write(dir.path().join(MARKER_FILE), "{ not json")?;
        assert!(matches!(
            VersionMarker::read(dir.path()),
            Err(Error::RequiresFullRebuild(_))
        ));

        VersionMarker::remove(dir.path())?;
        VersionMarker::remove(dir.path())?;
        assert!(VersionMarker::read(dir.path())?.is_none());
        Ok(())
    }

    #[test]
    fn test_marker_that_cannot_be_read_requires_rebuild() -> Result<()> {
        let dir = TempDir::new()?;
        fs::create_dir(dir.path().join(MARKER_FILE))?;
        assert!(matches!(
            VersionMarker::read(dir.path()),
            Err(Error::RequiresFullRebuild(_))
        ));

        // Rebuilding clears whatever sits at the marker path
        VersionMarker::remove(dir.path())?;
        assert!(VersionMarker::read(dir.path())?.is_none());
        Ok(())
    }
}
