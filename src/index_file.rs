use crate::fingerprint::ChangeDetection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum IndexFileError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Unsupported index file version: {0}")]
    UnsupportedVersion(u32),
}

impl IndexFileError {
    fn from_io(e: std::io::Error, path: &Path) -> Self {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            IndexFileError::PermissionDenied(path.to_path_buf())
        } else {
            IndexFileError::Io(e)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexFileError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Metadata {
    version: u32,
    change_detection: ChangeDetection,
}

/// Only the version out of the metadata table. Deliberately lenient so a
/// newer file can still be recognized as newer rather than malformed.
#[derive(Debug, Deserialize)]
struct VersionOnly {
    version: u32,
}

#[derive(Debug, Deserialize)]
struct MetadataOnly {
    metadata: VersionOnly,
}

/// On-disk form of a fingerprint index, stored next to a generation
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexFile {
    metadata: Metadata,
    /// Relative path (forward slashes) to fingerprint.
    pub entries: BTreeMap<String, String>,
}

impl IndexFile {
    const SUPPORTED_VERSION: u32 = 1;

    pub fn new(change_detection: ChangeDetection, entries: BTreeMap<String, String>) -> Self {
        IndexFile {
            metadata: Metadata {
                version: Self::SUPPORTED_VERSION,
                change_detection,
            },
            entries,
        }
    }

    /// The strategy that produced the fingerprints in this file.
    pub fn change_detection(&self) -> ChangeDetection {
        self.metadata.change_detection
    }

    pub fn from_toml(content: &str) -> Result<Self, IndexFileError> {
        // Check the version before parsing the rest, so a file written by a
        // future version is reported as such instead of as a parse error.
        let metadata_only: MetadataOnly = toml::from_str(content)?;

        if metadata_only.metadata.version != Self::SUPPORTED_VERSION {
            return Err(IndexFileError::UnsupportedVersion(
                metadata_only.metadata.version,
            ));
        }

        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, IndexFileError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, IndexFileError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| IndexFileError::from_io(e, path))?;

        Self::from_toml(&content)
    }

    /// Save atomically: write a temporary sibling, fsync it, rename it into
    /// place.
    pub fn save(&self, path: &Path) -> Result<(), IndexFileError> {
        use std::io::Write;

        let content = self.to_toml()?;

        let parent = path.parent().unwrap_or(Path::new("."));

        let mut temp_file = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| IndexFileError::from_io(e, parent))?;

        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| IndexFileError::from_io(e, path))?;

        temp_file.as_file().sync_all().map_err(IndexFileError::Io)?;

        temp_file
            .persist(path)
            .map_err(|e| IndexFileError::from_io(e.error, path))?;

        Ok(())
    }
}
