//! Fingerprint index builder.
//!
//! An index maps every regular file below a root, by its forward-slash
//! separated relative path, to the fingerprint of that file. Indexes are
//! persisted as `<generation>.index` sidecars next to each generation so later
//! runs do not have to walk a generation again.

use crate::checksum::ChecksumError;
use crate::dir_list::{DirListError, EntryMetadata, list_directory};
use crate::fingerprint::ChangeDetection;
use crate::index_file::{IndexFile, IndexFileError};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Extension appended to a generation directory's path to name its sidecar.
pub const INDEX_EXTENSION: &str = "index";

/// Relative path to fingerprint, iterated in path order.
pub type FingerprintIndex = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Could not read directory {}: {source}", path.display())]
    DirectoryUnreadable { path: PathBuf, source: DirListError },
    #[error("Refusing non-UTF-8 file name {}", .0.display())]
    NonUtf8Name(PathBuf),
    #[error("Could not save fingerprint index {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        source: IndexFileError,
    },
}

/// Path of the sidecar belonging to `generation_dir`.
pub fn sidecar_path(generation_dir: &Path) -> PathBuf {
    let mut path = OsString::from(generation_dir.as_os_str());
    path.push(".");
    path.push(INDEX_EXTENSION);
    PathBuf::from(path)
}

/// Walks `root` and fingerprints every regular file below it.
///
/// Directories contribute no entries of their own. Symlinks and special files
/// are skipped. A file whose fingerprint cannot be computed is logged and left
/// out; an unreadable directory or a non-UTF-8 name anywhere in the tree fails
/// the whole build.
pub fn build(root: &Path, strategy: ChangeDetection) -> Result<FingerprintIndex, IndexError> {
    let mut index = FingerprintIndex::new();
    walk(root, "", strategy, &mut index)?;
    Ok(index)
}

fn walk(
    dir: &Path,
    prefix: &str,
    strategy: ChangeDetection,
    index: &mut FingerprintIndex,
) -> Result<(), IndexError> {
    let entries = list_directory(dir).map_err(|source| IndexError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let path = dir.join(&entry.name);
        // Index keys are strings. A lossy conversion would store a name the
        // relocation step can no longer find, so the file would go missing.
        let Some(name) = entry.name.to_str() else {
            return Err(IndexError::NonUtf8Name(path));
        };
        let relative = format!("{prefix}{name}");

        match entry.metadata {
            EntryMetadata::File { mtime, size } => {
                match strategy.fingerprint(&path, mtime, size) {
                    Ok(fingerprint) => {
                        index.insert(relative, fingerprint);
                    }
                    Err(e) => log_unfingerprintable(&path, &e),
                }
            }
            EntryMetadata::Dir => {
                walk(&path, &format!("{relative}/"), strategy, index)?;
            }
            EntryMetadata::Symlink { target } => {
                debug!(
                    "Skipping symlink {} -> {}",
                    path.display(),
                    target.display()
                );
            }
            EntryMetadata::Special => {
                debug!("Skipping special file {}", path.display());
            }
        }
    }

    Ok(())
}

fn log_unfingerprintable(path: &Path, e: &ChecksumError) {
    error!(
        "Could not fingerprint {}, it is left out of this generation: {}",
        path.display(),
        e
    );
}

/// Builds the index of `root` and saves it to `sidecar`.
pub fn build_and_persist(
    root: &Path,
    sidecar: &Path,
    strategy: ChangeDetection,
) -> Result<FingerprintIndex, IndexError> {
    debug!("Creating fingerprints for {}", root.display());
    let index = build(root, strategy)?;

    persist(&index, sidecar, strategy)?;

    Ok(index)
}

pub fn persist(
    index: &FingerprintIndex,
    sidecar: &Path,
    strategy: ChangeDetection,
) -> Result<(), IndexError> {
    debug!("Saving {} fingerprints to {}", index.len(), sidecar.display());
    IndexFile::new(strategy, index.clone())
        .save(sidecar)
        .map_err(|source| IndexError::Persist {
            path: sidecar.to_path_buf(),
            source,
        })
}

/// Loads a persisted index.
///
/// Returns `None` when the sidecar is missing, unreadable, corrupt, or was
/// produced by a different change detection strategy. None of these are
/// errors: the caller is expected to fall back to [`build`].
pub fn load(sidecar: &Path, strategy: ChangeDetection) -> Option<FingerprintIndex> {
    debug!("Reading fingerprints from {}", sidecar.display());

    match IndexFile::load(sidecar) {
        Ok(index_file) if index_file.change_detection() == strategy => Some(index_file.entries),
        Ok(index_file) => {
            warn!(
                "Fingerprints in {} were created with {}, not {}",
                sidecar.display(),
                index_file.change_detection(),
                strategy
            );
            None
        }
        Err(e) if e.is_not_found() => {
            debug!("No fingerprints found at {}", sidecar.display());
            None
        }
        Err(e) => {
            warn!(
                "Could not read fingerprints from {}: {}",
                sidecar.display(),
                e
            );
            None
        }
    }
}

/// Loads the sidecar of `generation_dir`, or rebuilds and persists it by
/// walking the generation itself.
pub fn load_or_rebuild(
    generation_dir: &Path,
    strategy: ChangeDetection,
) -> Result<FingerprintIndex, IndexError> {
    let sidecar = sidecar_path(generation_dir);

    if let Some(index) = load(&sidecar, strategy) {
        return Ok(index);
    }

    warn!(
        "Rebuilding fingerprints by walking {}",
        generation_dir.display()
    );
    build_and_persist(generation_dir, &sidecar, strategy)
}
