//! Non-recursive directory listing.
//!
//! Lists the immediate children of a directory together with the metadata the
//! rest of the crate needs: modification time and size for regular files, the
//! link target for symlinks. Recursion is left to the callers (the index
//! builder and the pruner) so each can decide how to treat subdirectories.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, thiserror::Error)]
pub enum DirListError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
}

impl DirListError {
    fn from_io(e: std::io::Error, path: &Path) -> Self {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            DirListError::PermissionDenied(path.to_path_buf())
        } else {
            DirListError::Io(e)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    /// File name of the entry inside the listed directory.
    pub name: PathBuf,
    pub metadata: EntryMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryMetadata {
    File { mtime: SystemTime, size: u64 },
    Dir,
    Symlink { target: PathBuf },
    /// FIFOs, sockets, device nodes.
    Special,
}

/// Lists the immediate children of `dir`, sorted by name.
///
/// Symlinks are never followed. Any entry that cannot be examined fails the
/// whole listing.
pub fn list_directory(dir: &Path) -> Result<Vec<FsEntry>, DirListError> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| DirListError::from_io(e, dir))?;

    let mut entries = read_dir
        .map(|entry| {
            let entry = entry.map_err(|e| DirListError::from_io(e, dir))?;
            let path = entry.path();
            Ok(FsEntry {
                metadata: examine(&path)?,
                name: entry.file_name().into(),
            })
        })
        .collect::<Result<Vec<_>, DirListError>>()?;

    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(entries)
}

fn examine(path: &Path) -> Result<EntryMetadata, DirListError> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| DirListError::from_io(e, path))?;
    let file_type = metadata.file_type();

    if file_type.is_symlink() {
        let target = std::fs::read_link(path).map_err(|e| DirListError::from_io(e, path))?;
        Ok(EntryMetadata::Symlink { target })
    } else if file_type.is_dir() {
        Ok(EntryMetadata::Dir)
    } else if file_type.is_file() {
        Ok(EntryMetadata::File {
            mtime: metadata.modified().map_err(DirListError::Io)?,
            size: metadata.len(),
        })
    } else {
        Ok(EntryMetadata::Special)
    }
}
