use crate::dir_list::{DirListError, EntryMetadata, list_directory};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum PruneError {
    #[error("Cleaning directory {}: {source}", path.display())]
    List { path: PathBuf, source: DirListError },
    #[error("Cleaning directory, error deleting {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Removes every directory below `root`, and `root` itself, that holds no
/// file anywhere in its subtree. `None` means there is nothing to prune.
///
/// Anything that is not a directory (files, symlinks, special files) counts
/// as content. Returns the number of directories removed.
pub fn prune(root: Option<&Path>) -> Result<usize, PruneError> {
    let Some(root) = root else {
        return Ok(0);
    };

    let mut removed = 0;
    prune_dir(root, &mut removed)?;
    debug!("Removed {} empty directories below {}", removed, root.display());
    Ok(removed)
}

/// Returns whether `dir` was removed.
fn prune_dir(dir: &Path, removed: &mut usize) -> Result<bool, PruneError> {
    let entries = list_directory(dir).map_err(|source| PruneError::List {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut has_content = false;
    for entry in entries {
        match entry.metadata {
            EntryMetadata::Dir => {
                let child = dir.join(&entry.name);
                if !prune_dir(&child, removed)? {
                    has_content = true;
                }
            }
            _ => has_content = true,
        }
    }

    if has_content {
        return Ok(false);
    }

    debug!("Removing empty directory {}", dir.display());
    std::fs::remove_dir(dir).map_err(|source| PruneError::Remove {
        path: dir.to_path_buf(),
        source,
    })?;
    *removed += 1;

    Ok(true)
}
