//! Relocation engine.
//!
//! Populates a new generation from the source index. Files whose fingerprint
//! is unchanged since the reference generation are moved out of the reference
//! generation with a rename; everything else is copied from the source.
//!
//! A failure here is scoped to one file. It is logged and recorded in the
//! report, and the remaining files are still processed.

use crate::error::ExitStatus;
use crate::index::FingerprintIndex;
use crate::progress::ProgressReporter;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Suffix of the temporary file a copy is written to before it is renamed
/// into place.
pub const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Moved from the reference generation.
    Relocated,
    /// Copied from the source.
    Copied,
    /// Already present in the new generation; left untouched.
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Could not access {}: {source}", path.display())]
    Access {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Creating folder {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Moving file to {}: {source}", path.display())]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Opening {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Creating temp file in {}: {source}", path.display())]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Writing to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Closing {}: {source}", path.display())]
    Close {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Renaming temp file to {}: {source}", path.display())]
    Commit {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl TransferError {
    /// The exit status the command line reports for this kind of failure.
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            TransferError::Access { .. } => ExitStatus::NoAccess,
            TransferError::CreateDir { .. } | TransferError::Rename { .. } => {
                ExitStatus::CopyCreateDir
            }
            TransferError::Open { .. } => ExitStatus::CopyRead,
            TransferError::Create { .. } => ExitStatus::CopyCreate,
            TransferError::Write { .. } => ExitStatus::CopyWrite,
            TransferError::Close { .. } => ExitStatus::CopyClose,
            TransferError::Commit { .. } => ExitStatus::CopyRename,
        }
    }
}

#[derive(Debug)]
pub struct FileFailure {
    pub path: String,
    pub cause: TransferError,
}

#[derive(Debug, Default)]
pub struct RelocationReport {
    /// Successful outcomes, in processing order.
    pub outcomes: Vec<(String, Outcome)>,
    pub failures: Vec<FileFailure>,
}

impl RelocationReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }

    pub fn outcome_of(&self, path: &str) -> Option<Outcome> {
        self.outcomes
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, o)| *o)
    }
}

pub struct Relocator<'a> {
    new_generation: &'a Path,
    source: &'a Path,
    reference: Option<&'a Path>,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Relocator<'a> {
    pub fn new(
        new_generation: &'a Path,
        source: &'a Path,
        reference: Option<&'a Path>,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Relocator {
            new_generation,
            source,
            reference,
            progress,
        }
    }

    /// Processes every entry of `new_index` exactly once.
    ///
    /// Never fails as a whole. On return every entry either exists under its
    /// final name in the new generation or is listed in `failures`.
    pub fn apply(
        &self,
        new_index: &FingerprintIndex,
        reference_index: &FingerprintIndex,
    ) -> RelocationReport {
        let mut report = RelocationReport::default();

        info!("Backup of {} files...", new_index.len());
        self.progress.start(new_index.len() as u64);

        for (path, fingerprint) in new_index {
            match self.process(path, fingerprint, reference_index) {
                Ok(outcome) => report.outcomes.push((path.clone(), outcome)),
                Err(cause) => {
                    error!("{} (status {})", cause, cause.exit_status().code());
                    report.failures.push(FileFailure {
                        path: path.clone(),
                        cause,
                    });
                }
            }
            self.progress.file_processed(path);
        }

        self.progress.finish();

        report
    }

    fn process(
        &self,
        path: &str,
        fingerprint: &str,
        reference_index: &FingerprintIndex,
    ) -> Result<Outcome, TransferError> {
        let destination = self.new_generation.join(path);

        match fs::symlink_metadata(&destination) {
            Ok(_) => {
                info!("Skipping: {}", path);
                return Ok(Outcome::Skipped);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(TransferError::Access {
                    path: destination,
                    source,
                });
            }
        }

        if let Some(reference) = self.reference
            && reference_index.get(path).map(String::as_str) == Some(fingerprint)
        {
            info!("Moving from last backup: {}", path);
            // No fallback to copying: a failed rename is reported as is.
            move_file(&reference.join(path), &destination)?;
            return Ok(Outcome::Relocated);
        }

        info!("Copying: {}", path);
        copy_file(&self.source.join(path), &destination)?;
        Ok(Outcome::Copied)
    }
}

fn create_parent(destination: &Path) -> Result<(), TransferError> {
    let Some(parent) = destination.parent() else {
        return Ok(());
    };
    fs::create_dir_all(parent).map_err(|source| TransferError::CreateDir {
        path: parent.to_path_buf(),
        source,
    })
}

/// Renames `from` to `to`, creating the parent directories of `to`.
fn move_file(from: &Path, to: &Path) -> Result<(), TransferError> {
    create_parent(to)?;

    fs::rename(from, to).map_err(|source| TransferError::Rename {
        path: to.to_path_buf(),
        source,
    })
}

/// Copies `from` to `to` through a temporary sibling of `to`.
///
/// The temporary file only ever becomes visible under the final name through
/// a rename, and is removed on every failure path.
fn copy_file(from: &Path, to: &Path) -> Result<(), TransferError> {
    let mut input = File::open(from).map_err(|source| TransferError::Open {
        path: from.to_path_buf(),
        source,
    })?;

    create_parent(to)?;

    let parent = to.parent().unwrap_or(Path::new("."));
    let prefix = format!(
        ".{}.",
        to.file_name().unwrap_or_default().to_string_lossy()
    );

    let mut temp_file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(parent)
        .map_err(|source| TransferError::Create {
            path: parent.to_path_buf(),
            source,
        })?;

    std::io::copy(&mut input, &mut temp_file).map_err(|source| TransferError::Write {
        path: temp_file.path().to_path_buf(),
        source,
    })?;

    carry_mtime(&input, temp_file.as_file(), to);

    temp_file
        .as_file()
        .sync_all()
        .map_err(|source| TransferError::Close {
            path: temp_file.path().to_path_buf(),
            source,
        })?;

    temp_file
        .persist(to)
        .map_err(|e| TransferError::Commit {
            path: to.to_path_buf(),
            source: e.error,
        })?;

    debug!("Copied {} to {}", from.display(), to.display());

    Ok(())
}

/// Gives the copy the source's modification time so that a later walk of this
/// generation fingerprints the same as the source did.
fn carry_mtime(input: &File, output: &File, to: &Path) {
    let result = input
        .metadata()
        .and_then(|m| m.modified())
        .and_then(|mtime| output.set_modified(mtime));

    if let Err(e) = result {
        warn!(
            "Could not set modification time of {}: {}",
            to.display(),
            e
        );
    }
}
