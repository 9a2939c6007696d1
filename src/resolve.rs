use crate::config::{ChainConfig, generation_name};
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Reference directory does not exist or cannot be accessed: {}", .0.display())]
    ReferenceMissing(PathBuf),
    #[error("Backup type must be provided for the initial backup")]
    FormatRequired,
    #[error("No source directory configured")]
    SourceMissing,
    #[error("New backup directory could not be created - {}: {source}", path.display())]
    NotCreated {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not normalize directory - {}: {source}", path.display())]
    PathResolution {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The three directories a run works with, all absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPaths {
    /// Directory name of the new generation inside the target root.
    pub name: String,
    pub source: PathBuf,
    pub new_generation: PathBuf,
    /// The immediately preceding generation, if there is one to relocate
    /// from.
    pub reference: Option<PathBuf>,
    /// The new generation directory already existed, typically left behind
    /// by an interrupted run.
    pub resumed: bool,
}

/// Computes the directories for a run started at `now` and creates the new
/// generation directory.
///
/// Fails when the chain names a predecessor that is no longer there: a broken
/// chain must not quietly degrade into a full copy.
pub fn resolve<Tz>(
    target_root: &Path,
    config: &ChainConfig,
    now: &DateTime<Tz>,
) -> Result<GenerationPaths, ResolveError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let source = config
        .source_directory
        .as_deref()
        .ok_or(ResolveError::SourceMissing)?;

    let mut reference = None;
    if !config.latest_generation.is_empty() {
        let path = target_root.join(&config.latest_generation);
        if !is_accessible_dir(&path) {
            return Err(ResolveError::ReferenceMissing(path));
        }
        reference = Some(path);
    }

    if config.time_format.is_empty() {
        return Err(ResolveError::FormatRequired);
    }

    let name = generation_name(&config.time_format, now);
    let new_generation = target_root.join(&name);

    if name == config.latest_generation {
        warn!(
            "Generation {} is still current, continuing it without a reference",
            name
        );
        reference = None;
    }

    let resumed = create_generation_dir(&new_generation)?;

    Ok(GenerationPaths {
        source: absolute(source)?,
        new_generation: absolute(&new_generation)?,
        reference: reference.as_deref().map(absolute).transpose()?,
        resumed,
        name,
    })
}

fn is_accessible_dir(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) if m.is_dir() => true,
        Ok(_) => {
            warn!("Not a directory: {}", path.display());
            false
        }
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                warn!("Error checking for directory {}: {}", path.display(), e);
            }
            false
        }
    }
}

/// Returns whether the directory already existed.
fn create_generation_dir(path: &Path) -> Result<bool, ResolveError> {
    match std::fs::create_dir(path) {
        Ok(()) => {
            info!("Created backup directory {}", path.display());
            Ok(false)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => {
            warn!(
                "Backup directory already exists. Resuming backup into {}",
                path.display()
            );
            Ok(true)
        }
        Err(source) => Err(ResolveError::NotCreated {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ResolveError> {
    std::path::absolute(path).map_err(|source| ResolveError::PathResolution {
        path: path.to_path_buf(),
        source,
    })
}
