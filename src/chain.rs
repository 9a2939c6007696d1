//! Chain orchestration: one backup run from configuration to pruning.

use crate::config::{BackupSettings, ChainConfig, ConfigError};
use crate::error::BackupError;
use crate::index::{self, FingerprintIndex, sidecar_path};
use crate::progress::ProgressReporter;
use crate::prune::prune;
use crate::relocate::{RelocationReport, Relocator};
use crate::resolve::{GenerationPaths, resolve};
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[cfg(test)]
mod tests;

/// A run that has been set up: the new generation directory exists and both
/// fingerprint indexes are known.
#[derive(Debug)]
pub struct Backup {
    /// No chain configuration existed in the target root.
    pub initial: bool,
    pub target_root: PathBuf,
    pub config: ChainConfig,
    pub paths: GenerationPaths,
    pub source_index: FingerprintIndex,
    /// Empty when there is no reference generation.
    pub reference_index: FingerprintIndex,
}

#[derive(Debug)]
pub struct BackupSummary {
    pub initial: bool,
    /// The generation directory existed before this run.
    pub resumed: bool,
    pub generation: PathBuf,
    pub report: RelocationReport,
    pub pruned_directories: usize,
}

impl Backup {
    /// Loads the chain configuration, merges `settings` into it, resolves the
    /// generation directories for a run started at `now` and builds both
    /// fingerprint indexes.
    ///
    /// The source index is always built fresh and persisted next to the new
    /// generation. The reference index comes from the reference generation's
    /// sidecar, or from walking the reference generation if that is missing
    /// or unusable.
    pub fn prepare<Tz>(
        target_root: &Path,
        settings: &BackupSettings,
        now: &DateTime<Tz>,
    ) -> Result<Self, BackupError>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        check_target(target_root)?;

        let (mut config, initial) = match ChainConfig::load(target_root)? {
            Some(config) => (config, false),
            None => (ChainConfig::default(), true),
        };

        config.apply(settings)?;
        config.validate()?;
        check_target_outside_source(target_root, &config)?;

        let paths = resolve(target_root, &config, now)?;
        debug!("Source: {}", paths.source.display());
        debug!("New generation: {}", paths.new_generation.display());
        if let Some(reference) = &paths.reference {
            debug!("Reference generation: {}", reference.display());
        }

        let strategy = config.change_detection;
        let source_index = index::build_and_persist(
            &paths.source,
            &sidecar_path(&paths.new_generation),
            strategy,
        )?;

        let reference_index = match &paths.reference {
            Some(reference) => index::load_or_rebuild(reference, strategy)?,
            None => FingerprintIndex::new(),
        };

        Ok(Backup {
            initial,
            target_root: target_root.to_path_buf(),
            config,
            paths,
            source_index,
            reference_index,
        })
    }

    /// Populates the new generation and prunes the reference generation.
    ///
    /// The chain configuration is pointed at the new generation before any
    /// file is touched, so an interrupted run is picked up by the next one.
    pub fn create(mut self, progress: &dyn ProgressReporter) -> Result<BackupSummary, BackupError> {
        if self.initial {
            info!("Creating initial copy in {}", self.paths.new_generation.display());
        }

        debug!("Saving backup info in configuration file");
        self.config.latest_generation = self.paths.name.clone();
        self.config.save(&self.target_root)?;

        let relocator = Relocator::new(
            &self.paths.new_generation,
            &self.paths.source,
            self.paths.reference.as_deref(),
            progress,
        );
        let report = relocator.apply(&self.source_index, &self.reference_index);

        let pruned_directories = prune(self.paths.reference.as_deref())?;

        Ok(BackupSummary {
            initial: self.initial,
            resumed: self.paths.resumed,
            generation: self.paths.new_generation,
            report,
            pruned_directories,
        })
    }
}

/// Runs a complete backup into the chain rooted at `target_root`.
pub fn run_backup(
    target_root: &Path,
    settings: &BackupSettings,
    progress: &dyn ProgressReporter,
) -> Result<BackupSummary, BackupError> {
    Backup::prepare(target_root, settings, &Local::now())?.create(progress)
}

fn check_target(target_root: &Path) -> Result<(), BackupError> {
    match std::fs::metadata(target_root) {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(BackupError::TargetUnusable(format!(
            "{} is not a directory",
            target_root.display()
        ))),
        Err(e) => Err(BackupError::TargetUnusable(format!(
            "Cannot access target directory {}: {}",
            target_root.display(),
            e
        ))),
    }
}

/// A target inside the source would back up its own generations.
fn check_target_outside_source(target_root: &Path, config: &ChainConfig) -> Result<(), BackupError> {
    let Some(source) = &config.source_directory else {
        return Ok(());
    };
    // Both exist by now; canonical forms see through `..` and symlinks.
    let canonical = |path: &Path| {
        std::fs::canonicalize(path).map_err(|e| ConfigError::PathResolution {
            path: path.to_path_buf(),
            source: e,
        })
    };
    let target = canonical(target_root)?;
    let source = canonical(source)?;

    if target.starts_with(&source) {
        return Err(ConfigError::Invalid(format!(
            "Target directory {} is inside the source directory {}",
            target.display(),
            source.display()
        ))
        .into());
    }

    Ok(())
}
