use crate::config::ConfigError;
use crate::index::IndexError;
use crate::index_file::IndexFileError;
use crate::prune::PruneError;
use crate::resolve::ResolveError;
use std::process::ExitCode;

/// Process exit statuses. Values are part of the command line interface and
/// must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    NotCreated = 1,
    NoAccess = 2,
    CopyRead = 3,
    CopyCreate = 4,
    CopyWrite = 5,
    CopyClose = 6,
    CopyRename = 7,
    IndexSerialize = 8,
    IndexWrite = 9,
    ReadDirectory = 10,
    NoReference = 11,
    CopyCreateDir = 13,
    NoType = 14,
    Configuration = 15,
    ConfigurationRead = 16,
    ConfigurationWrite = 17,
    Cleanup = 18,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// Errors that abort a whole run.
///
/// Per-file problems during relocation are not represented here; they are
/// collected in the relocation report and the run still succeeds.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Target directory is not usable: {0}")]
    TargetUnusable(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Cleanup(#[from] PruneError),
}

impl BackupError {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            BackupError::TargetUnusable(_) => ExitStatus::Configuration,
            BackupError::Config(e) => match e {
                ConfigError::Read { .. } | ConfigError::Parse { .. } => {
                    ExitStatus::ConfigurationRead
                }
                ConfigError::Write { .. } | ConfigError::Serialize(_) => {
                    ExitStatus::ConfigurationWrite
                }
                ConfigError::PathResolution { .. } | ConfigError::Invalid(_) => {
                    ExitStatus::Configuration
                }
            },
            BackupError::Resolve(e) => match e {
                ResolveError::ReferenceMissing(_) => ExitStatus::NoReference,
                ResolveError::FormatRequired => ExitStatus::NoType,
                ResolveError::SourceMissing => ExitStatus::Configuration,
                ResolveError::NotCreated { .. } | ResolveError::PathResolution { .. } => {
                    ExitStatus::NotCreated
                }
            },
            BackupError::Index(e) => match e {
                IndexError::DirectoryUnreadable { .. } | IndexError::NonUtf8Name(_) => {
                    ExitStatus::ReadDirectory
                }
                IndexError::Persist {
                    source: IndexFileError::TomlSerialize(_),
                    ..
                } => ExitStatus::IndexSerialize,
                IndexError::Persist { .. } => ExitStatus::IndexWrite,
            },
            BackupError::Cleanup(_) => ExitStatus::Cleanup,
        }
    }
}
