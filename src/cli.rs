mod help_text;

use crate::config::{BackupSettings, BackupType};
use crate::fingerprint::ChangeDetection;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use tracing::Level;

/// Incremental backups as a chain of dated full snapshots
#[derive(Parser, Debug)]
#[command(
    name = "backchain",
    version,
    about,
    long_about = help_text::ROOT_LONG_ABOUT
)]
pub struct Cli {
    /// Directory holding the chain of generations
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Directory to back up (required for the first backup of a chain)
    #[arg(short, long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// How often a new generation is started (required for the first backup)
    #[arg(short = 't', long = "type", value_name = "TYPE", value_enum)]
    pub backup_type: Option<BackupType>,

    /// How unchanged files are recognized
    #[arg(short, long = "change", value_name = "METHOD", value_enum)]
    pub change_detection: Option<ChangeDetection>,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Increase log verbosity (-v info, -vv debug). Takes precedence over RUST_LOG.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Set the log level explicitly. Takes precedence over RUST_LOG.
    #[arg(
        long,
        value_name = "LEVEL",
        value_enum,
        conflicts_with = "verbose"
    )]
    pub log_level: Option<LogLevel>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// The log level requested on the command line, if any.
    pub fn explicit_log_level(&self) -> Option<Level> {
        if let Some(level) = self.log_level {
            return Some(level.into());
        }
        match self.verbose {
            0 => None,
            1 => Some(Level::INFO),
            _ => Some(Level::DEBUG),
        }
    }

    pub fn settings(&self) -> BackupSettings {
        BackupSettings {
            source: self.source.clone(),
            backup_type: self.backup_type,
            change_detection: self.change_detection,
        }
    }
}
