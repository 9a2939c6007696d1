//! Chain configuration: the small record, stored in the target root, that
//! links each generation to its predecessor.

use crate::fingerprint::ChangeDetection;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Name of the configuration file inside the target root.
pub const CONFIG_FILE_NAME: &str = "backchain.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not parse configuration {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Could not write configuration {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not serialize configuration: {0}")]
    Serialize(serde_json::Error),
    #[error("Could not normalize path {}: {source}", path.display())]
    PathResolution {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How often a new generation is started. Each cadence is a time format
/// whose resolution decides when a run lands in a new directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackupType {
    Hourly,
    Daily,
    Monthly,
    Yearly,
    /// Millisecond resolution, for creating many generations quickly.
    Test,
}

impl BackupType {
    pub fn time_format(&self) -> &'static str {
        match self {
            BackupType::Hourly => "%Y-%m-%d-%H",
            BackupType::Daily => "%Y-%m-%d",
            BackupType::Monthly => "%Y-%m",
            BackupType::Yearly => "%Y",
            BackupType::Test => "%Y-%m-%d-%H-%M-%S%.3f",
        }
    }
}

/// Per-run values that override what is stored in the chain configuration.
#[derive(Debug, Clone, Default)]
pub struct BackupSettings {
    pub source: Option<PathBuf>,
    pub backup_type: Option<BackupType>,
    pub change_detection: Option<ChangeDetection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(rename = "change", default)]
    pub change_detection: ChangeDetection,
    /// Directory name of the most recent generation, empty before the first
    /// run completes its setup.
    #[serde(rename = "last", default)]
    pub latest_generation: String,
    #[serde(rename = "source", default, skip_serializing_if = "Option::is_none")]
    pub source_directory: Option<PathBuf>,
    #[serde(rename = "format", default)]
    pub time_format: String,
}

impl ChainConfig {
    pub fn path(target_root: &Path) -> PathBuf {
        target_root.join(CONFIG_FILE_NAME)
    }

    /// Loads the configuration of the chain rooted at `target_root`.
    ///
    /// A missing file means the chain has not been started and yields `None`.
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load(target_root: &Path) -> Result<Option<Self>, ConfigError> {
        let path = Self::path(target_root);
        debug!("Reading configuration from {}", path.display());

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration at {}", path.display());
                return Ok(None);
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse { path, source })
    }

    /// Saves the configuration atomically.
    pub fn save(&self, target_root: &Path) -> Result<(), ConfigError> {
        use std::io::Write;

        let path = Self::path(target_root);
        debug!("Writing configuration to {}", path.display());

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        let write_error = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };

        let mut temp_file = tempfile::NamedTempFile::new_in(target_root).map_err(write_error)?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(write_error)?;
        temp_file.as_file().sync_all().map_err(write_error)?;
        temp_file
            .persist(&path)
            .map_err(|e| write_error(e.error))?;

        Ok(())
    }

    /// Merges per-run settings into the stored record. The source directory
    /// is stored in absolute form so later runs work from any directory.
    pub fn apply(&mut self, settings: &BackupSettings) -> Result<(), ConfigError> {
        if let Some(source) = &settings.source {
            let absolute =
                std::path::absolute(source).map_err(|e| ConfigError::PathResolution {
                    path: source.clone(),
                    source: e,
                })?;
            self.source_directory = Some(absolute);
        }

        if let Some(backup_type) = settings.backup_type {
            self.time_format = backup_type.time_format().to_string();
        }

        if let Some(change_detection) = settings.change_detection {
            self.change_detection = change_detection;
        }

        Ok(())
    }

    /// Checks everything that can be checked without touching the target.
    ///
    /// An empty time format is accepted here; whether it is an error depends
    /// on whether this is the first run of the chain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let source = self.source_directory.as_deref().ok_or_else(|| {
            ConfigError::Invalid("Source directory must be provided on the first backup".into())
        })?;

        match std::fs::metadata(source) {
            Ok(m) if m.is_dir() => {}
            Ok(_) => {
                return Err(ConfigError::Invalid(format!(
                    "Source is not a directory: {}",
                    source.display()
                )));
            }
            Err(e) => {
                return Err(ConfigError::Invalid(format!(
                    "Cannot access source directory {}: {}",
                    source.display(),
                    e
                )));
            }
        }

        if !self.time_format.is_empty() {
            validate_time_format(&self.time_format)?;
        }

        if !self.latest_generation.is_empty() && !is_single_component(&self.latest_generation) {
            return Err(ConfigError::Invalid(format!(
                "Latest generation name is not a plain directory name: {}",
                self.latest_generation
            )));
        }

        Ok(())
    }
}

fn validate_time_format(format: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::Invalid(format!(
            "Invalid time format: {format}"
        )));
    }

    let sample = generation_name(format, &chrono::Utc::now());
    if !is_single_component(&sample) {
        return Err(ConfigError::Invalid(format!(
            "Time format {format} does not produce a plain directory name (got {sample})"
        )));
    }

    Ok(())
}

/// Formats `now` into a generation directory name. `format` must already
/// have passed validation.
pub fn generation_name<Tz>(format: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    now.format(format).to_string()
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;

    fn config_with_source(source: &Path) -> ChainConfig {
        ChainConfig {
            source_directory: Some(source.to_path_buf()),
            time_format: BackupType::Daily.time_format().to_string(),
            ..ChainConfig::default()
        }
    }

    #[test]
    fn load_missing_is_none() {
        let temp = TempDir::new().unwrap();

        assert!(ChainConfig::load(temp.path()).unwrap().is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let config = ChainConfig {
            change_detection: ChangeDetection::ModSize,
            latest_generation: "2024-05-06".to_string(),
            source_directory: Some(PathBuf::from("/data/src")),
            time_format: "%Y-%m-%d".to_string(),
        };

        config.save(temp.path()).unwrap();

        assert_eq!(ChainConfig::load(temp.path()).unwrap(), Some(config));
    }

    #[test]
    fn stored_field_names_are_short() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            r#"{"change":"modsize","last":"2024","source":"/src","format":"%Y"}"#,
        )
        .unwrap();

        let config = ChainConfig::load(temp.path()).unwrap().unwrap();

        assert_eq!(config.latest_generation, "2024");
        assert_eq!(config.source_directory, Some(PathBuf::from("/src")));
        assert_eq!(config.time_format, "%Y");
    }

    #[test]
    fn corrupt_file_is_parse_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), "{ not json").unwrap();

        assert!(matches!(
            ChainConfig::load(temp.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn save_into_missing_target_is_write_error() {
        let temp = TempDir::new().unwrap();

        let result = ChainConfig::default().save(&temp.path().join("missing"));

        assert!(matches!(result, Err(ConfigError::Write { .. })));
    }

    #[test]
    fn apply_overrides_and_absolutizes_source() {
        let mut config = ChainConfig {
            latest_generation: "2024".to_string(),
            time_format: "%Y".to_string(),
            ..ChainConfig::default()
        };

        config
            .apply(&BackupSettings {
                source: Some(PathBuf::from("relative/src")),
                backup_type: Some(BackupType::Monthly),
                change_detection: Some(ChangeDetection::Sha256),
            })
            .unwrap();

        let source = config.source_directory.unwrap();
        assert!(source.is_absolute());
        assert!(source.ends_with("relative/src"));
        assert_eq!(config.time_format, "%Y-%m");
        assert_eq!(config.change_detection, ChangeDetection::Sha256);
        assert_eq!(config.latest_generation, "2024");
    }

    #[test]
    fn apply_without_settings_keeps_stored_values() {
        let mut config = ChainConfig {
            source_directory: Some(PathBuf::from("/src")),
            time_format: "%Y".to_string(),
            ..ChainConfig::default()
        };
        let before = config.clone();

        config.apply(&BackupSettings::default()).unwrap();

        assert_eq!(config, before);
    }

    #[test]
    fn validate_requires_source() {
        let config = ChainConfig {
            time_format: "%Y".to_string(),
            ..ChainConfig::default()
        };

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_missing_source() {
        let temp = TempDir::new().unwrap();
        let config = config_with_source(&temp.path().join("missing"));

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_source_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, "x").unwrap();

        assert!(matches!(
            config_with_source(&file).validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn validate_accepts_empty_format() {
        let temp = TempDir::new().unwrap();
        let config = ChainConfig {
            time_format: String::new(),
            ..config_with_source(temp.path())
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_format_with_separator() {
        let temp = TempDir::new().unwrap();
        let config = ChainConfig {
            time_format: "%Y/%m".to_string(),
            ..config_with_source(temp.path())
        };

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_unknown_specifier() {
        let temp = TempDir::new().unwrap();
        let config = ChainConfig {
            time_format: "%Q".to_string(),
            ..config_with_source(temp.path())
        };

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_traversing_latest_generation() {
        let temp = TempDir::new().unwrap();
        let config = ChainConfig {
            latest_generation: "../elsewhere".to_string(),
            ..config_with_source(temp.path())
        };

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn every_backup_type_validates() {
        for backup_type in [
            BackupType::Hourly,
            BackupType::Daily,
            BackupType::Monthly,
            BackupType::Yearly,
            BackupType::Test,
        ] {
            validate_time_format(backup_type.time_format()).unwrap();
        }
    }

    #[test]
    fn generation_names_follow_cadence() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();

        assert_eq!(generation_name(BackupType::Yearly.time_format(), &now), "2024");
        assert_eq!(
            generation_name(BackupType::Monthly.time_format(), &now),
            "2024-03"
        );
        assert_eq!(
            generation_name(BackupType::Daily.time_format(), &now),
            "2024-03-07"
        );
        assert_eq!(
            generation_name(BackupType::Hourly.time_format(), &now),
            "2024-03-07-09"
        );
        assert_eq!(
            generation_name(BackupType::Test.time_format(), &now),
            "2024-03-07-09-05-01.000"
        );
    }
}
