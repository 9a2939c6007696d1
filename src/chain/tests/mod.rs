use super::*;
use crate::config::BackupType;
use crate::fingerprint::ChangeDetection;
use crate::progress::NoProgress;
use crate::relocate::Outcome;
use chrono::{TimeZone, Utc};
use filetime::{FileTime, set_file_mtime};
use std::fs;
use tempfile::TempDir;

struct Chain {
    _temp: TempDir,
    source: PathBuf,
    target: PathBuf,
}

fn chain() -> Chain {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let target = temp.path().join("backup");
    fs::create_dir(&source).unwrap();
    fs::create_dir(&target).unwrap();
    Chain {
        _temp: temp,
        source,
        target,
    }
}

fn first_run_settings(chain: &Chain) -> BackupSettings {
    BackupSettings {
        source: Some(chain.source.clone()),
        backup_type: Some(BackupType::Test),
        change_detection: None,
    }
}

/// A run start time; successive calls with growing `millis` land in distinct
/// test generations.
fn at(millis: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap() + chrono::Duration::milliseconds(millis)
}

fn generation(millis: i64) -> String {
    at(millis).format(BackupType::Test.time_format()).to_string()
}

fn run_at(chain: &Chain, settings: &BackupSettings, millis: i64) -> BackupSummary {
    Backup::prepare(&chain.target, settings, &at(millis))
        .unwrap()
        .create(&NoProgress)
        .unwrap()
}

/// Writes `content` with a fixed modification time so fingerprints do not
/// depend on how fast the test runs.
fn write_dated(path: &Path, content: &str, unix_secs: i64) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    set_file_mtime(path, FileTime::from_unix_time(unix_secs, 0)).unwrap();
}

fn write(path: &Path, content: &str) {
    write_dated(path, content, 1_700_000_000);
}

/// Relative paths of all files below `dir`, sorted. A missing directory has
/// no files.
fn files_under(dir: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let relative = path.strip_prefix(root).unwrap();
                out.push(relative.to_string_lossy().into_owned());
            }
        }
    }

    let mut files = Vec::new();
    walk(dir, dir, &mut files);
    files.sort();
    files
}

fn generation_dirs(target: &Path) -> Vec<String> {
    let mut dirs: Vec<String> = fs::read_dir(target)
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().unwrap().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    dirs.sort();
    dirs
}

fn sidecars(target: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(target)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".index"))
        .collect();
    names.sort();
    names
}

fn keys(index: &FingerprintIndex) -> Vec<&str> {
    index.keys().map(String::as_str).collect()
}
