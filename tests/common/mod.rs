use assert_cmd::{Command, cargo::cargo_bin_cmd};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Workspace {
    _temp: TempDir,
    pub source: PathBuf,
    pub target: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let target = temp.path().join("backup");
        fs::create_dir(&source).unwrap();
        fs::create_dir(&target).unwrap();
        Workspace {
            _temp: temp,
            source,
            target,
        }
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.source.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Generation directories in the target, oldest first.
    pub fn generations(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.target)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        dirs
    }
}

pub fn backchain_cmd() -> Command {
    let mut cmd = cargo_bin_cmd!("backchain");
    cmd.env_remove("RUST_LOG").arg("--no-progress");
    cmd
}

/// Command for the first run of a chain.
// Only some test crates start chains with a high resolution cadence.
#[allow(dead_code)]
pub fn first_backup_cmd(ws: &Workspace) -> Command {
    let mut cmd = backchain_cmd();
    cmd.arg("--source")
        .arg(&ws.source)
        .arg("--type")
        .arg("test")
        .arg(&ws.target);
    cmd
}

/// Relative paths of all files below `dir`, sorted.
#[allow(dead_code)]
pub fn files_under(dir: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_string_lossy().into_owned());
            }
        }
    }

    let mut files = Vec::new();
    walk(dir, dir, &mut files);
    files.sort();
    files
}
