//! Change detection strategies.
//!
//! A fingerprint is an opaque token per regular file. Two files whose tokens
//! are byte-for-byte equal are presumed to have identical content; nothing
//! else about the token is interpreted by the rest of the crate.

use crate::checksum::{ChecksumError, sha256_file};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Timestamp layout used by `ChangeDetection::ModSize`. Second granularity.
const MODSIZE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum ChangeDetection {
    /// Modification time and size. Never reads file content.
    #[default]
    #[serde(rename = "modsize")]
    #[value(name = "modsize")]
    ModSize,
    /// SHA-256 of the file content.
    #[serde(rename = "sha256")]
    #[value(name = "sha256")]
    Sha256,
}

impl ChangeDetection {
    /// Computes the fingerprint of the regular file at `path`.
    ///
    /// `mtime` and `size` come from the directory listing that discovered the
    /// file so that `ModSize` never touches the file again.
    pub fn fingerprint(
        &self,
        path: &Path,
        mtime: SystemTime,
        size: u64,
    ) -> Result<String, ChecksumError> {
        match self {
            ChangeDetection::ModSize => Ok(format!("{}|{}", modsize_timestamp(mtime), size)),
            ChangeDetection::Sha256 => sha256_file(path),
        }
    }
}

/// Formats `mtime` in UTC. Times chrono cannot represent fall back to whole
/// seconds since the epoch, prefixed with `@`.
fn modsize_timestamp(mtime: SystemTime) -> String {
    let (secs, nanos) = match mtime.duration_since(UNIX_EPOCH) {
        Ok(after) => (i128::from(after.as_secs()), after.subsec_nanos()),
        Err(e) => {
            let before = e.duration();
            let secs = -i128::from(before.as_secs());
            match before.subsec_nanos() {
                0 => (secs, 0),
                n => (secs - 1, 1_000_000_000 - n),
            }
        }
    };

    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, nanos))
        .map(|utc| utc.format(MODSIZE_TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| format!("@{secs}"))
}

impl fmt::Display for ChangeDetection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeDetection::ModSize => f.write_str("modsize"),
            ChangeDetection::Sha256 => f.write_str("sha256"),
        }
    }
}
