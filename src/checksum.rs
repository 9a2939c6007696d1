use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("File modified during checksumming: {0}")]
    ConcurrentModification(PathBuf),
}

impl ChecksumError {
    fn from_io(e: std::io::Error, path: &Path) -> Self {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ChecksumError::PermissionDenied(path.to_path_buf())
        } else {
            ChecksumError::Io(e)
        }
    }
}

/// Computes the hex encoded SHA-256 of a file's content.
///
/// The modification time is sampled before and after reading; if it moved the
/// file was written to while we read it and `ConcurrentModification` is
/// returned. The absence of that error does not prove the file was stable.
pub fn sha256_file(path: &Path) -> Result<String, ChecksumError> {
    let mtime_before = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| ChecksumError::from_io(e, path))?;

    let mut file = File::open(path).map_err(|e| ChecksumError::from_io(e, path))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| ChecksumError::from_io(e, path))?;

    let mtime_after = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(ChecksumError::Io)?;

    if mtime_before != mtime_after {
        return Err(ChecksumError::ConcurrentModification(path.to_path_buf()));
    }

    let sha256 = format!("{:x}", hasher.finalize());

    debug!("Checksum of {} is {}", path.display(), sha256);

    Ok(sha256)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn digest_of_known_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc");
        fs::write(&path, "abc").unwrap();

        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_of_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        fs::write(&path, "").unwrap();

        assert_eq!(
            sha256_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_ignores_name_and_mtime() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        fs::write(&first, "same bytes").unwrap();
        fs::write(&second, "same bytes").unwrap();
        filetime::set_file_mtime(&second, filetime::FileTime::from_unix_time(0, 0)).unwrap();

        assert_eq!(sha256_file(&first).unwrap(), sha256_file(&second).unwrap());
    }

    #[test]
    fn missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();

        match sha256_file(&temp.path().join("missing")) {
            Err(ChecksumError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[test]
    #[cfg(unix)]
    fn unreadable_file_is_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::Uid::effective().is_root() {
            return;
        }

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("locked");
        fs::write(&path, "secret").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        match sha256_file(&path) {
            Err(ChecksumError::PermissionDenied(p)) => assert_eq!(p, path),
            other => panic!("Expected PermissionDenied error, got {:?}", other),
        }
    }
}
