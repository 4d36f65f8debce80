//! Optimistic version tracking for safe read-modify-write cycles
//! (spec.md §4.3).

use crate::atomic_io;
use crate::file_lock::FileLock;
use mnemo_core::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::warn;

/// Default number of `safe_update` retries before propagating `Conflict`.
pub const DEFAULT_RETRIES: u32 = 3;

/// A point-in-time snapshot of a file's identity: modification time,
/// size, and (optionally) a content hash.
#[derive(Debug, Clone, PartialEq)]
pub struct FileVersion {
    mtime: Option<SystemTime>,
    size: u64,
    sha256: Option<[u8; 32]>,
}

/// Take a snapshot of `path`. A missing file snapshots as size 0 with no
/// mtime; `check` against it succeeds only if the file is still absent.
pub fn snapshot(path: &Path, hash: bool) -> Result<FileVersion> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => Some(m),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(Error::io(path.to_path_buf(), e)),
    };

    let (mtime, size) = match &meta {
        Some(m) => (m.modified().ok(), m.len()),
        None => (None, 0),
    };

    let sha256 = if hash {
        match std::fs::read(path) {
            Ok(bytes) => Some(Sha256::digest(&bytes).into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::io(path.to_path_buf(), e)),
        }
    } else {
        None
    };

    Ok(FileVersion { mtime, size, sha256 })
}

/// Check that `path`'s current version still matches `version`.
pub fn check(path: &Path, version: &FileVersion) -> Result<()> {
    let current = snapshot(path, version.sha256.is_some())?;
    if &current == version {
        Ok(())
    } else {
        Err(Error::Conflict {
            path: path.to_path_buf(),
            attempts: 0,
        })
    }
}

/// Read-modify-write `path` under optimistic concurrency control:
/// snapshot -> read -> `f(data)` -> acquire lock -> re-check -> write ->
/// release. Retries up to `retries` times on conflict before propagating
/// [`Error::Conflict`].
pub fn safe_update<T, F>(path: &Path, retries: u32, mut f: F) -> Result<()>
where
    T: Serialize + DeserializeOwned + Default,
    F: FnMut(T) -> T,
{
    let mut attempts = 0;
    loop {
        let before = snapshot(path, false)?;
        let current: T = atomic_io::read_json(path, false)?.unwrap_or_default();
        let updated = f(current);

        let lock = FileLock::new(path, Duration::from_secs(300));
        let guard = lock
            .acquire(true, Duration::from_secs(30))?
            .ok_or_else(|| Error::LockTimeout(path.to_path_buf()))?;

        let recheck = check(path, &before);
        if recheck.is_err() {
            drop(guard);
            attempts += 1;
            if attempts > retries {
                warn!(path = %path.display(), attempts, "safe_update exhausted retries");
                return Err(Error::Conflict {
                    path: path.to_path_buf(),
                    attempts,
                });
            }
            continue;
        }

        atomic_io::write_json_unlocked(path, &updated)?;
        drop(guard);
        return Ok(());
    }
}
