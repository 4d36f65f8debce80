//! Atomic JSON read/write (spec.md §4.1).
//!
//! `write_json` writes to a sibling temp file in the same directory,
//! fsyncs the file, renames it over the target (atomic on POSIX and
//! recent Windows), and fsyncs the containing directory on POSIX. Any
//! I/O error aborts the write: the target is left at its prior, intact
//! version — writes are never partial.

use crate::file_lock::FileLock;
use mnemo_core::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default timeout for the lock `write_json`/`read_json` take when
/// `lock = true`.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Serialize `data` to JSON and write it atomically to `path`.
///
/// If `lock` is true, the write happens under a [`FileLock`] scoped to
/// `path` for the duration of the critical section.
pub fn write_json<T: Serialize>(path: &Path, data: &T, lock: bool) -> Result<()> {
    let _guard = if lock {
        let flock = FileLock::new(path, Duration::from_secs(300));
        Some(
            flock
                .acquire(true, DEFAULT_LOCK_TIMEOUT)?
                .ok_or_else(|| Error::LockTimeout(path.to_path_buf()))?,
        )
    } else {
        None
    };
    write_json_unlocked(path, data)
}

/// Write without taking a lock — callers that already hold the relevant
/// lock (e.g. a WAL flush holding the shard-set lock) use this to avoid
/// self-deadlock.
pub fn write_json_unlocked<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let bytes = serde_json::to_vec_pretty(data)?;

    let pid = std::process::id();
    let tmp_path = dir.join(format!(
        ".{}.tmp.{pid}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("data")
    ));

    {
        let mut f = File::create(&tmp_path).map_err(|e| Error::io(tmp_path.clone(), e))?;
        f.write_all(&bytes).map_err(|e| Error::io(tmp_path.clone(), e))?;
        f.sync_all().map_err(|e| Error::io(tmp_path.clone(), e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        Error::io(path.to_path_buf(), e)
    })?;

    sync_dir(dir)?;
    debug!(path = %path.display(), bytes = bytes.len(), "atomic write complete");
    Ok(())
}

/// Read and decode a JSON document from `path`.
///
/// Returns `Ok(None)` if the file does not exist. Any other I/O or
/// parse error propagates.
pub fn read_json<T: DeserializeOwned>(path: &Path, lock: bool) -> Result<Option<T>> {
    let _guard = if lock {
        let flock = FileLock::new(path, Duration::from_secs(300));
        Some(
            flock
                .acquire(true, DEFAULT_LOCK_TIMEOUT)?
                .ok_or_else(|| Error::LockTimeout(path.to_path_buf()))?,
        )
    } else {
        None
    };

    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path.to_path_buf(), e)),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    let f = File::open(dir).map_err(|e| Error::io(dir.to_path_buf(), e))?;
    f.sync_all().map_err(|e| Error::io(dir.to_path_buf(), e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    // Directory fsync has no equivalent on non-POSIX platforms; the file
    // rename itself is still atomic there.
    Ok(())
}
