//! Cross-process, cross-platform directory-based advisory file lock
//! (spec.md §4.2).
//!
//! Lock strategy: create a directory `<path>.lock/` via the filesystem's
//! atomic `mkdir`. Only one process can win that `mkdir`; the loser polls
//! or times out. Inside the winning directory we write `holder.json` with
//! the owning PID, hostname, and acquisition timestamp, which lets any
//! other waiter detect a stale holder (crashed process, or a lock held
//! longer than `stale_age`) and break it.
//!
//! `mkdir` on a directory is the only atomic primitive this assumes,
//! which is why it also works on network filesystems that don't support
//! `O_EXCL` reliably.

use chrono::{DateTime, Utc};
use mnemo_core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize, Deserialize)]
struct Holder {
    pid: u32,
    hostname: String,
    acquired_at: DateTime<Utc>,
}

/// A directory-based advisory lock over some target path.
///
/// Re-entrance is NOT supported: acquiring twice from the same process
/// blocks (or times out) just like a foreign acquirer, matching spec.md
/// §4.2. Use [`FileLock::acquire`] to obtain a [`LockGuard`] that
/// releases on drop, including on panic unwind.
pub struct FileLock {
    lock_dir: PathBuf,
    stale_age: Duration,
}

impl FileLock {
    /// Build a lock for `target`, whose lock directory lives alongside it
    /// at `<target>.lock/`.
    pub fn new(target: impl AsRef<Path>, stale_age: Duration) -> Self {
        let mut lock_dir = target.as_ref().as_os_str().to_os_string();
        lock_dir.push(".lock");
        FileLock {
            lock_dir: PathBuf::from(lock_dir),
            stale_age,
        }
    }

    /// Acquire the lock.
    ///
    /// `blocking = false`: try once, return `Ok(None)` immediately if
    /// contended. `blocking = true`: poll until acquired or `timeout`
    /// elapses, returning [`Error::LockTimeout`] on expiry.
    pub fn acquire(&self, blocking: bool, timeout: Duration) -> Result<Option<LockGuard>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_claim() {
                Ok(true) => return Ok(Some(LockGuard { lock_dir: self.lock_dir.clone() })),
                Ok(false) => {
                    self.break_if_stale()?;
                    if !blocking {
                        return Ok(None);
                    }
                    if Instant::now() >= deadline {
                        return Err(Error::LockTimeout(self.lock_dir.clone()));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Attempt the atomic `mkdir`. `Ok(true)` means we now own the lock;
    /// `Ok(false)` means someone else currently holds it.
    fn try_claim(&self) -> Result<bool> {
        match std::fs::create_dir(&self.lock_dir) {
            Ok(()) => {
                self.write_holder()?;
                debug!(lock = %self.lock_dir.display(), "lock acquired");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::io(self.lock_dir.clone(), e)),
        }
    }

    fn write_holder(&self) -> Result<()> {
        let holder = Holder {
            pid: std::process::id(),
            hostname: hostname(),
            acquired_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&holder)?;
        let path = self.lock_dir.join("holder.json");
        std::fs::write(&path, bytes).map_err(|e| Error::io(path, e))
    }

    /// If the current holder is stale (age exceeds `stale_age`, or its
    /// PID is no longer alive), forcibly break the lock so the next
    /// `try_claim` can succeed.
    fn break_if_stale(&self) -> Result<()> {
        let holder_path = self.lock_dir.join("holder.json");
        let Ok(bytes) = std::fs::read(&holder_path) else {
            return Ok(());
        };
        let Ok(holder) = serde_json::from_slice::<Holder>(&bytes) else {
            return Ok(());
        };
        let age = Utc::now().signed_duration_since(holder.acquired_at);
        let is_old = age.num_seconds() as u64 > self.stale_age.as_secs();
        let is_dead = !pid_alive(holder.pid);

        if is_old || is_dead {
            warn!(
                lock = %self.lock_dir.display(),
                pid = holder.pid,
                age_secs = age.num_seconds(),
                dead = is_dead,
                "breaking stale lock"
            );
            let _ = std::fs::remove_file(&holder_path);
            let _ = std::fs::remove_dir(&self.lock_dir);
        }
        Ok(())
    }
}

/// RAII guard: releases the lock (remove `holder.json`, then `rmdir`) on
/// drop, guaranteeing release on all exit paths including panics.
pub struct LockGuard {
    lock_dir: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(self.lock_dir.join("holder.json"));
        let _ = std::fs::remove_dir(&self.lock_dir);
        debug!(lock = %self.lock_dir.display(), "lock released");
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs no action, only error checking; the call
    // reads only the pid argument and has no unsafety beyond the FFI
    // boundary, standard for liveness probes.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    // Non-POSIX platforms can't cheaply signal-probe; assume alive and
    // rely on the age-based staleness check instead.
    true
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn acquire_uncontested() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("shard.json");
        let lock = FileLock::new(&target, Duration::from_secs(300));
        let guard = lock.acquire(true, Duration::from_secs(1)).unwrap();
        assert!(guard.is_some());
    }

    #[test]
    fn non_blocking_returns_none_when_contended() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("shard.json");
        let lock = FileLock::new(&target, Duration::from_secs(300));
        let _guard = lock.acquire(true, Duration::from_secs(1)).unwrap().unwrap();

        let lock2 = FileLock::new(&target, Duration::from_secs(300));
        let result = lock2.acquire(false, Duration::from_millis(10)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn blocking_times_out_when_held() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("shard.json");
        let lock = FileLock::new(&target, Duration::from_secs(300));
        let _guard = lock.acquire(true, Duration::from_secs(1)).unwrap().unwrap();

        let lock2 = FileLock::new(&target, Duration::from_secs(300));
        let result = lock2.acquire(true, Duration::from_millis(100));
        assert!(matches!(result, Err(Error::LockTimeout(_))));
    }

    #[test]
    fn release_allows_reacquire() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("shard.json");
        let lock = FileLock::new(&target, Duration::from_secs(300));
        {
            let _guard = lock.acquire(true, Duration::from_secs(1)).unwrap();
        }
        let lock2 = FileLock::new(&target, Duration::from_secs(300));
        let guard = lock2.acquire(true, Duration::from_secs(1)).unwrap();
        assert!(guard.is_some());
    }

    #[test]
    fn stale_lock_by_age_is_broken() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("shard.json");
        let lock_dir = {
            let mut p = target.as_os_str().to_os_string();
            p.push(".lock");
            PathBuf::from(p)
        };
        std::fs::create_dir(&lock_dir).unwrap();
        let holder = Holder {
            pid: std::process::id(),
            hostname: "h".into(),
            acquired_at: Utc::now() - chrono::Duration::seconds(1000),
        };
        std::fs::write(
            lock_dir.join("holder.json"),
            serde_json::to_vec(&holder).unwrap(),
        )
        .unwrap();

        let lock = FileLock::new(&target, Duration::from_secs(300));
        let guard = lock.acquire(true, Duration::from_secs(2)).unwrap();
        assert!(guard.is_some());
    }

    #[test]
    fn stale_lock_by_dead_pid_is_broken() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("shard.json");
        let lock_dir = {
            let mut p = target.as_os_str().to_os_string();
            p.push(".lock");
            PathBuf::from(p)
        };
        std::fs::create_dir(&lock_dir).unwrap();
        // Extremely unlikely to be a live pid.
        let holder = Holder {
            pid: 999_999_999,
            hostname: "h".into(),
            acquired_at: Utc::now(),
        };
        std::fs::write(
            lock_dir.join("holder.json"),
            serde_json::to_vec(&holder).unwrap(),
        )
        .unwrap();

        let lock = FileLock::new(&target, Duration::from_secs(300));
        let guard = lock.acquire(true, Duration::from_secs(2)).unwrap();
        assert!(guard.is_some());
    }

    #[test]
    fn only_one_of_many_concurrent_acquirers_wins_at_a_time() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("shard.json");
        let counter = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let target = target.clone();
                let counter = Arc::clone(&counter);
                let max_seen = Arc::clone(&max_seen);
                std::thread::spawn(move || {
                    let lock = FileLock::new(&target, Duration::from_secs(300));
                    let _guard = lock.acquire(true, Duration::from_secs(5)).unwrap();
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(n, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    counter.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
