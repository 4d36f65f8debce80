//! Append-only write-ahead log with thresholded/explicit flush and
//! crash-safe replay (spec.md §4.5).
//!
//! File: `workspace/.wal/pending.jsonl`, one JSON record per line.
//! `WalManager` owns only the log file itself — appending, counting,
//! reading back for replay, and atomically truncating. Applying records
//! to the in-memory map, shards, and indexes during a flush is the
//! facade's job (`mnemo-engine::MemorySystem`), since the WAL has no
//! dependency on shard or index representations.
//!
//! Crash model: a crash between append and flush leaves records to be
//! replayed on the next `load()`. A crash between shard persist and WAL
//! truncation leaves idempotent records that replay safely — re-ingest
//! of an already-present id is a no-op duplicate, delete of an absent id
//! is a no-op.

use chrono::{DateTime, Utc};
use mnemo_core::error::{Error, Result};
use mnemo_core::types::MemoryEntry;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// One WAL line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WalRecord {
    Ingest {
        entry: MemoryEntry,
        ts: DateTime<Utc>,
    },
    Delete {
        id: String,
        ts: DateTime<Utc>,
    },
}

/// Manages the WAL file's lifecycle: append, threshold checks, replay
/// read-back, and atomic truncation.
pub struct WalManager {
    path: PathBuf,
    pending_count: AtomicU64,
}

impl WalManager {
    /// Open (creating if absent) the WAL at `workspace/.wal/pending.jsonl`.
    pub fn open(workspace: &Path) -> Result<Self> {
        let wal_dir = workspace.join(".wal");
        fs::create_dir_all(&wal_dir).map_err(|e| Error::io(wal_dir.clone(), e))?;
        let path = wal_dir.join("pending.jsonl");
        if !path.exists() {
            File::create(&path).map_err(|e| Error::io(path.clone(), e))?;
        }
        let pending_count = count_lines(&path)?;
        Ok(WalManager {
            path,
            pending_count: AtomicU64::new(pending_count),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, fsyncing the file.
    pub fn append(&self, record: &WalRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::io(self.path.clone(), e))?;
        f.write_all(&line).map_err(|e| Error::io(self.path.clone(), e))?;
        f.sync_all().map_err(|e| Error::io(self.path.clone(), e))?;
        self.pending_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Current WAL size in bytes.
    pub fn size_bytes(&self) -> Result<u64> {
        fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| Error::io(self.path.clone(), e))
    }

    pub fn pending_count(&self) -> u64 {
        self.pending_count.load(Ordering::SeqCst)
    }

    /// True once either the record-count or byte-size threshold is
    /// exceeded (spec.md §4.5 flush triggers).
    pub fn should_flush(&self, flush_count: usize, flush_bytes: u64) -> Result<bool> {
        Ok(self.pending_count() as usize >= flush_count || self.size_bytes()? >= flush_bytes)
    }

    /// Read every pending record in append order, for replay or flush.
    pub fn read_all(&self) -> Result<Vec<WalRecord>> {
        let f = File::open(&self.path).map_err(|e| Error::io(self.path.clone(), e))?;
        let reader = BufReader::new(f);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| Error::io(self.path.clone(), e))?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// Atomically truncate the WAL to empty: write a new empty file and
    /// rename it over the old one. Called after every record has been
    /// durably applied to shards and indexes.
    pub fn truncate(&self) -> Result<()> {
        let pid = std::process::id();
        let tmp = self.path.with_extension(format!("jsonl.tmp.{pid}"));
        File::create(&tmp).map_err(|e| Error::io(tmp.clone(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::io(self.path.clone(), e))?;
        self.pending_count.store(0, Ordering::SeqCst);
        info!(path = %self.path.display(), "wal truncated");
        Ok(())
    }

    /// `{pending, size_bytes, sample}` inspection (spec.md §4.5).
    pub fn inspect(&self, sample_size: usize) -> Result<WalInspection> {
        let all = self.read_all()?;
        Ok(WalInspection {
            pending: all.len(),
            size_bytes: self.size_bytes()?,
            sample: all.into_iter().take(sample_size).collect(),
        })
    }
}

/// Result of `wal_inspect()`.
#[derive(Debug, Clone)]
pub struct WalInspection {
    pub pending: usize,
    pub size_bytes: u64,
    pub sample: Vec<WalRecord>,
}

fn count_lines(path: &Path) -> Result<u64> {
    let f = File::open(path).map_err(|e| Error::io(path.to_path_buf(), e))?;
    let reader = BufReader::new(f);
    let mut n = 0u64;
    for line in reader.lines() {
        let line = line.map_err(|e| Error::io(path.to_path_buf(), e))?;
        if !line.trim().is_empty() {
            n += 1;
        }
    }
    debug!(path = %path.display(), n, "counted existing wal lines");
    Ok(n)
}
