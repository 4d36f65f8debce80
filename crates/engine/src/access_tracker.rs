//! Per-entry access counts and last-access timestamps (spec.md §4.9).
//!
//! Search hits are buffered in memory during a single `search()` call
//! and flushed to `access_counts.json` once, at the end — not one write
//! per hit. The file is independent of shard storage; it mirrors
//! `MemoryEntry::access_count`/`last_accessed` so a reader that only
//! cares about access patterns doesn't need to load every shard.

use chrono::{DateTime, Utc};
use mnemo_core::error::Result;
use mnemo_storage::atomic_io;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AccessRecord {
    access_count: u64,
    last_accessed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AccessFile {
    entries: BTreeMap<String, AccessRecord>,
}

/// Tracks access counts/timestamps for entries, persisted under lock.
pub struct AccessTracker {
    path: PathBuf,
    file: AccessFile,
}

impl AccessTracker {
    pub fn open(workspace: &Path) -> Result<Self> {
        let path = workspace.join("access_counts.json");
        let file: AccessFile = atomic_io::read_json(&path, false)?.unwrap_or_default();
        Ok(AccessTracker { path, file })
    }

    pub fn access_count(&self, id: &str) -> u64 {
        self.file.entries.get(id).map(|r| r.access_count).unwrap_or(0)
    }

    pub fn last_accessed(&self, id: &str) -> Option<DateTime<Utc>> {
        self.file.entries.get(id).and_then(|r| r.last_accessed)
    }

    /// Record one hit per id in `ids`, all at timestamp `now`. Call once
    /// after scoring/ranking completes for a search, not per-candidate.
    pub fn record_hits(&mut self, ids: &[String], now: DateTime<Utc>) {
        for id in ids {
            let rec = self.file.entries.entry(id.clone()).or_default();
            rec.access_count += 1;
            rec.last_accessed = Some(now);
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.file.entries.remove(id);
    }

    /// Persist the current state atomically, under lock.
    pub fn save(&self) -> Result<()> {
        atomic_io::write_json(&self.path, &self.file, true)
    }
}
