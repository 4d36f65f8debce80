//! Shard routing and persistence (spec.md §4.4).
//!
//! Shards are stored under `workspace/shards/<YYYY-MM>-<category>.json`,
//! one JSON document per `(month, category)` bucket. Shards are loaded
//! lazily — only when a query or rebuild touches that bucket — and saved
//! atomically, one file per dirty shard.

use crate::atomic_io;
use mnemo_core::error::{Error, Result};
use mnemo_core::types::{MemoryEntry, ShardKey};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk shard document: an ordered sequence of entries for one
/// `(month, category)` bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Shard {
    pub entries: Vec<MemoryEntry>,
}

/// Routes entries to shards and manages their lazy load / dirty-save
/// lifecycle.
pub struct ShardManager {
    shards_dir: PathBuf,
    max_shard_bytes: u64,
    loaded: HashMap<String, Shard>,
    dirty: HashSet<String>,
}

impl ShardManager {
    pub fn new(workspace: &Path, max_shard_bytes: u64) -> Result<Self> {
        let shards_dir = workspace.join("shards");
        std::fs::create_dir_all(&shards_dir).map_err(|e| Error::io(shards_dir.clone(), e))?;
        Ok(ShardManager {
            shards_dir,
            max_shard_bytes,
            loaded: HashMap::new(),
            dirty: HashSet::new(),
        })
    }

    pub fn path_for_stem(&self, stem: &str) -> PathBuf {
        self.shards_dir.join(format!("{stem}.json"))
    }

    fn ensure_loaded(&mut self, stem: &str) -> Result<()> {
        if self.loaded.contains_key(stem) {
            return Ok(());
        }
        let path = self.path_for_stem(stem);
        let shard: Shard = atomic_io::read_json(&path, false)?.unwrap_or_default();
        self.loaded.insert(stem.to_string(), shard);
        Ok(())
    }

    /// Borrow the entries of the shard `key` routes to, loading it on
    /// first access.
    pub fn entries(&mut self, key: &ShardKey) -> Result<&[MemoryEntry]> {
        let stem = key.file_stem();
        self.ensure_loaded(&stem)?;
        Ok(&self.loaded.get(&stem).unwrap().entries)
    }

    /// Insert or replace an entry by hash within its routed shard,
    /// marking the shard dirty.
    pub fn upsert(&mut self, entry: MemoryEntry) -> Result<()> {
        let stem = entry.shard_key().file_stem();
        self.ensure_loaded(&stem)?;
        let shard = self.loaded.get_mut(&stem).unwrap();
        if let Some(existing) = shard.entries.iter_mut().find(|e| e.hash == entry.hash) {
            *existing = entry;
        } else {
            shard.entries.push(entry);
        }
        self.dirty.insert(stem);
        Ok(())
    }

    /// Remove an entry by hash from the shard it would route to. Returns
    /// whether anything was removed. A caller that doesn't know the
    /// shard key up front should use [`ShardManager::remove_from_any`].
    pub fn remove(&mut self, key: &ShardKey, hash: &str) -> Result<bool> {
        let stem = key.file_stem();
        self.ensure_loaded(&stem)?;
        let shard = self.loaded.get_mut(&stem).unwrap();
        let before = shard.entries.len();
        shard.entries.retain(|e| e.hash != hash);
        let removed = shard.entries.len() != before;
        if removed {
            self.dirty.insert(stem);
        }
        Ok(removed)
    }

    /// Remove an entry by hash from whichever loaded shard holds it,
    /// used by forget/purge when the caller only has an id.
    pub fn remove_from_any(&mut self, hash: &str) -> bool {
        let mut removed = false;
        for (stem, shard) in self.loaded.iter_mut() {
            let before = shard.entries.len();
            shard.entries.retain(|e| e.hash != hash);
            if shard.entries.len() != before {
                removed = true;
                self.dirty.insert(stem.clone());
            }
        }
        removed
    }

    /// Persist every dirty shard atomically, returning the count
    /// written.
    pub fn save_dirty(&mut self) -> Result<usize> {
        let stems: Vec<String> = self.dirty.drain().collect();
        for stem in &stems {
            let shard = self.loaded.get(stem).expect("dirty shard must be loaded");
            let path = self.path_for_stem(stem);
            atomic_io::write_json(&path, shard, true)?;
            let len = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if len > self.max_shard_bytes {
                tracing::warn!(
                    shard = stem,
                    bytes = len,
                    max = self.max_shard_bytes,
                    "shard exceeds max_shard_bytes; compact() should split it"
                );
            }
            debug!(shard = stem, "shard persisted");
        }
        info!(count = stems.len(), "dirty shards flushed");
        Ok(stems.len())
    }

    /// Load every shard file present on disk and return all entries,
    /// used by `rebuild_indexes()` and migration.
    pub fn load_all(&mut self) -> Result<Vec<MemoryEntry>> {
        let read_dir = std::fs::read_dir(&self.shards_dir)
            .map_err(|e| Error::io(self.shards_dir.clone(), e))?;
        let mut all = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| Error::io(self.shards_dir.clone(), e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            self.ensure_loaded(&stem)?;
            all.extend(self.loaded.get(&stem).unwrap().entries.iter().cloned());
        }
        Ok(all)
    }

    /// Whether a shard file exists for `stem` on disk — used to detect
    /// the "shard referenced by indexes/WAL is missing" corruption case.
    pub fn shard_file_exists(&self, stem: &str) -> bool {
        self.loaded.contains_key(stem) || self.path_for_stem(stem).exists()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }
}
