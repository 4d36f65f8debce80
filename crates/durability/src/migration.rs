//! Legacy single-file layout detection, backup, and history (spec.md §6).
//!
//! The legacy layout is a single `memory_metadata.json` file holding every
//! entry as one JSON document. `MigrationManager` is a one-way input path:
//! detect it, back it up, hand back the parsed entries for the facade to
//! shard and index, then record the migration. It never reads the legacy
//! file as steady-state once migration has recorded success.

use chrono::{DateTime, Utc};
use mnemo_core::error::{Error, Result};
use mnemo_core::types::{Category, MemoryEntry, MemoryType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::info;

/// Permissive legacy entry shape: anything the legacy store wrote that
/// isn't present just falls back to `MemoryEntry`'s defaults, rather
/// than rejecting the whole file the way current-layout loads do.
#[derive(Debug, Deserialize)]
struct LegacyEntry {
    content: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    memory_type: Option<String>,
    created: DateTime<Utc>,
    #[serde(default = "default_importance")]
    importance: f64,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    sentiment: BTreeMap<String, f64>,
    #[serde(default)]
    access_count: u64,
    #[serde(default)]
    last_accessed: Option<DateTime<Utc>>,
}

fn default_importance() -> f64 {
    1.0
}
fn default_confidence() -> f64 {
    0.8
}

#[derive(Debug, Deserialize)]
struct LegacyFile {
    memories: Vec<LegacyEntry>,
}

/// One line of `migrations/history.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries_migrated: usize,
    pub backup_path: PathBuf,
}

pub struct MigrationManager {
    workspace: PathBuf,
}

impl MigrationManager {
    pub fn new(workspace: &Path) -> Self {
        MigrationManager {
            workspace: workspace.to_path_buf(),
        }
    }

    pub fn legacy_path(&self) -> PathBuf {
        self.workspace.join("memory_metadata.json")
    }

    /// Whether a legacy-layout file is present.
    pub fn detect(&self) -> bool {
        self.legacy_path().exists()
    }

    /// Copy the legacy file to `migrations/backup-<ts>.json`, returning
    /// the backup path. Leaves the legacy file in place.
    pub fn backup(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        let migrations_dir = self.workspace.join("migrations");
        std::fs::create_dir_all(&migrations_dir).map_err(|e| Error::io(migrations_dir.clone(), e))?;
        let backup_path = migrations_dir.join(format!("backup-{}.json", now.timestamp_millis()));
        std::fs::copy(self.legacy_path(), &backup_path)
            .map_err(|e| Error::io(backup_path.clone(), e))?;
        info!(backup = %backup_path.display(), "legacy store backed up");
        Ok(backup_path)
    }

    /// Parse the legacy file (or a given backup copy) into entries ready
    /// for sharding and indexing.
    pub fn load_legacy(&self, path: &Path) -> Result<Vec<MemoryEntry>> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path.to_path_buf(), e))?;
        let legacy: LegacyFile = serde_json::from_slice(&bytes)
            .map_err(|e| Error::MigrationFailed(format!("legacy parse failed: {e}")))?;

        let mut entries = Vec::with_capacity(legacy.memories.len());
        for le in legacy.memories {
            let category = Category::new(le.category.unwrap_or_else(|| "general".to_string()));
            let memory_type = le
                .memory_type
                .as_deref()
                .and_then(parse_memory_type)
                .unwrap_or(MemoryType::Fact);
            let mut entry = MemoryEntry::new(le.content, le.source, category, memory_type, le.created)?;
            entry.importance = le.importance;
            entry.confidence = le.confidence;
            entry.tags = le.tags;
            entry.sentiment = le.sentiment;
            entry.access_count = le.access_count;
            entry.last_accessed = le.last_accessed;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Append one record to `migrations/history.json`, a JSON array.
    pub fn append_history(&self, record: &MigrationRecord) -> Result<()> {
        let history_path = self.workspace.join("migrations").join("history.json");
        std::fs::create_dir_all(history_path.parent().unwrap())
            .map_err(|e| Error::io(history_path.clone(), e))?;
        let mut history: Vec<MigrationRecord> = if history_path.exists() {
            let bytes = std::fs::read(&history_path).map_err(|e| Error::io(history_path.clone(), e))?;
            serde_json::from_slice(&bytes)?
        } else {
            Vec::new()
        };
        history.push(record.clone());
        mnemo_storage::atomic_io::write_json(&history_path, &history, true)
    }

    /// Restore the legacy file from a backup, undoing a failed
    /// migration. Only touches the legacy file itself — shards/indexes
    /// that a failed migration may have begun writing are the facade's
    /// responsibility to discard, since this manager has no knowledge of
    /// their representation.
    pub fn rollback(&self, backup_path: &Path) -> Result<()> {
        std::fs::copy(backup_path, self.legacy_path())
            .map_err(|e| Error::io(self.legacy_path(), e))?;
        info!(backup = %backup_path.display(), "legacy store restored from backup");
        Ok(())
    }
}

fn parse_memory_type(s: &str) -> Option<MemoryType> {
    match s {
        "episodic" => Some(MemoryType::Episodic),
        "fact" => Some(MemoryType::Fact),
        "preference" => Some(MemoryType::Preference),
        "procedure" => Some(MemoryType::Procedure),
        "mistake" => Some(MemoryType::Mistake),
        _ => None,
    }
}
