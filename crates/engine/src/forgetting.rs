//! `forget`/`purge` criteria matching and the audit trail (spec.md
//! §4.13).
//!
//! Both operations enumerate matching entries by an OR of the criteria
//! provided, then hand the matched ids back to the facade to remove from
//! shards, indexes, and pending WAL records — this module owns matching
//! and the audit log, not storage mutation.

use chrono::{DateTime, Utc};
use mnemo_core::error::Result;
use mnemo_core::types::MemoryEntry;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Criteria for `forget` — matches are OR'd across whichever fields are
/// set.
#[derive(Debug, Clone, Default)]
pub struct ForgetCriteria {
    pub entity: Option<String>,
    pub topic: Option<String>,
    pub before_date: Option<DateTime<Utc>>,
    pub id: Option<String>,
}

impl ForgetCriteria {
    fn is_empty(&self) -> bool {
        self.entity.is_none() && self.topic.is_none() && self.before_date.is_none() && self.id.is_none()
    }

    fn matches(&self, entry: &MemoryEntry) -> bool {
        if self.is_empty() {
            return false;
        }
        if let Some(id) = &self.id {
            if &entry.hash == id {
                return true;
            }
        }
        if let Some(entity) = &self.entity {
            if entry.content.to_lowercase().contains(&entity.to_lowercase()) {
                return true;
            }
        }
        if let Some(topic) = &self.topic {
            let topic = topic.to_lowercase();
            if entry.content.to_lowercase().contains(&topic) || entry.tags.iter().any(|t| t.to_lowercase() == topic) {
                return true;
            }
        }
        if let Some(before) = self.before_date {
            if entry.created < before {
                return true;
            }
        }
        false
    }
}

/// Criteria for `purge` — matches are OR'd across whichever fields are
/// set.
pub struct PurgeCriteria<'a> {
    pub source: Option<String>,
    pub content_contains: Option<String>,
    pub predicate: Option<Box<dyn Fn(&MemoryEntry) -> bool + 'a>>,
}

impl<'a> Default for PurgeCriteria<'a> {
    fn default() -> Self {
        PurgeCriteria {
            source: None,
            content_contains: None,
            predicate: None,
        }
    }
}

impl<'a> PurgeCriteria<'a> {
    fn is_empty(&self) -> bool {
        self.source.is_none() && self.content_contains.is_none() && self.predicate.is_none()
    }

    fn matches(&self, entry: &MemoryEntry) -> bool {
        if self.is_empty() {
            return false;
        }
        if let Some(source) = &self.source {
            if &entry.source == source {
                return true;
            }
        }
        if let Some(needle) = &self.content_contains {
            if entry.content.to_lowercase().contains(&needle.to_lowercase()) {
                return true;
            }
        }
        if let Some(pred) = &self.predicate {
            if pred(entry) {
                return true;
            }
        }
        false
    }
}

/// One line of `memory_audit.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub op: String,
    pub ts: DateTime<Utc>,
    pub removed_ids: Vec<String>,
}

pub struct ForgettingEngine {
    audit_path: PathBuf,
}

impl ForgettingEngine {
    pub fn new(workspace: &Path) -> Self {
        ForgettingEngine {
            audit_path: workspace.join("memory_audit.jsonl"),
        }
    }

    /// Ids among `entries` matching `criteria`.
    pub fn matching_forget(&self, entries: &[MemoryEntry], criteria: &ForgetCriteria) -> Vec<String> {
        entries
            .iter()
            .filter(|e| criteria.matches(e))
            .map(|e| e.hash.clone())
            .collect()
    }

    /// Ids among `entries` matching `criteria`.
    pub fn matching_purge(&self, entries: &[MemoryEntry], criteria: &PurgeCriteria) -> Vec<String> {
        entries
            .iter()
            .filter(|e| criteria.matches(e))
            .map(|e| e.hash.clone())
            .collect()
    }

    /// Append one audit record for a completed forget/purge.
    pub fn record(&self, op: &str, removed_ids: Vec<String>, now: DateTime<Utc>) -> Result<()> {
        let record = AuditRecord {
            op: op.to_string(),
            ts: now,
            removed_ids,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_path)
            .map_err(|e| mnemo_core::error::Error::io(self.audit_path.clone(), e))?;
        f.write_all(&line)
            .map_err(|e| mnemo_core::error::Error::io(self.audit_path.clone(), e))?;
        f.sync_all()
            .map_err(|e| mnemo_core::error::Error::io(self.audit_path.clone(), e))?;
        Ok(())
    }
}
