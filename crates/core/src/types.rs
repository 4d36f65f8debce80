//! The memory entry data model.
//!
//! Field set is closed and known at compile time (spec.md §9: "dynamic
//! attribute dictionaries -> fixed records"). Unknown keys on load are
//! rejected via `#[serde(deny_unknown_fields)]` rather than silently kept.

use crate::error::{Error, Result};
use crate::hash::content_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Minimum content length for an entry to be ingested (spec.md §3).
pub const MIN_CONTENT_LEN: usize = 15;

/// Memory type — controls decay half-life and recall boost (spec.md §3,
/// §4.7). Closed set, unlike `category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Episodic,
    Fact,
    Preference,
    Procedure,
    Mistake,
}

impl MemoryType {
    /// Half-life multiplier applied on top of `half_life_days` (spec.md
    /// §4.7): episodic=1, fact=1, preference=3, procedure=3, mistake=10.
    pub fn half_life_multiplier(self) -> f64 {
        match self {
            MemoryType::Episodic => 1.0,
            MemoryType::Fact => 1.0,
            MemoryType::Preference => 3.0,
            MemoryType::Procedure => 3.0,
            MemoryType::Mistake => 10.0,
        }
    }
}

/// An entry's shard-routing category. Open set by design (spec.md §3:
/// "one of {strategic, operational, tactical, personal, general, ...}");
/// represented as a validated newtype rather than an enum so new
/// categories don't require a recompile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Build a category from free text, trimming and lowercasing so
    /// `"Strategic"` and `"strategic"` route to the same shard.
    pub fn new(raw: impl Into<String>) -> Self {
        let s = raw.into().trim().to_lowercase();
        Category(if s.is_empty() { "general".to_string() } else { s })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::new("general")
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A memory entry: immutable content, mutable feedback/access stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryEntry {
    /// 128-bit content hash, hex-encoded. Immutable.
    pub hash: String,
    /// Normalized UTF-8 content, length >= [`MIN_CONTENT_LEN`]. Immutable.
    pub content: String,
    /// Free-form origin tag. Immutable.
    pub source: String,
    /// Shard-routing dimension.
    pub category: Category,
    /// Controls decay/recall boost.
    pub memory_type: MemoryType,
    /// Creation timestamp. Immutable.
    pub created: DateTime<Utc>,
    /// Real in [0, inf). Mutated by `record_outcome`.
    pub importance: f64,
    /// Real in [0, 1].
    pub confidence: f64,
    /// Free-form tag set.
    pub tags: BTreeSet<String>,
    /// Tone -> score in [0, 1].
    pub sentiment: BTreeMap<String, f64>,
    /// Non-negative; incremented on every search hit and duplicate ingest.
    pub access_count: u64,
    /// Updated on search hit.
    pub last_accessed: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    /// Build a new entry, computing its content-hash id and validating
    /// the minimum content length. Returns `InvalidData` if `content` is
    /// shorter than [`MIN_CONTENT_LEN`] — callers that want the
    /// "silently dropped" ingest behavior (spec.md §3) should check
    /// length themselves before calling this and treat short content as
    /// a non-error drop, not propagate this error.
    pub fn new(
        content: String,
        source: String,
        category: Category,
        memory_type: MemoryType,
        created: DateTime<Utc>,
    ) -> Result<Self> {
        if content.chars().count() < MIN_CONTENT_LEN {
            return Err(Error::InvalidData(format!(
                "content shorter than {MIN_CONTENT_LEN} chars"
            )));
        }
        let hash = content_id(&content, &source, &created.to_rfc3339());
        Ok(MemoryEntry {
            hash,
            content,
            source,
            category,
            memory_type,
            created,
            importance: 1.0,
            confidence: 0.8,
            tags: BTreeSet::new(),
            sentiment: BTreeMap::new(),
            access_count: 0,
            last_accessed: None,
        })
    }

    /// Shard key: `(YYYY-MM of created, category)`.
    pub fn shard_key(&self) -> ShardKey {
        ShardKey {
            month: self.created.format("%Y-%m").to_string(),
            category: self.category.clone(),
        }
    }

    /// Age in fractional days relative to `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created).num_milliseconds() as f64 / 86_400_000.0
    }

    /// Record a search hit: bump access count and last_accessed.
    pub fn reinforce(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed = Some(now);
    }
}

/// `(month, category)` shard-routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardKey {
    pub month: String,
    pub category: Category,
}

impl ShardKey {
    /// File-name stem for this shard: `<YYYY-MM>-<category>`.
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.month, self.category)
    }
}
