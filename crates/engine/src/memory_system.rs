//! `MemorySystem`: the facade tying storage, durability, and search
//! together into the single entry point callers use (spec.md §4.14).
//!
//! Owns the authoritative in-memory entry map plus every subsystem: WAL,
//! shards, indexes, access tracker, read cache, gate, consolidation, and
//! forgetting. Every mutating operation follows the flow `gate → ingest
//! → WAL append → in-memory update → index update → (batched) shard
//! persist` from spec.md §2.

use crate::access_tracker::AccessTracker;
use crate::consolidation::{ConsolidationEngine, ConsolidationReport, MergeProposal};
use crate::forgetting::{ForgetCriteria, ForgettingEngine, PurgeCriteria};
use crate::gate::{self, Priority};
use chrono::{DateTime, Utc};
use mnemo_core::config::Config;
use mnemo_core::error::{Error, Result};
use mnemo_core::types::{Category, MemoryEntry, MemoryType};
use mnemo_durability::migration::{MigrationManager, MigrationRecord};
use mnemo_durability::wal::{WalInspection, WalManager, WalRecord};
use mnemo_search::cache::{fingerprint, ReadCache};
use mnemo_search::decay::is_archive_candidate;
use mnemo_search::hybrid::{EmbeddingCache, Embedder};
use mnemo_search::index::{IndexManager, RebuildCounts};
use mnemo_search::scorer::{ScoredResult, SearchEngine, SearchQuery};
use mnemo_storage::shard::ShardManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// Result of a single `ingest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new entry was created with this id.
    Created(String),
    /// Content+source matched an existing entry; it was reinforced
    /// instead of duplicated.
    Reinforced(String),
    /// Rejected before storage; the store is unchanged.
    Dropped { reason: String },
}

/// Outcome label for `record_outcome` (spec.md §4.14).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeLabel {
    Good,
    Neutral,
    Bad,
}

impl OutcomeLabel {
    fn multiplier(self) -> f64 {
        match self {
            OutcomeLabel::Good => 1.2,
            OutcomeLabel::Neutral => 1.0,
            OutcomeLabel::Bad => 0.8,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            OutcomeLabel::Good => "good",
            OutcomeLabel::Neutral => "neutral",
            OutcomeLabel::Bad => "bad",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OutcomeRecord {
    ids: Vec<String>,
    label: String,
    ts: DateTime<Utc>,
}

/// Aggregated counts over `outcomes.jsonl`.
#[derive(Debug, Clone, Default)]
pub struct FeedbackStats {
    pub good: usize,
    pub neutral: usize,
    pub bad: usize,
}

/// Report from `compact()`: entries archived by decay threshold plus
/// whichever near-duplicate merges were applied (only if
/// `auto_merge_near_duplicates` is set; otherwise reported only).
#[derive(Debug, Clone, Default)]
pub struct CompactReport {
    pub archived_ids: Vec<String>,
    pub merge_proposals: Vec<MergeProposal>,
    pub merges_applied: usize,
}

/// Summary returned by `bulk_ingest`.
#[derive(Debug, Clone, Default)]
pub struct BulkSummary {
    pub created: usize,
    pub reinforced: usize,
    pub dropped: usize,
}

/// The facade. One instance owns one workspace.
pub struct MemorySystem {
    config: Config,
    workspace: PathBuf,
    shards: ShardManager,
    index: IndexManager,
    wal: WalManager,
    access: AccessTracker,
    cache: ReadCache,
    forgetting: ForgettingEngine,
    entries: BTreeMap<String, MemoryEntry>,
    bulk_mode: bool,
}

impl MemorySystem {
    /// Open (and, if needed, migrate/replay) a workspace.
    pub fn load(config: Config) -> Result<Self> {
        let workspace = config.workspace.clone();
        std::fs::create_dir_all(&workspace).map_err(|e| Error::io(workspace.clone(), e))?;

        let mut shards = ShardManager::new(&workspace, config.max_shard_bytes)?;
        let mut index = IndexManager::open(&workspace)?;
        let wal = WalManager::open(&workspace)?;
        let access = AccessTracker::open(&workspace)?;
        let forgetting = ForgettingEngine::new(&workspace);

        let migration = MigrationManager::new(&workspace);
        if migration.detect() {
            let started_at = Utc::now();
            let backup_path = migration.backup(started_at)?;
            match migration.load_legacy(&migration.legacy_path()) {
                Ok(legacy_entries) => {
                    let count = legacy_entries.len();
                    for entry in &legacy_entries {
                        shards.upsert(entry.clone())?;
                        index.add_entry(entry);
                    }
                    shards.save_dirty()?;
                    index.save()?;
                    std::fs::remove_file(migration.legacy_path())
                        .map_err(|e| Error::io(migration.legacy_path(), e))?;
                    migration.append_history(&MigrationRecord {
                        started_at,
                        finished_at: Utc::now(),
                        entries_migrated: count,
                        backup_path: backup_path.clone(),
                    })?;
                    info!(count, "legacy store migrated");
                }
                Err(e) => {
                    warn!(error = %e, "legacy migration failed, backup preserved");
                    return Err(e);
                }
            }
        }

        let mut entries: BTreeMap<String, MemoryEntry> =
            shards.load_all()?.into_iter().map(|e| (e.hash.clone(), e)).collect();

        // Replay any WAL records left by a crash between append and
        // shard persist.
        let pending = wal.read_all()?;
        if !pending.is_empty() {
            for record in &pending {
                match record {
                    WalRecord::Ingest { entry, .. } => {
                        shards.upsert(entry.clone())?;
                        index.add_entry(entry);
                        entries.insert(entry.hash.clone(), entry.clone());
                    }
                    WalRecord::Delete { id, .. } => {
                        shards.remove_from_any(id);
                        index.remove_entry_id(id);
                        entries.remove(id);
                    }
                }
            }
            shards.save_dirty()?;
            index.save()?;
            wal.truncate()?;
            info!(count = pending.len(), "wal replayed on load");
        }

        let cache = ReadCache::new(config.cache_max_entries);

        Ok(MemorySystem {
            config,
            workspace,
            shards,
            index,
            wal,
            access,
            cache,
            forgetting,
            entries,
            bulk_mode: false,
        })
    }

    /// Persist every dirty shard, the indexes, and the access tracker.
    pub fn save(&mut self) -> Result<()> {
        self.shards.save_dirty()?;
        self.index.save()?;
        self.access.save()?;
        Ok(())
    }

    pub fn entry(&self, id: &str) -> Option<&MemoryEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ingest raw content, deduplicating against existing entries with
    /// the same `(content, source)`. Content shorter than
    /// `min_content_len` is dropped, not an error (spec.md §3, §7).
    pub fn ingest(
        &mut self,
        content: impl Into<String>,
        source: impl Into<String>,
        category: Category,
        memory_type: MemoryType,
    ) -> Result<IngestOutcome> {
        let content = content.into();
        let source = source.into();
        let now = Utc::now();

        if content.chars().count() < self.config.min_content_len {
            return Ok(IngestOutcome::Dropped {
                reason: format!("content shorter than {} chars", self.config.min_content_len),
            });
        }

        if let Some(existing) = self
            .entries
            .values_mut()
            .find(|e| e.content == content && e.source == source)
        {
            existing.reinforce(now);
            let id = existing.hash.clone();
            let updated = existing.clone();
            self.shards.upsert(updated)?;
            self.cache.invalidate();
            return Ok(IngestOutcome::Reinforced(id));
        }

        if self.bulk_mode && self.entries.len() >= self.config.bulk_active_cap {
            warn!(
                cap = self.config.bulk_active_cap,
                current = self.entries.len(),
                "bulk_active_cap exceeded, dropping entry"
            );
            return Ok(IngestOutcome::Dropped {
                reason: "bulk_active_cap exceeded".to_string(),
            });
        }

        let entry = MemoryEntry::new(content, source, category, memory_type, now)?;
        let id = entry.hash.clone();

        self.wal.append(&WalRecord::Ingest {
            entry: entry.clone(),
            ts: now,
        })?;
        self.entries.insert(id.clone(), entry.clone());
        self.shards.upsert(entry.clone())?;
        if !self.bulk_mode {
            self.index.add_entry(&entry);
        }
        self.cache.invalidate();

        if self.wal.should_flush(self.config.wal_flush_count, self.config.wal_flush_bytes)? {
            self.wal_flush()?;
        }

        Ok(IngestOutcome::Created(id))
    }

    /// Ingest through the priority gate (spec.md §4.11): P3 input is
    /// dropped before it reaches storage.
    pub fn ingest_with_gating(
        &mut self,
        text: impl Into<String>,
        source: impl Into<String>,
        category: Category,
    ) -> Result<IngestOutcome> {
        let text = text.into();
        match gate::classify(&text, self.config.gate_p2_threshold_chars) {
            Priority::P3 => Ok(IngestOutcome::Dropped {
                reason: "gated: P3 filler/greeting".to_string(),
            }),
            _ => self.ingest(text, source, category, MemoryType::Fact),
        }
    }

    pub fn ingest_episodic(&mut self, content: impl Into<String>, source: impl Into<String>, category: Category) -> Result<IngestOutcome> {
        self.ingest(content, source, category, MemoryType::Episodic)
    }

    pub fn ingest_fact(&mut self, content: impl Into<String>, source: impl Into<String>, category: Category) -> Result<IngestOutcome> {
        self.ingest(content, source, category, MemoryType::Fact)
    }

    pub fn ingest_preference(&mut self, content: impl Into<String>, source: impl Into<String>, category: Category) -> Result<IngestOutcome> {
        self.ingest(content, source, category, MemoryType::Preference)
    }

    pub fn ingest_procedure(&mut self, content: impl Into<String>, source: impl Into<String>, category: Category) -> Result<IngestOutcome> {
        self.ingest(content, source, category, MemoryType::Procedure)
    }

    pub fn ingest_mistake(&mut self, content: impl Into<String>, source: impl Into<String>, category: Category) -> Result<IngestOutcome> {
        self.ingest(content, source, category, MemoryType::Mistake)
    }

    /// Ingest many items as a single batch (spec.md §4.14): incremental
    /// index mutation is disabled for the duration, the active-set cap is
    /// enforced against every item, and indexes are rebuilt plus persisted
    /// once at the end rather than per item. This holds regardless of
    /// whether the caller also wraps the call in [`MemorySystem::bulk_mode`].
    pub fn bulk_ingest<I>(&mut self, items: I) -> Result<BulkSummary>
    where
        I: IntoIterator<Item = (String, String, Category, MemoryType)>,
    {
        self.bulk_mode(|s| {
            let mut summary = BulkSummary::default();
            for (content, source, category, memory_type) in items {
                match s.ingest(content, source, category, memory_type)? {
                    IngestOutcome::Created(_) => summary.created += 1,
                    IngestOutcome::Reinforced(_) => summary.reinforced += 1,
                    IngestOutcome::Dropped { .. } => summary.dropped += 1,
                }
            }
            Ok(summary)
        })
    }

    /// Run `f` with index maintenance deferred to exit, then rebuild
    /// indexes once and persist (spec.md §4.14).
    pub fn bulk_mode<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.bulk_mode = true;
        let result = f(self);
        self.bulk_mode = false;
        self.rebuild_indexes()?;
        self.save()?;
        result
    }

    /// Run a search, consulting and updating the read cache, and
    /// reinforcing access stats for returned hits in one batch.
    pub fn search(
        &mut self,
        query: SearchQuery,
        embedder: Option<&dyn Embedder>,
        embeddings: Option<&EmbeddingCache>,
    ) -> Result<Vec<ScoredResult>> {
        let engine = SearchEngine::new(self.config.half_life_days);
        let now = Utc::now();
        let filter_fp = format!(
            "{:?}|{:?}|{:?}|{:?}",
            query.category, query.memory_type, query.min_confidence, query.limit
        );
        let key = fingerprint(&query.text, &filter_fp);

        let results = if let Some(cached_ids) = self.cache.get(&key) {
            let candidates: std::collections::HashSet<String> = cached_ids.into_iter().collect();
            engine.score_ids(&self.index, &self.entries, &query, &candidates, now, embedder, embeddings)
        } else {
            let fresh = engine.search(&self.index, &self.entries, &query, now, embedder, embeddings);
            self.cache.put(key, fresh.iter().map(|r| r.id.clone()).collect());
            fresh
        };

        let hit_ids: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
        for id in &hit_ids {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.reinforce(now);
            }
        }
        self.access.record_hits(&hit_ids, now);
        self.access.save()?;

        Ok(results)
    }

    /// Apply a feedback label to a batch of ids, scaling `importance`
    /// (spec.md §4.14) and appending one record to `outcomes.jsonl`.
    pub fn record_outcome(&mut self, ids: &[String], label: OutcomeLabel) -> Result<()> {
        let mult = label.multiplier();
        for id in ids {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.importance = (entry.importance * mult).clamp(0.01, 100.0);
                self.shards.upsert(entry.clone())?;
            }
        }
        self.append_outcome(ids, label)?;
        self.cache.invalidate();
        Ok(())
    }

    fn append_outcome(&self, ids: &[String], label: OutcomeLabel) -> Result<()> {
        let record = OutcomeRecord {
            ids: ids.to_vec(),
            label: label.as_str().to_string(),
            ts: Utc::now(),
        };
        let path = self.workspace.join("outcomes.jsonl");
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(path.clone(), e))?;
        f.write_all(&line).map_err(|e| Error::io(path.clone(), e))?;
        f.sync_all().map_err(|e| Error::io(path, e))
    }

    /// Aggregate counts from `outcomes.jsonl` by label.
    pub fn feedback_stats(&self) -> Result<FeedbackStats> {
        let path = self.workspace.join("outcomes.jsonl");
        let mut stats = FeedbackStats::default();
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Ok(stats);
        };
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let record: OutcomeRecord = serde_json::from_str(line)?;
            match record.label.as_str() {
                "good" => stats.good += record.ids.len(),
                "neutral" => stats.neutral += record.ids.len(),
                "bad" => stats.bad += record.ids.len(),
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Remove entries matching `criteria`, from the entry map, shards,
    /// indexes, and any still-pending WAL records; append one audit
    /// record. Returns the count removed.
    pub fn forget(&mut self, criteria: ForgetCriteria) -> Result<usize> {
        let all: Vec<MemoryEntry> = self.entries.values().cloned().collect();
        let ids = self.forgetting.matching_forget(&all, &criteria);
        self.remove_ids(&ids, "forget")?;
        Ok(ids.len())
    }

    /// Remove entries matching `criteria` (spec.md §4.13).
    pub fn purge(&mut self, criteria: PurgeCriteria) -> Result<usize> {
        let all: Vec<MemoryEntry> = self.entries.values().cloned().collect();
        let ids = self.forgetting.matching_purge(&all, &criteria);
        self.remove_ids(&ids, "purge")?;
        Ok(ids.len())
    }

    fn remove_ids(&mut self, ids: &[String], op: &str) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        for id in ids {
            self.entries.remove(id);
            self.shards.remove_from_any(id);
            self.index.remove_entry_id(id);
            self.access.remove(id);
        }
        self.prune_wal(ids)?;
        self.shards.save_dirty()?;
        self.index.save()?;
        self.access.save()?;
        self.forgetting.record(op, ids.to_vec(), Utc::now())?;
        self.cache.invalidate();
        Ok(())
    }

    /// Drop any pending WAL records referencing `ids`, rewriting the log
    /// without them.
    fn prune_wal(&self, ids: &[String]) -> Result<()> {
        let id_set: std::collections::HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        let remaining: Vec<WalRecord> = self
            .wal
            .read_all()?
            .into_iter()
            .filter(|r| match r {
                WalRecord::Ingest { entry, .. } => !id_set.contains(entry.hash.as_str()),
                WalRecord::Delete { id, .. } => !id_set.contains(id.as_str()),
            })
            .collect();
        self.wal.truncate()?;
        for r in &remaining {
            self.wal.append(r)?;
        }
        Ok(())
    }

    /// Archive entries below the decay threshold and report (or apply,
    /// per config) near-duplicate merges (spec.md §4.8, §4.12).
    pub fn compact(&mut self) -> Result<CompactReport> {
        let now = Utc::now();
        let all: Vec<MemoryEntry> = self.entries.values().cloned().collect();

        let archived_ids: Vec<String> = all
            .iter()
            .filter(|e| is_archive_candidate(e, now, self.config.half_life_days, self.config.archive_decay_threshold))
            .map(|e| e.hash.clone())
            .collect();

        if !archived_ids.is_empty() {
            self.archive_entries(&archived_ids)?;
        }

        let remaining: Vec<MemoryEntry> = self.entries.values().cloned().collect();
        let report = ConsolidationEngine::new().analyze(&remaining);

        let mut merges_applied = 0;
        if self.config.auto_merge_near_duplicates {
            for proposal in &report.merge_proposals {
                if self.entries.contains_key(&proposal.merge_from) && self.entries.contains_key(&proposal.keep) {
                    self.apply_merge(proposal)?;
                    merges_applied += 1;
                }
            }
        }

        Ok(CompactReport {
            archived_ids,
            merge_proposals: report.merge_proposals,
            merges_applied,
        })
    }

    fn archive_entries(&mut self, ids: &[String]) -> Result<()> {
        let archive_path = self.workspace.join("archive.jsonl");
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&archive_path)
            .map_err(|e| Error::io(archive_path.clone(), e))?;
        for id in ids {
            if let Some(entry) = self.entries.get(id) {
                let mut line = serde_json::to_vec(entry)?;
                line.push(b'\n');
                f.write_all(&line).map_err(|e| Error::io(archive_path.clone(), e))?;
            }
        }
        f.sync_all().map_err(|e| Error::io(archive_path, e))?;
        self.remove_ids(ids, "archive")?;
        Ok(())
    }

    /// Apply one near-duplicate merge proposal: delete `merge_from`,
    /// accumulate its tags and max access count into `keep`.
    fn apply_merge(&mut self, proposal: &MergeProposal) -> Result<()> {
        let merge_from = self.entries.get(&proposal.merge_from).cloned();
        if let Some(loser) = merge_from {
            if let Some(keeper) = self.entries.get_mut(&proposal.keep) {
                keeper.tags.extend(loser.tags.iter().cloned());
                keeper.access_count = keeper.access_count.max(loser.access_count);
            }
            if let Some(keeper) = self.entries.get(&proposal.keep).cloned() {
                self.shards.upsert(keeper)?;
            }
        }
        self.remove_ids(&[proposal.merge_from.clone()], "consolidate_merge")?;
        Ok(())
    }

    /// Read-only consolidation analysis: near-duplicates, clusters,
    /// contradictions (spec.md §4.12).
    pub fn consolidate(&self) -> ConsolidationReport {
        let all: Vec<MemoryEntry> = self.entries.values().cloned().collect();
        ConsolidationEngine::new().analyze(&all)
    }

    /// Persist dirty shards and indexes, then truncate the WAL.
    pub fn wal_flush(&mut self) -> Result<usize> {
        let n = self.shards.save_dirty()?;
        self.index.save()?;
        self.wal.truncate()?;
        Ok(n)
    }

    pub fn wal_inspect(&self, sample_size: usize) -> Result<WalInspection> {
        self.wal.inspect(sample_size)
    }

    /// Rebuild all three indexes from the authoritative entry map.
    pub fn rebuild_indexes(&mut self) -> Result<RebuildCounts> {
        let all: Vec<MemoryEntry> = self.entries.values().cloned().collect();
        let counts = self.index.rebuild(&all);
        self.index.save()?;
        self.cache.invalidate();
        Ok(counts)
    }

    /// Open an isolated nested store under `namespaces/<name>/` (spec.md
    /// §6, §9). There is no global singleton: each namespace is its own
    /// `MemorySystem` instance over its own subdirectory, recorded in
    /// `namespace_manifest.json` so the set of namespaces is discoverable
    /// without scanning the filesystem.
    pub fn namespace(&self, name: &str) -> Result<MemorySystem> {
        let ns_root = self.workspace.join("namespaces").join(name);
        let mut config = self.config.clone();
        config.workspace = ns_root;
        self.record_namespace(name)?;
        MemorySystem::load(config)
    }

    /// Names of every namespace ever opened under this workspace.
    pub fn namespaces(&self) -> Result<Vec<String>> {
        self.read_namespace_manifest()
    }

    fn record_namespace(&self, name: &str) -> Result<()> {
        let mut names = self.read_namespace_manifest()?;
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
            names.sort();
            let path = self.workspace.join("namespace_manifest.json");
            let data = serde_json::to_vec_pretty(&names)?;
            std::fs::write(&path, data).map_err(|e| Error::io(path, e))?;
        }
        Ok(())
    }

    fn read_namespace_manifest(&self) -> Result<Vec<String>> {
        let path = self.workspace.join("namespace_manifest.json");
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(serde_json::from_str(&s)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}
