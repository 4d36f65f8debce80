//! Workspace configuration (spec.md §6).

use std::path::{Path, PathBuf};

/// Environment variable consulted when no explicit workspace path is
/// given (spec.md §6).
pub const WORKSPACE_PATH_ENV: &str = "WORKSPACE_PATH";

/// Tunables for a [`crate::types`]-backed store. All defaults match
/// spec.md §6's configuration table.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the workspace. Required.
    pub workspace: PathBuf,
    /// Base decay half-life, in days.
    pub half_life_days: f64,
    /// Minimum content length accepted at ingest.
    pub min_content_len: usize,
    /// WAL records appended before auto-flush.
    pub wal_flush_count: usize,
    /// WAL size in bytes before auto-flush.
    pub wal_flush_bytes: u64,
    /// In-memory entry cap enforced during bulk ingest.
    pub bulk_active_cap: usize,
    /// Max entries held in the LRU search cache.
    pub cache_max_entries: usize,
    /// Age, in seconds, after which a lock is considered stale.
    pub stale_lock_age_s: u64,
    /// Shard files larger than this SHOULD be split by the compactor.
    pub max_shard_bytes: u64,
    /// Decay threshold below which `compact()` proposes archival.
    pub archive_decay_threshold: f64,
    /// Whether `compact()` applies proposed near-duplicate merges
    /// automatically, or only reports them (spec.md §9 open question).
    pub auto_merge_near_duplicates: bool,
    /// Minimum character length for the input gate to classify as P2
    /// rather than P3 (spec.md §4.11).
    pub gate_p2_threshold_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workspace: PathBuf::from("."),
            half_life_days: 7.0,
            min_content_len: 15,
            wal_flush_count: 50,
            wal_flush_bytes: 1024 * 1024,
            bulk_active_cap: 20_000,
            cache_max_entries: 256,
            stale_lock_age_s: 300,
            max_shard_bytes: 2 * 1024 * 1024,
            archive_decay_threshold: 0.05,
            auto_merge_near_duplicates: false,
            gate_p2_threshold_chars: 40,
        }
    }
}

impl Config {
    /// Build a config for an explicit workspace path, keeping every
    /// other field at its default.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Config {
            workspace: workspace.into(),
            ..Default::default()
        }
    }

    /// Resolve the workspace path: use `explicit` if given, otherwise
    /// fall back to the `WORKSPACE_PATH` environment variable.
    pub fn resolve_workspace(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(PathBuf::from)
            .or_else(|| std::env::var_os(WORKSPACE_PATH_ENV).map(PathBuf::from))
    }
}
