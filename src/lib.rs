//! # mnemo-store
//!
//! A single-node, file-based persistent memory store for AI agents. It
//! ingests short textual entries ("memories"), ranks them by a blend of
//! lexical relevance and time-weighted importance, and keeps the store
//! safe against concurrent writers and crashes.
//!
//! # Quick start
//!
//! ```no_run
//! use mnemo_store::{Category, Config, MemoryType, MemorySystem};
//!
//! fn main() -> mnemo_store::Result<()> {
//!     let mut store = MemorySystem::load(Config::new("./workspace"))?;
//!
//!     store.ingest(
//!         "Decided to use PostgreSQL for the primary database.",
//!         "meeting-notes",
//!         Category::new("strategic"),
//!         MemoryType::Fact,
//!     )?;
//!
//!     let results = store.search(
//!         mnemo_store::SearchQuery { text: "postgresql".into(), ..Default::default() },
//!         None,
//!         None,
//!     )?;
//!     assert!(!results.is_empty());
//!
//!     store.save()?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! [`MemorySystem`] is the facade; it owns a [`Config`]-scoped workspace
//! and every subsystem beneath it. The per-concern crates (storage,
//! durability, search) are not re-exported in full — only the types
//! needed to drive `MemorySystem` are surfaced here.

pub use mnemo_core::config::Config;
pub use mnemo_core::error::{Error, Result};
pub use mnemo_core::types::{Category, MemoryEntry, MemoryType, ShardKey, MIN_CONTENT_LEN};

pub use mnemo_durability::wal::{WalInspection, WalRecord};

pub use mnemo_search::cache::ReadCache;
pub use mnemo_search::hybrid::{Embedder, EmbeddingCache};
pub use mnemo_search::index::RebuildCounts;
pub use mnemo_search::scorer::{Explanation, ScoredResult, SearchQuery};

pub use mnemo_engine::{
    classify, BulkSummary, Cluster, CompactReport, ConsolidationReport, ContradictionFlag,
    FeedbackStats, ForgetCriteria, IngestOutcome, MemorySystem, MergeProposal, OutcomeLabel,
    Priority, PurgeCriteria,
};
