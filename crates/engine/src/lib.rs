//! Access tracking, input gating, consolidation, forgetting, and the
//! `MemorySystem` facade (spec.md §4.9, §4.11-§4.14).

pub mod access_tracker;
pub mod consolidation;
pub mod forgetting;
pub mod gate;
pub mod memory_system;

pub use access_tracker::AccessTracker;
pub use consolidation::{Cluster, ConsolidationEngine, ConsolidationReport, ContradictionFlag, MergeProposal};
pub use forgetting::{AuditRecord, ForgetCriteria, ForgettingEngine, PurgeCriteria};
pub use gate::{classify, Priority};
pub use memory_system::{BulkSummary, CompactReport, FeedbackStats, IngestOutcome, MemorySystem, OutcomeLabel};
