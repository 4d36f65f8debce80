//! Near-duplicate merge proposals, topic clustering, and rule-based
//! contradiction detection (spec.md §4.12).
//!
//! Everything here is read-only: it produces a report over a snapshot of
//! entries. Applying a merge or archive is a separate, explicit call the
//! facade exposes.

use mnemo_core::types::MemoryEntry;
use mnemo_search::tokenize;
use std::collections::{HashSet, VecDeque};

/// Jaccard threshold at or above which two entries are proposed as a
/// near-duplicate merge (spec.md §4.12).
pub const NEAR_DUPLICATE_THRESHOLD: f64 = 0.85;
/// Jaccard threshold at or above which two entries share a cluster edge.
pub const CLUSTER_THRESHOLD: f64 = 0.4;
/// Minimum shared significant tokens for a contradiction candidate pair.
pub const CONTRADICTION_MIN_SHARED: usize = 2;

const NEGATION_TOKENS: &[&str] = &["not", "never", "no", "without"];

/// A proposed merge of two near-duplicate entries.
#[derive(Debug, Clone)]
pub struct MergeProposal {
    pub keep: String,
    pub merge_from: String,
    pub similarity: f64,
}

/// A connected cluster of entries sharing a topic, by id.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub ids: Vec<String>,
}

/// A pair flagged for possible contradiction (not asserted as true).
#[derive(Debug, Clone)]
pub struct ContradictionFlag {
    pub a: String,
    pub b: String,
    pub shared_tokens: Vec<String>,
}

/// Full report returned by [`ConsolidationEngine::analyze`].
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub merge_proposals: Vec<MergeProposal>,
    pub clusters: Vec<Cluster>,
    pub contradictions: Vec<ContradictionFlag>,
}

pub struct ConsolidationEngine;

impl ConsolidationEngine {
    pub fn new() -> Self {
        ConsolidationEngine
    }

    /// Run near-duplicate, cluster, and contradiction analysis over
    /// `entries`. Produces a report only; callers apply merges/archives
    /// separately.
    pub fn analyze(&self, entries: &[MemoryEntry]) -> ConsolidationReport {
        let token_sets: Vec<HashSet<String>> = entries
            .iter()
            .map(|e| tokenize(&e.content).into_iter().collect())
            .collect();

        ConsolidationReport {
            merge_proposals: self.near_duplicates(entries, &token_sets),
            clusters: self.clusters(entries, &token_sets),
            contradictions: self.contradictions(entries, &token_sets),
        }
    }

    fn near_duplicates(&self, entries: &[MemoryEntry], token_sets: &[HashSet<String>]) -> Vec<MergeProposal> {
        let mut proposals = Vec::new();
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let sim = jaccard(&token_sets[i], &token_sets[j]);
                if sim >= NEAR_DUPLICATE_THRESHOLD {
                    let (keep, merge_from) = pick_keeper(&entries[i], &entries[j]);
                    proposals.push(MergeProposal {
                        keep,
                        merge_from,
                        similarity: sim,
                    });
                }
            }
        }
        proposals
    }

    /// Connected components over the graph of entries whose pairwise
    /// Jaccard similarity is at least [`CLUSTER_THRESHOLD`] and whose
    /// categories match.
    fn clusters(&self, entries: &[MemoryEntry], token_sets: &[HashSet<String>]) -> Vec<Cluster> {
        let n = entries.len();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            for j in (i + 1)..n {
                if entries[i].category != entries[j].category {
                    continue;
                }
                if jaccard(&token_sets[i], &token_sets[j]) >= CLUSTER_THRESHOLD {
                    adjacency[i].push(j);
                    adjacency[j].push(i);
                }
            }
        }

        let mut visited = vec![false; n];
        let mut clusters = Vec::new();
        for start in 0..n {
            if visited[start] || adjacency[start].is_empty() {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::new();
            queue.push_back(start);
            visited[start] = true;
            while let Some(node) = queue.pop_front() {
                component.push(node);
                for &next in &adjacency[node] {
                    if !visited[next] {
                        visited[next] = true;
                        queue.push_back(next);
                    }
                }
            }
            if component.len() > 1 {
                clusters.push(Cluster {
                    ids: component.into_iter().map(|i| entries[i].hash.clone()).collect(),
                });
            }
        }
        clusters
    }

    /// Rule-based contradiction detection: pairs sharing at least
    /// [`CONTRADICTION_MIN_SHARED`] significant tokens where exactly one
    /// side contains a negation token.
    fn contradictions(&self, entries: &[MemoryEntry], token_sets: &[HashSet<String>]) -> Vec<ContradictionFlag> {
        let mut flags = Vec::new();
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let shared: Vec<String> = token_sets[i].intersection(&token_sets[j]).cloned().collect();
                if shared.len() < CONTRADICTION_MIN_SHARED {
                    continue;
                }
                let a_negated = has_negation(&token_sets[i]);
                let b_negated = has_negation(&token_sets[j]);
                if a_negated != b_negated {
                    flags.push(ContradictionFlag {
                        a: entries[i].hash.clone(),
                        b: entries[j].hash.clone(),
                        shared_tokens: shared,
                    });
                }
            }
        }
        flags
    }
}

impl Default for ConsolidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn has_negation(tokens: &HashSet<String>) -> bool {
    NEGATION_TOKENS.iter().any(|n| tokens.contains(*n))
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Keeper selection for a merge: the entry with higher `importance *
/// confidence` wins; ties keep the earlier-created entry.
fn pick_keeper(a: &MemoryEntry, b: &MemoryEntry) -> (String, String) {
    let score_a = a.importance * a.confidence;
    let score_b = b.importance * b.confidence;
    if score_a > score_b || (score_a == score_b && a.created <= b.created) {
        (a.hash.clone(), b.hash.clone())
    } else {
        (b.hash.clone(), a.hash.clone())
    }
}
