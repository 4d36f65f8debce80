//! BM25 + boosts + decay + reinforcement + hybrid composite scoring
//! (spec.md §4.7).
//!
//! `SearchEngine` is stateless over any single query: it takes the index,
//! the entry map, and the current time, and produces ranked, normalized
//! results without mutating anything itself. Callers (the facade) are
//! responsible for persisting access-count reinforcement afterward.

use crate::decay::decay;
use crate::hybrid::{blend, cosine, EmbeddingCache, Embedder};
use crate::index::IndexManager;
use crate::tokenizer::{tokenize, tokenize_raw};
use mnemo_core::types::{Category, MemoryEntry, MemoryType};
use std::collections::{BTreeMap, HashSet};

/// BM25 k1 constant (spec.md §4.7). Deliberately not the lighter-weight
/// default some BM25-lite implementations use — this store tunes for
/// longer documents.
pub const K1: f64 = 1.5;
/// BM25 length-normalization constant (spec.md §4.7).
pub const B: f64 = 0.75;

pub const PHRASE_BOOST: f64 = 1.5;
pub const TAG_BOOST: f64 = 1.2;
pub const SOURCE_BOOST: f64 = 1.1;

pub const MAX_REINFORCE_ACCESS: u64 = 50;
pub const REINFORCE_STEP: f64 = 0.01;

/// A search request against the store.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    pub category: Option<Category>,
    pub memory_type: Option<MemoryType>,
    pub min_confidence: Option<f64>,
    pub limit: Option<usize>,
    pub explain: bool,
}

/// Per-result score breakdown, populated only when `explain` is set.
#[derive(Debug, Clone, Default)]
pub struct Explanation {
    pub matched_terms: Vec<String>,
    pub lexical: f64,
    pub boosts: f64,
    pub decay: f64,
    pub reinforcement: f64,
    pub importance: f64,
    pub hybrid_cosine: Option<f64>,
    pub final_score: f64,
}

#[derive(Debug, Clone)]
pub struct ScoredResult {
    pub id: String,
    pub relevance: f64,
    pub explanation: Option<Explanation>,
}

/// Stateless BM25-plus-boosts-plus-decay scorer. Construct once from
/// workspace config and reuse across searches.
pub struct SearchEngine {
    pub half_life_days: f64,
}

impl SearchEngine {
    pub fn new(half_life_days: f64) -> Self {
        SearchEngine { half_life_days }
    }

    /// Run a search. `entries` must contain every id referenced by
    /// `index`'s postings. `embedder`/`embeddings` are optional — when
    /// both are present and the query embeds successfully, scores blend
    /// BM25 with cosine similarity per entry (falling back to pure BM25
    /// for entries lacking a cached embedding).
    pub fn search(
        &self,
        index: &IndexManager,
        entries: &BTreeMap<String, MemoryEntry>,
        query: &SearchQuery,
        now: chrono::DateTime<chrono::Utc>,
        embedder: Option<&dyn Embedder>,
        embeddings: Option<&EmbeddingCache>,
    ) -> Vec<ScoredResult> {
        let terms = tokenize(&query.text);
        if terms.is_empty() {
            return Vec::new();
        }

        let candidates = self.candidate_set(index, &terms, query, entries);
        self.score_ids(index, entries, query, &candidates, now, embedder, embeddings)
    }

    /// Score and rank a pre-selected id set against `query`, skipping
    /// the posting-list candidate lookup. Used by the facade's read
    /// cache: a cache hit supplies the previously-ranked id set directly
    /// so only scoring (which reads entries live, reflecting current
    /// access counts and importance) reruns, not index lookup.
    pub fn score_ids(
        &self,
        index: &IndexManager,
        entries: &BTreeMap<String, MemoryEntry>,
        query: &SearchQuery,
        candidates: &HashSet<String>,
        now: chrono::DateTime<chrono::Utc>,
        embedder: Option<&dyn Embedder>,
        embeddings: Option<&EmbeddingCache>,
    ) -> Vec<ScoredResult> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let terms = tokenize(&query.text);
        if terms.is_empty() {
            return Vec::new();
        }

        let raw_tokens = tokenize_raw(&query.text);
        let query_embedding = embedder.map(|e| e.embed(&query.text));

        let mut scored: Vec<(String, f64, Explanation)> = Vec::new();
        for id in &candidates {
            let Some(entry) = entries.get(id) else { continue };

            let (lexical, matched_terms) = self.bm25(index, &terms, id, entries.len());
            if lexical <= 0.0 {
                continue;
            }

            let boosts = self.boosts(entry, &terms, &raw_tokens);
            let d = decay(entry, now, self.half_life_days);
            let reinforce = 1.0 + (entry.access_count.min(MAX_REINFORCE_ACCESS) as f64) * REINFORCE_STEP;
            let importance = entry.importance.max(0.0);

            let bm25_component = lexical * boosts * d * reinforce * importance;

            let hybrid_cosine = match (&query_embedding, embeddings) {
                (Some(qv), Some(cache)) => cache.get(id).map(|dv| cosine(qv, dv)),
                _ => None,
            };

            let explanation = Explanation {
                matched_terms: matched_terms.clone(),
                lexical,
                boosts,
                decay: d,
                reinforcement: reinforce,
                importance,
                hybrid_cosine,
                final_score: 0.0,
            };

            scored.push((id.clone(), bm25_component, explanation));
        }

        if scored.is_empty() {
            return Vec::new();
        }

        let max_bm25 = scored.iter().map(|(_, s, _)| *s).fold(0.0_f64, f64::max);
        if max_bm25 <= 0.0 {
            return Vec::new();
        }

        let mut finalized: Vec<(String, f64, Explanation)> = scored
            .into_iter()
            .map(|(id, bm25_component, mut exp)| {
                let normalized_bm25 = bm25_component / max_bm25;
                let score = match exp.hybrid_cosine {
                    Some(cos) => blend(normalized_bm25, cos),
                    None => normalized_bm25,
                };
                exp.final_score = score;
                (id, score, exp)
            })
            .collect();

        let max_final = finalized.iter().map(|(_, s, _)| *s).fold(0.0_f64, f64::max);
        if max_final <= 0.0 {
            return Vec::new();
        }

        // Ties on relevance break toward the more recently created entry,
        // then toward the lexicographically smaller id, so ranking is
        // fully deterministic.
        finalized.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let created_a = entries.get(&a.0).map(|e| e.created);
                    let created_b = entries.get(&b.0).map(|e| e.created);
                    created_b.cmp(&created_a)
                })
                .then_with(|| a.0.cmp(&b.0))
        });

        let limit = query.limit.unwrap_or(usize::MAX);
        finalized
            .into_iter()
            .take(limit)
            .map(|(id, score, exp)| {
                let relevance = (score / max_final).clamp(0.0, 1.0);
                ScoredResult {
                    id,
                    relevance,
                    explanation: if query.explain { Some(exp) } else { None },
                }
            })
            .collect()
    }

    fn candidate_set(
        &self,
        index: &IndexManager,
        terms: &[String],
        query: &SearchQuery,
        entries: &BTreeMap<String, MemoryEntry>,
    ) -> HashSet<String> {
        let mut ids: HashSet<String> = HashSet::new();
        for term in terms {
            if let Some(postings) = index.text().postings.get(term) {
                for (id, _) in postings {
                    ids.insert(id.clone());
                }
            }
        }

        ids.retain(|id| {
            let Some(entry) = entries.get(id) else { return false };
            if let Some(cat) = &query.category {
                if &entry.category != cat {
                    return false;
                }
            }
            if let Some(mt) = query.memory_type {
                if entry.memory_type != mt {
                    return false;
                }
            }
            if let Some(min_conf) = query.min_confidence {
                if entry.confidence < min_conf {
                    return false;
                }
            }
            true
        });
        ids
    }

    /// BM25 lexical score plus the list of query terms that matched.
    fn bm25(
        &self,
        index: &IndexManager,
        terms: &[String],
        id: &str,
        _entry_count: usize,
    ) -> (f64, Vec<String>) {
        let n = index.total_docs() as f64;
        let avgdl = index.avg_doc_len().max(1.0);
        let doc_len = index.doc_len(id) as f64;

        let mut score = 0.0;
        let mut matched = Vec::new();
        for term in terms {
            let df = index.doc_freq(term) as f64;
            if df == 0.0 {
                continue;
            }
            let tf = index
                .text()
                .postings
                .get(term)
                .and_then(|list| list.iter().find(|(pid, _)| pid == id))
                .map(|(_, tf)| *tf as f64)
                .unwrap_or(0.0);
            if tf == 0.0 {
                continue;
            }
            matched.push(term.clone());
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            let numerator = tf * (K1 + 1.0);
            let denominator = tf + K1 * (1.0 - B + B * doc_len / avgdl);
            score += idf * numerator / denominator;
        }
        (score, matched)
    }

    /// Multiplicative boosts: exact phrase, tag match, source match
    /// (spec.md §4.7).
    fn boosts(&self, entry: &MemoryEntry, terms: &[String], raw_query_tokens: &[String]) -> f64 {
        let mut boost = 1.0;

        if raw_query_tokens.len() >= 2 && contains_phrase(&entry.content, raw_query_tokens) {
            boost *= PHRASE_BOOST;
        }

        let tag_tokens: HashSet<String> = entry
            .tags
            .iter()
            .flat_map(|t| tokenize(t))
            .collect();
        if terms.iter().any(|t| tag_tokens.contains(t)) {
            boost *= TAG_BOOST;
        }

        let source_tokens: HashSet<String> = tokenize(&entry.source).into_iter().collect();
        if terms.iter().any(|t| source_tokens.contains(t)) {
            boost *= SOURCE_BOOST;
        }

        boost
    }
}

/// True if `query_tokens` appears as a consecutive subsequence of
/// `content`'s tokenization (including stopwords, so "the database" can
/// match literally).
fn contains_phrase(content: &str, query_tokens: &[String]) -> bool {
    let content_tokens = tokenize_raw(content);
    if query_tokens.is_empty() || content_tokens.len() < query_tokens.len() {
        return false;
    }
    content_tokens
        .windows(query_tokens.len())
        .any(|w| w == query_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn entry(content: &str, tags: &[&str], source: &str, now: chrono::DateTime<Utc>) -> MemoryEntry {
        let mut e = MemoryEntry::new(
            content.into(),
            source.into(),
            Category::default(),
            MemoryType::Fact,
            now,
        )
        .unwrap();
        e.tags = tags.iter().map(|t| t.to_string()).collect();
        e
    }

    fn setup() -> (TempDir, chrono::DateTime<Utc>) {
        (TempDir::new().unwrap(), Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn basic_search_ranks_relevant_above_irrelevant() {
        let (dir, now) = setup();
        let mut index = IndexManager::open(dir.path()).unwrap();
        let mut entries = BTreeMap::new();

        let e1 = entry("Decided to use PostgreSQL for the primary database.", &[], "cli", now);
        let e2 = entry("The weather today is sunny and warm outside.", &[], "cli", now);
        index.add_entry(&e1);
        index.add_entry(&e2);
        entries.insert(e1.hash.clone(), e1.clone());
        entries.insert(e2.hash.clone(), e2.clone());

        let engine = SearchEngine::new(7.0);
        let query = SearchQuery {
            text: "postgresql database".into(),
            ..Default::default()
        };
        let results = engine.search(&index, &entries, &query, now, None, None);
        assert!(!results.is_empty());
        assert_eq!(results[0].id, e1.hash);
    }

    #[test]
    fn relevance_is_normalized_into_unit_range() {
        let (dir, now) = setup();
        let mut index = IndexManager::open(dir.path()).unwrap();
        let mut entries = BTreeMap::new();
        let e1 = entry("Decided to use PostgreSQL for the database layer.", &[], "cli", now);
        index.add_entry(&e1);
        entries.insert(e1.hash.clone(), e1);

        let engine = SearchEngine::new(7.0);
        let query = SearchQuery {
            text: "postgresql".into(),
            ..Default::default()
        };
        let results = engine.search(&index, &entries, &query, now, None, None);
        assert_eq!(results.len(), 1);
        assert!((results[0].relevance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tag_match_boosts_score() {
        let (dir, now) = setup();
        let mut index = IndexManager::open(dir.path()).unwrap();
        let mut entries = BTreeMap::new();

        let tagged = entry("A note about deployment procedures and rollouts.", &["deployment"], "cli", now);
        let untagged = entry("A note about deployment procedures in general terms.", &[], "cli", now);
        index.add_entry(&tagged);
        index.add_entry(&untagged);
        entries.insert(tagged.hash.clone(), tagged.clone());
        entries.insert(untagged.hash.clone(), untagged.clone());

        let engine = SearchEngine::new(7.0);
        let query = SearchQuery {
            text: "deployment".into(),
            explain: true,
            ..Default::default()
        };
        let results = engine.search(&index, &entries, &query, now, None, None);
        let tagged_result = results.iter().find(|r| r.id == tagged.hash).unwrap();
        let untagged_result = results.iter().find(|r| r.id == untagged.hash).unwrap();
        assert!(tagged_result.explanation.as_ref().unwrap().boosts > untagged_result.explanation.as_ref().unwrap().boosts);
    }

    #[test]
    fn category_filter_excludes_other_categories() {
        let (dir, now) = setup();
        let mut index = IndexManager::open(dir.path()).unwrap();
        let mut entries = BTreeMap::new();

        let mut other = entry("Discussion about database migrations and schema changes.", &[], "cli", now);
        other.category = Category::new("personal");
        index.add_entry(&other);
        entries.insert(other.hash.clone(), other.clone());

        let engine = SearchEngine::new(7.0);
        let query = SearchQuery {
            text: "database migrations".into(),
            category: Some(Category::new("strategic")),
            ..Default::default()
        };
        let results = engine.search(&index, &entries, &query, now, None, None);
        assert!(results.is_empty());
    }

    #[test]
    fn min_confidence_filters_low_confidence_entries() {
        let (dir, now) = setup();
        let mut index = IndexManager::open(dir.path()).unwrap();
        let mut entries = BTreeMap::new();
        let mut low = entry("A low confidence observation about system load averages.", &[], "cli", now);
        low.confidence = 0.1;
        index.add_entry(&low);
        entries.insert(low.hash.clone(), low);

        let engine = SearchEngine::new(7.0);
        let query = SearchQuery {
            text: "confidence observation".into(),
            min_confidence: Some(0.5),
            ..Default::default()
        };
        let results = engine.search(&index, &entries, &query, now, None, None);
        assert!(results.is_empty());
    }

    #[test]
    fn limit_truncates_results() {
        let (dir, now) = setup();
        let mut index = IndexManager::open(dir.path()).unwrap();
        let mut entries = BTreeMap::new();
        for i in 0..5 {
            let e = entry(&format!("Note number {i} about recurring budget planning."), &[], "cli", now);
            index.add_entry(&e);
            entries.insert(e.hash.clone(), e);
        }
        let engine = SearchEngine::new(7.0);
        let query = SearchQuery {
            text: "budget planning".into(),
            limit: Some(2),
            ..Default::default()
        };
        let results = engine.search(&index, &entries, &query, now, None, None);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn empty_query_returns_no_results() {
        let (dir, now) = setup();
        let index = IndexManager::open(dir.path()).unwrap();
        let entries = BTreeMap::new();
        let engine = SearchEngine::new(7.0);
        let query = SearchQuery { text: "the and or".into(), ..Default::default() };
        let results = engine.search(&index, &entries, &query, now, None, None);
        assert!(results.is_empty());
    }

    #[test]
    fn decayed_entry_ranks_below_fresh_entry() {
        let (dir, now) = setup();
        let mut index = IndexManager::open(dir.path()).unwrap();
        let mut entries = BTreeMap::new();

        let fresh = entry("Budget review scheduled for next quarter planning.", &[], "cli", now);
        let stale = entry("Budget review scheduled for next quarter planning too.", &[], "cli", now - chrono::Duration::days(60));
        index.add_entry(&fresh);
        index.add_entry(&stale);
        entries.insert(fresh.hash.clone(), fresh.clone());
        entries.insert(stale.hash.clone(), stale.clone());

        let engine = SearchEngine::new(7.0);
        let query = SearchQuery { text: "budget review quarter planning".into(), ..Default::default() };
        let results = engine.search(&index, &entries, &query, now, None, None);
        let fresh_rank = results.iter().position(|r| r.id == fresh.hash).unwrap();
        let stale_rank = results.iter().position(|r| r.id == stale.hash).unwrap();
        assert!(fresh_rank < stale_rank);
    }

    #[test]
    fn phrase_match_detected() {
        assert!(contains_phrase(
            "the quick brown fox jumps",
            &["quick".to_string(), "brown".to_string()]
        ));
        assert!(!contains_phrase(
            "the quick brown fox jumps",
            &["brown".to_string(), "quick".to_string()]
        ));
    }

    use proptest::prelude::*;

    const SUBJECTS: &[&str] = &["budget", "pipeline", "roadmap", "incident", "release", "database"];
    const VERBS: &[&str] = &["reviewed", "scheduled", "discussed", "finalized", "updated"];

    proptest! {
        /// For any entry set and any query built from the same vocabulary,
        /// every returned relevance lies in [0, 1], and the top result is
        /// exactly 1.0 whenever the result set is non-empty (spec.md §8,
        /// invariant 8).
        #[test]
        fn relevance_always_normalized(
            subject_idx in 0..SUBJECTS.len(),
            verb_indices in proptest::collection::vec(0..VERBS.len(), 1..5),
            age_days in proptest::collection::vec(0.0_f64..120.0, 1..5),
        ) {
            let (dir, now) = setup();
            let mut index = IndexManager::open(dir.path()).unwrap();
            let mut entries = BTreeMap::new();

            let subject = SUBJECTS[subject_idx];
            for (i, &verb_idx) in verb_indices.iter().enumerate() {
                let age = age_days[i % age_days.len()];
                let created = now - chrono::Duration::milliseconds((age * 86_400_000.0) as i64);
                let content = format!("The {subject} was {} during this week's sync", VERBS[verb_idx]);
                let e = entry(&content, &[], "cli", created);
                index.add_entry(&e);
                entries.insert(e.hash.clone(), e);
            }

            let engine = SearchEngine::new(7.0);
            let query = SearchQuery { text: subject.to_string(), ..Default::default() };
            let results = engine.search(&index, &entries, &query, now, None, None);

            for r in &results {
                prop_assert!(r.relevance >= 0.0 && r.relevance <= 1.0);
            }
            if let Some(top) = results.first() {
                prop_assert!((top.relevance - 1.0).abs() < 1e-9);
            }
        }
    }
}
