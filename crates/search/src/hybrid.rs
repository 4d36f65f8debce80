//! Opaque embedding plumbing for the optional hybrid BM25+cosine blend
//! (spec.md §4.7). Embeddings themselves are out of scope — this module
//! only defines the seam: a pluggable `Embedder` callable and a cache of
//! per-entry vectors computed at ingest time.

use std::collections::HashMap;

/// A pluggable embedding function. The core treats this as opaque: it
/// never interprets the vector beyond cosine similarity.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// `id -> embedding`, computed on ingest and cached alongside entry
/// metadata. Absence of a cached embedding for a document makes that
/// document fall back to pure BM25 contribution (spec.md §4.7).
#[derive(Debug, Clone, Default)]
pub struct EmbeddingCache {
    vectors: HashMap<String, Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: String, embedding: Vec<f32>) {
        self.vectors.insert(id, embedding);
    }

    pub fn remove(&mut self, id: &str) {
        self.vectors.remove(id);
    }

    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.vectors.get(id).map(|v| v.as_slice())
    }
}

/// Cosine similarity between two vectors. Returns 0.0 for zero-length
/// vectors or dimension mismatches rather than panicking — a malformed
/// embedding should degrade the score, not the search call.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// `hybrid(d) = 0.4 * normalized_bm25(d) + 0.6 * cosine(embed(Q), embed(d))`.
pub const BM25_WEIGHT: f64 = 0.4;
pub const COSINE_WEIGHT: f64 = 0.6;

pub fn blend(normalized_bm25: f64, cosine_similarity: f64) -> f64 {
    BM25_WEIGHT * normalized_bm25 + COSINE_WEIGHT * cosine_similarity
}
