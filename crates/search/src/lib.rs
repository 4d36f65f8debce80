//! Search: tokenization, inverted indexes, BM25+decay+hybrid scoring, and
//! the read cache (spec.md §4.6-4.7-4.8-4.10).

pub mod cache;
pub mod decay;
pub mod hybrid;
pub mod index;
pub mod scorer;
pub mod tokenizer;

pub use cache::{fingerprint, CacheKey, ReadCache};
pub use decay::{decay as decay_score, half_life_effective, is_archive_candidate};
pub use hybrid::{blend, cosine, EmbeddingCache, Embedder};
pub use index::{DateIndex, IndexManager, RebuildCounts, TagIndex, TextIndex};
pub use scorer::{Explanation, ScoredResult, SearchEngine, SearchQuery};
pub use tokenizer::{is_stopword, tokenize, tokenize_raw};
