//! Content hashing for memory entry identity.
//!
//! An entry's id is a 128-bit BLAKE2b digest of its normalized content,
//! source, and creation timestamp. Re-ingesting identical content yields
//! the same id, which is how `ingest` recognizes duplicates.

use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};

type Blake2b128 = Blake2b<U16>;

/// Compute the content-hash id for a memory entry from its normalized
/// content, source, and ISO-8601 creation timestamp.
///
/// The same `(content, source, created)` triple always yields the same
/// id; this is intentional since entries are keyed by creation time.
/// `ingest`'s duplicate detection keys purely on `(content, source)` and
/// looks up the most recent matching entry rather than re-hashing with a
/// fixed `created`, because `created` is only known at first-ingest time.
pub fn content_id(content: &str, source: &str, created: &str) -> String {
    let mut hasher = Blake2b128::new();
    hasher.update(content.as_bytes());
    hasher.update([0u8]);
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(created.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}
