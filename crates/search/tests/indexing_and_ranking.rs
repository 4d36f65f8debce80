//! Integration tests wiring `IndexManager` and `SearchEngine` together
//! the way the engine facade does: rebuild the indexes from a corpus,
//! then rank a query against them.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use mnemo_core::types::{Category, MemoryEntry, MemoryType};
use mnemo_search::{IndexManager, SearchEngine, SearchQuery};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn entry_at(content: &str, days_ago: i64) -> MemoryEntry {
    let created = Utc::now() - ChronoDuration::days(days_ago);
    MemoryEntry::new(
        content.into(),
        "test".into(),
        Category::default(),
        MemoryType::Fact,
        created,
    )
    .unwrap()
}

#[test]
fn rebuild_then_search_ranks_the_more_recent_of_two_equally_matching_entries_higher() {
    let dir = TempDir::new().unwrap();
    let mut index = IndexManager::open(dir.path()).unwrap();

    let older = entry_at("The database migration finished successfully last quarter.", 120);
    let newer = entry_at("The database migration finished successfully this week.", 1);

    let mut entries = BTreeMap::new();
    entries.insert(older.hash.clone(), older.clone());
    entries.insert(newer.hash.clone(), newer.clone());

    let counts = index.rebuild(&entries.values().cloned().collect::<Vec<_>>());
    assert_eq!(counts.entries, 2);

    let engine = SearchEngine::new(7.0);
    let results = engine.search(
        &index,
        &entries,
        &SearchQuery { text: "database migration finished".into(), ..Default::default() },
        Utc::now(),
        None,
        None,
    );

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, newer.hash, "decay should favor the more recent match when lexical scores tie");
}

#[test]
fn rebuilding_the_same_corpus_twice_produces_identical_index_counts() {
    let dir = TempDir::new().unwrap();
    let mut index = IndexManager::open(dir.path()).unwrap();

    let entries: Vec<MemoryEntry> = vec![
        entry_at("A fact about the onboarding flow for new hires.", 10),
        entry_at("A note about the billing reconciliation job.", 5),
    ];

    let first = index.rebuild(&entries);
    let second = index.rebuild(&entries);
    assert_eq!(first, second, "rebuild must be idempotent over an unchanged entry set");
}

#[test]
fn category_filter_excludes_entries_outside_the_requested_category() {
    let dir = TempDir::new().unwrap();
    let mut index = IndexManager::open(dir.path()).unwrap();

    let strategic = MemoryEntry::new(
        "Strategic note about the upcoming platform migration.".into(),
        "test".into(),
        Category::new("strategic"),
        MemoryType::Fact,
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    )
    .unwrap();
    let personal = MemoryEntry::new(
        "Personal note about the upcoming platform migration.".into(),
        "test".into(),
        Category::new("personal"),
        MemoryType::Fact,
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    )
    .unwrap();

    let mut entries = BTreeMap::new();
    entries.insert(strategic.hash.clone(), strategic.clone());
    entries.insert(personal.hash.clone(), personal.clone());
    index.rebuild(&entries.values().cloned().collect::<Vec<_>>());

    let engine = SearchEngine::new(7.0);
    let results = engine.search(
        &index,
        &entries,
        &SearchQuery {
            text: "platform migration".into(),
            category: Some(Category::new("strategic")),
            ..Default::default()
        },
        Utc::now(),
        None,
        None,
    );

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, strategic.hash);
}
