//! Integration tests for `WalManager` append/replay/truncate and
//! `MigrationManager` legacy-layout detection and backup, exercised
//! against a real temp workspace rather than in-memory fixtures.

use chrono::Utc;
use mnemo_core::types::{Category, MemoryEntry, MemoryType};
use mnemo_durability::{MigrationManager, MigrationRecord, WalManager, WalRecord};
use tempfile::TempDir;

fn entry(content: &str) -> MemoryEntry {
    MemoryEntry::new(
        content.into(),
        "test".into(),
        Category::default(),
        MemoryType::Fact,
        Utc::now(),
    )
    .unwrap()
}

#[test]
fn wal_replays_every_appended_record_in_order_then_truncates_to_empty() {
    let dir = TempDir::new().unwrap();
    let wal = WalManager::open(dir.path()).unwrap();

    let e1 = entry("first record appended to the write-ahead log");
    let e2 = entry("second record appended to the write-ahead log");
    wal.append(&WalRecord::Ingest { entry: e1.clone(), ts: Utc::now() }).unwrap();
    wal.append(&WalRecord::Ingest { entry: e2.clone(), ts: Utc::now() }).unwrap();
    wal.append(&WalRecord::Delete { id: e1.hash.clone(), ts: Utc::now() }).unwrap();

    assert_eq!(wal.pending_count(), 3);
    let replayed = wal.read_all().unwrap();
    assert_eq!(replayed.len(), 3);

    wal.truncate().unwrap();
    assert_eq!(wal.pending_count(), 0);
    assert!(wal.read_all().unwrap().is_empty());
}

#[test]
fn should_flush_trips_once_the_configured_record_count_is_reached() {
    let dir = TempDir::new().unwrap();
    let wal = WalManager::open(dir.path()).unwrap();
    for i in 0..3 {
        wal.append(&WalRecord::Ingest {
            entry: entry(&format!("record number {i} is long enough for ingest")),
            ts: Utc::now(),
        })
        .unwrap();
    }
    assert!(!wal.should_flush(5, u64::MAX).unwrap());
    assert!(wal.should_flush(3, u64::MAX).unwrap());
}

#[test]
fn migration_manager_detects_backs_up_and_parses_a_legacy_layout_file() {
    let dir = TempDir::new().unwrap();
    let legacy_path = dir.path().join("memory_metadata.json");
    std::fs::write(
        &legacy_path,
        serde_json::json!({
            "memories": [{
                "content": "Legacy note migrated from the old single-file layout.",
                "source": "legacy",
                "created": Utc::now().to_rfc3339(),
            }]
        })
        .to_string(),
    )
    .unwrap();

    let manager = MigrationManager::new(dir.path());
    assert!(manager.detect());

    let backup_path = manager.backup(Utc::now()).unwrap();
    assert!(backup_path.exists());

    let entries = manager.load_legacy(&manager.legacy_path()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].memory_type, MemoryType::Fact);

    let record = MigrationRecord {
        started_at: Utc::now(),
        finished_at: Utc::now(),
        entries_migrated: entries.len(),
        backup_path: backup_path.clone(),
    };
    manager.append_history(&record).unwrap();

    manager.rollback(&backup_path).unwrap();
    assert!(manager.legacy_path().exists());
}
