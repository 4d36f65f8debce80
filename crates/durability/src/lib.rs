//! Write-ahead log and legacy-layout migration for mnemo-store.

pub mod migration;
pub mod wal;

pub use migration::{MigrationManager, MigrationRecord};
pub use wal::{WalInspection, WalManager, WalRecord};
