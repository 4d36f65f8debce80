//! Atomic I/O, file locking, version tracking, and shard persistence for
//! mnemo-store.

pub mod atomic_io;
pub mod file_lock;
pub mod shard;
pub mod version_tracker;

pub use file_lock::{FileLock, LockGuard};
pub use shard::{Shard, ShardManager};
pub use version_tracker::FileVersion;
