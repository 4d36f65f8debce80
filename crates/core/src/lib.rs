//! Data model, configuration, and error taxonomy shared by every
//! mnemo-store crate.

pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{Category, MemoryEntry, MemoryType, ShardKey, MIN_CONTENT_LEN};
