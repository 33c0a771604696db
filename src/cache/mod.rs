//! Cache Module
//!
//! Two-level caching: a bounded memory tier with TTL expiry and LRU eviction
//! in front of a byte-budgeted persistent store.

mod engine;
mod entry;
mod eviction;
mod lru;
mod memory;
mod pending;
mod record;
mod storage;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use engine::CacheEngine;
pub(crate) use engine::EngineShared;
pub use entry::{CacheEntry, EncryptionMetadata, Priority};
pub use eviction::{select_victims, EvictionCandidate};
pub use lru::LruTracker;
pub use memory::{MemoryInsert, MemoryLookup, MemoryTier};
pub use pending::{MetadataRefresh, PendingWrites};
pub use record::StoredRecord;
pub use storage::{MemoryStore, StoreAdapter, StoreResult};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed namespace length in bytes
pub const MAX_NAMESPACE_LENGTH: usize = 64;
