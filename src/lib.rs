//! Tiered Cache - a two-level cache with encryption at rest
//!
//! Provides a bounded in-memory tier in front of a persistent byte store,
//! with TTL expiration, priority-aware LRU eviction and passphrase-based
//! AES-256-GCM encryption of persisted payloads.

pub mod cache;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod models;
pub mod tasks;
pub mod validation;

pub use cache::{CacheEngine, MemoryStore, Priority, StoreAdapter};
pub use config::{CryptoConfig, DeploymentTier, EngineConfig};
pub use crypto::CryptoEngine;
pub use error::{CacheError, CryptoError, Result, SchemaError, StoreError};
pub use models::{CacheStats, GetOptions, SetOptions, StorageStatus, WriteStatus};
