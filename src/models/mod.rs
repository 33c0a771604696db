//! Option and report models for the cache engine
//!
//! This module defines the values passed into and returned from engine
//! operations.

pub mod options;
pub mod stats;

// Re-export commonly used types
pub use options::{GetOptions, SetOptions, StorageStatus, WriteStatus};
pub use stats::CacheStats;
