//! Engine statistics report
//!
//! Serializable view combining metrics with the state of both tiers.

use serde::Serialize;

use crate::metrics::MetricsSnapshot;

/// Report returned by `CacheEngine::get_stats`
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Hit/miss counters and derived rates
    pub metrics: MetricsSnapshot,
    /// Entries currently held in the memory tier
    pub memory_entries: usize,
    /// Records under the engine's key prefix in the persistent tier
    pub storage_entries: usize,
    /// Bytes those records occupy
    pub storage_bytes: usize,
    pub storage_available: bool,
    /// Deferred metadata writes not yet committed
    pub pending_writes: usize,
    pub healthy: bool,
}
