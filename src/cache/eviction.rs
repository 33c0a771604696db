//! Eviction Policy Module
//!
//! Chooses which persistent entries to drop when the byte budget is exceeded.

use crate::cache::Priority;

// == Eviction Candidate ==
/// Metadata the policy needs about one stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub storage_key: String,
    pub priority: Priority,
    pub last_accessed_at: u64,
    /// Bytes the record occupies in the store
    pub stored_bytes: usize,
}

// == Select Victims ==
/// Picks records to remove until at least `bytes_needed` bytes are freed.
///
/// Critical records are never considered. The rest are taken by priority
/// ascending, then by `last_accessed_at` ascending. If the whole pool cannot
/// cover the requirement, every eligible record is returned and the caller
/// decides whether that is enough.
pub fn select_victims(
    candidates: &[EvictionCandidate],
    bytes_needed: usize,
) -> Vec<&EvictionCandidate> {
    if bytes_needed == 0 {
        return Vec::new();
    }

    let mut pool: Vec<&EvictionCandidate> = candidates
        .iter()
        .filter(|c| c.priority.is_evictable())
        .collect();
    pool.sort_by_key(|c| (c.priority, c.last_accessed_at));

    let mut freed = 0usize;
    let mut victims = Vec::new();
    for candidate in pool {
        if freed >= bytes_needed {
            break;
        }
        freed += candidate.stored_bytes;
        victims.push(candidate);
    }
    victims
}
