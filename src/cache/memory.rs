//! Memory Tier Module
//!
//! Bounded in-memory map (L1) with LRU eviction that never drops critical entries.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheEntry, LruTracker};

// == Lookup Result ==
/// Outcome of a memory-tier lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryLookup {
    /// Live entry; metadata already bumped
    Hit(CacheEntry<Value>),
    /// Entry was present but expired and has been dropped
    Expired,
    Absent,
}

// == Insert Result ==
/// Outcome of a memory-tier insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryInsert {
    /// Stored; carries the key evicted to make room, if any
    Stored { evicted: Option<String> },
    /// Tier is full of critical entries and cannot admit another
    Rejected,
}

// == Memory Tier ==
/// L1 storage: plaintext entries bounded by entry count.
#[derive(Debug)]
pub struct MemoryTier {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<Value>>,
    /// LRU access tracker
    lru: LruTracker,
    /// Maximum number of entries allowed
    capacity: usize,
}

impl MemoryTier {
    // == Constructor ==
    /// Creates an empty tier holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            capacity,
        }
    }

    // == Get ==
    /// Looks up a key at `now`.
    ///
    /// Hits bump `access_count`/`last_accessed_at` and the LRU position.
    /// Expired entries are removed on the spot.
    pub fn get(&mut self, key: &str, now: u64) -> MemoryLookup {
        let Some(entry) = self.entries.get_mut(key) else {
            return MemoryLookup::Absent;
        };

        if entry.is_expired(now) {
            self.remove(key);
            return MemoryLookup::Expired;
        }

        entry.touch(now);
        let hit = entry.clone();
        self.lru.touch(key);
        MemoryLookup::Hit(hit)
    }

    // == Insert ==
    /// Stores an entry, evicting the least recently used non-critical entry
    /// when the tier is full.
    pub fn insert(&mut self, key: &str, entry: CacheEntry<Value>) -> MemoryInsert {
        if self.capacity == 0 {
            return MemoryInsert::Rejected;
        }

        let is_overwrite = self.entries.contains_key(key);
        let mut evicted = None;

        if !is_overwrite && self.entries.len() >= self.capacity {
            match self.evict_one() {
                Some(victim) => evicted = Some(victim),
                None => {
                    debug!(key, "Memory tier full of critical entries, not admitting");
                    return MemoryInsert::Rejected;
                }
            }
        }

        self.entries.insert(key.to_string(), entry);
        self.lru.touch(key);
        MemoryInsert::Stored { evicted }
    }

    // == Remove ==
    /// Removes an entry by key.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<Value>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.lru.remove(key);
        }
        removed
    }

    // == Remove Namespace ==
    /// Removes every entry in `namespace`, returning the removed keys.
    pub fn remove_namespace(&mut self, namespace: &str) -> Vec<String> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.namespace == namespace)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            self.remove(key);
        }
        keys
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
    }

    // == Resize ==
    /// Changes the capacity, evicting down to it. Returns evicted keys.
    ///
    /// Critical entries survive even if that leaves the tier over capacity.
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<String> {
        self.capacity = capacity;
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            match self.evict_one() {
                Some(key) => evicted.push(key),
                None => break,
            }
        }
        evicted
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_one(&mut self) -> Option<String> {
        let entries = &self.entries;
        let victim = self.lru.evict_oldest_where(|k| {
            entries
                .get(k)
                .map(|entry| entry.priority.is_evictable())
                .unwrap_or(true)
        })?;
        self.entries.remove(&victim);
        debug!(key = %victim, "Evicted least recently used memory entry");
        Some(victim)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Priority;
    use serde_json::json;

    fn entry(now: u64, priority: Priority) -> CacheEntry<Value> {
        CacheEntry::new(json!({"v": now}), now, 60_000, priority, "default", 8)
    }

    #[test]
    fn test_memory_insert_and_get() {
        let mut tier = MemoryTier::new(10);
        tier.insert("key1", entry(0, Priority::Normal));

        match tier.get("key1", 10) {
            MemoryLookup::Hit(hit) => {
                assert_eq!(hit.data, json!({"v": 0}));
                assert_eq!(hit.access_count, 1);
                assert_eq!(hit.last_accessed_at, 10);
            }
            other => panic!("expected hit, got {other:?}"),
        }
        assert_eq!(tier.get("missing", 10), MemoryLookup::Absent);
    }

    #[test]
    fn test_memory_expired_entry_is_dropped() {
        let mut tier = MemoryTier::new(10);
        tier.insert("key1", entry(0, Priority::Normal));

        assert_eq!(tier.get("key1", 60_000), MemoryLookup::Expired);
        assert!(!tier.contains("key1"));
        assert_eq!(tier.get("key1", 60_000), MemoryLookup::Absent);
    }

    #[test]
    fn test_memory_lru_eviction() {
        let mut tier = MemoryTier::new(3);

        tier.insert("key1", entry(0, Priority::Normal));
        tier.insert("key2", entry(0, Priority::Normal));
        tier.insert("key3", entry(0, Priority::Normal));

        // Access key1 so key2 becomes the oldest
        tier.get("key1", 1);

        let outcome = tier.insert("key4", entry(2, Priority::Normal));
        assert_eq!(
            outcome,
            MemoryInsert::Stored {
                evicted: Some("key2".to_string())
            }
        );
        assert_eq!(tier.len(), 3);
        assert!(tier.contains("key1"));
        assert!(!tier.contains("key2"));
    }

    #[test]
    fn test_memory_never_evicts_critical() {
        let mut tier = MemoryTier::new(2);

        tier.insert("vip", entry(0, Priority::Critical));
        tier.insert("plain", entry(0, Priority::Low));

        let outcome = tier.insert("new", entry(1, Priority::Normal));
        assert_eq!(
            outcome,
            MemoryInsert::Stored {
                evicted: Some("plain".to_string())
            }
        );
        assert!(tier.contains("vip"));
    }

    #[test]
    fn test_memory_rejects_when_all_critical() {
        let mut tier = MemoryTier::new(1);
        tier.insert("vip", entry(0, Priority::Critical));

        assert_eq!(
            tier.insert("other", entry(1, Priority::Critical)),
            MemoryInsert::Rejected
        );
        assert!(tier.contains("vip"));
        assert!(!tier.contains("other"));
    }

    #[test]
    fn test_memory_overwrite_does_not_evict() {
        let mut tier = MemoryTier::new(2);
        tier.insert("a", entry(0, Priority::Normal));
        tier.insert("b", entry(0, Priority::Normal));

        let outcome = tier.insert("a", entry(5, Priority::Normal));
        assert_eq!(outcome, MemoryInsert::Stored { evicted: None });
        assert_eq!(tier.len(), 2);
    }

    #[test]
    fn test_memory_hundred_and_one_keys() {
        let mut tier = MemoryTier::new(100);
        for i in 0..101 {
            tier.insert(&format!("key{i}"), entry(i, Priority::Normal));
        }

        assert_eq!(tier.len(), 100);
        assert!(!tier.contains("key0"));
        for i in 1..101 {
            assert!(tier.contains(&format!("key{i}")));
        }
    }

    #[test]
    fn test_memory_remove_namespace() {
        let mut tier = MemoryTier::new(10);
        let mut scoped = entry(0, Priority::Normal);
        scoped.namespace = "users".to_string();

        tier.insert("u1", scoped.clone());
        tier.insert("u2", scoped);
        tier.insert("other", entry(0, Priority::Normal));

        let mut removed = tier.remove_namespace("users");
        removed.sort();
        assert_eq!(removed, vec!["u1".to_string(), "u2".to_string()]);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_memory_shrink_capacity() {
        let mut tier = MemoryTier::new(4);
        for key in ["a", "b", "c", "d"] {
            tier.insert(key, entry(0, Priority::Normal));
        }

        let evicted = tier.set_capacity(2);
        assert_eq!(evicted, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(tier.capacity(), 2);
        assert_eq!(tier.len(), 2);
    }

    #[test]
    fn test_memory_zero_capacity_rejects() {
        let mut tier = MemoryTier::new(0);
        assert_eq!(tier.insert("a", entry(0, Priority::Normal)), MemoryInsert::Rejected);
        assert!(tier.is_empty());
    }
}
