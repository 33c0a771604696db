//! LRU Tracker Module
//!
//! Access-order tracking for memory-tier eviction.

use std::collections::{BTreeMap, HashMap};

// == LRU Tracker ==
/// Orders keys by their last access.
///
/// Each touch stamps the key with a fresh tick; the ordered map from tick to
/// key yields the least recently used key first.
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Last access tick per key
    ticks: HashMap<String, u64>,
    /// Keys by access tick, oldest first
    order: BTreeMap<u64, String>,
    next_tick: u64,
}

impl LruTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as the most recently used.
    pub fn touch(&mut self, key: &str) {
        self.next_tick += 1;
        let tick = self.next_tick;
        if let Some(previous) = self.ticks.insert(key.to_string(), tick) {
            self.order.remove(&previous);
        }
        self.order.insert(tick, key.to_string());
    }

    pub fn remove(&mut self, key: &str) {
        if let Some(tick) = self.ticks.remove(key) {
            self.order.remove(&tick);
        }
    }

    // == Evict Oldest Where ==
    /// Removes and returns the least recently used key accepted by `eligible`.
    ///
    /// Keys rejected by the predicate keep their position.
    pub fn evict_oldest_where<F>(&mut self, mut eligible: F) -> Option<String>
    where
        F: FnMut(&str) -> bool,
    {
        let tick = self
            .order
            .iter()
            .find(|(_, key)| eligible(key))
            .map(|(tick, _)| *tick)?;
        let key = self.order.remove(&tick)?;
        self.ticks.remove(&key);
        Some(key)
    }

    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&String> {
        self.order.values().next()
    }

    pub fn clear(&mut self) {
        self.ticks.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.ticks.contains_key(key)
    }
}
