//! Pending Writes Module
//!
//! Bounded set of deferred L2 access-metadata refreshes.
//!
//! A refresh is owned by whoever removes it from the set: the timer task that
//! claims it, a flush that drains it, or a cancellation. Only the owner may
//! commit it, so a cancelled refresh can never be written.

use std::collections::HashMap;

use tokio::task::JoinHandle;

// == Metadata Refresh ==
/// Access metadata to merge into a stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRefresh {
    pub storage_key: String,
    /// Identity of the record the refresh was taken from
    pub created_at: u64,
    pub access_count: u64,
    pub last_accessed_at: u64,
}

#[derive(Debug)]
struct PendingWrite {
    id: u64,
    refresh: MetadataRefresh,
    timer: Option<JoinHandle<()>>,
}

// == Pending Writes ==
#[derive(Debug)]
pub struct PendingWrites {
    entries: HashMap<String, PendingWrite>,
    next_id: u64,
    cap: usize,
}

impl PendingWrites {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 0,
            cap,
        }
    }

    /// Reserves an id for a refresh about to be scheduled.
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// True when adding a refresh for `storage_key` would exceed the cap.
    pub fn would_overflow(&self, storage_key: &str) -> bool {
        !self.entries.contains_key(storage_key) && self.entries.len() >= self.cap
    }

    /// Registers a refresh, replacing and cancelling any older one for the same key.
    ///
    /// Callers spawn `timer` while holding the lock that guards this set, so
    /// the timer cannot try to claim before it is registered.
    pub fn insert(&mut self, id: u64, refresh: MetadataRefresh, timer: Option<JoinHandle<()>>) {
        let key = refresh.storage_key.clone();
        if let Some(previous) = self.entries.insert(key, PendingWrite { id, refresh, timer }) {
            abort(previous.timer);
        }
    }

    /// Takes ownership of the refresh `id` if it is still pending.
    pub fn claim(&mut self, storage_key: &str, id: u64) -> Option<MetadataRefresh> {
        match self.entries.get(storage_key) {
            Some(pending) if pending.id == id => self
                .entries
                .remove(storage_key)
                .map(|pending| pending.refresh),
            _ => None,
        }
    }

    /// Drops the refresh for `storage_key` without committing it.
    pub fn cancel(&mut self, storage_key: &str) -> bool {
        match self.entries.remove(storage_key) {
            Some(pending) => {
                abort(pending.timer);
                true
            }
            None => false,
        }
    }

    /// Drops every refresh without committing. Returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, pending) in self.entries.drain() {
            abort(pending.timer);
        }
        count
    }

    /// Removes every refresh for immediate commit, stopping their timers.
    pub fn drain(&mut self) -> Vec<MetadataRefresh> {
        self.entries
            .drain()
            .map(|(_, pending)| {
                abort(pending.timer);
                pending.refresh
            })
            .collect()
    }

    pub fn set_cap(&mut self, cap: usize) {
        self.cap = cap;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn abort(timer: Option<JoinHandle<()>>) {
    if let Some(timer) = timer {
        timer.abort();
    }
}
