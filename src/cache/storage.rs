//! Store Adapter Module
//!
//! Contract for the persistent byte store behind L2, plus an in-process adapter.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::StoreError;

/// Result type returned by store adapters.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// == Store Adapter ==
/// Key-value byte store backing the persistent tier.
///
/// Implementations must be safe to share across tasks. The engine only talks
/// to the store through this trait.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Returns the bytes stored under `key`, if any.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Stores `bytes` under `key`, replacing any previous value.
    ///
    /// Returns `StoreError::QuotaExceeded` when the backend refuses the write.
    async fn set(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Lists every key starting with `prefix`.
    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Reports whether the backend can currently be used.
    fn is_available(&self) -> bool;
}

// == Memory Store ==
/// In-process store adapter with an optional byte quota and an availability
/// switch.
#[derive(Debug)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
    quota_bytes: Option<usize>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(BTreeMap::new()),
            quota_bytes: None,
            available: AtomicBool::new(true),
        }
    }

    /// Creates a store that rejects writes pushing total usage past `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new()
        }
    }

    /// Toggles availability, simulating a disabled or absent backend.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Total bytes held, keys excluded.
    pub fn used_bytes(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        self.check_available()?;
        let mut data = self.lock();

        if let Some(quota) = self.quota_bytes {
            let current: usize = data
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if current + bytes.len() > quota {
                return Err(StoreError::QuotaExceeded);
            }
        }

        data.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.check_available()?;
        self.lock().remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.check_available()?;
        Ok(self
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();

        store.set("cache_a", b"one".to_vec()).await.unwrap();
        store.set("other_b", b"two".to_vec()).await.unwrap();

        assert_eq!(store.get("cache_a").await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.keys("cache_").await.unwrap(), vec!["cache_a".to_string()]);

        store.remove("cache_a").await.unwrap();
        store.remove("cache_a").await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_quota() {
        let store = MemoryStore::with_quota(10);

        store.set("a", vec![0; 6]).await.unwrap();
        assert_eq!(
            store.set("b", vec![0; 6]).await,
            Err(StoreError::QuotaExceeded)
        );
        // Overwriting the same key only counts the new size
        store.set("a", vec![0; 10]).await.unwrap();
        assert_eq!(store.used_bytes(), 10);
    }

    #[tokio::test]
    async fn test_memory_store_unavailable() {
        let store = MemoryStore::new();
        store.set_available(false);

        assert!(!store.is_available());
        assert_eq!(store.get("a").await, Err(StoreError::Unavailable));
        assert_eq!(store.set("a", vec![1]).await, Err(StoreError::Unavailable));

        store.set_available(true);
        assert!(store.set("a", vec![1]).await.is_ok());
    }
}
