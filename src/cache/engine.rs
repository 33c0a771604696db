//! Cache Engine Module
//!
//! Two-level cache: a bounded memory tier (L1) in front of a byte-budgeted
//! persistent store (L2), with optional encryption of persisted payloads.
//!
//! L1 always holds plaintext. Encrypted entries are decrypted once, when they
//! are promoted from L2. Unusable L2 data (corrupt, expired, undecryptable)
//! is purged and reported as a miss rather than an error.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::eviction::{select_victims, EvictionCandidate};
use crate::cache::memory::{MemoryInsert, MemoryLookup, MemoryTier};
use crate::cache::pending::{MetadataRefresh, PendingWrites};
use crate::cache::record::StoredRecord;
use crate::cache::storage::StoreAdapter;
use crate::cache::{CacheEntry, EncryptionMetadata};
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, MAX_TTL_MS, MIN_TTL_MS};
use crate::crypto::{CryptoEngine, EncryptionEnvelope};
use crate::error::{CacheError, CryptoError, Result, StoreError};
use crate::metrics::Metrics;
use crate::models::{CacheStats, GetOptions, SetOptions, StorageStatus, WriteStatus};
use crate::tasks::spawn_cleanup_task;
use crate::validation::{validate_key, validate_namespace, validate_ttl};

fn lock_std<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// == Cache Engine ==
/// Handle to a cache engine. Instances share nothing with each other.
#[derive(Clone)]
pub struct CacheEngine {
    shared: Arc<EngineShared>,
}

/// State shared between the engine handle and its background tasks.
///
/// Background tasks hold a `Weak` reference so dropping the last handle
/// tears the engine down.
pub(crate) struct EngineShared {
    config: StdRwLock<EngineConfig>,
    memory: Mutex<MemoryTier>,
    store: Arc<dyn StoreAdapter>,
    crypto: Arc<CryptoEngine>,
    metrics: Mutex<Metrics>,
    pending: Mutex<PendingWrites>,
    /// Serialises every L2 mutation
    storage_lock: Mutex<()>,
    cleanup_task: StdMutex<Option<JoinHandle<()>>>,
    storage_degraded: AtomicBool,
    destroyed: AtomicBool,
    clock: Arc<dyn Clock>,
}

/// Result of a sweep over the engine's L2 records.
struct StorageScan {
    live: Vec<EvictionCandidate>,
    purged: usize,
}

impl CacheEngine {
    // == Constructor ==
    /// Creates an engine over `store`.
    ///
    /// Starts the cleanup timer when `auto_cleanup` is set and a tokio
    /// runtime is running; otherwise call `start_auto_cleanup` later.
    pub fn new(
        config: EngineConfig,
        crypto: Arc<CryptoEngine>,
        store: Arc<dyn StoreAdapter>,
    ) -> Result<Self> {
        Self::with_clock(config, crypto, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: EngineConfig,
        crypto: Arc<CryptoEngine>,
        store: Arc<dyn StoreAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let memory_capacity = if config.enable_memory_cache {
            config.max_memory_entries
        } else {
            0
        };
        let auto_cleanup = config.auto_cleanup;

        let shared = Arc::new(EngineShared {
            memory: Mutex::new(MemoryTier::new(memory_capacity)),
            pending: Mutex::new(PendingWrites::new(config.pending_write_cap)),
            metrics: Mutex::new(Metrics::new(clock.now_ms())),
            config: StdRwLock::new(config),
            store,
            crypto,
            storage_lock: Mutex::new(()),
            cleanup_task: StdMutex::new(None),
            storage_degraded: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            clock,
        });
        let engine = Self { shared };

        if auto_cleanup {
            if tokio::runtime::Handle::try_current().is_ok() {
                engine.start_auto_cleanup()?;
            } else {
                debug!("No tokio runtime, auto cleanup not started");
            }
        }

        info!("Cache engine initialized");
        Ok(engine)
    }

    /// Crypto engine used for encrypted entries.
    pub fn crypto(&self) -> &CryptoEngine {
        &self.shared.crypto
    }

    pub fn config(&self) -> EngineConfig {
        self.shared.config()
    }

    // == Get ==
    /// Returns the value stored under `key`, or `None` on a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_with(key, &GetOptions::default()).await
    }

    /// Like `get`, with a passphrase for encrypted entries.
    pub async fn get_with<T: DeserializeOwned>(
        &self,
        key: &str,
        options: &GetOptions,
    ) -> Result<Option<T>> {
        self.shared.ensure_alive()?;
        let key = validate_key(key)?.sanitized;
        self.shared.get(&key, options).await
    }

    // == Set ==
    /// Stores `value` under `key` in both tiers.
    ///
    /// Returns `MemoryOnly` when the persistent store is unavailable. The two
    /// tiers are not updated atomically: on `InsufficientSpace` or
    /// `QuotaExceeded` the memory tier already holds the new value.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<WriteStatus> {
        self.shared.ensure_alive()?;
        self.shared.set(key, value, options).await
    }

    // == Remove ==
    /// Deletes `key` from both tiers and drops any pending refresh for it.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.shared.ensure_alive()?;
        let key = validate_key(key)?.sanitized;
        self.shared.remove(&key).await;
        Ok(())
    }

    // == Has ==
    /// True if `get` would return a value. Expired or corrupt entries are
    /// purged along the way.
    pub async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get::<Value>(key).await?.is_some())
    }

    // == Clear ==
    /// Removes every entry, or only those in `namespace`.
    ///
    /// Returns the number of persistent records removed.
    pub async fn clear(&self, namespace: Option<&str>) -> Result<usize> {
        self.shared.ensure_alive()?;
        match namespace {
            None => Ok(self.shared.clear_all().await),
            Some(namespace) => {
                let namespace = validate_namespace(Some(namespace))?;
                Ok(self.shared.clear_namespace(&namespace).await)
            }
        }
    }

    // == Cleanup ==
    /// Purges expired and corrupt persistent records. The memory tier is
    /// left to expire lazily. Returns the number of records purged.
    pub async fn cleanup(&self) -> Result<usize> {
        self.shared.ensure_alive()?;
        Ok(self.shared.run_cleanup().await)
    }

    // == Stats ==
    pub async fn get_stats(&self) -> Result<CacheStats> {
        self.shared.ensure_alive()?;
        Ok(self.shared.stats().await)
    }

    /// Zeroes hit/miss counters. The start timestamp is kept.
    pub async fn reset_metrics(&self) -> Result<()> {
        self.shared.ensure_alive()?;
        self.shared.metrics.lock().await.reset();
        Ok(())
    }

    pub fn storage_status(&self) -> StorageStatus {
        if self.shared.store_available() {
            StorageStatus::Available
        } else {
            StorageStatus::StorageUnavailable
        }
    }

    // == Deferred Writes ==
    /// Commits every pending metadata refresh now. Returns how many were written.
    pub async fn flush_pending_writes(&self) -> Result<usize> {
        self.shared.ensure_alive()?;
        let refreshes = self.shared.pending.lock().await.drain();
        Ok(self.shared.commit_all(refreshes).await)
    }

    // == Lifecycle ==
    /// Starts the periodic cleanup timer. Does nothing if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_auto_cleanup(&self) -> Result<()> {
        self.shared.ensure_alive()?;
        let interval = Duration::from_millis(self.shared.config().cleanup_interval_ms);

        let mut task = lock_std(&self.shared.cleanup_task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }
        *task = Some(spawn_cleanup_task(Arc::downgrade(&self.shared), interval));
        Ok(())
    }

    /// Stops the periodic cleanup timer. Does nothing if it is not running.
    pub fn stop_auto_cleanup(&self) {
        self.shared.stop_cleanup_task();
    }

    pub fn is_auto_cleanup_running(&self) -> bool {
        lock_std(&self.shared.cleanup_task)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Replaces the configuration between operations.
    ///
    /// The memory tier is trimmed to the new capacity and the cleanup timer
    /// restarted with the new interval.
    pub async fn reconfigure(&self, config: EngineConfig) -> Result<()> {
        self.shared.ensure_alive()?;
        config.validate()?;

        let previous = self.shared.config();
        let auto_cleanup = config.auto_cleanup;
        {
            let mut memory = self.shared.memory.lock().await;
            if config.enable_memory_cache {
                let evicted = memory.set_capacity(config.max_memory_entries);
                if !evicted.is_empty() {
                    debug!(count = evicted.len(), "Trimmed memory tier to new capacity");
                }
            } else {
                memory.clear();
                memory.set_capacity(0);
            }
        }
        {
            let mut pending = self.shared.pending.lock().await;
            if previous.key_prefix != config.key_prefix {
                pending.cancel_all();
            }
            pending.set_cap(config.pending_write_cap);
        }
        *self
            .shared
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;

        self.shared.stop_cleanup_task();
        if auto_cleanup {
            self.start_auto_cleanup()?;
        }
        info!("Cache engine reconfigured");
        Ok(())
    }

    /// Tears the engine down: stops the timer, drops pending writes and
    /// clears the memory tier. Persistent records are kept.
    ///
    /// Idempotent. Every other operation fails with `Destroyed` afterwards.
    pub async fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.stop_cleanup_task();
        let dropped = self.shared.pending.lock().await.cancel_all();
        self.shared.memory.lock().await.clear();
        self.shared.crypto.clear_key_cache();
        info!(dropped_writes = dropped, "Cache engine destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.is_destroyed()
    }
}

impl fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEngine")
            .field("config", &self.shared.config())
            .field("destroyed", &self.shared.is_destroyed())
            .finish_non_exhaustive()
    }
}

impl EngineShared {
    fn config(&self) -> EngineConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(CacheError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn stop_cleanup_task(&self) {
        if let Some(handle) = lock_std(&self.cleanup_task).take() {
            handle.abort();
            debug!("Cleanup task stopped");
        }
    }

    /// Checks the store and logs transitions between available and degraded.
    fn store_available(&self) -> bool {
        let available = self.store.is_available();
        self.note_availability(available);
        available
    }

    fn note_availability(&self, available: bool) {
        if available {
            if self.storage_degraded.swap(false, Ordering::SeqCst) {
                info!("Persistent storage available again");
            }
        } else if !self.storage_degraded.swap(true, Ordering::SeqCst) {
            warn!("Persistent storage unavailable, running memory-only");
        }
    }

    // == Read Path ==
    async fn get<T: DeserializeOwned>(
        self: &Arc<Self>,
        key: &str,
        options: &GetOptions,
    ) -> Result<Option<T>> {
        let config = self.config();
        let storage_key = format!("{}{key}", config.key_prefix);

        if config.enable_memory_cache {
            let lookup = self.memory.lock().await.get(key, self.clock.now_ms());
            match lookup {
                MemoryLookup::Hit(entry) => {
                    return match serde_json::from_value::<T>(entry.data) {
                        Ok(value) => {
                            self.metrics.lock().await.record_l1_hit();
                            Ok(Some(value))
                        }
                        Err(err) => {
                            warn!(key, error = %err, "Cached value has the wrong type, purging");
                            self.purge_everywhere(key, &storage_key).await;
                            self.metrics.lock().await.record_miss();
                            Ok(None)
                        }
                    };
                }
                MemoryLookup::Expired => debug!(key, "Memory entry expired"),
                MemoryLookup::Absent => {}
            }
        }

        let Some((entry, bytes)) = self
            .read_persistent(key, &storage_key, options.passphrase.as_deref())
            .await?
        else {
            if !self.is_destroyed() {
                self.metrics.lock().await.record_miss();
            }
            return Ok(None);
        };

        if self.is_destroyed() {
            return Ok(None);
        }

        let value = match serde_json::from_value::<T>(entry.data.clone()) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "Stored value does not match requested type, purging");
                self.purge_everywhere(key, &storage_key).await;
                self.metrics.lock().await.record_miss();
                return Ok(None);
            }
        };

        let refresh = MetadataRefresh {
            storage_key,
            created_at: entry.created_at,
            access_count: entry.access_count,
            last_accessed_at: entry.last_accessed_at,
        };
        let current = if config.enable_memory_cache {
            self.promote_if_unchanged(key, &refresh.storage_key, &bytes, entry)
                .await
        } else {
            true
        };
        if current {
            self.schedule_refresh(refresh, config.metadata_flush_delay_ms)
                .await;
        }
        self.metrics.lock().await.record_l2_hit();
        Ok(Some(value))
    }

    /// Copies an L2 hit into L1 if the stored record still holds the bytes
    /// it was read from.
    ///
    /// Removals and clears drop the L1 entry while holding `storage_lock`, so
    /// checking under the same lock keeps a removed key from coming back.
    /// Returns `false` when the record was removed or replaced since `read`.
    async fn promote_if_unchanged(
        &self,
        key: &str,
        storage_key: &str,
        read: &[u8],
        entry: CacheEntry<Value>,
    ) -> bool {
        let _guard = self.storage_lock.lock().await;
        match self.store.get(storage_key).await {
            Ok(Some(current)) if current == read => {}
            Ok(_) => {
                debug!(key, "Record changed since read, not promoting");
                return false;
            }
            Err(err) => {
                debug!(key, error = %err, "Promotion skipped");
                return false;
            }
        }

        let mut memory = self.memory.lock().await;
        if self.is_destroyed() {
            return false;
        }
        // A concurrent set may have stored a newer value meanwhile
        if !memory.contains(key) {
            memory.insert(key, entry);
        }
        true
    }

    /// Loads, validates and decrypts the L2 record for `storage_key`.
    ///
    /// Returns the plaintext entry with its access metadata bumped, along
    /// with the stored bytes it came from. Unusable records are purged and
    /// yield `None`.
    async fn read_persistent(
        &self,
        key: &str,
        storage_key: &str,
        passphrase: Option<&str>,
    ) -> Result<Option<(CacheEntry<Value>, Vec<u8>)>> {
        if !self.store_available() {
            return Ok(None);
        }

        let bytes = match self.store.get(storage_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(StoreError::Unavailable) => {
                self.note_availability(false);
                return Ok(None);
            }
            Err(err) => {
                warn!(key, error = %err, "Persistent read failed");
                return Ok(None);
            }
        };

        let record = match StoredRecord::decode(&bytes) {
            Ok(record) => record,
            Err(err) => {
                warn!(key, error = %err, "Purging corrupt persistent record");
                self.purge_if_unchanged(storage_key, &bytes).await;
                return Ok(None);
            }
        };

        if record.is_expired(self.clock.now_ms()) {
            debug!(key, "Purging expired persistent record");
            self.purge_if_unchanged(storage_key, &bytes).await;
            return Ok(None);
        }

        let data = if record.encrypted {
            match self.decrypt_payload(key, &record.data, passphrase).await? {
                Some(data) => data,
                None => {
                    self.purge_if_unchanged(storage_key, &bytes).await;
                    return Ok(None);
                }
            }
        } else {
            record.data.clone()
        };

        let mut entry = record.into_entry(data);
        entry.touch(self.clock.now_ms());
        Ok(Some((entry, bytes)))
    }

    /// Decrypts an envelope payload.
    ///
    /// Payloads that can never be read (no salt, failed authentication,
    /// malformed envelope) yield `None`. Missing or invalid passphrases
    /// propagate because they are caller errors, not data errors.
    async fn decrypt_payload(
        &self,
        key: &str,
        payload: &Value,
        passphrase: Option<&str>,
    ) -> Result<Option<Value>> {
        let envelope: EncryptionEnvelope = match serde_json::from_value(payload.clone()) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(key, error = %err, "Purging malformed encryption envelope");
                return Ok(None);
            }
        };

        let plaintext = match self.crypto.decrypt(&envelope, passphrase).await {
            Ok(plaintext) => plaintext,
            Err(CryptoError::MissingSalt) => {
                warn!(key, "Purging encrypted record without salt");
                return Ok(None);
            }
            Err(err @ (CryptoError::IntegrityViolation | CryptoError::InvalidInput(_))) => {
                warn!(key, error = %err, "Purging undecryptable record");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_slice(&plaintext) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key, error = %err, "Purging record with unparseable plaintext");
                Ok(None)
            }
        }
    }

    // == Write Path ==
    async fn set<T: Serialize + ?Sized>(
        &self,
        raw_key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<WriteStatus> {
        let validated = validate_key(raw_key)?;
        if validated.was_truncated {
            debug!(key = %validated.sanitized, "Key truncated to maximum length");
        }
        let key = validated.sanitized;

        let config = self.config();
        let ttl = validate_ttl(options.ttl_ms, config.default_ttl_ms, MIN_TTL_MS, MAX_TTL_MS);
        if let Some(reason) = ttl.reason {
            warn!(
                key = %key,
                requested = ?options.ttl_ms,
                ttl_ms = ttl.value,
                %reason,
                "TTL adjusted"
            );
        }
        let namespace = validate_namespace(options.namespace.as_deref())?;

        let data =
            serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let plaintext =
            serde_json::to_vec(&data).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let size_bytes = plaintext.len();

        let (payload, encryption) = if options.encrypt {
            let envelope = self
                .crypto
                .encrypt(&plaintext, options.passphrase.as_deref())
                .await?;
            let metadata = EncryptionMetadata {
                algorithm: envelope.algorithm.clone(),
                timestamp: envelope.timestamp,
            };
            let payload = serde_json::to_value(&envelope)
                .map_err(|e| CacheError::Serialization(e.to_string()))?;
            (payload, Some(metadata))
        } else {
            (data.clone(), None)
        };

        // Crypto work may outlive a concurrent destroy
        self.ensure_alive()?;

        let now = self.clock.now_ms();
        let storage_key = format!("{}{key}", config.key_prefix);
        let entry = CacheEntry::new(data, now, ttl.value, options.priority, namespace, size_bytes)
            .with_encryption(encryption);

        self.pending.lock().await.cancel(&storage_key);

        if config.enable_memory_cache {
            match self.memory.lock().await.insert(&key, entry.clone()) {
                MemoryInsert::Stored { evicted: Some(victim) } => {
                    debug!(key = %key, evicted = %victim, "Memory tier full, evicted entry");
                }
                MemoryInsert::Stored { evicted: None } => {}
                MemoryInsert::Rejected => {
                    debug!(key = %key, "Memory tier rejected entry");
                }
            }
        }

        if !self.store_available() {
            return Ok(WriteStatus::MemoryOnly);
        }

        let bytes = StoredRecord::from_entry(&entry, payload)
            .encode()
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let _guard = self.storage_lock.lock().await;
        let outcome = match self.ensure_space(&storage_key, bytes.len(), &config).await {
            Ok(()) => self.store.set(&storage_key, bytes).await.map_err(|err| match err {
                StoreError::QuotaExceeded => CacheError::QuotaExceeded(key.clone()),
                other => other.into(),
            }),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                debug!(key = %key, ttl_ms = ttl.value, "Persisted entry");
                Ok(WriteStatus::Persisted)
            }
            Err(CacheError::StorageUnavailable) => {
                self.note_availability(false);
                Ok(WriteStatus::MemoryOnly)
            }
            Err(err) => {
                warn!(key = %key, error = %err, "Persistent write failed");
                // The previous record must not outlive the value that replaced it in L1
                if let Err(remove_err) = self.store.remove(&storage_key).await {
                    debug!(key = %key, error = %remove_err, "Could not drop stale record");
                }
                Err(err)
            }
        }
    }

    /// Makes room for `required` bytes under `storage_key`.
    ///
    /// Expired and corrupt records go first, then the eviction policy. Nothing
    /// is evicted if eviction could not free enough. Caller holds `storage_lock`.
    async fn ensure_space(
        &self,
        storage_key: &str,
        required: usize,
        config: &EngineConfig,
    ) -> Result<()> {
        let budget = config.max_storage_bytes;
        if required > budget {
            return Err(CacheError::InsufficientSpace {
                required,
                available: budget,
            });
        }

        let scan = self.scan_storage(&config.key_prefix).await?;
        let others: Vec<EvictionCandidate> = scan
            .live
            .into_iter()
            .filter(|candidate| candidate.storage_key != storage_key)
            .collect();
        let used: usize = others.iter().map(|c| c.stored_bytes).sum();
        let available = budget.saturating_sub(used);
        if required <= available {
            return Ok(());
        }

        let victims = select_victims(&others, required - available);
        let freeable: usize = victims.iter().map(|v| v.stored_bytes).sum();
        if available + freeable < required {
            return Err(CacheError::InsufficientSpace {
                required,
                available: available + freeable,
            });
        }

        for victim in &victims {
            self.store.remove(&victim.storage_key).await?;
            self.pending.lock().await.cancel(&victim.storage_key);
        }
        info!(
            evicted = victims.len(),
            freed_bytes = freeable,
            "Evicted persistent entries to make room"
        );
        Ok(())
    }

    /// Walks every record under the prefix, removing expired and corrupt ones.
    /// Caller holds `storage_lock`.
    async fn scan_storage(&self, prefix: &str) -> std::result::Result<StorageScan, StoreError> {
        let now = self.clock.now_ms();
        let mut scan = StorageScan {
            live: Vec::new(),
            purged: 0,
        };

        for storage_key in self.store.keys(prefix).await? {
            let Some(bytes) = self.store.get(&storage_key).await? else {
                continue;
            };
            match StoredRecord::decode(&bytes) {
                Ok(record) if !record.is_expired(now) => scan.live.push(EvictionCandidate {
                    storage_key,
                    priority: record.priority,
                    last_accessed_at: record.last_accessed_at,
                    stored_bytes: bytes.len(),
                }),
                Ok(_) => {
                    debug!(key = %storage_key, "Purging expired persistent record");
                    self.store.remove(&storage_key).await?;
                    scan.purged += 1;
                }
                Err(err) => {
                    warn!(key = %storage_key, error = %err, "Purging corrupt persistent record");
                    self.store.remove(&storage_key).await?;
                    scan.purged += 1;
                }
            }
        }
        Ok(scan)
    }

    // == Removal ==
    async fn remove(&self, key: &str) {
        let storage_key = format!("{}{key}", self.config().key_prefix);
        self.purge_everywhere(key, &storage_key).await;
        debug!(key, "Removed entry");
    }

    /// Drops `key` from both levels. L1 is cleared under `storage_lock` so an
    /// in-flight promotion cannot put it back.
    async fn purge_everywhere(&self, key: &str, storage_key: &str) {
        let _guard = self.storage_lock.lock().await;
        self.pending.lock().await.cancel(storage_key);
        self.memory.lock().await.remove(key);

        if !self.store_available() {
            return;
        }
        if let Err(err) = self.store.remove(storage_key).await {
            warn!(key, error = %err, "Failed to remove persistent record");
        }
    }

    /// Removes `storage_key` only if it still holds `expected`, so a purge
    /// never deletes a record written after it was read.
    async fn purge_if_unchanged(&self, storage_key: &str, expected: &[u8]) {
        let _guard = self.storage_lock.lock().await;
        match self.store.get(storage_key).await {
            Ok(Some(current)) if current == expected => {
                if let Err(err) = self.store.remove(storage_key).await {
                    warn!(key = %storage_key, error = %err, "Failed to purge record");
                }
            }
            Ok(_) => debug!(key = %storage_key, "Record changed since read, not purging"),
            Err(err) => debug!(key = %storage_key, error = %err, "Purge skipped"),
        }
    }

    async fn clear_all(&self) -> usize {
        let _guard = self.storage_lock.lock().await;
        self.memory.lock().await.clear();
        self.pending.lock().await.cancel_all();

        if !self.store_available() {
            info!("Cleared memory tier, persistent storage unavailable");
            return 0;
        }

        let prefix = self.config().key_prefix;
        let keys = match self.store.keys(&prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "Failed to list persistent records");
                return 0;
            }
        };

        let mut removed = 0;
        for storage_key in keys {
            match self.store.remove(&storage_key).await {
                Ok(()) => removed += 1,
                Err(err) => warn!(key = %storage_key, error = %err, "Failed to remove record"),
            }
        }
        info!(removed, "Cleared cache");
        removed
    }

    async fn clear_namespace(&self, namespace: &str) -> usize {
        let prefix = self.config().key_prefix;
        let _guard = self.storage_lock.lock().await;
        let memory_keys = self.memory.lock().await.remove_namespace(namespace);
        {
            let mut pending = self.pending.lock().await;
            for key in &memory_keys {
                pending.cancel(&format!("{prefix}{key}"));
            }
        }

        if !self.store_available() {
            return 0;
        }

        let keys = match self.store.keys(&prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(namespace, error = %err, "Failed to list persistent records");
                return 0;
            }
        };

        let mut removed = 0;
        for storage_key in keys {
            let in_namespace = match self.store.get(&storage_key).await {
                Ok(Some(bytes)) => StoredRecord::decode(&bytes)
                    .map(|record| record.namespace == namespace)
                    .unwrap_or(false),
                _ => false,
            };
            if !in_namespace {
                continue;
            }
            self.pending.lock().await.cancel(&storage_key);
            match self.store.remove(&storage_key).await {
                Ok(()) => removed += 1,
                Err(err) => warn!(key = %storage_key, error = %err, "Failed to remove record"),
            }
        }
        info!(namespace, memory = memory_keys.len(), persistent = removed, "Cleared namespace");
        removed
    }

    // == Cleanup ==
    /// Sweeps expired and corrupt L2 records. A no-op while storage is unavailable.
    pub(crate) async fn run_cleanup(&self) -> usize {
        if !self.store_available() {
            debug!("Cleanup skipped, persistent storage unavailable");
            return 0;
        }

        let prefix = self.config().key_prefix;
        let purged = {
            let _guard = self.storage_lock.lock().await;
            match self.scan_storage(&prefix).await {
                Ok(scan) => scan.purged,
                Err(err) => {
                    warn!(error = %err, "Cleanup sweep failed");
                    return 0;
                }
            }
        };

        self.metrics
            .lock()
            .await
            .update_last_cleanup(self.clock.now_ms());
        if purged > 0 {
            info!("Cleanup: removed {} persistent records", purged);
        } else {
            debug!("Cleanup: nothing to remove");
        }
        purged
    }

    // == Stats ==
    async fn stats(&self) -> CacheStats {
        let (metrics, healthy) = {
            let metrics = self.metrics.lock().await;
            (metrics.snapshot(self.clock.now_ms()), metrics.is_healthy())
        };
        let memory_entries = self.memory.lock().await.len();
        let pending_writes = self.pending.lock().await.len();
        let storage_available = self.store_available();

        let mut storage_entries = 0;
        let mut storage_bytes = 0;
        if storage_available {
            let prefix = self.config().key_prefix;
            match self.store.keys(&prefix).await {
                Ok(keys) => {
                    for storage_key in keys {
                        if let Ok(Some(bytes)) = self.store.get(&storage_key).await {
                            storage_entries += 1;
                            storage_bytes += bytes.len();
                        }
                    }
                }
                Err(err) => warn!(error = %err, "Failed to list persistent records"),
            }
        }

        CacheStats {
            metrics,
            memory_entries,
            storage_entries,
            storage_bytes,
            storage_available,
            pending_writes,
            healthy,
        }
    }

    // == Deferred Metadata Refresh ==
    /// Queues an access-metadata write for a promoted entry.
    ///
    /// A full queue is flushed before the new refresh is queued.
    async fn schedule_refresh(self: &Arc<Self>, refresh: MetadataRefresh, delay_ms: u64) {
        let overflow = {
            let mut pending = self.pending.lock().await;
            if pending.would_overflow(&refresh.storage_key) {
                pending.drain()
            } else {
                Vec::new()
            }
        };
        if !overflow.is_empty() {
            debug!(count = overflow.len(), "Pending write cap reached, flushing");
            self.commit_all(overflow).await;
        }

        let mut pending = self.pending.lock().await;
        if self.is_destroyed() {
            return;
        }
        if pending.would_overflow(&refresh.storage_key) {
            drop(pending);
            self.commit_all(vec![refresh]).await;
            return;
        }

        let id = pending.next_id();
        let storage_key = refresh.storage_key.clone();
        let engine = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if let Some(engine) = engine.upgrade() {
                engine.commit_pending(&storage_key, id).await;
            }
        });
        pending.insert(id, refresh, Some(timer));
    }

    async fn commit_pending(&self, storage_key: &str, id: u64) {
        let _guard = self.storage_lock.lock().await;
        let claimed = self.pending.lock().await.claim(storage_key, id);
        if let Some(refresh) = claimed {
            self.commit_refresh(refresh).await;
        }
    }

    async fn commit_all(&self, refreshes: Vec<MetadataRefresh>) -> usize {
        if refreshes.is_empty() {
            return 0;
        }
        let _guard = self.storage_lock.lock().await;
        let mut committed = 0;
        for refresh in refreshes {
            if self.commit_refresh(refresh).await {
                committed += 1;
            }
        }
        committed
    }

    /// Merges access metadata into the stored record if it is still the
    /// record the refresh was taken from. Caller holds `storage_lock`.
    async fn commit_refresh(&self, refresh: MetadataRefresh) -> bool {
        if self.is_destroyed() || !self.store.is_available() {
            return false;
        }

        let bytes = match self.store.get(&refresh.storage_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %refresh.storage_key, "Dropping refresh for removed record");
                return false;
            }
            Err(err) => {
                debug!(key = %refresh.storage_key, error = %err, "Dropping refresh");
                return false;
            }
        };

        let mut record = match StoredRecord::decode(&bytes) {
            Ok(record) => record,
            Err(_) => return false,
        };
        if record.is_expired(self.clock.now_ms()) || record.created_at != refresh.created_at {
            debug!(key = %refresh.storage_key, "Dropping stale refresh");
            return false;
        }

        record.access_count = record.access_count.max(refresh.access_count);
        record.last_accessed_at = record.last_accessed_at.max(refresh.last_accessed_at);

        let encoded = match record.encode() {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(key = %refresh.storage_key, error = %err, "Failed to encode refresh");
                return false;
            }
        };
        match self.store.set(&refresh.storage_key, encoded).await {
            Ok(()) => true,
            Err(err) => {
                debug!(key = %refresh.storage_key, error = %err, "Refresh write failed");
                false
            }
        }
    }
}

impl Drop for EngineShared {
    fn drop(&mut self) {
        if let Some(handle) = self
            .cleanup_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.pending.get_mut().cancel_all();
    }
}
