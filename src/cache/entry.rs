//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and priority metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

// == Priority ==
/// Eviction-resistance class of an entry.
///
/// Ordering is `Low < Normal < High < Critical`. Critical entries are never
/// evicted by capacity pressure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Returns true if capacity pressure may remove entries of this priority.
    pub fn is_evictable(self) -> bool {
        self != Priority::Critical
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(CacheError::InvalidPriority(other.to_string())),
        }
    }
}

// == Encryption Metadata ==
/// Marker carried by entries whose persisted payload is an encryption envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    pub algorithm: String,
    pub timestamp: u64,
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// `data` is always plaintext in the memory tier. The expiry instant
/// (`created_at + ttl_millis`) never moves after the entry is written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    /// The stored value
    pub data: T,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Lifetime in milliseconds
    pub ttl_millis: u64,
    pub priority: Priority,
    pub namespace: String,
    /// Number of lookup hits since creation
    pub access_count: u64,
    /// Timestamp of the most recent hit (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Estimated serialized payload size
    pub size_bytes: usize,
    pub encryption: Option<EncryptionMetadata>,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new cache entry stamped at `now`.
    pub fn new(
        data: T,
        now: u64,
        ttl_millis: u64,
        priority: Priority,
        namespace: impl Into<String>,
        size_bytes: usize,
    ) -> Self {
        Self {
            data,
            created_at: now,
            ttl_millis,
            priority,
            namespace: namespace.into(),
            access_count: 0,
            last_accessed_at: now,
            size_bytes,
            encryption: None,
        }
    }

    /// Attaches encryption metadata.
    pub fn with_encryption(mut self, encryption: Option<EncryptionMetadata>) -> Self {
        self.encryption = encryption;
        self
    }

    /// Returns the immutable expiry timestamp.
    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.ttl_millis)
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at()
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, `0` once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.expires_at().saturating_sub(now)
    }

    // == Touch ==
    /// Records a hit. Does not extend the TTL.
    pub fn touch(&mut self, now: u64) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = now;
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    /// Replaces the payload while keeping every piece of metadata.
    pub fn map_data<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            data: f(self.data),
            created_at: self.created_at,
            ttl_millis: self.ttl_millis,
            priority: self.priority,
            namespace: self.namespace,
            access_count: self.access_count,
            last_accessed_at: self.last_accessed_at,
            size_bytes: self.size_bytes,
            encryption: self.encryption,
        }
    }
}
