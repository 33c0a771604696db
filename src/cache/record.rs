//! Persisted Record Module
//!
//! JSON wire format of an L2 entry and its typed decode step.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{CacheEntry, EncryptionMetadata, Priority};
use crate::error::SchemaError;

// == Stored Record ==
/// One record per storage key.
///
/// When `encrypted` is true, `data` holds an encryption envelope rather than
/// the plain value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub data: Value,
    pub created_at: u64,
    pub ttl_millis: u64,
    pub priority: Priority,
    pub namespace: String,
    pub access_count: u64,
    pub last_accessed_at: u64,
    pub size_bytes: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionMetadata>,
}

impl StoredRecord {
    /// Builds a record from entry metadata and the payload destined for L2.
    pub fn from_entry<T>(entry: &CacheEntry<T>, payload: Value) -> Self {
        Self {
            data: payload,
            created_at: entry.created_at,
            ttl_millis: entry.ttl_millis,
            priority: entry.priority,
            namespace: entry.namespace.clone(),
            access_count: entry.access_count,
            last_accessed_at: entry.last_accessed_at,
            size_bytes: entry.size_bytes,
            encrypted: entry.encryption.is_some(),
            encryption: entry.encryption.clone(),
        }
    }

    // == Decode ==
    /// Parses and validates raw store bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, SchemaError> {
        let record: StoredRecord = serde_json::from_slice(bytes)?;
        record.validate()?;
        Ok(record)
    }

    // == Encode ==
    pub fn encode(&self) -> Result<Vec<u8>, SchemaError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.ttl_millis == 0 {
            return Err(SchemaError::Invalid("ttlMillis must be positive".to_string()));
        }
        if self.namespace.is_empty() {
            return Err(SchemaError::Invalid("namespace must not be empty".to_string()));
        }
        if self.last_accessed_at < self.created_at {
            return Err(SchemaError::Invalid(
                "lastAccessedAt precedes createdAt".to_string(),
            ));
        }
        if self.encrypted && !self.data.is_object() {
            return Err(SchemaError::Invalid(
                "encrypted record must carry an envelope object".to_string(),
            ));
        }
        Ok(())
    }

    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.ttl_millis)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at()
    }

    /// Converts into an entry carrying `data` as its (plaintext) payload.
    pub fn into_entry(self, data: Value) -> CacheEntry<Value> {
        CacheEntry {
            data,
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
