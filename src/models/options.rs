//! Operation options for the cache engine
//!
//! Defines the per-call knobs accepted by `set`/`get` and the outcome of a write.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::Priority;

/// Options for the SET operation
///
/// # Fields
/// - `ttl_ms`: Requested lifetime; out-of-range values are clamped, not rejected
/// - `priority`: Eviction resistance
/// - `namespace`: Grouping used by scoped `clear`; `default` when absent
/// - `encrypt`: Persist the value as an encryption envelope
/// - `passphrase`: Overrides the configured passphrase for this call
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetOptions {
    pub ttl_ms: Option<i64>,
    pub priority: Priority,
    pub namespace: Option<String>,
    pub encrypt: bool,
    #[serde(skip)]
    pub passphrase: Option<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }

    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }
}

impl fmt::Debug for SetOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetOptions")
            .field("ttl_ms", &self.ttl_ms)
            .field("priority", &self.priority)
            .field("namespace", &self.namespace)
            .field("encrypt", &self.encrypt)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Options for the GET operation
#[derive(Clone, Default)]
pub struct GetOptions {
    /// Passphrase used if the persisted value is encrypted
    pub passphrase: Option<String>,
}

impl GetOptions {
    pub fn with_passphrase(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Some(passphrase.into()),
        }
    }
}

impl fmt::Debug for GetOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetOptions")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Where a successful `set` landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    /// Written to both tiers
    Persisted,
    /// Persistent store unavailable; only the memory tier holds the value
    MemoryOnly,
}

/// Availability of the persistent tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageStatus {
    Available,
    StorageUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_options_builder() {
        let options = SetOptions::new()
            .ttl_ms(5_000)
            .priority(Priority::High)
            .namespace("users")
            .encrypted();

        assert_eq!(options.ttl_ms, Some(5_000));
        assert_eq!(options.priority, Priority::High);
        assert_eq!(options.namespace.as_deref(), Some("users"));
        assert!(options.encrypt);
    }

    #[test]
    fn test_set_options_deserialize() {
        let json = r#"{"ttlMs": 60000, "priority": "critical"}"#;
        let options: SetOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.ttl_ms, Some(60_000));
        assert_eq!(options.priority, Priority::Critical);
        assert!(!options.encrypt);
        assert!(options.namespace.is_none());
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let options = SetOptions::new().passphrase("correct horse battery staple");
        let rendered = format!("{options:?}");
        assert!(!rendered.contains("horse"));
        assert!(rendered.contains("<redacted>"));

        let get = GetOptions::with_passphrase("correct horse battery staple");
        assert!(!format!("{get:?}").contains("horse"));
    }

    #[test]
    fn test_write_status_serialize() {
        assert_eq!(
            serde_json::to_string(&WriteStatus::MemoryOnly).unwrap(),
            "\"memory_only\""
        );
    }
}
