//! Key Rotation Module
//!
//! Bookkeeping of key versions: creation, activation, expiry warnings.
//! Existing envelopes are never re-encrypted here.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crypto::token::generate_secure_token;
use crate::error::CryptoError;

// == Key Version ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVersion {
    pub key_id: String,
    /// Strictly increasing across the key ring
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl KeyVersion {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

// == Key Ring ==
/// Ordered set of key versions with at most one active.
#[derive(Debug, Default)]
pub struct KeyRing {
    versions: Vec<KeyVersion>,
    latest: u32,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new, inactive version numbered one past the latest.
    pub fn generate(&mut self, now: DateTime<Utc>, expires_in_days: Option<u32>) -> KeyVersion {
        self.latest += 1;
        let key_id = format!(
            "key_v{}_{}",
            self.latest,
            generate_secure_token(8).unwrap_or_default()
        );
        let version = KeyVersion {
            key_id,
            version: self.latest,
            created_at: now,
            expires_at: expires_in_days.map(|days| now + Duration::days(i64::from(days))),
            is_active: false,
        };
        self.versions.push(version.clone());
        version
    }

    /// Activates `key_id`, deactivating whichever version was active.
    pub fn activate(
        &mut self,
        key_id: &str,
        now: DateTime<Utc>,
    ) -> Result<KeyVersion, CryptoError> {
        let target = self
            .versions
            .iter()
            .position(|v| v.key_id == key_id)
            .ok_or_else(|| CryptoError::UnknownKeyVersion(key_id.to_string()))?;

        if self.versions[target].is_expired(now) {
            return Err(CryptoError::KeyVersionExpired(key_id.to_string()));
        }

        for version in &mut self.versions {
            version.is_active = false;
        }
        self.versions[target].is_active = true;
        info!(
            key_id,
            version = self.versions[target].version,
            "Activated key version"
        );
        Ok(self.versions[target].clone())
    }

    /// True if the version (or the active one when `key_id` is `None`) expires
    /// within `warning_window`. A missing version always needs rotation.
    pub fn needs_rotation(
        &self,
        key_id: Option<&str>,
        warning_window: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let version = match key_id {
            Some(id) => self.versions.iter().find(|v| v.key_id == id),
            None => self.active(),
        };

        match version {
            Some(version) => version
                .expires_at
                .is_some_and(|expires| expires <= now + warning_window),
            None => true,
        }
    }

    pub fn active(&self) -> Option<&KeyVersion> {
        self.versions.iter().find(|v| v.is_active)
    }

    pub fn versions(&self) -> &[KeyVersion] {
        &self.versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_versions_increase_monotonically() {
        let mut ring = KeyRing::new();
        let first = ring.generate(now(), None);
        let second = ring.generate(now(), Some(30));

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_ne!(first.key_id, second.key_id);
        assert!(!second.is_active);
        assert_eq!(second.expires_at, Some(now() + Duration::days(30)));
    }

    #[test]
    fn test_single_active_version() {
        let mut ring = KeyRing::new();
        let first = ring.generate(now(), None);
        let second = ring.generate(now(), None);

        ring.activate(&first.key_id, now()).unwrap();
        ring.activate(&second.key_id, now()).unwrap();

        let active: Vec<_> = ring.versions().iter().filter(|v| v.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].key_id, second.key_id);
    }

    #[test]
    fn test_activate_rejects_unknown_and_expired() {
        let mut ring = KeyRing::new();
        assert!(matches!(
            ring.activate("nope", now()),
            Err(CryptoError::UnknownKeyVersion(_))
        ));

        let short = ring.generate(now(), Some(1));
        let later = now() + Duration::days(2);
        assert!(matches!(
            ring.activate(&short.key_id, later),
            Err(CryptoError::KeyVersionExpired(_))
        ));
        assert!(ring.active().is_none());
    }

    #[test]
    fn test_needs_rotation_window() {
        let mut ring = KeyRing::new();
        assert!(ring.needs_rotation(None, Duration::days(7), now()));

        let key = ring.generate(now(), Some(10));
        ring.activate(&key.key_id, now()).unwrap();

        assert!(!ring.needs_rotation(None, Duration::days(7), now()));
        assert!(ring.needs_rotation(None, Duration::days(10), now()));
        assert!(ring.needs_rotation(Some(&key.key_id), Duration::days(14), now()));
        assert!(ring.needs_rotation(Some("unknown"), Duration::days(1), now()));
    }

    #[test]
    fn test_non_expiring_key_never_needs_rotation() {
        let mut ring = KeyRing::new();
        let key = ring.generate(now(), None);
        ring.activate(&key.key_id, now()).unwrap();

        assert!(!ring.needs_rotation(None, Duration::days(3650), now()));
    }
}
