//! Validation Module
//!
//! Stateless input checks for keys, namespaces, TTLs, priorities and passphrases.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::cache::{Priority, MAX_KEY_LENGTH, MAX_NAMESPACE_LENGTH};
use crate::error::{CacheError, CryptoError};

/// Namespace used when a caller gives none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Hex digits of the hash suffix appended to truncated keys
const KEY_HASH_SUFFIX_LEN: usize = 8;

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

// == TTL ==
/// Why a TTL was adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlAdjustment {
    /// Zero or negative input replaced by the default
    NonPositive,
    BelowMinimum,
    AboveMaximum,
}

impl fmt::Display for TtlAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            TtlAdjustment::NonPositive => "TTL must be positive, using default",
            TtlAdjustment::BelowMinimum => "TTL below minimum, clamped",
            TtlAdjustment::AboveMaximum => "TTL above maximum, clamped",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlValidation {
    pub value: u64,
    pub adjusted: bool,
    pub reason: Option<TtlAdjustment>,
}

/// Normalises a requested TTL. Never fails: out-of-range input is corrected
/// and reported through `adjusted`/`reason`.
pub fn validate_ttl(value: Option<i64>, default_value: u64, min: u64, max: u64) -> TtlValidation {
    let unchanged = |value| TtlValidation {
        value,
        adjusted: false,
        reason: None,
    };
    let adjusted = |value, reason| TtlValidation {
        value,
        adjusted: true,
        reason: Some(reason),
    };

    match value {
        None => unchanged(default_value),
        Some(v) if v <= 0 => adjusted(default_value, TtlAdjustment::NonPositive),
        Some(v) if (v as u64) < min => adjusted(min, TtlAdjustment::BelowMinimum),
        Some(v) if (v as u64) > max => adjusted(max, TtlAdjustment::AboveMaximum),
        Some(v) => unchanged(v as u64),
    }
}

// == Key ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedKey {
    pub sanitized: String,
    pub was_truncated: bool,
}

/// Restricts a key to `[A-Za-z0-9_.:-]`, replacing other characters with `_`.
///
/// Keys longer than `MAX_KEY_LENGTH` are cut and suffixed with a hash of the
/// raw key so distinct long keys stay distinct.
pub fn validate_key(raw: &str) -> Result<ValidatedKey, CacheError> {
    if raw.trim().is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    if !raw.chars().any(is_safe_char) {
        return Err(CacheError::InvalidKey(format!(
            "key has no usable characters: {raw:?}"
        )));
    }

    let sanitized: String = raw
        .chars()
        .map(|c| if is_safe_char(c) { c } else { '_' })
        .collect();

    if sanitized.len() <= MAX_KEY_LENGTH {
        return Ok(ValidatedKey {
            sanitized,
            was_truncated: false,
        });
    }

    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    let keep = MAX_KEY_LENGTH - KEY_HASH_SUFFIX_LEN - 1;
    Ok(ValidatedKey {
        sanitized: format!("{}_{}", &sanitized[..keep], &digest[..KEY_HASH_SUFFIX_LEN]),
        was_truncated: true,
    })
}

// == Namespace ==
/// Returns the namespace to use, `default` when none is given.
pub fn validate_namespace(raw: Option<&str>) -> Result<String, CacheError> {
    let namespace = match raw.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_NAMESPACE.to_string()),
        Some(namespace) => namespace,
    };

    if namespace.len() > MAX_NAMESPACE_LENGTH {
        return Err(CacheError::InvalidNamespace(format!(
            "namespace exceeds {MAX_NAMESPACE_LENGTH} characters"
        )));
    }
    if !namespace.chars().all(is_safe_char) {
        return Err(CacheError::InvalidNamespace(namespace.to_string()));
    }
    Ok(namespace.to_string())
}

// == Priority ==
pub fn validate_priority(raw: &str) -> Result<Priority, CacheError> {
    raw.parse()
}

// == Passphrase ==
/// Rejects passphrases shorter than `min_length` characters.
pub fn validate_passphrase(passphrase: &str, min_length: usize) -> Result<(), CryptoError> {
    if passphrase.trim().is_empty() {
        return Err(CryptoError::InvalidPassphrase(
            "passphrase must not be empty".to_string(),
        ));
    }
    if passphrase.chars().count() < min_length {
        return Err(CryptoError::InvalidPassphrase(format!(
            "passphrase must be at least {min_length} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_TTL_MS, MAX_TTL_MS, MIN_TTL_MS};

    #[test]
    fn test_ttl_negative_uses_default() {
        let result = validate_ttl(Some(-5), 86_400_000, 1_000, 31_536_000_000);
        assert_eq!(result.value, 86_400_000);
        assert!(result.adjusted);
        assert_eq!(result.reason, Some(TtlAdjustment::NonPositive));
    }

    #[test]
    fn test_ttl_clamping() {
        let low = validate_ttl(Some(10), DEFAULT_TTL_MS, MIN_TTL_MS, MAX_TTL_MS);
        assert_eq!((low.value, low.adjusted), (MIN_TTL_MS, true));

        let high = validate_ttl(Some(i64::MAX), DEFAULT_TTL_MS, MIN_TTL_MS, MAX_TTL_MS);
        assert_eq!((high.value, high.adjusted), (MAX_TTL_MS, true));
        assert_eq!(high.reason, Some(TtlAdjustment::AboveMaximum));
    }

    #[test]
    fn test_ttl_in_range_and_absent() {
        let ok = validate_ttl(Some(5_000), DEFAULT_TTL_MS, MIN_TTL_MS, MAX_TTL_MS);
        assert_eq!(
            ok,
            TtlValidation {
                value: 5_000,
                adjusted: false,
                reason: None
            }
        );

        let absent = validate_ttl(None, DEFAULT_TTL_MS, MIN_TTL_MS, MAX_TTL_MS);
        assert_eq!(absent.value, DEFAULT_TTL_MS);
        assert!(!absent.adjusted);
    }

    #[test]
    fn test_key_sanitization() {
        let key = validate_key("user profile/42").unwrap();
        assert_eq!(key.sanitized, "user_profile_42");
        assert!(!key.was_truncated);

        assert_eq!(validate_key("a.b:c-d_e").unwrap().sanitized, "a.b:c-d_e");
    }

    #[test]
    fn test_key_rejections() {
        assert!(matches!(validate_key(""), Err(CacheError::InvalidKey(_))));
        assert!(matches!(validate_key("   "), Err(CacheError::InvalidKey(_))));
        assert!(matches!(validate_key("/// ???"), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn test_key_truncation_is_deterministic_and_unique() {
        let base = "k".repeat(MAX_KEY_LENGTH + 10);
        let a = validate_key(&format!("{base}a")).unwrap();
        let a_again = validate_key(&format!("{base}a")).unwrap();
        let b = validate_key(&format!("{base}b")).unwrap();

        assert!(a.was_truncated);
        assert_eq!(a.sanitized.len(), MAX_KEY_LENGTH);
        assert_eq!(a, a_again);
        assert_ne!(a.sanitized, b.sanitized);
    }

    #[test]
    fn test_namespace() {
        assert_eq!(validate_namespace(None).unwrap(), DEFAULT_NAMESPACE);
        assert_eq!(validate_namespace(Some(" ")).unwrap(), DEFAULT_NAMESPACE);
        assert_eq!(validate_namespace(Some("users")).unwrap(), "users");
        assert!(matches!(
            validate_namespace(Some("bad space")),
            Err(CacheError::InvalidNamespace(_))
        ));
        assert!(validate_namespace(Some(&"n".repeat(MAX_NAMESPACE_LENGTH + 1))).is_err());
    }

    #[test]
    fn test_priority() {
        assert_eq!(validate_priority("critical").unwrap(), Priority::Critical);
        assert!(validate_priority("meh").is_err());
    }

    #[test]
    fn test_passphrase_length() {
        assert!(validate_passphrase("long enough passphrase", 12).is_ok());
        assert!(matches!(
            validate_passphrase("short", 12),
            Err(CryptoError::InvalidPassphrase(_))
        ));
        assert!(validate_passphrase("            ", 4).is_err());
    }
}
