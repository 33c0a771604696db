//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Crypto Error Enum ==
/// Failures raised by the crypto engine.
///
/// Integrity failures are kept distinct from malformed input so callers can
/// tell "tampered or wrong key" apart from "not an envelope at all".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD or KDF primitives failed the startup self-test
    #[error("Crypto primitives unavailable: {0}")]
    Unsupported(String),

    /// Passphrase too short or otherwise unusable
    #[error("Invalid passphrase: {0}")]
    InvalidPassphrase(String),

    /// Envelope has no salt (legacy or incompatible payload)
    #[error("Envelope is missing its salt")]
    MissingSalt,

    /// Authentication tag mismatch (tampering or wrong passphrase)
    #[error("Integrity check failed")]
    IntegrityViolation,

    /// Structurally malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No passphrase available where one is mandatory, or bad crypto settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Key version id not known to the key ring
    #[error("Unknown key version: {0}")]
    UnknownKeyVersion(String),

    /// Key version past its expiry date
    #[error("Key version expired: {0}")]
    KeyVersionExpired(String),

    /// Blocking crypto worker failed to complete
    #[error("Crypto task failed: {0}")]
    Task(String),
}

// == Store Error Enum ==
/// Failures reported by a persistent store adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store disabled, absent, or unreachable
    #[error("Store unavailable")]
    Unavailable,

    /// Store refused the write for lack of room
    #[error("Store quota exceeded")]
    QuotaExceeded,

    /// Any other backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

// == Schema Error Enum ==
/// Failures decoding a persisted record.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Bytes are not a JSON record of the expected shape
    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Record parsed but a field violates its constraints
    #[error("Invalid record: {0}")]
    Invalid(String),
}

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Persistent store unavailable
    #[error("Storage unavailable")]
    StorageUnavailable,

    /// Persistent store rejected the write (memory tier was still updated)
    #[error("Storage quota exceeded for key: {0}")]
    QuotaExceeded(String),

    /// A persisted record failed schema validation
    #[error("Schema validation failed: {0}")]
    SchemaValidationFailed(#[from] SchemaError),

    /// Eviction could not free enough room
    #[error("Insufficient space: {required} bytes required, {available} available")]
    InsufficientSpace { required: usize, available: usize },

    /// Key is empty or has no usable characters
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// TTL settings out of range
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Namespace is unusable
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Unknown priority name
    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    /// Crypto engine failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Engine settings are inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Value could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unexpected store backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Engine has been torn down
    #[error("Cache engine has been destroyed")]
    Destroyed,
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable => CacheError::StorageUnavailable,
            StoreError::QuotaExceeded => CacheError::QuotaExceeded(String::new()),
            StoreError::Backend(msg) => CacheError::Storage(msg),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_conversion() {
        assert!(matches!(
            CacheError::from(StoreError::Unavailable),
            CacheError::StorageUnavailable
        ));
        assert!(matches!(
            CacheError::from(StoreError::Backend("disk".to_string())),
            CacheError::Storage(msg) if msg == "disk"
        ));
    }

    #[test]
    fn test_crypto_errors_stay_distinct() {
        let missing: CacheError = CryptoError::MissingSalt.into();
        let integrity: CacheError = CryptoError::IntegrityViolation.into();

        assert!(matches!(missing, CacheError::Crypto(CryptoError::MissingSalt)));
        assert!(matches!(
            integrity,
            CacheError::Crypto(CryptoError::IntegrityViolation)
        ));
        assert_ne!(missing.to_string(), integrity.to_string());
    }

    #[test]
    fn test_insufficient_space_message() {
        let err = CacheError::InsufficientSpace {
            required: 10,
            available: 4,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient space: 10 bytes required, 4 available"
        );
    }
}
