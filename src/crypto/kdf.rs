//! Key Derivation Module
//!
//! PBKDF2-HMAC-SHA256 key derivation and the decrypt-path derived-key cache.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Derived key length (AES-256)
pub const KEY_LEN: usize = 32;
/// Salt length for new envelopes (256 bits)
pub const SALT_LEN: usize = 32;
/// Derived keys kept by the decrypt-path cache
pub const KEY_CACHE_CAPACITY: usize = 64;

pub type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

/// Generates a fresh random salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

// == Derive Key ==
/// Derives a 256-bit key from `passphrase` and `salt`.
///
/// This is deliberately slow; call it from a blocking worker.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<DerivedKey, CryptoError> {
    let iterations = NonZeroU32::new(iterations).ok_or_else(|| {
        CryptoError::Configuration("PBKDF2 iterations must be non-zero".to_string())
    })?;
    if salt.is_empty() {
        return Err(CryptoError::InvalidInput("salt must not be empty".to_string()));
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(passphrase, salt, iterations.get(), key.as_mut_slice());
    Ok(key)
}

// == Derived Key Cache ==
/// Cache of derived keys indexed by a one-way hash of `(passphrase, salt)`.
///
/// Only the decrypt path uses it: there the salt is fixed by the envelope.
/// Oldest insertions are dropped first once full.
pub struct DerivedKeyCache {
    keys: HashMap<String, DerivedKey>,
    order: VecDeque<String>,
    capacity: usize,
}

impl std::fmt::Debug for DerivedKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeyCache")
            .field("len", &self.keys.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl DerivedKeyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            keys: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Hashes `(passphrase, salt)` into a cache index.
    ///
    /// The passphrase length is mixed in first so that no two distinct pairs
    /// concatenate to the same input.
    pub fn index(passphrase: &[u8], salt: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update((passphrase.len() as u64).to_be_bytes());
        hasher.update(passphrase);
        hasher.update(salt);
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, index: &str) -> Option<DerivedKey> {
        self.keys.get(index).cloned()
    }

    pub fn insert(&mut self, index: String, key: DerivedKey) {
        if self.capacity == 0 {
            return;
        }
        if self.keys.insert(index.clone(), key).is_none() {
            self.order.push_back(index);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let a = derive_key(b"correct horse battery", &salt, 1_000).unwrap();
        let b = derive_key(b"correct horse battery", &salt, 1_000).unwrap();
        let c = derive_key(b"correct horse battery", &[8u8; SALT_LEN], 1_000).unwrap();

        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn test_derive_key_rejects_zero_iterations() {
        assert!(matches!(
            derive_key(b"pass", &[1; SALT_LEN], 0),
            Err(CryptoError::Configuration(_))
        ));
        assert!(matches!(
            derive_key(b"pass", &[], 10),
            Err(CryptoError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_generate_salt_is_unique() {
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn test_cache_index_is_unambiguous() {
        assert_ne!(
            DerivedKeyCache::index(b"ab", b"c"),
            DerivedKeyCache::index(b"a", b"bc")
        );
        assert_eq!(DerivedKeyCache::index(b"ab", b"c").len(), 64);
    }

    #[test]
    fn test_cache_drops_oldest() {
        let mut cache = DerivedKeyCache::new(2);
        cache.insert("a".to_string(), Zeroizing::new([1; KEY_LEN]));
        cache.insert("b".to_string(), Zeroizing::new([2; KEY_LEN]));
        cache.insert("c".to_string(), Zeroizing::new([3; KEY_LEN]));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(*cache.get("c").unwrap(), [3; KEY_LEN]);

        cache.clear();
        assert!(cache.is_empty());
    }
}
