//! Crypto Module
//!
//! Passphrase-based authenticated encryption for cache payloads, plus key
//! rotation bookkeeping, passphrase scoring and secure tokens.
//!
//! Keys are derived with PBKDF2-HMAC-SHA256 over a fresh 256-bit salt and
//! used with AES-256-GCM under a fresh 96-bit nonce. Derived keys are cached
//! only on the decrypt path.

mod cipher;
mod envelope;
mod kdf;
mod rotation;
mod strength;
mod token;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::clock::{Clock, SystemClock};
use crate::config::CryptoConfig;
use crate::error::CryptoError;
use crate::validation::validate_passphrase;

pub use cipher::NONCE_LEN;
pub use envelope::{EncryptionEnvelope, ALGORITHM};
pub use kdf::{DerivedKeyCache, KEY_CACHE_CAPACITY, KEY_LEN, SALT_LEN};
pub use rotation::{KeyRing, KeyVersion};
pub use strength::{PassphraseStrength, StrengthLevel};
pub use token::MAX_TOKEN_BYTES;

// == Crypto Engine ==
pub struct CryptoEngine {
    config: CryptoConfig,
    key_cache: Mutex<DerivedKeyCache>,
    key_ring: Mutex<KeyRing>,
    ephemeral: OnceLock<Zeroizing<String>>,
    clock: Arc<dyn Clock>,
}

impl CryptoEngine {
    // == Constructor ==
    /// Creates an engine after validating the config and self-testing the
    /// AEAD and KDF primitives.
    pub fn new(config: CryptoConfig) -> Result<Self, CryptoError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CryptoConfig, clock: Arc<dyn Clock>) -> Result<Self, CryptoError> {
        config.validate()?;
        self_test()?;

        Ok(Self {
            config,
            key_cache: Mutex::new(DerivedKeyCache::new(KEY_CACHE_CAPACITY)),
            key_ring: Mutex::new(KeyRing::new()),
            ephemeral: OnceLock::new(),
            clock,
        })
    }

    pub fn config(&self) -> &CryptoConfig {
        &self.config
    }

    // == Encrypt ==
    /// Encrypts `plaintext` under a key derived from the resolved passphrase.
    ///
    /// Every call draws a new salt and nonce, so equal inputs never produce
    /// equal envelopes. The derived key is not cached.
    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        passphrase: Option<&str>,
    ) -> Result<EncryptionEnvelope, CryptoError> {
        let passphrase = self.resolve_passphrase(passphrase)?;
        let iterations = self.config.iterations;
        let plaintext = Zeroizing::new(plaintext.to_vec());
        let timestamp = self.clock.now_ms();

        tokio::task::spawn_blocking(move || -> Result<EncryptionEnvelope, CryptoError> {
            let salt = kdf::generate_salt();
            let key = kdf::derive_key(passphrase.as_bytes(), &salt, iterations)?;
            let nonce = cipher::generate_nonce();
            let ciphertext = cipher::seal(&key, &nonce, &plaintext)?;

            Ok(EncryptionEnvelope {
                ciphertext,
                nonce: nonce.to_vec(),
                salt: Some(salt.to_vec()),
                algorithm: ALGORITHM.to_string(),
                timestamp,
            })
        })
        .await
        .map_err(|e| CryptoError::Task(e.to_string()))?
    }

    // == Decrypt ==
    /// Authenticates and decrypts `envelope`.
    ///
    /// Fails with `MissingSalt` before anything else if the envelope carries
    /// no salt. Tag mismatches fail with `IntegrityViolation`.
    pub async fn decrypt(
        &self,
        envelope: &EncryptionEnvelope,
        passphrase: Option<&str>,
    ) -> Result<Vec<u8>, CryptoError> {
        let salt = match &envelope.salt {
            Some(salt) if !salt.is_empty() => salt.clone(),
            _ => return Err(CryptoError::MissingSalt),
        };
        if envelope.algorithm != ALGORITHM {
            return Err(CryptoError::InvalidInput(format!(
                "unsupported algorithm: {}",
                envelope.algorithm
            )));
        }
        if envelope.nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidInput(format!(
                "nonce must be {NONCE_LEN} bytes"
            )));
        }

        let passphrase = self.resolve_passphrase(passphrase)?;
        let index = DerivedKeyCache::index(passphrase.as_bytes(), &salt);
        let cached = self.key_cache().get(&index);

        let key = match cached {
            Some(key) => key,
            None => {
                let iterations = self.config.iterations;
                let key = tokio::task::spawn_blocking(move || {
                    kdf::derive_key(passphrase.as_bytes(), &salt, iterations)
                })
                .await
                .map_err(|e| CryptoError::Task(e.to_string()))??;
                self.key_cache().insert(index, key.clone());
                key
            }
        };

        let nonce = envelope.nonce.clone();
        let ciphertext = envelope.ciphertext.clone();
        tokio::task::spawn_blocking(move || cipher::open(&key, &nonce, &ciphertext))
            .await
            .map_err(|e| CryptoError::Task(e.to_string()))?
    }

    /// Drops every cached derived key.
    pub fn clear_key_cache(&self) {
        self.key_cache().clear();
    }

    pub fn cached_key_count(&self) -> usize {
        self.key_cache().len()
    }

    // == Tokens and Strength ==
    pub fn generate_secure_token(&self, length: usize) -> Result<String, CryptoError> {
        token::generate_secure_token(length)
    }

    pub fn evaluate_passphrase_strength(&self, passphrase: &str) -> PassphraseStrength {
        strength::evaluate(passphrase)
    }

    // == Key Rotation ==
    /// Creates a new inactive key version.
    pub fn generate_key_version(&self, expires_in_days: Option<u32>) -> KeyVersion {
        self.key_ring().generate(self.clock.now_utc(), expires_in_days)
    }

    /// Makes `key_id` the single active version.
    pub fn activate_key_version(&self, key_id: &str) -> Result<KeyVersion, CryptoError> {
        self.key_ring().activate(key_id, self.clock.now_utc())
    }

    /// True if `key_id` (or the active version) expires within `warning_window`.
    pub fn needs_rotation(&self, key_id: Option<&str>, warning_window: chrono::Duration) -> bool {
        self.key_ring()
            .needs_rotation(key_id, warning_window, self.clock.now_utc())
    }

    pub fn active_key_version(&self) -> Option<KeyVersion> {
        self.key_ring().active().cloned()
    }

    pub fn key_versions(&self) -> Vec<KeyVersion> {
        self.key_ring().versions().to_vec()
    }

    // == Passphrase Resolution ==
    /// Explicit argument, then configured passphrase, then (if allowed) the
    /// per-process ephemeral one. Length is checked before any crypto runs.
    fn resolve_passphrase(&self, explicit: Option<&str>) -> Result<Zeroizing<String>, CryptoError> {
        let resolved = if let Some(passphrase) = explicit {
            Zeroizing::new(passphrase.to_string())
        } else if let Some(passphrase) = &self.config.passphrase {
            passphrase.clone()
        } else if self.config.allow_ephemeral_passphrase {
            self.ephemeral_passphrase()?
        } else {
            return Err(CryptoError::Configuration(
                "no encryption passphrase configured".to_string(),
            ));
        };

        validate_passphrase(&resolved, self.config.min_passphrase_length)?;
        Ok(resolved)
    }

    fn ephemeral_passphrase(&self) -> Result<Zeroizing<String>, CryptoError> {
        if let Some(existing) = self.ephemeral.get() {
            return Ok(existing.clone());
        }
        let generated = Zeroizing::new(token::generate_secure_token(32)?);
        let stored = self.ephemeral.get_or_init(|| {
            warn!(
                "No encryption passphrase configured; using an EPHEMERAL per-process passphrase. \
                 Encrypted entries will be unreadable after restart"
            );
            generated
        });
        Ok(stored.clone())
    }

    fn key_cache(&self) -> MutexGuard<'_, DerivedKeyCache> {
        self.key_cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key_ring(&self) -> MutexGuard<'_, KeyRing> {
        self.key_ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("config", &self.config)
            .field("cached_keys", &self.cached_key_count())
            .finish()
    }
}

/// Round-trips a probe through the KDF and AEAD.
fn self_test() -> Result<(), CryptoError> {
    let key = kdf::derive_key(b"self-test", &kdf::generate_salt(), 1)
        .map_err(|e| CryptoError::Unsupported(format!("KDF self-test failed: {e}")))?;
    let nonce = cipher::generate_nonce();
    let sealed = cipher::seal(&key, &nonce, b"probe")?;
    match cipher::open(&key, &nonce, &sealed) {
        Ok(opened) if opened == b"probe" => {
            debug!("Crypto self-test passed");
            Ok(())
        }
        _ => Err(CryptoError::Unsupported("AEAD self-test failed".to_string())),
    }
}
