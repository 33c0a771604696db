//! Configuration Module
//!
//! Handles loading and validating engine and crypto configuration from
//! environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::error::{CacheError, CryptoError};

// == TTL Bounds ==
/// Smallest TTL accepted without adjustment (1 second)
pub const MIN_TTL_MS: u64 = 1_000;
/// Largest TTL accepted without adjustment (365 days)
pub const MAX_TTL_MS: u64 = 31_536_000_000;
/// TTL used when a caller gives none (24 hours)
pub const DEFAULT_TTL_MS: u64 = 86_400_000;

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Cache engine configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Prefix prepended to every storage key
    pub key_prefix: String,
    /// Byte budget for the persistent tier
    pub max_storage_bytes: usize,
    /// Entry-count cap for the memory tier
    pub max_memory_entries: usize,
    /// Default TTL in milliseconds for entries without explicit TTL
    pub default_ttl_ms: u64,
    /// Background cleanup interval in milliseconds
    pub cleanup_interval_ms: u64,
    pub auto_cleanup: bool,
    pub enable_memory_cache: bool,
    /// Hard cap on deferred metadata writes before a forced flush
    pub pending_write_cap: usize,
    /// Delay before a deferred metadata write is committed
    pub metadata_flush_delay_ms: u64,
}

impl EngineConfig {
    /// Creates a new EngineConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_KEY_PREFIX` - Storage key prefix (default: `cache_`)
    /// - `CACHE_MAX_STORAGE_BYTES` - Persistent tier budget (default: 5 MiB)
    /// - `CACHE_MAX_MEMORY_ENTRIES` - Memory tier entries (default: 100)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL (default: 24h)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Cleanup frequency (default: 1h)
    /// - `CACHE_AUTO_CLEANUP` - Run the cleanup timer (default: true)
    /// - `CACHE_ENABLE_MEMORY` - Use the memory tier (default: true)
    /// - `CACHE_PENDING_WRITE_CAP` - Deferred write cap (default: 64)
    /// - `CACHE_METADATA_FLUSH_DELAY_MS` - Deferred write delay (default: 250)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            max_storage_bytes: env_or("CACHE_MAX_STORAGE_BYTES", defaults.max_storage_bytes),
            max_memory_entries: env_or("CACHE_MAX_MEMORY_ENTRIES", defaults.max_memory_entries),
            default_ttl_ms: env_or("CACHE_DEFAULT_TTL_MS", defaults.default_ttl_ms),
            cleanup_interval_ms: env_or("CACHE_CLEANUP_INTERVAL_MS", defaults.cleanup_interval_ms),
            auto_cleanup: env_or("CACHE_AUTO_CLEANUP", defaults.auto_cleanup),
            enable_memory_cache: env_or("CACHE_ENABLE_MEMORY", defaults.enable_memory_cache),
            pending_write_cap: env_or("CACHE_PENDING_WRITE_CAP", defaults.pending_write_cap),
            metadata_flush_delay_ms: env_or(
                "CACHE_METADATA_FLUSH_DELAY_MS",
                defaults.metadata_flush_delay_ms,
            ),
        }
    }

    /// Checks that the settings are usable together.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.key_prefix.is_empty() {
            return Err(CacheError::Configuration(
                "key prefix must not be empty".to_string(),
            ));
        }
        if self.max_storage_bytes == 0 {
            return Err(CacheError::Configuration(
                "storage budget must be positive".to_string(),
            ));
        }
        if !(MIN_TTL_MS..=MAX_TTL_MS).contains(&self.default_ttl_ms) {
            return Err(CacheError::InvalidTtl(format!(
                "default TTL {}ms outside [{MIN_TTL_MS}, {MAX_TTL_MS}]",
                self.default_ttl_ms
            )));
        }
        if self.auto_cleanup && self.cleanup_interval_ms == 0 {
            return Err(CacheError::Configuration(
                "cleanup interval must be positive when auto cleanup is on".to_string(),
            ));
        }
        if self.pending_write_cap == 0 {
            return Err(CacheError::Configuration(
                "pending write cap must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_prefix: "cache_".to_string(),
            max_storage_bytes: 5 * 1024 * 1024,
            max_memory_entries: 100,
            default_ttl_ms: DEFAULT_TTL_MS,
            cleanup_interval_ms: 3_600_000,
            auto_cleanup: true,
            enable_memory_cache: true,
            pending_write_cap: 64,
            metadata_flush_delay_ms: 250,
        }
    }
}

// == Deployment Tier ==
/// Selects the default KDF work factor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeploymentTier {
    #[default]
    Development,
    Production,
}

impl DeploymentTier {
    /// PBKDF2 iteration count used when none is configured explicitly.
    pub fn default_iterations(self) -> u32 {
        match self {
            DeploymentTier::Development => 100_000,
            DeploymentTier::Production => 600_000,
        }
    }
}

impl FromStr for DeploymentTier {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(DeploymentTier::Development),
            "production" | "prod" => Ok(DeploymentTier::Production),
            other => Err(CryptoError::Configuration(format!(
                "unknown deployment tier: {other}"
            ))),
        }
    }
}

/// Crypto engine configuration.
#[derive(Clone)]
pub struct CryptoConfig {
    /// Passphrase used when callers pass none
    pub passphrase: Option<Zeroizing<String>>,
    pub tier: DeploymentTier,
    /// PBKDF2 iteration count
    pub iterations: u32,
    pub min_passphrase_length: usize,
    /// Permit a random per-process passphrase when none is configured
    pub allow_ephemeral_passphrase: bool,
}

impl CryptoConfig {
    /// Creates a new CryptoConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ENCRYPTION_PASSPHRASE` - Default passphrase (default: none)
    /// - `CACHE_DEPLOYMENT_TIER` - `development` or `production` (default: development)
    /// - `CACHE_KDF_ITERATIONS` - PBKDF2 iterations (default: per tier)
    /// - `CACHE_MIN_PASSPHRASE_LENGTH` - Minimum passphrase length (default: 12)
    /// - `CACHE_ALLOW_EPHEMERAL_PASSPHRASE` - Opt into the ephemeral fallback (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let tier = env_or("CACHE_DEPLOYMENT_TIER", defaults.tier);
        Self {
            passphrase: env::var("CACHE_ENCRYPTION_PASSPHRASE")
                .ok()
                .filter(|p| !p.is_empty())
                .map(Zeroizing::new),
            tier,
            iterations: env_or("CACHE_KDF_ITERATIONS", tier.default_iterations()),
            min_passphrase_length: env_or(
                "CACHE_MIN_PASSPHRASE_LENGTH",
                defaults.min_passphrase_length,
            ),
            allow_ephemeral_passphrase: env_or(
                "CACHE_ALLOW_EPHEMERAL_PASSPHRASE",
                defaults.allow_ephemeral_passphrase,
            ),
        }
    }

    /// Sets an explicit default passphrase.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.iterations == 0 {
            return Err(CryptoError::Configuration(
                "KDF iterations must be positive".to_string(),
            ));
        }
        if self.min_passphrase_length == 0 {
            return Err(CryptoError::Configuration(
                "minimum passphrase length must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        let tier = DeploymentTier::default();
        Self {
            passphrase: None,
            tier,
            iterations: tier.default_iterations(),
            min_passphrase_length: 12,
            allow_ephemeral_passphrase: false,
        }
    }
}

impl fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("tier", &self.tier)
            .field("iterations", &self.iterations)
            .field("min_passphrase_length", &self.min_passphrase_length)
            .field("allow_ephemeral_passphrase", &self.allow_ephemeral_passphrase)
            .finish()
    }
}
