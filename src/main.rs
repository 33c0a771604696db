//! Tiered Cache demo runner
//!
//! Builds an engine from environment configuration over an in-memory store,
//! runs a short workload and prints the resulting statistics.

use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_cache::{
    CacheEngine, CacheError, CryptoConfig, CryptoEngine, CryptoError, EngineConfig, MemoryStore,
    Priority, SetOptions,
};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Profile {
    id: u32,
    name: String,
    roles: Vec<String>,
}

/// Main entry point for the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load engine and crypto configuration from environment variables
/// 3. Build the engine over an in-memory store
/// 4. Run a plain and, if a passphrase resolves, an encrypted round trip
/// 5. Run one cleanup sweep and print statistics
/// 6. Destroy the engine
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tiered Cache demo");

    let engine_config = EngineConfig::from_env();
    let crypto_config = CryptoConfig::from_env();
    info!(
        max_memory_entries = engine_config.max_memory_entries,
        max_storage_bytes = engine_config.max_storage_bytes,
        default_ttl_ms = engine_config.default_ttl_ms,
        kdf_iterations = crypto_config.iterations,
        "Configuration loaded"
    );

    let crypto =
        Arc::new(CryptoEngine::new(crypto_config).context("crypto engine failed to start")?);
    let store = Arc::new(MemoryStore::new());
    let engine =
        CacheEngine::new(engine_config, crypto, store).context("invalid engine configuration")?;

    let profile = Profile {
        id: 42,
        name: "Ada".to_string(),
        roles: vec!["admin".to_string(), "editor".to_string()],
    };

    // Plain round trip
    let status = engine
        .set(
            "profile:42",
            &profile,
            SetOptions::new().priority(Priority::High).namespace("profiles"),
        )
        .await?;
    let cached: Option<Profile> = engine.get("profile:42").await?;
    info!(?status, hit = cached.as_ref() == Some(&profile), "Plain round trip");

    // Encrypted round trip
    match engine
        .set("session:42", &profile, SetOptions::new().ttl_ms(60_000).encrypted())
        .await
    {
        Ok(status) => {
            let cached: Option<Profile> = engine.get("session:42").await?;
            info!(?status, hit = cached.as_ref() == Some(&profile), "Encrypted round trip");
        }
        Err(CacheError::Crypto(
            CryptoError::Configuration(reason) | CryptoError::InvalidPassphrase(reason),
        )) => {
            warn!("Skipping encrypted round trip: {}", reason);
        }
        Err(err) => return Err(err.into()),
    }

    let purged = engine.cleanup().await?;
    info!("Cleanup removed {} records", purged);

    let stats = engine.get_stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    engine.destroy().await;
    info!("Demo complete");
    Ok(())
}
