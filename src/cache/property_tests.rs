//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache and crypto invariants over generated inputs.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{
    select_victims, CacheEngine, CacheEntry, EvictionCandidate, MemoryInsert, MemoryStore,
    MemoryTier, Priority, MAX_KEY_LENGTH,
};
use crate::clock::ManualClock;
use crate::config::{CryptoConfig, EngineConfig, MAX_TTL_MS, MIN_TTL_MS};
use crate::crypto::CryptoEngine;
use crate::models::SetOptions;
use crate::validation::{validate_key, validate_ttl};

// == Test Configuration ==
const TEST_START: u64 = 1_700_000_000_000;
const TEST_PASSPHRASE: &str = "correct horse battery staple";

fn test_engine(clock: Arc<ManualClock>) -> CacheEngine {
    let crypto = CryptoConfig::default()
        .with_passphrase(TEST_PASSPHRASE)
        .with_iterations(1_000);
    let config = EngineConfig {
        auto_cleanup: false,
        metadata_flush_delay_ms: 60_000,
        ..EngineConfig::default()
    };
    CacheEngine::with_clock(
        config,
        Arc::new(CryptoEngine::new(crypto).unwrap()),
        Arc::new(MemoryStore::new()),
        clock,
    )
    .unwrap()
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-.:".contains(c)
}

fn memory_entry(now: u64, priority: Priority) -> CacheEntry<Value> {
    CacheEntry::new(json!(now), now, 60_000, priority, "default", 8)
}

// == Strategies ==
/// Generates valid cache keys (non-empty, safe characters)
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:.-]{1,64}".prop_map(|s| s)
}

/// Generates JSON values of modest size
fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,128}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        ("[a-z]{1,8}", any::<u32>()).prop_map(|(k, v)| json!({ k: v })),
    ]
}

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Normal),
        Just(Priority::High),
        Just(Priority::Critical),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Value },
    Get { key: String },
    Remove { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    // A small key space so operations collide
    let key = "k[0-9]";
    prop_oneof![
        (key, value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key.prop_map(|key| CacheOp::Get { key }),
        key.prop_map(|key| CacheOp::Remove { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // For any set followed by an immediate get, the value comes back unchanged.
    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in value_strategy()) {
        tokio_test::block_on(async {
            let engine = test_engine(Arc::new(ManualClock::new(TEST_START)));
            engine.set(&key, &value, SetOptions::new()).await.unwrap();

            let cached: Option<Value> = engine.get(&key).await.unwrap();
            prop_assert_eq!(cached, Some(value));
            Ok(())
        })?;
    }

    // For any operation sequence, the engine agrees with a plain map and the
    // metrics count every lookup exactly once.
    #[test]
    fn prop_engine_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        tokio_test::block_on(async {
            let engine = test_engine(Arc::new(ManualClock::new(TEST_START)));
            let mut model: HashMap<String, Value> = HashMap::new();
            let (mut hits, mut misses) = (0u64, 0u64);

            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        engine.set(&key, &value, SetOptions::new()).await.unwrap();
                        model.insert(key, value);
                    }
                    CacheOp::Get { key } => {
                        let cached: Option<Value> = engine.get(&key).await.unwrap();
                        let expected = model.get(&key).cloned();
                        if expected.is_some() { hits += 1 } else { misses += 1 }
                        prop_assert_eq!(cached, expected);
                    }
                    CacheOp::Remove { key } => {
                        engine.remove(&key).await.unwrap();
                        model.remove(&key);
                    }
                }
            }

            let stats = engine.get_stats().await.unwrap();
            prop_assert_eq!(stats.metrics.hits, hits);
            prop_assert_eq!(stats.metrics.misses, misses);
            prop_assert_eq!(stats.storage_entries, model.len());
            Ok(())
        })?;
    }

    // After the clock passes created_at + ttl, the entry is gone from both tiers.
    #[test]
    fn prop_ttl_expiration(ttl in MIN_TTL_MS..100_000u64, value in value_strategy()) {
        tokio_test::block_on(async {
            let clock = Arc::new(ManualClock::new(TEST_START));
            let engine = test_engine(clock.clone());
            engine.set("ttl", &value, SetOptions::new().ttl_ms(ttl as i64)).await.unwrap();

            clock.advance(Duration::from_millis(ttl - 1));
            prop_assert!(engine.has("ttl").await.unwrap());

            clock.advance(Duration::from_millis(1));
            prop_assert!(!engine.has("ttl").await.unwrap());
            prop_assert_eq!(engine.get_stats().await.unwrap().storage_entries, 0);
            Ok(())
        })?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // The memory tier never holds more than its capacity of evictable entries
    // and never evicts a critical one.
    #[test]
    fn prop_memory_capacity_and_critical(
        capacity in 1usize..20,
        inserts in prop::collection::vec(priority_strategy(), 1..60),
    ) {
        let mut tier = MemoryTier::new(capacity);
        let mut critical = Vec::new();

        for (i, priority) in inserts.into_iter().enumerate() {
            let key = format!("key{i}");
            let outcome = tier.insert(&key, memory_entry(i as u64, priority));
            if priority == Priority::Critical && outcome != MemoryInsert::Rejected {
                critical.push(key);
            }
            prop_assert!(tier.len() <= capacity);
        }

        for key in &critical {
            prop_assert!(tier.contains(key), "critical entry {} was evicted", key);
        }
    }

    // Inserting one entry past capacity evicts exactly the least recently used.
    #[test]
    fn prop_lru_eviction_order(capacity in 2usize..30, touched in any::<prop::sample::Index>()) {
        let mut tier = MemoryTier::new(capacity);
        for i in 0..capacity {
            tier.insert(&format!("key{i}"), memory_entry(i as u64, Priority::Normal));
        }

        // Touch one key so it becomes most recent
        let touched = touched.index(capacity);
        tier.get(&format!("key{touched}"), 1);

        let expected_victim = if touched == 0 { "key1" } else { "key0" };
        let outcome = tier.insert("new", memory_entry(2, Priority::Normal));
        prop_assert_eq!(
            outcome,
            MemoryInsert::Stored {
                evicted: Some(expected_victim.to_string())
            }
        );
        prop_assert_eq!(tier.len(), capacity);
    }

    // Victim selection never includes critical records, and takes lower
    // priorities before higher ones.
    #[test]
    fn prop_eviction_respects_priority(
        records in prop::collection::vec((priority_strategy(), 0u64..1_000, 1usize..500), 1..40),
        needed in 1usize..5_000,
    ) {
        let candidates: Vec<EvictionCandidate> = records
            .iter()
            .enumerate()
            .map(|(i, (priority, last, bytes))| EvictionCandidate {
                storage_key: format!("key{i}"),
                priority: *priority,
                last_accessed_at: *last,
                stored_bytes: *bytes,
            })
            .collect();

        let victims = select_victims(&candidates, needed);
        prop_assert!(victims.iter().all(|v| v.priority != Priority::Critical));

        let max_victim = victims.iter().map(|v| v.priority).max();
        if let Some(max_victim) = max_victim {
            let skipped_lower = candidates.iter().any(|c| {
                c.priority < max_victim && !victims.iter().any(|v| v.storage_key == c.storage_key)
            });
            prop_assert!(!skipped_lower, "a lower-priority record was skipped");
        }

        let eligible: usize = candidates
            .iter()
            .filter(|c| c.priority != Priority::Critical)
            .map(|c| c.stored_bytes)
            .sum();
        let freed: usize = victims.iter().map(|v| v.stored_bytes).sum();
        prop_assert!(freed >= needed.min(eligible));
    }

    // Sanitized keys are deterministic, bounded and use only safe characters.
    #[test]
    fn prop_key_sanitization(raw in "\\PC{1,400}") {
        match validate_key(&raw) {
            Ok(key) => {
                prop_assert!(key.sanitized.len() <= MAX_KEY_LENGTH);
                prop_assert!(key.sanitized.chars().all(is_safe));
                prop_assert_eq!(validate_key(&raw).unwrap(), key);
            }
            Err(_) => prop_assert!(!raw.chars().any(is_safe)),
        }
    }

    // Any TTL input normalises into the configured bounds.
    #[test]
    fn prop_ttl_within_bounds(input in proptest::option::of(any::<i64>())) {
        let result = validate_ttl(input, 86_400_000, MIN_TTL_MS, MAX_TTL_MS);
        prop_assert!((MIN_TTL_MS..=MAX_TTL_MS).contains(&result.value));
        prop_assert_eq!(result.adjusted, result.reason.is_some());
    }
}

proptest! {
    // Key derivation is deliberately slow, keep the case count low
    #![proptest_config(ProptestConfig::with_cases(8))]

    // decrypt(encrypt(p)) == p, and two encryptions of p never share salt,
    // nonce or ciphertext.
    #[test]
    fn prop_crypto_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..512)) {
        tokio_test::block_on(async {
            let config = CryptoConfig::default()
                .with_passphrase(TEST_PASSPHRASE)
                .with_iterations(1_000);
            let crypto = CryptoEngine::new(config).unwrap();

            let first = crypto.encrypt(&plaintext, None).await.unwrap();
            let second = crypto.encrypt(&plaintext, None).await.unwrap();
            prop_assert_ne!(&first.salt, &second.salt);
            prop_assert_ne!(&first.nonce, &second.nonce);
            prop_assert_ne!(&first.ciphertext, &second.ciphertext);

            prop_assert_eq!(crypto.decrypt(&first, None).await.unwrap(), plaintext.clone());
            prop_assert_eq!(crypto.decrypt(&second, None).await.unwrap(), plaintext);
            Ok(())
        })?;
    }
}
