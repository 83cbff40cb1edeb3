//! Content-addressed, signed cache of validation layer results.
//!
//! Generalizes the workspace's existing validator cache (`CacheEntry`,
//! `CacheKey`, LRU/LFU/FIFO eviction) into the signed, policy-scoped shape
//! the pipeline needs: a cache key includes `policy_version`, so rotating
//! policy makes every entry from an older version unreachable without an
//! explicit invalidation pass.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use lru::LruCache;
use qflow_core::ValidationLayerId;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::layer::{LayerResult, LayerStatus};

type HmacSha256 = Hmac<Sha256>;

/// Which eviction discipline a [`SignedCache`] uses once it's at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EvictionStrategy {
    /// Evict the least-recently-used entry.
    Lru,
    /// Evict the least-frequently-used entry (lowest `access_count`).
    Lfu,
}

/// Explicit configuration for a [`SignedCache`], replacing an `any`-typed
/// cache config bag.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl: Duration,
    pub eviction_strategy: EvictionStrategy,
    /// How often a background sweep would scan for expired entries.
    /// Expiry here is checked lazily on [`SignedCache::get`], so this
    /// value is advisory for an embedding runtime that wants to run its
    /// own periodic sweep; this crate doesn't spawn one itself.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl: Duration::from_secs(300),
            eviction_strategy: EvictionStrategy::Lru,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Validate internal consistency.
    pub fn validate(&self) -> Result<(), qflow_error::QflowError> {
        if self.max_entries == 0 {
            return Err(invalid("max_entries must be greater than zero"));
        }
        if self.default_ttl.is_zero() {
            return Err(invalid("default_ttl must be greater than zero"));
        }
        if self.cleanup_interval.is_zero() {
            return Err(invalid("cleanup_interval must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(detail: &str) -> qflow_error::QflowError {
    qflow_error::QflowError::new(qflow_error::ErrorKind::from(qflow_error::InputError::InvalidType {
        field: "cache_config".to_string(),
        expected: "internally consistent CacheConfig".to_string(),
        actual: detail.to_string(),
    }))
}

/// Identifies a cached verdict: which layer, which data, under which
/// policy version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    layer_id: ValidationLayerId,
    policy_version: u32,
    data_hash: u64,
}

impl CacheKey {
    /// Build a key from the layer, the policy version in effect, and the
    /// data being validated (hashed, not stored).
    #[must_use]
    pub fn new(layer_id: ValidationLayerId, policy_version: u32, data: &Value) -> Self {
        let mut hasher = DefaultHasher::new();
        if let Ok(bytes) = serde_json::to_vec(data) {
            bytes.hash(&mut hasher);
        }
        Self {
            layer_id,
            policy_version,
            data_hash: hasher.finish(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: LayerResult,
    issued_at: Instant,
    wall_issued_at: DateTime<Utc>,
    ttl: Duration,
    access_count: u64,
    signature: Vec<u8>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.issued_at.elapsed() > self.ttl
    }
}

/// Statistics for a [`SignedCache`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Lookups that found a live, verified entry.
    pub hits: u64,
    /// Lookups that found nothing, or found an expired/invalid entry.
    pub misses: u64,
    /// Entries inserted via [`SignedCache::set`].
    pub sets: u64,
    /// Entries removed to make room for a new one.
    pub evictions: u64,
}

/// A signed, capacity-bounded cache of layer verdicts.
///
/// Every entry is signed over `(key, result, issued_at, ttl)` with the
/// cache's key at insertion time, and verified in constant time on every
/// read — a stored entry that was tampered with (or signed under a
/// rotated-out key) is treated as a miss, not trusted.
pub struct SignedCache {
    max_entries: usize,
    default_ttl: Duration,
    strategy: EvictionStrategy,
    storage: Mutex<Storage>,
    signing_key: Vec<u8>,
    stats: Mutex<CacheStats>,
}

enum Storage {
    Lru(LruCache<CacheKey, CacheEntry>),
    Lfu(HashMap<CacheKey, CacheEntry>),
}

impl SignedCache {
    /// Build a cache with the given capacity, default TTL, eviction
    /// strategy, and HMAC signing key.
    #[must_use]
    pub fn new(
        max_entries: usize,
        default_ttl: Duration,
        strategy: EvictionStrategy,
        signing_key: impl Into<Vec<u8>>,
    ) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        let storage = match strategy {
            EvictionStrategy::Lru => Storage::Lru(LruCache::new(capacity)),
            EvictionStrategy::Lfu => Storage::Lfu(HashMap::new()),
        };
        Self {
            max_entries,
            default_ttl,
            strategy,
            storage: Mutex::new(storage),
            signing_key: signing_key.into(),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Build a cache from a [`CacheConfig`] and an HMAC signing key.
    #[must_use]
    pub fn from_config(config: &CacheConfig, signing_key: impl Into<Vec<u8>>) -> Self {
        Self::new(config.max_entries, config.default_ttl, config.eviction_strategy, signing_key)
    }

    /// Look up `key`. Returns `None` on a miss, an expired entry, or a
    /// signature that fails to verify.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<LayerResult> {
        let mut storage = self.storage.lock().expect("cache mutex poisoned");
        let mut stats = self.stats.lock().expect("cache mutex poisoned");

        let entry = match &mut *storage {
            Storage::Lru(cache) => cache.get_mut(key),
            Storage::Lfu(map) => map.get_mut(key),
        };

        let Some(entry) = entry else {
            stats.misses += 1;
            return None;
        };

        if entry.is_expired() || !Self::verify(&self.signing_key, key, entry) {
            stats.misses += 1;
            return None;
        }

        entry.access_count += 1;
        stats.hits += 1;
        Some(entry.result.clone())
    }

    /// Insert `result` for `key` with the cache's default TTL.
    pub fn set(&self, key: CacheKey, result: LayerResult) {
        self.set_with_ttl(key, result, self.default_ttl);
    }

    /// Insert `result` for `key` with an explicit TTL.
    pub fn set_with_ttl(&self, key: CacheKey, result: LayerResult, ttl: Duration) {
        let wall_issued_at = Utc::now();
        let signature = Self::sign(&self.signing_key, &key, &result, wall_issued_at, ttl);
        let entry = CacheEntry {
            result,
            issued_at: Instant::now(),
            wall_issued_at,
            ttl,
            access_count: 0,
            signature,
        };

        let mut storage = self.storage.lock().expect("cache mutex poisoned");
        let mut stats = self.stats.lock().expect("cache mutex poisoned");

        match &mut *storage {
            Storage::Lru(cache) => {
                cache.put(key, entry);
            }
            Storage::Lfu(map) => {
                if map.len() >= self.max_entries && !map.contains_key(&key) {
                    if let Some(evict_key) = map
                        .iter()
                        .min_by_key(|(_, e)| e.access_count)
                        .map(|(k, _)| k.clone())
                    {
                        map.remove(&evict_key);
                        stats.evictions += 1;
                    }
                }
                map.insert(key, entry);
            }
        }
        stats.sets += 1;
    }

    /// Remove a single entry, returning `true` if it was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut storage = self.storage.lock().expect("cache mutex poisoned");
        match &mut *storage {
            Storage::Lru(cache) => cache.pop(key).is_some(),
            Storage::Lfu(map) => map.remove(key).is_some(),
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut storage = self.storage.lock().expect("cache mutex poisoned");
        match &mut *storage {
            Storage::Lru(cache) => cache.clear(),
            Storage::Lfu(map) => map.clear(),
        }
    }

    /// A snapshot of hit/miss/set/eviction counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        *self.stats.lock().expect("cache mutex poisoned")
    }

    /// Which eviction strategy this cache was built with.
    #[must_use]
    pub fn strategy(&self) -> EvictionStrategy {
        self.strategy
    }

    fn sign(
        signing_key: &[u8],
        key: &CacheKey,
        result: &LayerResult,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Vec<u8> {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(signing_key).expect("HMAC accepts any key length");
        mac.update(key.layer_id.to_string().as_bytes());
        mac.update(&key.policy_version.to_be_bytes());
        mac.update(&key.data_hash.to_be_bytes());
        mac.update(&[result.status as u8]);
        mac.update(result.message.as_deref().unwrap_or("").as_bytes());
        mac.update(issued_at.to_rfc3339().as_bytes());
        mac.update(&ttl.as_millis().to_be_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn verify(signing_key: &[u8], key: &CacheKey, entry: &CacheEntry) -> bool {
        let expected = Self::sign(
            signing_key,
            key,
            &entry.result,
            entry.wall_issued_at,
            entry.ttl,
        );
        expected.ct_eq(&entry.signature).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: LayerStatus) -> LayerResult {
        LayerResult {
            status,
            message: None,
            duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn a_fresh_entry_hits_on_read() {
        let cache = SignedCache::new(10, Duration::from_secs(60), EvictionStrategy::Lru, b"k".to_vec());
        let key = CacheKey::new(ValidationLayerId::v4(), 1, &Value::Bool(true));
        cache.set(key.clone(), result(LayerStatus::Passed));
        assert!(cache.get(&key).is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn an_expired_entry_is_a_miss() {
        let cache = SignedCache::new(
            10,
            Duration::from_millis(0),
            EvictionStrategy::Lru,
            b"k".to_vec(),
        );
        let key = CacheKey::new(ValidationLayerId::v4(), 1, &Value::Bool(true));
        cache.set(key.clone(), result(LayerStatus::Passed));
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn different_policy_versions_produce_different_keys() {
        let data = Value::Bool(true);
        let layer = ValidationLayerId::v4();
        let a = CacheKey::new(layer, 1, &data);
        let b = CacheKey::new(layer, 2, &data);
        assert_ne!(a, b);
    }

    #[test]
    fn a_tampered_entry_fails_verification_and_is_a_miss() {
        let cache = SignedCache::new(10, Duration::from_secs(60), EvictionStrategy::Lru, b"k".to_vec());
        let key = CacheKey::new(ValidationLayerId::v4(), 1, &Value::Bool(true));
        cache.set(key.clone(), result(LayerStatus::Passed));

        {
            let mut storage = cache.storage.lock().unwrap();
            if let Storage::Lru(lru) = &mut *storage {
                if let Some(entry) = lru.get_mut(&key) {
                    entry.signature[0] ^= 0xFF;
                }
            }
        }
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn lfu_evicts_the_least_accessed_entry_when_full() {
        let cache = SignedCache::new(2, Duration::from_secs(60), EvictionStrategy::Lfu, b"k".to_vec());
        let a = CacheKey::new(ValidationLayerId::v4(), 1, &Value::String("a".into()));
        let b = CacheKey::new(ValidationLayerId::v4(), 1, &Value::String("b".into()));
        let c = CacheKey::new(ValidationLayerId::v4(), 1, &Value::String("c".into()));

        cache.set(a.clone(), result(LayerStatus::Passed));
        cache.set(b.clone(), result(LayerStatus::Passed));
        cache.get(&b); // bump b's access_count above a's
        cache.set(c.clone(), result(LayerStatus::Passed));

        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
        assert!(cache.get(&c).is_some());
    }

    #[test]
    fn invalidate_removes_a_single_entry() {
        let cache = SignedCache::new(10, Duration::from_secs(60), EvictionStrategy::Lru, b"k".to_vec());
        let key = CacheKey::new(ValidationLayerId::v4(), 1, &Value::Bool(true));
        cache.set(key.clone(), result(LayerStatus::Passed));
        assert!(cache.invalidate(&key));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn default_cache_config_validates_and_builds_a_cache() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        let cache = SignedCache::from_config(&config, b"k".to_vec());
        assert_eq!(cache.strategy(), EvictionStrategy::Lru);
    }

    #[test]
    fn zero_max_entries_is_rejected() {
        let mut config = CacheConfig::default();
        config.max_entries = 0;
        assert!(config.validate().is_err());
    }
}
