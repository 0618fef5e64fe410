//! TTL cache backed by a concurrent map.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::duration;
use crate::config::schema::CacheConfig;
use crate::observability::metrics;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<[u8]>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Named, thread-safe cache of serialized values with per-entry TTL.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone)]
pub struct TtlCache {
    name: Arc<str>,
    entries: Arc<DashMap<String, CacheEntry>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl TtlCache {
    pub fn new(name: &str, default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            name: Arc::from(name),
            entries: Arc::new(DashMap::new()),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Cache using the engine-wide defaults.
    pub fn from_config(name: &str, config: &CacheConfig) -> Self {
        Self::new(
            name,
            Duration::from_millis(config.default_ttl_ms),
            config.max_entries,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the live value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(Arc::clone(&entry.value)),
            Some(entry) => {
                drop(entry);
                self.entries.remove_if(key, |_, e| e.is_expired(now));
                None
            }
            None => None,
        };

        let decoded = value.and_then(|bytes| match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(cache = %self.name, error = %e, "Cached value has unexpected shape");
                None
            }
        });
        metrics::record_cache_lookup(&self.name, decoded.is_some());
        decoded
    }

    /// Stores `value` for `ttl`; a zero TTL uses the default TTL.
    ///
    /// A value that fails to serialize is not cached.
    pub fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(cache = %self.name, error = %e, "Value not cacheable, skipping");
                return;
            }
        };
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };

        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            self.make_room();
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: Arc::from(bytes),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Stores `value` with the default TTL.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, Duration::ZERO);
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn make_room(&self) {
        if self.purge_expired() > 0 && self.entries.len() < self.max_entries {
            return;
        }
        let soonest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = soonest {
            self.entries.remove(&key);
            tracing::debug!(cache = %self.name, "Evicted entry closest to expiry");
        }
    }
}

/// `cache` block of a handler configuration, e.g.
/// `{"enabled": true, "ttl": "30s"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    #[serde(with = "duration::option")]
    pub ttl: Option<Duration>,
}

impl CacheSettings {
    /// Configured TTL, or zero for the cache default.
    pub fn ttl_or_default(&self) -> Duration {
        self.ttl.unwrap_or(Duration::ZERO)
    }
}

/// Deterministic key over the given parts.
///
/// Parts are length-prefixed, so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn cache_key<S: AsRef<[u8]>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        let part = part.as_ref();
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Token {
        value: String,
        expires_in: u64,
    }

    fn cache() -> TtlCache {
        TtlCache::new("test", Duration::from_secs(60), 100)
    }

    #[test]
    fn test_get_returns_stored_value() {
        let cache = cache();
        let token = Token {
            value: "abc".into(),
            expires_in: 30,
        };
        cache.set("k", &token);
        assert_eq!(cache.get::<Token>("k"), Some(token));
        assert_eq!(cache.get::<Token>("missing"), None);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = cache();
        cache.set_with_ttl("k", &"value", Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.get::<String>("k").as_deref(), Some("value"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(cache.get::<String>("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_uses_default() {
        let cache = TtlCache::new("test", Duration::from_secs(3600), 10);
        cache.set_with_ttl("k", &1u32, Duration::ZERO);
        assert_eq!(cache.get::<u32>("k"), Some(1));
    }

    #[test]
    fn test_unserializable_value_is_dropped() {
        use std::collections::HashMap;
        // JSON object keys must be strings
        let mut map = HashMap::new();
        map.insert(vec![1u8], 1u8);
        let cache = cache();
        cache.set("k", &map);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stored_values_do_not_alias() {
        let cache = cache();
        let mut token = Token {
            value: "before".into(),
            expires_in: 1,
        };
        cache.set("k", &token);
        token.value = "after".into();
        assert_eq!(cache.get::<Token>("k").unwrap().value, "before");
    }

    #[test]
    fn test_capacity_evicts_one_entry() {
        let cache = TtlCache::new("test", Duration::from_secs(60), 2);
        cache.set_with_ttl("a", &1, Duration::from_secs(1));
        cache.set_with_ttl("b", &2, Duration::from_secs(10));
        cache.set_with_ttl("c", &3, Duration::from_secs(10));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<i32>("a"), None);
        assert_eq!(cache.get::<i32>("c"), Some(3));
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        assert_eq!(cache_key(&["token", "exact"]), cache_key(&["token", "exact"]));
        assert_ne!(cache_key(&["ab", "c"]), cache_key(&["a", "bc"]));
        assert_eq!(cache_key(&["x"]).len(), 64);
    }
}
