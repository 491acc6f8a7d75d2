//! In-process cache backend.
//!
//! A single-node deployment of the extension caches in process memory; the
//! host may substitute any shared backend by implementing [`CacheBackend`]
//! itself.

use async_trait::async_trait;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};

use crate::host::CacheBackend;

const MAX_CAPACITY: u64 = 10_000;

#[derive(Serialize, Deserialize)]
struct Slot {
    value: String,
    /// Unix expiry timestamp; `None` lives until flushed.
    expires_at: Option<i64>,
}

/// Moka-backed in-process cache with per-entry TTL and namespace flushing.
pub struct MemoryCache {
    inner: Cache<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        let inner = Cache::builder()
            .max_capacity(MAX_CAPACITY)
            .support_invalidation_closures()
            .build();
        Self { inner }
    }

    fn full_key(namespace: &str, key: &str) -> String {
        format!("{namespace}:{key}")
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, namespace: &str, key: &str) -> Option<String> {
        let full = Self::full_key(namespace, key);
        let raw = self.inner.get(&full)?;
        let slot: Slot = serde_json::from_str(&raw).ok()?;
        if let Some(expires_at) = slot.expires_at
            && chrono::Utc::now().timestamp() >= expires_at
        {
            self.inner.invalidate(&full);
            return None;
        }
        Some(slot.value)
    }

    async fn set(&self, namespace: &str, key: &str, value: String, ttl_secs: u64) {
        let expires_at = if ttl_secs > 0 {
            Some(chrono::Utc::now().timestamp() + ttl_secs as i64)
        } else {
            None
        };
        let slot = Slot { value, expires_at };
        match serde_json::to_string(&slot) {
            Ok(encoded) => self.inner.insert(Self::full_key(namespace, key), encoded),
            Err(err) => tracing::warn!(error = %err, "failed to encode cache slot"),
        }
    }

    async fn delete(&self, namespace: &str, key: &str) {
        self.inner.invalidate(&Self::full_key(namespace, key));
    }

    async fn flush_namespace(&self, namespace: &str) {
        let prefix = format!("{namespace}:");
        if let Err(err) = self
            .inner
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
        {
            tracing::warn!(error = %err, "namespace flush failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("query", "k", "v".to_string(), 0).await;
        assert_eq!(cache.get("query", "k").await.as_deref(), Some("v"));

        cache.delete("query", "k").await;
        assert!(cache.get("query", "k").await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_read_as_misses() {
        let cache = MemoryCache::new();
        let full = MemoryCache::full_key("query", "k");
        // Plant an already-expired slot directly.
        let slot = Slot {
            value: "v".to_string(),
            expires_at: Some(chrono::Utc::now().timestamp() - 10),
        };
        cache
            .inner
            .insert(full, serde_json::to_string(&slot).unwrap());
        assert!(cache.get("query", "k").await.is_none());
    }

    #[tokio::test]
    async fn flush_only_clears_the_namespace() {
        let cache = MemoryCache::new();
        cache.set("query", "a", "1".to_string(), 0).await;
        cache.set("other", "b", "2".to_string(), 0).await;

        cache.flush_namespace("query").await;
        // Invalidation predicates apply on read; sync up first.
        cache.inner.run_pending_tasks();

        assert!(cache.get("query", "a").await.is_none());
        assert_eq!(cache.get("other", "b").await.as_deref(), Some("2"));
    }
}
