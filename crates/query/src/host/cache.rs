//! Key/value cache backend.

use async_trait::async_trait;

/// Namespaced key/value cache.
///
/// Failures are absorbed by implementations (logged, then treated as a miss
/// on `get` and a no-op on writes) so a broken backend degrades to an
/// uncached pipeline rather than a failed invocation.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Option<String>;

    /// Store a value. `ttl_secs` of 0 means "until externally flushed".
    async fn set(&self, namespace: &str, key: &str, value: String, ttl_secs: u64);

    async fn delete(&self, namespace: &str, key: &str);

    /// Drop every entry under the namespace.
    async fn flush_namespace(&self, namespace: &str);
}
