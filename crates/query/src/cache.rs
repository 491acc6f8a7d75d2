//! Result cache.
//!
//! The full rendered output is memoized under a fingerprint of everything
//! that can influence it: the property set itself plus the complete request
//! query and body maps, because input modifiers make resolved values change
//! while the properties stay static. A hit short-circuits the entire
//! pipeline; a backend failure is just a forced miss.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::host::{CacheBackend, RequestInput};
use crate::properties::{PropertySet, Value};

/// Cache namespace for all entries written by this extension. The host's
/// cache-flush hook clears the whole namespace.
pub const NAMESPACE: &str = "query";

/// One memoized invocation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub rendered: String,
    pub page_count: u64,
    pub pagination_links: String,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// Seconds; 0 means "until externally flushed".
    pub ttl: u64,
}

/// Deterministic fingerprint over the invocation inputs.
///
/// Keys are hashed in sorted order so equal maps always fingerprint
/// equally, regardless of property order. The entry-point name keeps the
/// two variants from colliding on identical properties.
pub fn fingerprint(entry_point: &str, properties: &PropertySet, request: &dyn RequestInput) -> String {
    let sorted = |map: &indexmap::IndexMap<String, Value>| -> BTreeMap<String, Value> {
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    };

    let mut hasher = Sha256::new();
    hasher.update(entry_point.as_bytes());
    for map in [
        sorted(properties),
        sorted(&request.query_map()),
        sorted(&request.body_map()),
    ] {
        // Serialization of a string-keyed map of plain values cannot fail.
        let encoded = serde_json::to_string(&map).unwrap_or_default();
        hasher.update([0u8]);
        hasher.update(encoded.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Namespaced view over the host cache backend.
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Fetch a memoized entry. Decode failures are treated as misses.
    pub async fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let raw = self.backend.get(NAMESPACE, fingerprint).await?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "discarding undecodable cache entry");
                self.backend.delete(NAMESPACE, fingerprint).await;
                None
            }
        }
    }

    /// Store an entry. Best-effort: failures degrade to an uncached call.
    pub async fn put(&self, fingerprint: &str, entry: &CacheEntry) {
        match serde_json::to_string(entry) {
            Ok(encoded) => {
                self.backend
                    .set(NAMESPACE, fingerprint, encoded, entry.ttl)
                    .await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode cache entry");
            }
        }
    }

    /// Drop every memoized result. Called from the host's cache-flush hook.
    pub async fn flush(&self) {
        self.backend.flush_namespace(NAMESPACE).await;
    }
}
