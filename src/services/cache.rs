//! Response caching for site-level lookups.
//!
//! Site lists and per-site series metadata change rarely, so the decoded JSON
//! is kept for a configurable TTL. Time-series values are never cached here;
//! [`crate::plotting::store::SeriesStore`] owns those and tracks what range
//! has been loaded.
//!
//! # Usage
//!
//! ```text
//! let key = cache::cache_key("get_sampling_feature_metadata", &[site_code]);
//! if let Some(cached) = cache.get(&key).await {
//!     return decode_value((*cached).clone());
//! }
//! // ... fetch ...
//! cache.store(key, value).await;
//! ```

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Build a cache key from a prefix and components.
///
/// Components are joined with `:` separator. Empty components are included
/// to ensure different queries produce different keys.
pub fn cache_key(prefix: &str, components: &[&str]) -> String {
    let mut key = prefix.to_string();
    for c in components {
        key.push(':');
        key.push_str(c);
    }
    key
}

/// Decoded JSON responses keyed by request.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<String, Arc<serde_json::Value>>,
}

impl ResponseCache {
    #[must_use]
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { inner }
    }

    pub async fn get(&self, cache_key: &str) -> Option<Arc<serde_json::Value>> {
        let cached = self.inner.get(cache_key).await;
        if cached.is_some() {
            tracing::debug!(cache_key = %cache_key, "cache_hit");
        }
        cached
    }

    pub async fn store(&self, cache_key: String, value: serde_json::Value) {
        tracing::debug!(cache_key = %cache_key, "cache_stored");
        self.inner.insert(cache_key, Arc::new(value)).await;
    }

    /// Drop an entry, e.g. one that no longer decodes into the expected shape.
    pub async fn invalidate(&self, cache_key: &str) {
        self.inner.invalidate(cache_key).await;
        tracing::debug!(cache_key = %cache_key, "cache_invalidated");
    }
}
