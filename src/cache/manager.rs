//! Namespaced, versioned cache on top of a `CacheStore`
//!
//! Every payload is wrapped in an envelope carrying its creation time, TTL,
//! kind and schema version. Store failures never reach callers: reads turn
//! into misses and writes are skipped, so the pipeline keeps running uncached.

use futures::future::join_all;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::store::{CacheStore, Clock, SystemClock};

/// Version of the envelope layout; entries with any other version are misses
pub const SCHEMA_VERSION: u32 = 1;

/// Cache kinds used by the aggregation pipeline
pub mod kinds {
    pub const LISTINGS: &str = "listings";
    pub const DETAILS: &str = "details";
}

/// Kind used for the health check sentinel key
const HEALTH_KIND: &str = "health";

/// TTL resolution table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    /// TTL in seconds per cache kind
    pub by_kind: HashMap<String, u64>,
    /// TTL for kinds missing from the table
    pub default_ttl_seconds: u64,
    /// Extra time the store keeps an entry after its TTL, so stale reads are possible
    pub stale_grace_seconds: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        let by_kind = HashMap::from([
            (kinds::LISTINGS.to_string(), 600),
            (kinds::DETAILS.to_string(), 3600),
        ]);
        Self {
            by_kind,
            default_ttl_seconds: 300,
            stale_grace_seconds: 3600,
        }
    }
}

impl TtlPolicy {
    /// TTL in seconds for `kind`, falling back to the default
    pub fn ttl_for(&self, kind: &str) -> u64 {
        self.by_kind
            .get(kind)
            .copied()
            .unwrap_or(self.default_ttl_seconds)
    }
}

/// Envelope stored for every cached payload
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    payload: T,
    created_at_millis: i64,
    ttl_seconds: u64,
    kind: String,
    schema_version: u32,
}

/// Result of a cache health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
}

/// Cache wrapper shared by the pipeline
///
/// Cloning is cheap; clones share the same store and clock.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    namespace: String,
    ttl: TtlPolicy,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    /// Creates a manager that prefixes every key with `namespace` (e.g. the environment name)
    pub fn new(store: Arc<dyn CacheStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            ttl: TtlPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_ttl_policy(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    /// Uses `clock` for entry timestamps and freshness checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    /// Builds the namespaced store key `{namespace}_{kind}:{key}`
    ///
    /// Kinds must not contain `_` or `:`.
    pub fn full_key(&self, key: &str, kind: &str) -> String {
        format!("{}_{}:{}", self.namespace, kind, key)
    }

    /// Returns the payload for `key` if present and fresh
    ///
    /// Expired entries are deleted. Store and decode errors count as misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, kind: &str) -> Option<T> {
        let full_key = self.full_key(key, kind);
        let entry = self.read_entry::<T>(&full_key).await?;

        if self.is_fresh(&entry) {
            debug!(key = %full_key, "cache hit");
            return Some(entry.payload);
        }

        debug!(key = %full_key, "cache entry expired");
        self.delete_quietly(&full_key).await;
        None
    }

    /// Writes `payload` under `key`
    ///
    /// The TTL comes from the kind table unless `ttl_override` is given.
    /// Returns `false` when the write was skipped because of a store or encode error.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        payload: &T,
        kind: &str,
        ttl_override: Option<u64>,
    ) -> bool {
        let full_key = self.full_key(key, kind);
        let ttl_seconds = ttl_override.unwrap_or_else(|| self.ttl.ttl_for(kind));
        let entry = CacheEntry {
            payload,
            created_at_millis: self.clock.now_millis(),
            ttl_seconds,
            kind: kind.to_string(),
            schema_version: SCHEMA_VERSION,
        };

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %full_key, error = %e, "failed to encode cache entry");
                return false;
            }
        };

        let store_ttl = ttl_seconds.saturating_add(self.ttl.stale_grace_seconds);
        match self.store.set(&full_key, bytes, store_ttl).await {
            Ok(()) => {
                debug!(key = %full_key, ttl_seconds, "cache set");
                true
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "cache write failed, continuing uncached");
                false
            }
        }
    }

    /// Returns the cached payload or computes, caches and returns it
    ///
    /// There is no single-flight locking: concurrent callers racing on the same
    /// cold key may each run `generator`. Writes are last-write-wins.
    /// Generator errors are returned as-is and nothing is cached.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        kind: &str,
        generator: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key, kind).await {
            return Ok(cached);
        }

        let value = generator().await?;
        self.set(key, &value, kind, None).await;
        Ok(value)
    }

    /// Serves stale entries within `ttl + swr_seconds` while refreshing them in the background
    ///
    /// A fresh entry is returned directly. A stale entry inside the window is
    /// returned and `generator` runs in a detached task that re-caches on
    /// success; its errors and panics are only logged. Anything older, or a
    /// miss, runs `generator` inline.
    ///
    /// The store keeps entries for `ttl + stale_grace_seconds` only, so a
    /// larger `swr_seconds` is clamped to the policy's grace.
    pub async fn get_with_stale_while_revalidate<T, E, F, Fut>(
        &self,
        key: &str,
        kind: &str,
        generator: F,
        swr_seconds: u64,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let full_key = self.full_key(key, kind);
        let swr_seconds = self.clamp_swr(&full_key, swr_seconds);

        if let Some(entry) = self.read_entry::<T>(&full_key).await {
            if self.is_fresh(&entry) {
                debug!(key = %full_key, "cache hit");
                return Ok(entry.payload);
            }

            let window_millis = millis(entry.ttl_seconds.saturating_add(swr_seconds));
            if self.age_millis(&entry) < window_millis {
                debug!(key = %full_key, "serving stale entry, refreshing in background");
                self.spawn_refresh(key.to_string(), kind.to_string(), generator);
                return Ok(entry.payload);
            }
        }

        let value = generator().await?;
        self.set(key, &value, kind, None).await;
        Ok(value)
    }

    /// Round-trips a sentinel key through the store
    pub async fn health_check(&self) -> HealthStatus {
        let key = self.full_key(&format!("probe-{}", self.clock.now_millis()), HEALTH_KIND);
        let expected = b"ok".to_vec();

        if let Err(e) = self.store.set(&key, expected.clone(), 60).await {
            return unhealthy(format!("write failed: {}", e));
        }

        let read_back = self.store.get(&key).await;
        let delete_result = self.store.delete(&key).await;

        match read_back {
            Ok(Some(value)) if value == expected => {}
            Ok(Some(_)) => return unhealthy("read returned a different value".to_string()),
            Ok(None) => return unhealthy("read returned nothing after write".to_string()),
            Err(e) => return unhealthy(format!("read failed: {}", e)),
        }

        if let Err(e) = delete_result {
            return unhealthy(format!("delete failed: {}", e));
        }

        HealthStatus {
            healthy: true,
            message: "cache store round trip succeeded".to_string(),
        }
    }

    /// Reads several keys independently; each key reports its own result
    pub async fn get_batch<T: DeserializeOwned>(
        &self,
        keys: &[String],
        kind: &str,
    ) -> Vec<(String, Option<T>)> {
        let reads = keys.iter().map(|key| async move {
            let value = self.get::<T>(key, kind).await;
            (key.clone(), value)
        });
        join_all(reads).await
    }

    /// Writes several entries independently; each key reports whether it was written
    pub async fn set_batch<T: Serialize>(
        &self,
        entries: &[(String, T)],
        kind: &str,
        ttl_override: Option<u64>,
    ) -> Vec<(String, bool)> {
        let writes = entries.iter().map(|(key, payload)| async move {
            let written = self.set(key, payload, kind, ttl_override).await;
            (key.clone(), written)
        });
        join_all(writes).await
    }

    /// Deletes every entry in this namespace, returning how many were removed
    ///
    /// Keys of a longer namespace sharing the prefix (`dev_eu` for `dev`) are
    /// kept: their remainder has a `_` before the `:`, which no kind contains.
    pub async fn clear(&self) -> usize {
        let prefix = format!("{}_", self.namespace);
        self.clear_where(&prefix, |rest| {
            rest.split_once(':')
                .is_some_and(|(kind, _)| !kind.contains('_'))
        })
        .await
    }

    /// Deletes every entry of one kind in this namespace
    pub async fn clear_kind(&self, kind: &str) -> usize {
        let prefix = self.full_key("", kind);
        self.clear_where(&prefix, |_| true).await
    }

    async fn clear_where(&self, prefix: &str, owned: impl Fn(&str) -> bool) -> usize {
        let keys = match self.store.list(prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "failed to list cache keys");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            if !key.strip_prefix(prefix).is_some_and(&owned) {
                continue;
            }
            match self.store.delete(&key).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %key, error = %e, "failed to delete cache key"),
            }
        }
        info!(prefix = %prefix, removed, "cache cleared");
        removed
    }

    async fn read_entry<T: DeserializeOwned>(&self, full_key: &str) -> Option<CacheEntry<T>> {
        let bytes = match self.store.get(full_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %full_key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry<T>>(&bytes) {
            Ok(entry) if entry.schema_version == SCHEMA_VERSION => Some(entry),
            Ok(entry) => {
                debug!(
                    key = %full_key,
                    found = entry.schema_version,
                    expected = SCHEMA_VERSION,
                    "cache entry schema mismatch"
                );
                self.delete_quietly(full_key).await;
                None
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "undecodable cache entry");
                self.delete_quietly(full_key).await;
                None
            }
        }
    }

    fn clamp_swr(&self, full_key: &str, swr_seconds: u64) -> u64 {
        let grace = self.ttl.stale_grace_seconds;
        if swr_seconds > grace {
            warn!(
                key = %full_key,
                swr_seconds,
                stale_grace_seconds = grace,
                "stale window exceeds store retention, clamping"
            );
            return grace;
        }
        swr_seconds
    }

    fn age_millis<T>(&self, entry: &CacheEntry<T>) -> i64 {
        self.clock.now_millis().saturating_sub(entry.created_at_millis)
    }

    fn is_fresh<T>(&self, entry: &CacheEntry<T>) -> bool {
        self.age_millis(entry) < millis(entry.ttl_seconds)
    }

    async fn delete_quietly(&self, full_key: &str) {
        if let Err(e) = self.store.delete(full_key).await {
            warn!(key = %full_key, error = %e, "cache delete failed");
        }
    }

    fn spawn_refresh<T, E, F, Fut>(&self, key: String, kind: String, generator: F)
    where
        T: Serialize + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let manager = self.clone();
        let full_key = self.full_key(&key, &kind);

        let refresh = tokio::spawn(async move {
            match generator().await {
                Ok(value) => {
                    if manager.set(&key, &value, &kind, None).await {
                        debug!(key = %key, kind = %kind, "background refresh stored");
                    }
                }
                Err(e) => {
                    warn!(key = %key, kind = %kind, error = %e, "background refresh failed");
                }
            }
        });

        tokio::spawn(async move {
            if let Err(e) = refresh.await {
                error!(key = %full_key, error = %e, "background refresh task aborted");
            }
        });
    }
}

fn millis(seconds: u64) -> i64 {
    i64::try_from(seconds.saturating_mul(1000)).unwrap_or(i64::MAX)
}

fn unhealthy(message: String) -> HealthStatus {
    warn!(message = %message, "cache health check failed");
    HealthStatus {
        healthy: false,
        message,
    }
}
