//! TTL cache for upstream query results, persisted in its own namespace.
//!
//! Entries live under the single key `"cache"` of the namespace file as
//! `{ source_key: { "data": ..., "timestamp": epoch_secs } }`. An entry is
//! valid while `now - timestamp < ttl`. Expired entries are dropped when the
//! namespace is loaded and again before every write.
//!
//! [`TtlCache::get_or_fetch`] is the fetch protocol: it takes the per-source
//! lock before checking the cache, so concurrent requests for one source
//! collapse into a single upstream call while other sources proceed.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AppError, FetchError};
use super::locks::{KeyedGuard, KeyedLocks};
use super::store::DictNamespace;
use super::types::{CacheEntry, now_secs};

const CACHE_KEY: &str = "cache";

#[derive(Debug)]
pub struct TtlCache {
    source: String,
    ttl: Duration,
    namespace: DictNamespace,
    entries: Mutex<HashMap<String, CacheEntry>>,
    locks: KeyedLocks,
}

impl TtlCache {
    /// Open (or create) the cache namespace at `path`.
    pub fn open(source: impl Into<String>, path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self::open_at(source, path, ttl, now_secs())
    }

    /// [`open`](Self::open) with an explicit clock reading.
    pub fn open_at(source: impl Into<String>, path: impl Into<PathBuf>, ttl: Duration, now: f64) -> Self {
        let source = source.into();
        let namespace = DictNamespace::open(format!("{source}_cache"), path);
        let stored: HashMap<String, CacheEntry> = namespace.get_or(CACHE_KEY, HashMap::new());
        let total = stored.len();
        let ttl_secs = ttl.as_secs_f64();
        let entries: HashMap<_, _> = stored
            .into_iter()
            .filter(|(_, e)| e.is_fresh(now, ttl_secs))
            .collect();

        info!(source = %source, loaded = entries.len(), expired = total - entries.len(), "cache loaded");

        Self {
            locks: KeyedLocks::new(source.clone()),
            source,
            ttl,
            namespace,
            entries: Mutex::new(entries),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Payload for `key` if present and younger than the TTL.
    pub fn get_cached(&self, key: &str) -> Option<Value> {
        self.get_cached_at(key, now_secs())
    }

    pub fn get_cached_at(&self, key: &str, now: f64) -> Option<Value> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries
            .get(key)
            .filter(|e| e.is_fresh(now, self.ttl.as_secs_f64()))
            .map(|e| e.data.clone())
    }

    /// Typed [`get_cached`](Self::get_cached). A payload of another shape
    /// counts as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_cached(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(source = %self.source, key, error = %e, "cached payload has unexpected shape");
                None
            }
        }
    }

    /// Store `payload` stamped with the current time and persist.
    pub fn set_cached<T: Serialize + ?Sized>(&self, key: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(data) => self.set_cached_at(key, data, now_secs()),
            Err(e) => warn!(source = %self.source, key, error = %e, "payload not serialisable; not cached"),
        }
    }

    pub fn set_cached_at(&self, key: &str, data: Value, now: f64) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.to_string(), CacheEntry { data, timestamp: now });

        let ttl_secs = self.ttl.as_secs_f64();
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh(now, ttl_secs));
        debug!(
            source = %self.source,
            key,
            kept = entries.len(),
            pruned = before - entries.len(),
            "saving cache"
        );
        self.namespace.set(CACHE_KEY, &*entries);
    }

    /// Number of entries held (fresh or not yet pruned).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exclusive hold on one source key.
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        self.locks.acquire(key).await
    }

    /// Cached list for `key`, or the result of `fetch` on a miss.
    ///
    /// Runs entirely under the per-key lock. An empty fetch result is
    /// reported as [`AppError::EmptyResult`] and not cached.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, fetch: F) -> Result<Vec<T>, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, FetchError>>,
    {
        let _guard = self.lock(key).await;

        if let Some(hit) = self.get::<Vec<T>>(key) {
            debug!(source = %self.source, key, items = hit.len(), "cache hit");
            return Ok(hit);
        }

        debug!(source = %self.source, key, "cache miss, fetching");
        let items = fetch().await.map_err(|e| {
            warn!(source = %self.source, key, error = %e, "upstream fetch failed");
            e
        })?;

        if items.is_empty() {
            info!(source = %self.source, key, "upstream returned nothing");
            return Err(AppError::EmptyResult(format!("{}:{key}", self.source)));
        }

        info!(source = %self.source, key, items = items.len(), "fetched and cached");
        self.set_cached(key, &items);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(1800);

    fn cache(dir: &TempDir) -> TtlCache {
        TtlCache::open("reddit", dir.path().join("reddit_cache.json"), TTL)
    }

    #[test]
    fn hit_before_ttl_miss_after() {
        let dir = TempDir::new().unwrap();
        let c = cache(&dir);
        c.set_cached_at("aww", json!(["a"]), 10_000.0);
        assert_eq!(c.get_cached_at("aww", 10_000.0 + 1799.0), Some(json!(["a"])));
        assert_eq!(c.get_cached_at("aww", 10_000.0 + 1800.0), None);
        assert_eq!(c.get_cached_at("aww", 10_000.0 + 5000.0), None);
    }

    #[test]
    fn absent_key_misses() {
        let dir = TempDir::new().unwrap();
        assert_eq!(cache(&dir).get_cached("nothing"), None);
    }

    #[test]
    fn save_prunes_expired_entries() {
        let dir = TempDir::new().unwrap();
        let c = cache(&dir);
        c.set_cached_at("old", json!(1), 0.0);
        c.set_cached_at("new", json!(2), 2000.0);
        assert_eq!(c.len(), 1);

        let raw = DictNamespace::open("check", dir.path().join("reddit_cache.json"));
        let stored: HashMap<String, CacheEntry> = raw.get("cache").unwrap();
        assert!(stored.contains_key("new"));
        assert!(!stored.contains_key("old"));
    }

    #[test]
    fn reload_drops_expired() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("neodb_cache.json");
        let c = TtlCache::open_at("neodb", &path, TTL, 0.0);
        c.set_cached_at("a", json!("x"), 40.0);
        c.set_cached_at("b", json!("y"), 1000.0);
        drop(c);

        let reopened = TtlCache::open_at("neodb", &path, TTL, 1850.0);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get_cached_at("b", 1850.0), Some(json!("y")));
    }

    #[test]
    fn persisted_entries_survive_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reddit_cache.json");
        TtlCache::open("reddit", &path, TTL).set_cached("aww", &vec!["u1", "u2"]);
        let reopened = TtlCache::open("reddit", &path, TTL);
        assert_eq!(reopened.get::<Vec<String>>("aww"), Some(vec!["u1".into(), "u2".into()]));
    }

    #[tokio::test]
    async fn concurrent_misses_fetch_once() {
        let dir = TempDir::new().unwrap();
        let c = Arc::new(cache(&dir));
        let fetches = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let (c, fetches) = (c.clone(), fetches.clone());
            tasks.push(tokio::spawn(async move {
                c.get_or_fetch("aww", move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, FetchError>(vec!["post".to_string()])
                })
                .await
            }));
        }
        for t in tasks {
            assert_eq!(t.await.unwrap().unwrap(), vec!["post".to_string()]);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_sources_fetch_in_parallel() {
        let dir = TempDir::new().unwrap();
        let c = Arc::new(cache(&dir));
        let _held = c.lock("aww").await;
        // "eyebleach" is not blocked by the held "aww" lock.
        let got = tokio::time::timeout(
            Duration::from_secs(1),
            c.get_or_fetch("eyebleach", || async { Ok::<_, FetchError>(vec![1u32]) }),
        )
        .await
        .expect("unrelated source must not block")
        .unwrap();
        assert_eq!(got, vec![1]);
    }

    #[tokio::test]
    async fn empty_fetch_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let c = cache(&dir);
        let res = c.get_or_fetch("void", || async { Ok::<Vec<String>, _>(Vec::new()) }).await;
        assert!(matches!(res, Err(AppError::EmptyResult(_))));
        assert!(c.get_cached("void").is_none());
    }

    #[tokio::test]
    async fn fetch_error_propagates_and_leaves_cache_empty() {
        let dir = TempDir::new().unwrap();
        let c = cache(&dir);
        let res = c
            .get_or_fetch("aww", || async { Err::<Vec<String>, _>(FetchError::Timeout) })
            .await;
        assert!(matches!(res, Err(AppError::Fetch(FetchError::Timeout))));
        assert!(c.is_empty());
    }
}
