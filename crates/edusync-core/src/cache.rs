// ── Resource cache with request deduplication ──
//
// Per-endpoint memoized reads over opaque JSON payloads. At most one fetch
// is in flight per key at any instant: concurrent callers attach to the
// leader's in-flight entry and all settle with the same result. Entries
// have no TTL -- they are removed only by explicit invalidation (typically
// after a successful mutation).
//
// The cache is an explicitly constructed, injectable instance. Whatever
// owns the UI tree's lifetime owns the cache; tests construct their own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;

type FetchResult = Result<Arc<Value>, SyncError>;
type SuccessCallback = Arc<dyn Fn(&Arc<Value>) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&SyncError) + Send + Sync>;

// ── QueryOptions ─────────────────────────────────────────────────────

/// Per-query tuning and callbacks.
#[derive(Clone)]
pub struct QueryOptions {
    /// When `false`, `query` and `poll` do nothing at all.
    pub enabled: bool,
    /// Cadence for [`ResourceCache::poll`]. Ignored by one-shot queries.
    pub refetch_interval: Option<Duration>,
    /// Per-fetch budget; falls back to the cache-wide default.
    pub timeout: Option<Duration>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            refetch_interval: None,
            timeout: None,
            on_success: None,
            on_error: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Invoked with the settled value on every successful query, including
    /// cache hits.
    pub fn on_success(mut self, f: impl Fn(&Arc<Value>) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Invoked with the error on every failed query.
    pub fn on_error(mut self, f: impl Fn(&SyncError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

// ── ResourceCache ────────────────────────────────────────────────────

struct CacheInner {
    entries: DashMap<String, Arc<Value>>,
    /// One watch per outstanding fetch; followers wait on it, the leader
    /// settles it. Removed when the fetch settles or the leader is dropped.
    in_flight: DashMap<String, watch::Receiver<Option<FetchResult>>>,
    errors: DashMap<String, SyncError>,
    default_timeout: Duration,
}

/// Memoized, deduplicating read cache. Cheaply cloneable.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<CacheInner>,
}

impl ResourceCache {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                errors: DashMap::new(),
                default_timeout,
            }),
        }
    }

    /// Read a resource, fetching on a cache miss.
    ///
    /// A present cache entry is returned immediately with no refetch. On a
    /// miss the fetch is deduplicated: all concurrent callers for `key`
    /// share one network call and one result. Returns `Ok(None)` when
    /// `options.enabled` is `false`.
    pub async fn query<F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        options: &QueryOptions,
    ) -> Result<Option<Arc<Value>>, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, SyncError>>,
    {
        if !options.enabled {
            return Ok(None);
        }

        if let Some(entry) = self.inner.entries.get(key) {
            let value = Arc::clone(entry.value());
            drop(entry);
            if let Some(cb) = &options.on_success {
                cb(&value);
            }
            return Ok(Some(value));
        }

        self.fetch_through(key, fetcher, options).await.map(Some)
    }

    /// Re-fetch a resource, bypassing the cached-entry short-circuit but
    /// still deduplicating with any outstanding fetch for `key`.
    pub async fn refetch<F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        options: &QueryOptions,
    ) -> Result<Option<Arc<Value>>, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, SyncError>>,
    {
        if !options.enabled {
            return Ok(None);
        }
        self.fetch_through(key, fetcher, options).await.map(Some)
    }

    /// Periodically refetch `key` on `options.refetch_interval` until the
    /// returned handle is dropped or cancelled (consumer deactivation).
    ///
    /// Each tick goes through the normal deduplication path. A refetch
    /// already in flight when the handle is cancelled is NOT aborted -- it
    /// completes and populates the shared cache.
    pub fn poll<F, Fut>(&self, key: &str, fetcher: F, options: QueryOptions) -> PollHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, SyncError>> + Send + 'static,
    {
        let cancel = CancellationToken::new();

        let Some(interval) = options.refetch_interval else {
            return PollHandle { cancel };
        };
        if !options.enabled {
            return PollHandle { cancel };
        }

        let cache = self.clone();
        let key = key.to_owned();
        let fetcher = Arc::new(fetcher);
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        // Spawned so that cancelling the poll loop never
                        // aborts an in-flight fetch.
                        let cache = cache.clone();
                        let key = key.clone();
                        let fetcher = Arc::clone(&fetcher);
                        let options = options.clone();
                        tokio::spawn(async move {
                            if let Err(e) = cache.refetch(&key, || fetcher(), &options).await {
                                tracing::debug!(key = %key, error = %e, "periodic refetch failed");
                            }
                        });
                    }
                }
            }
        });

        PollHandle { cancel }
    }

    /// Discard the cached value for `key`; the next read performs a real
    /// fetch. No effect on an in-flight fetch for the same key.
    pub fn invalidate(&self, key: &str) {
        self.inner.entries.remove(key);
    }

    /// Drop all cached values and error state (e.g. on sign-out).
    pub fn clear(&self) {
        self.inner.entries.clear();
        self.inner.errors.clear();
    }

    /// The cached value for `key`, if any. Never triggers a fetch.
    pub fn cached(&self, key: &str) -> Option<Arc<Value>> {
        self.inner.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    /// The most recent fetch error for `key`. Cleared by the next
    /// successful fetch; a failed fetch never clears the cached value.
    pub fn error(&self, key: &str) -> Option<SyncError> {
        self.inner.errors.get(key).map(|e| e.value().clone())
    }

    /// Whether a fetch for `key` is currently outstanding.
    pub fn is_fetching(&self, key: &str) -> bool {
        self.inner.in_flight.contains_key(key)
    }

    // ── Deduplicated fetch ───────────────────────────────────────────

    async fn fetch_through<F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        options: &QueryOptions,
    ) -> FetchResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, SyncError>>,
    {
        let result = self.fetch_shared(key, fetcher, options.timeout).await;
        match &result {
            Ok(value) => {
                if let Some(cb) = &options.on_success {
                    cb(value);
                }
            }
            Err(e) => {
                if let Some(cb) = &options.on_error {
                    cb(e);
                }
            }
        }
        result
    }

    async fn fetch_shared<F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        timeout: Option<Duration>,
    ) -> FetchResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, SyncError>>,
    {
        enum Role {
            Leader(watch::Sender<Option<FetchResult>>),
            Follower(watch::Receiver<Option<FetchResult>>),
        }

        let role = match self.inner.in_flight.entry(key.to_owned()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().clone()),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(mut rx) => loop {
                let settled = rx.borrow_and_update().clone();
                if let Some(result) = settled {
                    return result;
                }
                if rx.changed().await.is_err() {
                    // Leader was dropped without settling (caller cancelled).
                    return Err(SyncError::Internal("in-flight fetch was abandoned".into()));
                }
            },
            Role::Leader(tx) => {
                // If the leader's future is dropped mid-fetch, the guard
                // clears the registry entry so the key is not wedged.
                let guard = InFlightGuard {
                    map: &self.inner.in_flight,
                    key: Some(key.to_owned()),
                };

                let budget = timeout.unwrap_or(self.inner.default_timeout);
                let result = match tokio::time::timeout(budget, fetcher()).await {
                    Ok(Ok(value)) => {
                        let value = Arc::new(value);
                        self.inner.entries.insert(key.to_owned(), Arc::clone(&value));
                        self.inner.errors.remove(key);
                        Ok(value)
                    }
                    Ok(Err(e)) => {
                        // Stale-but-available: the previous cached value, if
                        // any, stays readable.
                        self.inner.errors.insert(key.to_owned(), e.clone());
                        Err(e)
                    }
                    Err(_) => {
                        let e = SyncError::Timeout { timeout_secs: budget.as_secs() };
                        self.inner.errors.insert(key.to_owned(), e.clone());
                        Err(e)
                    }
                };

                guard.finish();
                let _ = tx.send(Some(result.clone()));
                result
            }
        }
    }
}

/// Removes the in-flight entry on drop unless `finish` already did.
struct InFlightGuard<'a> {
    map: &'a DashMap<String, watch::Receiver<Option<FetchResult>>>,
    key: Option<String>,
}

impl InFlightGuard<'_> {
    fn finish(mut self) {
        if let Some(key) = self.key.take() {
            self.map.remove(&key);
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.map.remove(&key);
        }
    }
}

// ── PollHandle ───────────────────────────────────────────────────────

/// Handle to a periodic refetch loop. Dropping it stops the timer.
#[derive(Debug)]
pub struct PollHandle {
    cancel: CancellationToken,
}

impl PollHandle {
    /// Stop the periodic refetch explicitly.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Tests ────────────────────────────────────────────────────────────
