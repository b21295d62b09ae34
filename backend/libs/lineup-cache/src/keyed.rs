//! Read-through cache with single-flight fetch coalescing
//!
//! A miss registers the fetch as a shared future under its key. Callers that
//! miss while that fetch is running attach to the same future instead of
//! starting their own, so N concurrent misses cost exactly one backend call.

use crate::{CacheBackend, CacheKey, CacheMetrics, CacheResult, MemoryBackend};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

type Flight<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// TTL cache keyed by the exact lookup key used for the backend fetch.
///
/// Each instance owns a namespace; two caches with different namespaces never
/// see each other's entries even when they share a backend. Fetch failures are
/// never cached and reach every caller waiting on that fetch.
pub struct KeyedCache<V, E> {
    inner: Arc<Inner<V, E>>,
}

impl<V, E> Clone for KeyedCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<V, E> {
    namespace: String,
    ttl: Duration,
    backend: Arc<dyn CacheBackend>,
    in_flight: Mutex<HashMap<String, Flight<V, E>>>,
    /// Bumped by `clear`; fetches started under an older generation do not write back
    generation: AtomicU64,
    metrics: CacheMetrics,
}

impl<V, E> KeyedCache<V, E>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(namespace: impl Into<String>, backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        let namespace = namespace.into();
        Self {
            inner: Arc::new(Inner {
                metrics: CacheMetrics::new(namespace.clone()),
                namespace,
                ttl,
                backend,
                in_flight: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Cache backed by its own process-local [`MemoryBackend`]
    pub fn in_memory(namespace: impl Into<String>, ttl: Duration) -> Self {
        Self::new(namespace, Arc::new(MemoryBackend::new()), ttl)
    }

    /// Return the live entry for `key`, or run `fetcher` once and cache its value.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetcher: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.get_or_fetch_where(key, |_| true, fetcher).await
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), but a live entry rejected by
    /// `accept` counts as a miss and is replaced by a fresh fetch.
    pub async fn get_or_fetch_where<A, F, Fut>(
        &self,
        key: &str,
        accept: A,
        fetcher: F,
    ) -> Result<V, E>
    where
        A: Fn(&V) -> bool + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let cache_key = CacheKey::scoped(&self.inner.namespace, key);

        if let Some(value) = self.inner.lookup(&cache_key).await {
            if accept(&value) {
                debug!(key = %cache_key, "Cache hit");
                self.inner.metrics.record_hit();
                return Ok(value);
            }
        }

        // Backend I/O never happens under the `in_flight` lock
        let mut rechecked = false;
        loop {
            let mut in_flight = self.inner.in_flight.lock().await;

            if let Some(flight) = in_flight.get(&cache_key).cloned() {
                drop(in_flight);
                debug!(key = %cache_key, "Joining in-flight fetch");
                self.inner.metrics.record_coalesced();

                let result = flight.await;
                match &result {
                    // The shared fetch covered a different request; fetch our own
                    Ok(value) if !accept(value) => {
                        rechecked = true;
                        continue;
                    }
                    _ => return result,
                }
            }

            if !rechecked {
                // A fetch may have completed between the first lookup and taking
                // the lock. Flights write the backend before leaving the map.
                drop(in_flight);
                rechecked = true;
                if let Some(value) = self.inner.lookup(&cache_key).await {
                    if accept(&value) {
                        debug!(key = %cache_key, "Cache hit");
                        self.inner.metrics.record_hit();
                        return Ok(value);
                    }
                }
                continue;
            }

            debug!(key = %cache_key, "Cache miss");
            self.inner.metrics.record_miss();

            let flight = Inner::launch(&self.inner, cache_key.clone(), fetcher());
            in_flight.insert(cache_key, flight.clone());
            drop(in_flight);

            return flight.await;
        }
    }

    /// Discard every entry of this cache.
    ///
    /// Callers already waiting on a fetch still receive its result, but that
    /// result is not written back.
    pub async fn clear(&self) -> CacheResult<usize> {
        {
            let mut in_flight = self.inner.in_flight.lock().await;
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            in_flight.clear();
        }

        let removed = self
            .inner
            .backend
            .delete_namespace(&self.inner.namespace)
            .await?;

        debug!(namespace = %self.inner.namespace, removed, "Cache cleared");
        self.inner.metrics.record_invalidation();
        Ok(removed)
    }
}

impl<V, E> Inner<V, E>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn launch<Fut>(inner: &Arc<Self>, cache_key: String, fetch: Fut) -> Flight<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let inner = Arc::clone(inner);
        let generation = inner.generation.load(Ordering::SeqCst);
        inner.metrics.record_fetch();

        async move {
            let result = fetch.await;

            match &result {
                Ok(value) if inner.is_current(generation) => {
                    inner.store(&cache_key, value).await;
                    // clear() ran during the write and may have missed it
                    if !inner.is_current(generation) {
                        inner.discard(&cache_key).await;
                    }
                }
                Ok(_) => {
                    debug!(key = %cache_key, "Cache cleared during fetch, result not stored");
                }
                Err(_) => {
                    debug!(key = %cache_key, "Fetch failed, nothing cached");
                    inner.metrics.record_fetch_error();
                }
            }

            let mut in_flight = inner.in_flight.lock().await;
            if inner.is_current(generation) {
                in_flight.remove(&cache_key);
            }
            drop(in_flight);

            result
        }
        .boxed()
        .shared()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn lookup(&self, cache_key: &str) -> Option<V> {
        match self.backend.get(cache_key).await {
            Ok(Some(data)) => match serde_json::from_str::<V>(&data) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %cache_key, error = %e, "Cache deserialization failed");
                    self.metrics.record_error("deserialize");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                // Backend outage degrades to a miss
                warn!(key = %cache_key, error = %e, "Cache backend get failed");
                self.metrics.record_error("backend");
                None
            }
        }
    }

    async fn store(&self, cache_key: &str, value: &V) {
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Cache serialization failed");
                self.metrics.record_error("serialize");
                return;
            }
        };

        match self.backend.set(cache_key, &data, self.ttl).await {
            Ok(()) => {
                debug!(key = %cache_key, ttl = ?self.ttl, "Cache set");
                self.metrics.record_write();
            }
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Cache backend set failed");
                self.metrics.record_error("backend");
            }
        }
    }

    async fn discard(&self, cache_key: &str) {
        if let Err(e) = self.backend.delete(cache_key).await {
            warn!(key = %cache_key, error = %e, "Cache backend delete failed");
            self.metrics.record_error("backend");
        }
    }
}
