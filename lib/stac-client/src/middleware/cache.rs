//! Memoization of `GET` responses.
//!
//! Root documents, collections and queryables are fetched repeatedly while a
//! client is in use; the cache keeps the successful ones in a bounded LRU
//! owned by one transport. `POST` responses and requests marked
//! [`Request::no_store`] (search and listing pages) are never stored.

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use lru::LruCache;
use tower::{Layer, Service};
use tracing::debug;

use crate::{Error, Request, Response, Result};

/// Shared LRU of responses keyed by [`Request::cache_key`].
///
/// Cloning shares the storage. A capacity of zero disables storage.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Option<Arc<Mutex<LruCache<String, Response<Bytes>>>>>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    /// Cache holding at most `capacity` responses.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity)
                .map(|capacity| Arc::new(Mutex::new(LruCache::new(capacity)))),
        }
    }

    /// Cache that stores nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { entries: None }
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut LruCache<String, Response<Bytes>>) -> T,
    ) -> Option<T> {
        self.entries.as_ref().map(|entries| {
            let mut guard = entries.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        })
    }

    /// Stored response for `key`, marking it recently used.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Response<Bytes>> {
        self.with_entries(|entries| entries.get(key).cloned()).flatten()
    }

    /// Store a response.
    pub fn insert(&self, key: String, response: Response<Bytes>) {
        self.with_entries(|entries| entries.put(key, response));
    }

    /// Drop every stored response.
    pub fn clear(&self) {
        self.with_entries(LruCache::clear);
    }

    /// Number of stored responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len()).unwrap_or(0)
    }

    /// Nothing stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Layer that answers repeated `GET`s from a [`ResponseCache`].
#[derive(Debug, Clone)]
pub struct CacheLayer {
    cache: ResponseCache,
}

impl CacheLayer {
    /// Layer backed by `cache`.
    #[must_use]
    pub const fn new(cache: ResponseCache) -> Self {
        Self { cache }
    }
}

impl<S> Layer<S> for CacheLayer {
    type Service = Cached<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Cached {
            inner,
            cache: self.cache.clone(),
        }
    }
}

/// Service produced by [`CacheLayer`].
#[derive(Debug, Clone)]
pub struct Cached<S> {
    inner: S,
    cache: ResponseCache,
}

impl<S> Service<Request<Bytes>> for Cached<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        if !request.method().is_cacheable() || request.is_no_store() {
            return Box::pin(async move { inner.call(request).await });
        }

        let key = request.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            debug!(url = %request.url(), "cache hit");
            return Box::pin(async move { Ok(hit) });
        }

        let cache = self.cache.clone();
        Box::pin(async move {
            let response = inner.call(request).await?;
            if response.is_success() {
                debug!("caching response");
                cache.insert(key, response.clone());
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn response(body: &'static str) -> Response<Bytes> {
        Response::new(200, HashMap::new(), Bytes::from(body))
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ResponseCache::new(2);
        cache.insert("a".to_string(), response("a"));
        cache.insert("b".to_string(), response("b"));
        assert!(cache.get("a").is_some());
        cache.insert("c".to_string(), response("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn clear_empties() {
        let cache = ResponseCache::new(4);
        let shared = cache.clone();
        cache.insert("a".to_string(), response("a"));
        assert_eq!(shared.len(), 1);
        shared.clear();
        assert!(cache.is_empty());
    }

    #[derive(Clone, Default)]
    struct Counting {
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Service<Request<Bytes>> for Counting {
        type Response = Response<Bytes>;
        type Error = Error;
        type Future = std::future::Ready<Result<Response<Bytes>>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _request: Request<Bytes>) -> Self::Future {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            std::future::ready(Ok(response("page")))
        }
    }

    #[tokio::test]
    async fn no_store_requests_bypass_the_cache() {
        use tower::ServiceExt;

        let inner = Counting::default();
        let cache = ResponseCache::new(4);
        let mut service = CacheLayer::new(cache.clone()).layer(inner.clone());
        let url = url::Url::parse("https://stac.example.com/search?limit=1").expect("url");

        for _ in 0..2 {
            let request = Request::builder(crate::Method::Get, url.clone())
                .build()
                .no_store();
            service.ready().await.expect("ready").call(request).await.expect("page");
        }
        assert_eq!(inner.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(cache.is_empty());

        for _ in 0..2 {
            let request = Request::builder(crate::Method::Get, url.clone()).build();
            service.ready().await.expect("ready").call(request).await.expect("page");
        }
        assert_eq!(inner.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache = ResponseCache::new(0);
        cache.insert("a".to_string(), response("a"));
        assert!(cache.get("a").is_none());
        assert!(ResponseCache::disabled().is_empty());
    }
}
