//! Pooled HTTP transport built on hyper-util.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tower::{Layer, ServiceExt};
use tower::retry::RetryLayer;
use tower::util::{BoxCloneService, MapRequestLayer};
use tower_service::Service;

use crate::{
    Error, Request, Response, Result,
    config::{TransportConfig, TransportConfigBuilder},
    connector::https_connector,
    middleware::{
        Backoff, CacheLayer, DefaultsLayer, LogLevel, LoggingLayer, ResponseCache, RetryPolicy,
    },
};

/// Type-erased service the middleware stack is composed of.
pub type BoxedService = BoxCloneService<Request<Bytes>, Response<Bytes>, Error>;

/// Future returned by [`Transport`] as a tower service.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response<Bytes>>> + Send + 'static>>;

/// Hook that edits every outgoing request.
pub type RequestModifier = Arc<dyn Fn(&mut Request<Bytes>) + Send + Sync>;

type LayerFn = Arc<dyn Fn(BoxedService) -> BoxedService + Send + Sync>;

/// Makes a [`BoxedService`] `Sync`: lock, clone, release, then call the clone.
#[derive(Clone)]
struct SyncService {
    inner: Arc<Mutex<BoxedService>>,
}

impl SyncService {
    fn new(service: BoxedService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    fn call(&self, request: Request<Bytes>) -> ServiceFuture {
        let mut service = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        Box::pin(async move { service.ready().await?.call(request).await })
    }
}

/// The network end of the stack.
#[derive(Clone)]
struct RawHyperClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl RawHyperClient {
    fn new(config: &TransportConfig) -> Self {
        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .build(https_connector(config.connect_timeout));

        Self {
            inner,
            timeout: config.timeout,
        }
    }

    fn build_hyper_request(request: Request<Bytes>) -> Result<http::Request<Full<Bytes>>> {
        let (method, url, headers, body) = request.into_parts();

        let mut builder = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .body(body.map_or_else(Full::default, Full::new))
            .map_err(|e| Error::invalid_request(e.to_string()))
    }

    fn extract_headers(headers: &http::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect()
    }

    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let hyper_request = Self::build_hyper_request(request)?;

        let exchange = async {
            let response = self
                .inner
                .request(hyper_request)
                .await
                .map_err(Self::map_hyper_error)?;
            let status = response.status().as_u16();
            let headers = Self::extract_headers(response.headers());
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| Error::connection(e.to_string()))?
                .to_bytes();
            Ok(Response::new(status, headers, body))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout)?
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = err.to_string();

        if err.is_connect() {
            return Error::connection(msg);
        }
        if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
            return Error::tls(msg);
        }
        Error::connection(msg)
    }
}

impl Service<Request<Bytes>> for RawHyperClient {
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.execute(request).await })
    }
}

/// HTTP transport with connection pooling, TLS, retries and `GET` memoization.
///
/// The transport is `Send + Sync` and cheap to clone; clones share the
/// connection pool and the response cache, so one transport can serve many
/// concurrent searches.
///
/// # Example
///
/// ```ignore
/// use stac_client::Transport;
/// use std::time::Duration;
///
/// let transport = Transport::builder()
///     .timeout(Duration::from_secs(10))
///     .max_retries(5)
///     .with_bearer_auth("my-token")
///     .build();
/// ```
#[derive(Clone)]
pub struct Transport {
    service: SyncService,
    config: TransportConfig,
    cache: ResponseCache,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Transport with the default configuration and middleware.
    #[must_use]
    pub fn new() -> Self {
        TransportBuilder::default().build()
    }

    /// Transport with a custom configuration and the default middleware.
    #[must_use]
    pub fn with_config(config: TransportConfig) -> Self {
        TransportBuilder {
            config: config.into(),
            ..TransportBuilder::default()
        }
        .build()
    }

    /// Start configuring a transport.
    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder::default()
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Forget every memoized response.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Number of memoized responses.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::HttpClient for Transport {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.service.call(request).await
    }
}

impl Service<Request<Bytes>> for Transport {
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        self.service.call(request)
    }
}

/// Builder for [`Transport`].
pub struct TransportBuilder {
    config: TransportConfigBuilder,
    defaults: DefaultsLayer,
    user_agent: Option<String>,
    modifier: Option<RequestModifier>,
    logging: Option<LogLevel>,
    layers: Vec<LayerFn>,
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self {
            config: TransportConfigBuilder::default(),
            defaults: DefaultsLayer::new(),
            user_agent: None,
            modifier: None,
            logging: Some(LogLevel::Info),
            layers: Vec::new(),
        }
    }
}

impl std::fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("config", &self.config)
            .field("defaults", &self.defaults)
            .field("user_agent", &self.user_agent)
            .field("has_modifier", &self.modifier.is_some())
            .field("logging", &self.logging)
            .field("layers_count", &self.layers.len())
            .finish()
    }
}

impl TransportBuilder {
    /// Per-request timeout, covering the whole exchange.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Connection establishment timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    /// Maximum idle connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config = self.config.pool_idle_per_host(count);
        self
    }

    /// Idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.pool_idle_timeout(timeout);
        self
    }

    /// Retries after the first attempt; `0` disables retrying.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config = self.config.max_retries(retries);
        self
    }

    /// First retry delay and the cap on later ones.
    #[must_use]
    pub fn retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.config = self.config.retry_backoff(base, max);
        self
    }

    /// Memoized responses kept; `0` disables memoization.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.cache_capacity(capacity);
        self
    }

    /// Header added to every request that does not set it.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults = self.defaults.header(name, value);
        self
    }

    /// Several default headers.
    #[must_use]
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.defaults = self.defaults.header(name, value);
        }
        self
    }

    /// Query parameter added to every request that does not set it.
    #[must_use]
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults = self.defaults.query_param(name, value);
        self
    }

    /// `Authorization: Bearer <token>` on every request.
    #[must_use]
    pub fn with_bearer_auth(mut self, token: impl AsRef<str>) -> Self {
        self.defaults = self.defaults.bearer_auth(token);
        self
    }

    /// Replace the default `User-Agent` (`stac-client-rs/<version>`).
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Edit every outgoing request.
    ///
    /// Runs after default headers and parameters are merged and before the
    /// memoization lookup.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let transport = Transport::builder()
    ///     .with_request_modifier(|request| {
    ///         request.headers_mut().insert("X-Trace".into(), "1".into());
    ///     })
    ///     .build();
    /// ```
    #[must_use]
    pub fn with_request_modifier<F>(mut self, modifier: F) -> Self
    where
        F: Fn(&mut Request<Bytes>) + Send + Sync + 'static,
    {
        self.modifier = Some(Arc::new(modifier));
        self
    }

    /// Info-level request logging (the default).
    #[must_use]
    pub const fn with_logging(mut self) -> Self {
        self.logging = Some(LogLevel::Info);
        self
    }

    /// Debug-level request logging, including headers.
    #[must_use]
    pub const fn with_debug_logging(mut self) -> Self {
        self.logging = Some(LogLevel::Debug);
        self
    }

    /// No request logging.
    #[must_use]
    pub const fn without_logging(mut self) -> Self {
        self.logging = None;
        self
    }

    /// Add a tower layer between the memoization and logging layers.
    ///
    /// Layers wrap in the order they are added: the last one added sees
    /// requests first.
    #[must_use]
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<Request<Bytes>>>::Future: Send,
    {
        self.layers
            .push(Arc::new(move |service| BoxCloneService::new(layer.layer(service))));
        self
    }

    /// Assemble the middleware stack.
    #[must_use]
    pub fn build(self) -> Transport {
        let config = self.config.build();
        let cache = ResponseCache::new(config.cache_capacity);

        let mut service: BoxedService = BoxCloneService::new(RawHyperClient::new(&config));

        if config.max_retries > 0 {
            let backoff = Backoff::new(config.retry_base_delay, config.retry_max_delay);
            service = BoxCloneService::new(
                RetryLayer::new(RetryPolicy::new(config.max_retries, backoff)).layer(service),
            );
        }

        match self.logging {
            Some(LogLevel::Info) => {
                service = BoxCloneService::new(LoggingLayer::new().layer(service));
            }
            Some(LogLevel::Debug) => {
                service = BoxCloneService::new(LoggingLayer::debug().layer(service));
            }
            None => {}
        }

        for layer_fn in self.layers {
            service = layer_fn(service);
        }

        service = BoxCloneService::new(CacheLayer::new(cache.clone()).layer(service));

        if let Some(modifier) = self.modifier {
            service = BoxCloneService::new(
                MapRequestLayer::new(move |mut request: Request<Bytes>| {
                    modifier(&mut request);
                    request
                })
                .layer(service),
            );
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("stac-client-rs/{}", env!("CARGO_PKG_VERSION")));
        let defaults = self.defaults.header("User-Agent", user_agent);
        service = BoxCloneService::new(defaults.layer(service));

        Transport {
            service: SyncService::new(service),
            config,
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_default() {
        let transport = Transport::new();
        assert_eq!(transport.config().timeout, Duration::from_secs(30));
        assert_eq!(transport.config().cache_capacity, 256);
        assert_eq!(transport.cache_len(), 0);
    }

    #[test]
    fn transport_builder() {
        let transport = Transport::builder()
            .timeout(Duration::from_secs(60))
            .pool_idle_per_host(16)
            .max_retries(0)
            .cache_capacity(8)
            .build();

        assert_eq!(transport.config().timeout, Duration::from_secs(60));
        assert_eq!(transport.config().pool_idle_per_host, 16);
        assert_eq!(transport.config().max_retries, 0);
        assert_eq!(transport.config().cache_capacity, 8);
    }

    #[test]
    fn transport_is_debug() {
        let transport = Transport::new();
        assert!(format!("{transport:?}").contains("Transport"));
    }

    #[test]
    fn transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Transport>();
    }
}
