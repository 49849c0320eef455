//! Session-wide headers and query parameters.
//!
//! Every outgoing request gains the configured headers (authorization, user
//! agent, API keys...) and query parameters. Values already on the request
//! win.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};

use crate::{Error, Request, Response, Result, merge_query_defaults};

#[derive(Debug, Default)]
struct Defaults {
    headers: Vec<(String, String)>,
    params: Vec<(String, String)>,
}

impl Defaults {
    fn apply(&self, request: &mut Request<Bytes>) {
        for (name, value) in &self.headers {
            if !request.has_header(name) {
                request.headers_mut().insert(name.clone(), value.clone());
            }
        }
        merge_query_defaults(
            request.url_mut(),
            self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
    }
}

/// Layer that merges default headers and query parameters into requests.
///
/// # Example
///
/// ```ignore
/// use stac_client::middleware::DefaultsLayer;
///
/// let layer = DefaultsLayer::new()
///     .header("X-Api-Key", "secret")
///     .query_param("token", "abc");
/// ```
#[derive(Debug, Clone, Default)]
pub struct DefaultsLayer {
    defaults: Arc<Defaults>,
}

impl DefaultsLayer {
    /// Layer with no defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer from header and parameter lists.
    #[must_use]
    pub fn from_parts(headers: Vec<(String, String)>, params: Vec<(String, String)>) -> Self {
        Self {
            defaults: Arc::new(Defaults { headers, params }),
        }
    }

    /// Add a default header.
    #[must_use]
    pub fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (mut headers, params) = self.into_parts();
        headers.push((name.into(), value.into()));
        Self::from_parts(headers, params)
    }

    /// Add `Authorization: Bearer <token>`.
    #[must_use]
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.as_ref()))
    }

    /// Add a default query parameter.
    #[must_use]
    pub fn query_param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (headers, mut params) = self.into_parts();
        params.push((name.into(), value.into()));
        Self::from_parts(headers, params)
    }

    /// Whether nothing would be added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defaults.headers.is_empty() && self.defaults.params.is_empty()
    }

    fn into_parts(self) -> (Vec<(String, String)>, Vec<(String, String)>) {
        match Arc::try_unwrap(self.defaults) {
            Ok(defaults) => (defaults.headers, defaults.params),
            Err(shared) => (shared.headers.clone(), shared.params.clone()),
        }
    }
}

impl<S> Layer<S> for DefaultsLayer {
    type Service = WithDefaults<S>;

    fn layer(&self, inner: S) -> Self::Service {
        WithDefaults {
            inner,
            defaults: Arc::clone(&self.defaults),
        }
    }
}

/// Service produced by [`DefaultsLayer`].
#[derive(Debug, Clone)]
pub struct WithDefaults<S> {
    inner: S,
    defaults: Arc<Defaults>,
}

impl<S> Service<Request<Bytes>> for WithDefaults<S>
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

    fn call(&mut self, mut request: Request<Bytes>) -> Self::Future {
        self.defaults.apply(&mut request);
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[test]
    fn request_values_win() {
        let layer = DefaultsLayer::new()
            .bearer_auth("t0ken")
            .header("Accept", "application/json")
            .query_param("limit", "10")
            .query_param("api-key", "k");

        let url = url::Url::parse("https://stac.example.com/search?limit=2").expect("url");
        let mut request = Request::builder(Method::Get, url)
            .header("accept", "application/geo+json")
            .build();
        layer.defaults.apply(&mut request);

        assert_eq!(request.header("Authorization"), Some("Bearer t0ken"));
        assert_eq!(request.header("Accept"), Some("application/geo+json"));
        assert_eq!(
            request.url().as_str(),
            "https://stac.example.com/search?limit=2&api-key=k"
        );
    }

    #[test]
    fn empty_layer_leaves_request_alone() {
        let layer = DefaultsLayer::new();
        assert!(layer.is_empty());

        let url = url::Url::parse("https://stac.example.com/search").expect("url");
        let mut request = Request::builder(Method::Get, url).build();
        layer.defaults.apply(&mut request);
        assert_eq!(request.url().as_str(), "https://stac.example.com/search");
        assert!(request.headers().is_empty());
    }
}
