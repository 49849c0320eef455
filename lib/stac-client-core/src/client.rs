//! HTTP client traits.
//!
//! [`HttpClient`] is the seam between the search engine and the network: the
//! pagination engine and the search facade only ever talk to an `HttpClient`,
//! so tests can swap in an in-memory double and the `stac-client` crate plugs
//! in its pooled, retrying, memoizing transport.

use std::future::Future;

use bytes::Bytes;

use crate::{Method, Request, Response, Result};

/// Core HTTP client trait.
///
/// This trait defines the interface for executing HTTP requests.
/// Implementations should be async-first and support connection pooling.
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request and return the response.
    ///
    /// Non-2xx statuses are returned as responses, not errors; use
    /// [`Response::error_for_status`] to convert them.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails for any reason:
    /// - Network errors
    /// - TLS errors
    /// - Timeouts
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send;
}

impl<C: HttpClient + ?Sized> HttpClient for &C {
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        (**self).execute(request)
    }
}

impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        (**self).execute(request)
    }
}

/// Extension trait for [`HttpClient`] with JSON convenience methods.
pub trait HttpClientExt: HttpClient {
    /// Execute a request and decode a 2xx JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Http`] for non-2xx statuses and a
    /// deserialization error when the body does not decode.
    fn read_json<T: serde::de::DeserializeOwned + Send>(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<T>> + Send {
        async move { self.execute(request).await?.error_for_status()?.json() }
    }

    /// GET `url` and decode its JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    fn get_json<T: serde::de::DeserializeOwned + Send>(
        &self,
        url: url::Url,
    ) -> impl Future<Output = Result<T>> + Send {
        async move {
            let request = Request::builder(Method::Get, url)
                .header("Accept", "application/json")
                .build();
            self.read_json(request).await
        }
    }
}

// Blanket implementation for all HttpClient implementors
impl<T: HttpClient> HttpClientExt for T {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct Canned(u16, &'static str);

    impl HttpClient for Canned {
        async fn execute(&self, _request: Request<Bytes>) -> Result<Response<Bytes>> {
            Ok(Response::new(self.0, HashMap::new(), Bytes::from(self.1)))
        }
    }

    #[tokio::test]
    async fn get_json_decodes_success() {
        let client = Canned(200, r#"{"id":"root"}"#);
        let url = url::Url::parse("https://stac.example.com/").expect("url");
        let value: serde_json::Value = client.get_json(url).await.expect("json");
        assert_eq!(value["id"], "root");
    }

    #[tokio::test]
    async fn get_json_maps_status_to_error() {
        let client = Canned(503, "unavailable");
        let url = url::Url::parse("https://stac.example.com/").expect("url");
        let err = client
            .get_json::<serde_json::Value>(url)
            .await
            .expect_err("503");
        assert_eq!(err.status(), Some(503));
    }
}
