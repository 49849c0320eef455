//! A prepared item search.

use futures_core::Stream;
use futures_util::TryStreamExt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    HttpClient, Item, ItemCollection, Link, Method, Page, PageOptions, Result, SearchRequest,
    ToQueryPairs, Transport, matched_count,
};

/// A validated search bound to an endpoint and an encoding.
///
/// Nothing is sent until one of the streams is polled or one of the async
/// methods is awaited. Every call starts a fresh walk from the first page.
///
/// # Example
///
/// ```ignore
/// use futures_util::TryStreamExt;
///
/// let search = client.search(SearchBuilder::new().collections("sentinel-2-l2a").max_items(50))?;
/// let items: Vec<Item> = search.items().try_collect().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ItemSearch {
    transport: Transport,
    request: SearchRequest,
    url: url::Url,
    method: Method,
    initial: Link,
}

impl ItemSearch {
    pub(crate) fn new(
        transport: Transport,
        request: SearchRequest,
        url: url::Url,
        method: Method,
    ) -> Result<Self> {
        let initial = request.to_link(&url, method)?;
        debug!(%url, %method, "prepared item search");
        Ok(Self {
            transport,
            request,
            url,
            method,
            initial,
        })
    }

    /// The normalized search.
    #[must_use]
    pub const fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// Search endpoint.
    #[must_use]
    pub const fn url(&self) -> &url::Url {
        &self.url
    }

    /// Endpoint with the search encoded as query parameters, whatever the
    /// method actually used.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoded address does not parse.
    pub fn url_with_parameters(&self) -> Result<url::Url> {
        Ok(self
            .request
            .to_request(&self.url, Method::Get)?
            .url()
            .clone())
    }

    /// Encoding used for the first page.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    fn options(&self) -> PageOptions {
        PageOptions::features()
            .max_items(self.request.max_items())
            .carried(self.request.to_query_pairs())
    }

    /// Stream of result pages, fetched one per poll.
    pub fn pages(&self) -> impl Stream<Item = Result<Page<Item>>> + Send + use<> {
        crate::pages(self.transport.clone(), self.initial.clone(), self.options())
    }

    /// Stream of individual items across pages.
    pub fn items(&self) -> impl Stream<Item = Result<Item>> + Send + use<> {
        crate::items(self.transport.clone(), self.initial.clone(), self.options())
    }

    /// Every item (up to `max_items`) as one GeoJSON `FeatureCollection`.
    ///
    /// # Errors
    ///
    /// Returns the first error met while paging.
    pub async fn collect_items(&self) -> Result<ItemCollection> {
        let items: Vec<Item> = self.items().try_collect().await?;
        Ok(ItemCollection::new(items))
    }

    /// Total number of matches reported by the server.
    ///
    /// Sends the search once with `limit=1` and reads `numberMatched`, or
    /// `context.matched` for older servers. `None` when neither is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is not a JSON
    /// object.
    pub async fn matched(&self) -> Result<Option<u64>> {
        let request = self
            .request
            .with_limit(1)
            .to_request(&self.url, self.method)?
            .no_store();
        let document: Map<String, Value> = self
            .transport
            .execute(request)
            .await?
            .error_for_status()?
            .json()?;

        let matched = matched_count(&document);
        if matched.is_none() {
            warn!(url = %self.url, "server did not report a match count");
        }
        Ok(matched)
    }
}
