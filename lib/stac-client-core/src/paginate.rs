//! Lazy pagination over continuation links.
//!
//! [`pages`] turns an initial [`Link`] into a stream of [`Page`]s. Nothing is
//! fetched until the stream is polled, and each poll issues at most one
//! request, so dropping the stream early costs nothing.
//!
//! ```ignore
//! let mut pages = pages::<Item, _>(&transport, link, PageOptions::features());
//! while let Some(page) = pages.try_next().await? {
//!     println!("{} items", page.len());
//! }
//! ```

use std::collections::HashSet;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::{StreamExt, TryStreamExt, stream};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{HttpClient, Link, Method, Page, Request, Result};

/// How to walk a paginated endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOptions {
    /// Key of the results array in each page.
    pub items_key: String,
    /// Stop once this many results have been yielded.
    pub max_items: Option<u64>,
    /// Parameters re-applied to bare `GET` continuation links. When empty,
    /// the query parameters of the initial request are used.
    pub carried: Vec<(String, String)>,
}

impl PageOptions {
    /// Item search pages (`features`).
    #[must_use]
    pub fn features() -> Self {
        Self::with_items_key("features")
    }

    /// Collection listing pages (`collections`).
    #[must_use]
    pub fn collections() -> Self {
        Self::with_items_key("collections")
    }

    /// Pages with results under `items_key`.
    #[must_use]
    pub fn with_items_key(items_key: impl Into<String>) -> Self {
        Self {
            items_key: items_key.into(),
            max_items: None,
            carried: Vec::new(),
        }
    }

    /// Cap the number of results.
    #[must_use]
    pub const fn max_items(mut self, max_items: Option<u64>) -> Self {
        self.max_items = max_items;
        self
    }

    /// Parameters to carry across bare continuation links.
    #[must_use]
    pub fn carried(mut self, carried: Vec<(String, String)>) -> Self {
        self.carried = carried;
        self
    }
}

impl Default for PageOptions {
    fn default() -> Self {
        Self::features()
    }
}

/// Stream the pages reachable from `initial`.
///
/// The walk stops after a page without a `next` link, after an empty page
/// (which is still yielded), once `max_items` results were yielded (the last
/// page is truncated), or when a `next` link leads back to a request already
/// sent by this walk. An error ends the stream at the page that failed.
///
/// Page requests are marked [`Request::no_store`]: every walk goes to the
/// server.
pub fn pages<T, C>(
    client: C,
    initial: Link,
    options: PageOptions,
) -> impl Stream<Item = Result<Page<T>>> + Send
where
    T: DeserializeOwned + Send,
    C: HttpClient,
{
    async_stream::try_stream! {
        let PageOptions { items_key, max_items, carried } = options;
        let mut request = initial.to_request(None)?.no_store();
        let carried = if carried.is_empty() && request.method() == Method::Get {
            request.query_pairs()
        } else {
            carried
        };
        let mut remaining = max_items;
        let mut number = 0_usize;
        let mut visited = HashSet::from([visit_key(&request)]);

        loop {
            number += 1;
            debug!(page = number, method = %request.method(), url = %request.url(), "fetching page");
            let response = client.execute(request.clone()).await?.error_for_status()?;
            let mut page: Page<T> = Page::from_value(response.json()?, &items_key)?;

            if let Some(left) = remaining {
                let returned = u64::try_from(page.items.len()).unwrap_or(u64::MAX);
                if returned >= left {
                    page.items.truncate(usize::try_from(left).unwrap_or(usize::MAX));
                    debug!(page = number, max_items, "item limit reached");
                    yield page;
                    break;
                }
                remaining = Some(left - returned);
            }

            let exhausted = page.is_empty();
            let next = page.next.clone();
            yield page;

            if exhausted {
                debug!(page = number, "empty page, stopping");
                break;
            }
            let Some(next) = next else {
                break;
            };
            let next_request = next.continuation(&request, &carried)?.no_store();
            if !visited.insert(visit_key(&next_request)) {
                warn!(url = %next_request.url(), "next link leads back to a page already fetched, stopping");
                break;
            }
            request = next_request;
        }
    }
}

type VisitKey = (Method, url::Url, Option<Bytes>);

fn visit_key(request: &Request<Bytes>) -> VisitKey {
    (request.method(), request.url().clone(), request.body().cloned())
}

/// Stream the individual results of [`pages`].
pub fn items<T, C>(
    client: C,
    initial: Link,
    options: PageOptions,
) -> impl Stream<Item = Result<T>> + Send
where
    T: DeserializeOwned + Send,
    C: HttpClient,
{
    pages(client, initial, options)
        .map_ok(|page: Page<T>| stream::iter(page.items.into_iter().map(Ok)))
        .try_flatten()
}

/// Collect every result of [`pages`].
pub async fn collect_items<T, C>(client: C, initial: Link, options: PageOptions) -> Result<Vec<T>>
where
    T: DeserializeOwned + Send,
    C: HttpClient,
{
    items(client, initial, options).try_collect().await
}

/// Number of pages a stream yields; handy in tests and logs.
pub async fn count_pages<T, S>(stream: S) -> Result<usize>
where
    S: Stream<Item = Result<Page<T>>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut count = 0;
    while let Some(page) = stream.next().await {
        page?;
        count += 1;
    }
    Ok(count)
}
