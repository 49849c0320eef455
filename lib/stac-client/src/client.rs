//! The catalog client: root discovery, capability checks, search and
//! collection access.

use std::sync::Arc;

use futures_core::Stream;
use futures_util::TryStreamExt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    Capability, Collection, Conformance, ContentType, Error, HttpClient, HttpClientExt, Item,
    ItemSearch, Link, Method, PageOptions, QUERYABLES_REL, Request, Result, RootDescriptor,
    SearchBuilder, SearchConfig, SearchRequest, Transport, TransportBuilder,
};

/// How [`Client::open_with`] connects.
#[derive(Debug, Default)]
pub struct ClientOptions {
    transport: TransportBuilder,
    ignore_conformance: bool,
    search: SearchConfig,
}

impl ClientOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a customized transport.
    #[must_use]
    pub fn transport(mut self, transport: TransportBuilder) -> Self {
        self.transport = transport;
        self
    }

    /// Header sent with every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.transport = self.transport.header(name, value);
        self
    }

    /// Query parameter sent with every request.
    #[must_use]
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.transport = self.transport.query_param(name, value);
        self
    }

    /// `Authorization: Bearer <token>` on every request.
    #[must_use]
    pub fn with_bearer_auth(mut self, token: impl AsRef<str>) -> Self {
        self.transport = self.transport.with_bearer_auth(token);
        self
    }

    /// Treat every capability as advertised, for servers with incomplete
    /// `conformsTo` arrays.
    #[must_use]
    pub const fn ignore_conformance(mut self, ignore: bool) -> Self {
        self.ignore_conformance = ignore;
        self
    }

    /// Limits and textual fields used when building searches.
    #[must_use]
    pub fn search_config(mut self, config: SearchConfig) -> Self {
        self.search = config;
        self
    }
}

/// Client for one STAC API.
///
/// Cheap to clone; clones share the transport (pool and cache) and the root
/// document.
///
/// # Example
///
/// ```ignore
/// use stac_client::prelude::*;
///
/// let client = Client::open("https://earth-search.aws.element84.com/v1").await?;
/// let search = client.search(
///     SearchBuilder::new()
///         .collections("sentinel-2-l2a")
///         .bbox([-72.5, 40.5, -72.0, 41.0])
///         .datetime("2023-06")
///         .max_items(20),
/// )?;
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    transport: Transport,
    url: url::Url,
    root: Arc<RootDescriptor>,
    conformance: Arc<Conformance>,
    search_config: Arc<SearchConfig>,
}

impl Client {
    /// Fetch the root document at `url` with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, the request fails or the
    /// root document does not decode.
    pub async fn open(url: &str) -> Result<Self> {
        Self::open_with(url, ClientOptions::default()).await
    }

    /// Fetch the root document at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, the request fails or the
    /// root document does not decode.
    pub async fn open_with(url: &str, options: ClientOptions) -> Result<Self> {
        let url = url::Url::parse(url)?;
        let transport = options.transport.build();
        let root: RootDescriptor = transport.get_json(url.clone()).await?;
        debug!(%url, id = %root.id, links = root.links.len(), "opened catalog");

        Ok(Self::from_root(transport, url, root, options.ignore_conformance)
            .with_search_config(options.search))
    }

    /// Client over an already fetched root document.
    #[must_use]
    pub fn from_root(
        transport: Transport,
        url: url::Url,
        root: RootDescriptor,
        ignore_conformance: bool,
    ) -> Self {
        let conformance = root.conformance(ignore_conformance);
        Self {
            transport,
            url,
            root: Arc::new(root),
            conformance: Arc::new(conformance),
            search_config: Arc::new(SearchConfig::default()),
        }
    }

    /// Replace the search limits and textual fields.
    #[must_use]
    pub fn with_search_config(mut self, config: SearchConfig) -> Self {
        self.search_config = Arc::new(config);
        self
    }

    /// Root document.
    #[must_use]
    pub fn root(&self) -> &RootDescriptor {
        &self.root
    }

    /// Root address.
    #[must_use]
    pub const fn url(&self) -> &url::Url {
        &self.url
    }

    /// What the server advertises.
    #[must_use]
    pub fn conformance(&self) -> &Conformance {
        &self.conformance
    }

    /// Underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Validate `builder` and prepare an item search.
    ///
    /// Every check happens here, before any network call.
    ///
    /// # Errors
    ///
    /// - [`Error::NotSupported`] when the server lacks item search or an
    ///   extension the search uses
    /// - [`Error::InvalidSearch`] when the parameters are inconsistent
    /// - [`Error::MissingLink`] when the root has no `search` link
    pub fn search(&self, builder: SearchBuilder) -> Result<ItemSearch> {
        self.conformance
            .require(Capability::ItemSearch, "item search")?;
        let request = builder.build_with(&self.search_config)?;
        self.require_extensions(&request)?;

        let method = request.method_for(self.root.post_search_advertised());
        let link = self
            .root
            .search_link(method)
            .ok_or_else(|| Error::missing_link("search"))?;
        let url = link.url(Some(&self.url))?;

        ItemSearch::new(self.transport.clone(), request, url, method)
    }

    fn require_extensions(&self, request: &SearchRequest) -> Result<()> {
        if request.filter().is_some() {
            self.conformance.require(Capability::Filter, "filter")?;
        }
        if request.sortby().is_some() {
            self.conformance.require(Capability::Sort, "sortby")?;
        }
        if request.fields().is_some() {
            self.conformance.require(Capability::Fields, "fields")?;
        }
        if request.query().is_some() {
            self.conformance.require(Capability::Query, "query")?;
        }
        Ok(())
    }

    /// One item by collection and id; `None` when the server has no such
    /// item.
    ///
    /// Uses the features endpoint when advertised, item search otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] when neither is available, or the
    /// error of the underlying request.
    pub async fn get_item(&self, collection_id: &str, item_id: &str) -> Result<Option<Item>> {
        if self.conformance.supports(Capability::Features) {
            let url = child_url(
                &self.collections_url()?,
                &[collection_id, "items", item_id],
            )?;
            let request = Request::builder(Method::Get, url)
                .header("Accept", ContentType::GeoJson.as_str())
                .build();
            let response = self.transport.execute(request).await?;
            if response.status() == 404 {
                return Ok(None);
            }
            return response.error_for_status()?.json().map(Some);
        }

        if self.conformance.supports(Capability::ItemSearch) {
            let search = self.search(
                SearchBuilder::new()
                    .ids(vec![item_id.to_string()])
                    .collections(vec![collection_id.to_string()])
                    .limit(1)
                    .max_items(1),
            )?;
            let mut items = std::pin::pin!(search.items());
            return items.try_next().await;
        }

        Err(Error::not_supported(Capability::Features, "item lookup"))
    }

    /// Every collection, paging through the collections endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] when the server lists no collections.
    pub fn collections(&self) -> Result<impl Stream<Item = Result<Collection>> + Send + use<>> {
        self.require_collections("collections")?;
        let link = Link::new("data", self.collections_url()?.as_str());
        Ok(crate::items(
            self.transport.clone(),
            link,
            PageOptions::collections(),
        ))
    }

    /// One collection by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] when the server lists no collections,
    /// or the error of the request.
    pub async fn get_collection(&self, collection_id: &str) -> Result<Collection> {
        self.require_collections("collections")?;
        let url = child_url(&self.collections_url()?, &[collection_id])?;
        self.transport.get_json(url).await
    }

    /// Search the items of one collection through its features endpoint.
    ///
    /// The search is always sent as `GET` query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] without the features capability (or an
    /// extension the search uses) and [`Error::InvalidSearch`] for invalid
    /// parameters.
    pub fn collection_items(&self, collection_id: &str, builder: SearchBuilder) -> Result<ItemSearch> {
        self.conformance
            .require(Capability::Features, "collection items")?;
        let request = builder.build_with(&self.search_config)?;
        self.require_extensions(&request)?;

        let url = child_url(&self.collections_url()?, &[collection_id, "items"])?;
        ItemSearch::new(self.transport.clone(), request, url, Method::Get)
    }

    /// Queryable properties as a JSON schema.
    ///
    /// With no collection ids, the catalog-wide queryables. Otherwise the
    /// union of the `properties` of each collection's queryables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] without the filter capability and
    /// [`Error::InvalidResponse`] when a document has no `properties` object.
    pub async fn queryables(&self, collection_ids: &[&str]) -> Result<Map<String, Value>> {
        self.conformance.require(Capability::Filter, "queryables")?;

        if collection_ids.is_empty() {
            let url = match self.root.link(QUERYABLES_REL) {
                Some(link) => link.url(Some(&self.url))?,
                None => {
                    warn!(url = %self.url, "root has no queryables link, using {{root}}/queryables");
                    child_url(&self.url, &["queryables"])?
                }
            };
            return self.fetch_queryables(url).await;
        }

        let collections = self.collections_url()?;
        let mut merged: Option<Map<String, Value>> = None;
        for id in collection_ids {
            let document = self
                .fetch_queryables(child_url(&collections, &[*id, "queryables"])?)
                .await?;
            match merged.as_mut() {
                None => merged = Some(document),
                Some(schema) => {
                    if let (Some(Value::Object(target)), Some(Value::Object(source))) =
                        (schema.get_mut("properties"), document.get("properties"))
                    {
                        for (name, definition) in source {
                            target.insert(name.clone(), definition.clone());
                        }
                    }
                }
            }
        }
        Ok(merged.unwrap_or_default())
    }

    async fn fetch_queryables(&self, url: url::Url) -> Result<Map<String, Value>> {
        let request = Request::builder(Method::Get, url)
            .header("Accept", ContentType::JsonSchema.as_str())
            .build();
        let document: Map<String, Value> = self.transport.read_json(request).await?;
        if !matches!(document.get("properties"), Some(Value::Object(_))) {
            return Err(Error::invalid_response(
                "queryables",
                "missing \"properties\" object",
            ));
        }
        Ok(document)
    }

    fn require_collections(&self, feature: &str) -> Result<()> {
        if self.conformance.supports(Capability::Features) {
            return Ok(());
        }
        self.conformance.require(Capability::Collections, feature)
    }

    fn collections_url(&self) -> Result<url::Url> {
        match self.root.link("data") {
            Some(link) => link.url(Some(&self.url)),
            None => {
                warn!(url = %self.url, "root has no data link, using {{root}}/collections");
                child_url(&self.url, &["collections"])
            }
        }
    }
}

/// `base` with `segments` appended as path segments.
fn child_url(base: &url::Url, segments: &[&str]) -> Result<url::Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|()| Error::invalid_request(format!("{base} cannot be a base address")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use serde_json::json;

    use super::*;

    fn root(value: Value) -> RootDescriptor {
        serde_json::from_value(value).expect("root")
    }

    fn client(root_doc: Value) -> Client {
        let url = url::Url::parse("https://stac.example.com/api/").expect("url");
        Client::from_root(Transport::new(), url, root(root_doc), false)
    }

    fn search_root(conforms_to: &[&str]) -> Value {
        json!({
            "id": "test",
            "conformsTo": conforms_to,
            "links": [
                {"rel": "search", "href": "search", "type": "application/geo+json", "method": "GET"},
                {"rel": "search", "href": "search", "type": "application/geo+json", "method": "POST"},
            ],
        })
    }

    const ITEM_SEARCH: &str = "https://api.stacspec.org/v1.0.0/item-search";
    const SORT: &str = "https://api.stacspec.org/v1.0.0/item-search#sort";

    #[test]
    fn child_url_appends_segments() {
        let base = url::Url::parse("https://stac.example.com/api?token=x").expect("url");
        let url = child_url(&base, &["collections", "a b", "items"]).expect("child");
        check!(url.as_str() == "https://stac.example.com/api/collections/a%20b/items");

        let slash = url::Url::parse("https://stac.example.com/api/").expect("url");
        let url = child_url(&slash, &["collections"]).expect("child");
        check!(url.as_str() == "https://stac.example.com/api/collections");
    }

    #[test]
    fn search_requires_item_search() {
        let client = client(search_root(&["https://api.stacspec.org/v1.0.0/core"]));
        let_assert!(Err(err) = client.search(SearchBuilder::new()));
        check!(err.is_capability());
        check!(err.to_string().contains("item search"));
    }

    #[test]
    fn search_requires_sort_extension() {
        let without = client(search_root(&[ITEM_SEARCH]));
        let_assert!(Err(err) = without.search(SearchBuilder::new().sortby("-datetime")));
        check!(err.is_capability());

        let with = client(search_root(&[ITEM_SEARCH, SORT]));
        check!(with.search(SearchBuilder::new().sortby("-datetime")).is_ok());
    }

    #[test]
    fn search_resolves_relative_link_and_prefers_post() {
        let client = client(search_root(&[ITEM_SEARCH]));
        let_assert!(Ok(search) = client.search(SearchBuilder::new().collections("c1")));
        check!(search.method() == Method::Post);
        check!(search.url().as_str() == "https://stac.example.com/api/search");
    }

    #[test]
    fn explicit_get_is_honored() {
        let client = client(search_root(&[ITEM_SEARCH]));
        let_assert!(
            Ok(search) = client.search(SearchBuilder::new().method(Method::Get).ids("a,b"))
        );
        check!(search.method() == Method::Get);
        let_assert!(Ok(url) = search.url_with_parameters());
        check!(url.query() == Some("limit=100&ids=a%2Cb"));
    }

    #[test]
    fn missing_search_link() {
        let client = client(json!({"id": "test", "conformsTo": [ITEM_SEARCH], "links": []}));
        let_assert!(Err(Error::MissingLink { rel }) = client.search(SearchBuilder::new()));
        check!(rel == "search");
    }

    #[test]
    fn invalid_search_is_reported_before_anything_else() {
        let client = client(search_root(&[ITEM_SEARCH]));
        let_assert!(
            Err(err) = client.search(
                SearchBuilder::new()
                    .bbox([0.0, 0.0, 1.0, 1.0])
                    .intersects(json!({"type": "Point", "coordinates": [0, 0]}))
            )
        );
        check!(err.is_invalid_input());
    }

    #[test]
    fn collections_need_a_capability() {
        let client = client(search_root(&[ITEM_SEARCH]));
        let_assert!(Err(err) = client.collections());
        check!(err.is_capability());
    }

    #[test]
    fn collections_url_prefers_data_link() {
        let client = client(json!({
            "id": "test",
            "conformsTo": [],
            "links": [{"rel": "data", "href": "https://data.example.com/colls"}],
        }));
        let_assert!(Ok(url) = client.collections_url());
        check!(url.as_str() == "https://data.example.com/colls");
    }
}
