//! Query building.
//!
//! [`SearchBuilder`] collects loosely typed user input; [`SearchBuilder::build`]
//! validates and normalizes all of it at once into an immutable
//! [`SearchRequest`], which knows how to encode itself as a query string or a
//! JSON body. Nothing here touches the network.
//!
//! ```
//! use stac_client_core::{Method, SearchBuilder};
//!
//! let request = SearchBuilder::new()
//!     .collections("sentinel-2-l2a")
//!     .bbox([-110.0, 39.5, -105.0, 40.5])
//!     .datetime("2023-06")
//!     .query_shortcut("eo:cloud_cover<=10")
//!     .build()
//!     .expect("valid search");
//!
//! assert_eq!(request.limit(), 100);
//! assert_eq!(request.method_for(false), Method::Post);
//! ```

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::params::{deep_merge, parse_query_shortcut, sortby_to_query};
use crate::{
    Bbox, BboxInput, Datetime, DatetimeInput, Error, Fields, FieldsInput, FilterInput, FilterLang,
    IntersectsInput, Link, Method, Request, Result, SortBy, SortInput, StringList, ToQueryPairs,
};

/// Limits and parsing rules applied by [`SearchBuilder::build_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Largest page size a request may ask for.
    pub max_limit: u32,
    /// Page size when none is given.
    pub default_limit: u32,
    /// Properties whose query-shortcut values always stay strings.
    pub textual_fields: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_limit: 10_000,
            default_limit: 100,
            textual_fields: vec!["id".to_string(), "collection".to_string()],
        }
    }
}

impl SearchConfig {
    /// Set the maximum page size.
    #[must_use]
    pub const fn with_max_limit(mut self, max_limit: u32) -> Self {
        self.max_limit = max_limit;
        self
    }

    /// Set the default page size.
    #[must_use]
    pub const fn with_default_limit(mut self, default_limit: u32) -> Self {
        self.default_limit = default_limit;
        self
    }

    /// Replace the textual field allowlist.
    #[must_use]
    pub fn with_textual_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.textual_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// Collects search parameters; see the [module docs](self).
#[derive(Debug, Clone, Default)]
pub struct SearchBuilder {
    method: Option<Method>,
    limit: Option<u32>,
    max_items: Option<u64>,
    bbox: Option<BboxInput>,
    intersects: Option<IntersectsInput>,
    datetime: Option<DatetimeInput>,
    collections: Option<StringList>,
    ids: Option<StringList>,
    query: Option<Map<String, Value>>,
    query_shortcuts: Vec<String>,
    filter: Option<FilterInput>,
    filter_lang: Option<String>,
    sortby: Option<SortInput>,
    fields: Option<FieldsInput>,
}

impl SearchBuilder {
    /// An empty search: every item of every collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the wire encoding.
    #[must_use]
    pub const fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Page size.
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Stop after this many items in total.
    #[must_use]
    pub const fn max_items(mut self, max_items: u64) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// Bounding box filter.
    #[must_use]
    pub fn bbox(mut self, bbox: impl Into<BboxInput>) -> Self {
        self.bbox = Some(bbox.into());
        self
    }

    /// Geometry filter.
    #[must_use]
    pub fn intersects(mut self, intersects: impl Into<IntersectsInput>) -> Self {
        self.intersects = Some(intersects.into());
        self
    }

    /// Temporal filter.
    #[must_use]
    pub fn datetime(mut self, datetime: impl Into<DatetimeInput>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    /// Restrict to these collections.
    #[must_use]
    pub fn collections(mut self, collections: impl Into<StringList>) -> Self {
        self.collections = Some(collections.into());
        self
    }

    /// Restrict to these item ids.
    #[must_use]
    pub fn ids(mut self, ids: impl Into<StringList>) -> Self {
        self.ids = Some(ids.into());
        self
    }

    /// Query extension object, merged with any shortcuts.
    #[must_use]
    pub fn query(mut self, query: Map<String, Value>) -> Self {
        self.query = Some(query);
        self
    }

    /// Query extension shortcut such as `eo:cloud_cover<=10`.
    #[must_use]
    pub fn query_shortcut(mut self, shortcut: impl Into<String>) -> Self {
        self.query_shortcuts.push(shortcut.into());
        self
    }

    /// CQL2 filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<FilterInput>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Explicit filter language (`cql2-json` or `cql2-text`).
    #[must_use]
    pub fn filter_lang(mut self, lang: impl Into<String>) -> Self {
        self.filter_lang = Some(lang.into());
        self
    }

    /// Sort order.
    #[must_use]
    pub fn sortby(mut self, sortby: impl Into<SortInput>) -> Self {
        self.sortby = Some(sortby.into());
        self
    }

    /// Property inclusion and exclusion.
    #[must_use]
    pub fn fields(mut self, fields: impl Into<FieldsInput>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    /// Validate with default limits.
    pub fn build(self) -> Result<SearchRequest> {
        self.build_with(&SearchConfig::default())
    }

    /// Validate and normalize.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSearch`] for out-of-range limits, both `bbox`
    /// and `intersects`, or any input that does not normalize.
    pub fn build_with(self, config: &SearchConfig) -> Result<SearchRequest> {
        let mut limit = match self.limit {
            Some(limit) if limit == 0 || limit > config.max_limit => {
                return Err(Error::invalid_search(format!(
                    "limit must be between 1 and {}, got {limit}",
                    config.max_limit
                )));
            }
            Some(limit) => limit,
            None => config.default_limit.clamp(1, config.max_limit.max(1)),
        };
        if let Some(max_items) = self.max_items {
            if max_items == 0 {
                return Err(Error::invalid_search("max_items must be at least 1"));
            }
            if let Ok(max_items) = u32::try_from(max_items) {
                limit = limit.min(max_items);
            }
        }

        if self.bbox.is_some() && self.intersects.is_some() {
            return Err(Error::invalid_search(
                "bbox and intersects are mutually exclusive",
            ));
        }
        let bbox = self.bbox.map(BboxInput::normalize).transpose()?;
        let intersects = self.intersects.map(IntersectsInput::normalize).transpose()?;
        let datetime = self.datetime.map(DatetimeInput::normalize).transpose()?;

        let collections = self.collections.map(StringList::normalize).filter(|c| !c.is_empty());
        let ids = self.ids.map(StringList::normalize).filter(|i| !i.is_empty());

        let mut query = self.query;
        for shortcut in &self.query_shortcuts {
            let parsed = parse_query_shortcut(shortcut, &config.textual_fields)?;
            deep_merge(query.get_or_insert_with(Map::new), parsed);
        }

        let filter_lang = self
            .filter_lang
            .as_deref()
            .map(str::parse::<FilterLang>)
            .transpose()?;
        let filter = self.filter.map(|f| f.normalize(filter_lang)).transpose()?;

        let sortby = self.sortby.map(SortInput::normalize).transpose()?;
        let fields = self.fields.map(FieldsInput::normalize).filter(|f| !f.is_empty());

        Ok(SearchRequest {
            limit,
            bbox,
            intersects,
            datetime,
            collections,
            ids,
            query: query.filter(|q| !q.is_empty()),
            filter_lang: filter.as_ref().map(|f| f.lang),
            filter: filter.map(|f| f.expression),
            sortby,
            fields,
            max_items: self.max_items,
            method: self.method,
        })
    }
}

/// A validated, normalized search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    bbox: Option<Bbox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    intersects: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    datetime: Option<Datetime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collections: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
    #[serde(rename = "filter-lang", skip_serializing_if = "Option::is_none")]
    filter_lang: Option<FilterLang>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sortby: Option<Vec<SortBy>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Fields>,
    #[serde(skip)]
    max_items: Option<u64>,
    #[serde(skip)]
    method: Option<Method>,
}

impl SearchRequest {
    /// Page size.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Total item cap.
    #[must_use]
    pub const fn max_items(&self) -> Option<u64> {
        self.max_items
    }

    /// Bounding box.
    #[must_use]
    pub const fn bbox(&self) -> Option<&Bbox> {
        self.bbox.as_ref()
    }

    /// Geometry.
    #[must_use]
    pub const fn intersects(&self) -> Option<&Map<String, Value>> {
        self.intersects.as_ref()
    }

    /// Temporal filter.
    #[must_use]
    pub const fn datetime(&self) -> Option<&Datetime> {
        self.datetime.as_ref()
    }

    /// Collection ids.
    #[must_use]
    pub fn collections(&self) -> Option<&[String]> {
        self.collections.as_deref()
    }

    /// Item ids.
    #[must_use]
    pub fn ids(&self) -> Option<&[String]> {
        self.ids.as_deref()
    }

    /// Query extension object.
    #[must_use]
    pub const fn query(&self) -> Option<&Map<String, Value>> {
        self.query.as_ref()
    }

    /// CQL2 filter expression.
    #[must_use]
    pub const fn filter(&self) -> Option<&Value> {
        self.filter.as_ref()
    }

    /// Language of [`filter`](Self::filter).
    #[must_use]
    pub const fn filter_lang(&self) -> Option<FilterLang> {
        self.filter_lang
    }

    /// Sort directives.
    #[must_use]
    pub fn sortby(&self) -> Option<&[SortBy]> {
        self.sortby.as_deref()
    }

    /// Field selection.
    #[must_use]
    pub const fn fields(&self) -> Option<&Fields> {
        self.fields.as_ref()
    }

    /// Method requested by the caller, if any.
    #[must_use]
    pub const fn requested_method(&self) -> Option<Method> {
        self.method
    }

    /// Whether the request carries a filter, geometry or query object.
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        self.filter.is_some() || self.intersects.is_some() || self.query.is_some()
    }

    /// Encoding to use: the caller's choice, else `POST` for structured
    /// requests or when the server advertises a `POST` search, else `GET`.
    #[must_use]
    pub const fn method_for(&self, post_advertised: bool) -> Method {
        match self.method {
            Some(method) => method,
            None if post_advertised || self.is_structured() => Method::Post,
            None => Method::Get,
        }
    }

    /// The same search with another page size.
    #[must_use]
    pub fn with_limit(&self, limit: u32) -> Self {
        Self {
            limit,
            ..self.clone()
        }
    }

    /// The same search restricted to `ids` in `collections`.
    #[must_use]
    pub fn with_ids(&self, ids: Vec<String>, collections: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            collections: Some(collections),
            ..self.clone()
        }
    }

    /// JSON body form.
    pub fn to_body(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(body) => Ok(body),
            _ => Err(Error::invalid_request("search request did not serialize to an object")),
        }
    }

    /// Initial link for paging through this search at `url`.
    pub fn to_link(&self, url: &url::Url, method: Method) -> Result<Link> {
        match method {
            Method::Get => {
                let request = Request::<Bytes>::builder(Method::Get, url.clone())
                    .query_pairs(self.to_query_pairs())
                    .build();
                Ok(Link::new("search", request.url().as_str()))
            }
            Method::Post => {
                Ok(Link::new("search", url.as_str())
                    .with_method(Method::Post)
                    .with_body(self.to_body()?))
            }
        }
    }

    /// A single request for this search at `url`.
    pub fn to_request(&self, url: &url::Url, method: Method) -> Result<Request<Bytes>> {
        self.to_link(url, method)?.to_request(None)
    }
}

impl ToQueryPairs for SearchRequest {
    fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("limit".to_string(), self.limit.to_string())];
        let mut push = |key: &str, value: String| pairs.push((key.to_string(), value));

        if let Some(bbox) = &self.bbox {
            push("bbox", bbox.to_query_value());
        }
        if let Some(intersects) = &self.intersects {
            push("intersects", Value::Object(intersects.clone()).to_string());
        }
        if let Some(datetime) = &self.datetime {
            push("datetime", datetime.to_string());
        }
        if let Some(collections) = &self.collections {
            push("collections", collections.join(","));
        }
        if let Some(ids) = &self.ids {
            push("ids", ids.join(","));
        }
        if let Some(query) = &self.query {
            push("query", Value::Object(query.clone()).to_string());
        }
        if let Some(filter) = &self.filter {
            let value = match filter {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            push("filter", value);
        }
        if let Some(lang) = self.filter_lang {
            push("filter-lang", lang.to_string());
        }
        if let Some(sortby) = &self.sortby {
            push("sortby", sortby_to_query(sortby));
        }
        if let Some(fields) = &self.fields {
            push("fields", fields.to_query_value());
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use serde_json::json;

    use super::*;

    fn search_url() -> url::Url {
        url::Url::parse("https://stac.example.com/search").expect("url")
    }

    #[test]
    fn default_limit_and_max_items() {
        let request = SearchBuilder::new().build().expect("empty search");
        check!(request.limit() == 100);

        let request = SearchBuilder::new().limit(50).max_items(20).build().expect("capped");
        check!(request.limit() == 20);
        check!(request.max_items() == Some(20));

        let request = SearchBuilder::new().max_items(1_000).build().expect("large cap");
        check!(request.limit() == 100);
    }

    #[test]
    fn limit_bounds() {
        let_assert!(Err(err) = SearchBuilder::new().limit(0).build());
        check!(err.is_invalid_input());
        let_assert!(Err(_) = SearchBuilder::new().limit(10_001).build());
        let_assert!(Ok(_) = SearchBuilder::new().limit(10_000).build());

        let config = SearchConfig::default().with_max_limit(500);
        let_assert!(Err(_) = SearchBuilder::new().limit(501).build_with(&config));
        let_assert!(Err(_) = SearchBuilder::new().max_items(0).build());
    }

    #[test]
    fn bbox_and_intersects_are_exclusive() {
        let_assert!(
            Err(err) = SearchBuilder::new()
                .bbox([0.0, 0.0, 1.0, 1.0])
                .intersects(json!({"type": "Point", "coordinates": [0.5, 0.5]}))
                .build()
        );
        check!(err.is_invalid_input());
        check!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn query_object_and_shortcuts_merge() {
        let mut explicit = Map::new();
        explicit.insert("gsd".to_string(), json!({"gte": 10}));
        let request = SearchBuilder::new()
            .query(explicit)
            .query_shortcut("gsd<=30")
            .query_shortcut("id=abc")
            .build()
            .expect("query");
        check!(
            request.query().cloned().map(Value::Object)
                == Some(json!({"gsd": {"gte": 10, "lte": 30}, "id": {"eq": "abc"}}))
        );
    }

    #[test]
    fn textual_fields_are_configurable() {
        let config = SearchConfig::default().with_textual_fields(["platform"]);
        let request = SearchBuilder::new()
            .query_shortcut("platform=8")
            .query_shortcut("id=8")
            .build_with(&config)
            .expect("query");
        check!(
            request.query().cloned().map(Value::Object)
                == Some(json!({"platform": {"eq": "8"}, "id": {"eq": 8}}))
        );
    }

    #[test]
    fn get_encoding() {
        let request = SearchBuilder::new()
            .limit(10)
            .bbox("-110,39.5,-105,40.5")
            .datetime("2023-06-01T00:00:00Z/..")
            .collections(["sentinel-2-l2a", "landsat-c2-l2"])
            .ids("a,b")
            .sortby("-datetime")
            .fields("id,-assets")
            .build()
            .expect("search");

        let pairs = request.to_query_pairs();
        let value = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        check!(value("limit") == Some("10"));
        check!(value("bbox") == Some("-110,39.5,-105,40.5"));
        check!(value("datetime") == Some("2023-06-01T00:00:00Z/.."));
        check!(value("collections") == Some("sentinel-2-l2a,landsat-c2-l2"));
        check!(value("ids") == Some("a,b"));
        check!(value("sortby") == Some("-datetime"));
        check!(value("fields") == Some("+id,-assets"));
        check!(value("filter-lang").is_none());
        check!(request.method_for(false) == Method::Get);
    }

    #[test]
    fn get_encoding_of_structured_parameters() {
        let request = SearchBuilder::new()
            .intersects(r#"{"type":"Point","coordinates":[1,2]}"#)
            .filter("eo:cloud_cover < 10")
            .method(Method::Get)
            .build()
            .expect("search");
        let pairs = request.to_query_pairs();
        let intersects = pairs
            .iter()
            .find(|(k, _)| k == "intersects")
            .map(|(_, v)| serde_json::from_str::<Value>(v).expect("json"));
        check!(intersects == Some(json!({"type": "Point", "coordinates": [1, 2]})));
        check!(pairs.contains(&("filter".to_string(), "eo:cloud_cover < 10".to_string())));
        check!(pairs.contains(&("filter-lang".to_string(), "cql2-text".to_string())));
        check!(request.method_for(true) == Method::Get);
    }

    #[test]
    fn post_encoding() {
        let request = SearchBuilder::new()
            .limit(5)
            .collections("naip")
            .filter(json!({"op": "<", "args": [{"property": "eo:cloud_cover"}, 10]}))
            .sortby(vec![SortBy::desc("datetime")])
            .fields("id")
            .build()
            .expect("search");

        check!(request.method_for(false) == Method::Post);
        let body = request.to_body().expect("body");
        check!(
            Value::Object(body)
                == json!({
                    "limit": 5,
                    "collections": ["naip"],
                    "filter": {"op": "<", "args": [{"property": "eo:cloud_cover"}, 10]},
                    "filter-lang": "cql2-json",
                    "sortby": [{"field": "datetime", "direction": "desc"}],
                    "fields": {"includes": ["id"], "excludes": []}
                })
        );
    }

    #[test]
    fn method_choice() {
        let plain = SearchBuilder::new().collections("naip").build().expect("plain");
        check!(plain.method_for(false) == Method::Get);
        check!(plain.method_for(true) == Method::Post);

        let forced = SearchBuilder::new().method(Method::Get).build().expect("forced");
        check!(forced.method_for(true) == Method::Get);
    }

    #[test]
    fn to_request_uses_encoding() {
        let request = SearchBuilder::new().collections("naip").limit(2).build().expect("search");

        let get = request.to_request(&search_url(), Method::Get).expect("get");
        check!(get.url().as_str() == "https://stac.example.com/search?limit=2&collections=naip");
        check!(get.body().is_none());

        let post = request.to_request(&search_url(), Method::Post).expect("post");
        check!(post.url().as_str() == "https://stac.example.com/search");
        let sent: Value = serde_json::from_slice(post.body().expect("body")).expect("json");
        check!(sent == json!({"limit": 2, "collections": ["naip"]}));
    }

    #[test]
    fn invalid_inputs_fail_at_build() {
        let_assert!(Err(_) = SearchBuilder::new().datetime("../..").build());
        let_assert!(Err(_) = SearchBuilder::new().filter("x = 1").filter_lang("cql-text").build());
        let_assert!(Err(_) = SearchBuilder::new().query_shortcut("gsd").build());
        let_assert!(Err(_) = SearchBuilder::new().sortby("").build());
        let_assert!(Err(_) = SearchBuilder::new().bbox([1.0, 2.0]).build());
    }
}
