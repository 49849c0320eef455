//! Hypermedia links and their resolution into requests.
//!
//! A STAC link is more than an address: paging links may carry their own
//! method, headers and JSON body (`"method": "POST"`, `"body": {...}`), and
//! `"merge": true` asks the client to fold that body into the one it sent
//! previously.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{ContentType, HttpClient, Method, Request, Response, Result, merge_query_defaults};

/// A single hypermedia link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Relation type (`self`, `next`, `search`, ...).
    pub rel: String,
    /// Target address, absolute or relative to the document it came from.
    pub href: String,
    /// Media type of the target.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Human readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// HTTP method to use; `GET` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    /// Headers to send; values may be a string or a list of strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, Value>>,
    /// JSON body for `POST` links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Map<String, Value>>,
    /// Merge `body` into the previous request body instead of replacing it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub merge: bool,
}

impl Link {
    /// A plain `GET` link.
    #[must_use]
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
            media_type: None,
            title: None,
            method: None,
            headers: None,
            body: None,
            merge: false,
        }
    }

    /// Set the method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the media type.
    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Whether this link has relation `rel`.
    #[must_use]
    pub fn is_rel(&self, rel: &str) -> bool {
        self.rel == rel
    }

    /// Whether the media type is JSON or GeoJSON (or unspecified).
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.media_type.as_deref().is_none_or(|media_type| {
            ContentType::Json.matches(media_type) || ContentType::GeoJson.matches(media_type)
        })
    }

    /// Method to use, defaulting to `POST` when only a body is given.
    #[must_use]
    pub fn effective_method(&self) -> Method {
        self.method.unwrap_or(if self.body.is_some() {
            Method::Post
        } else {
            Method::Get
        })
    }

    /// Absolute target address, resolving relative hrefs against `base`.
    pub fn url(&self, base: Option<&url::Url>) -> Result<url::Url> {
        match base {
            Some(base) => Ok(base.join(&self.href)?),
            None => Ok(url::Url::parse(&self.href)?),
        }
    }

    fn header_pairs(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.headers.iter().flatten().map(|(name, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Array(values) => values
                    .iter()
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                    .collect::<Vec<_>>()
                    .join(", "),
                other => other.to_string(),
            };
            (name.clone(), value)
        })
    }

    /// Request that follows this link on its own.
    pub fn to_request(&self, base: Option<&url::Url>) -> Result<Request<Bytes>> {
        let url = self.url(base)?;
        let builder = Request::builder(self.effective_method(), url)
            .header("Accept", ContentType::GeoJson.as_str())
            .headers(self.header_pairs());
        match self.effective_method() {
            Method::Get => Ok(builder.build()),
            Method::Post => {
                let body = self.body.clone().unwrap_or_default();
                Ok(builder.json(&body)?.build())
            }
        }
    }

    /// Request that continues from `previous`, the request that returned the
    /// page this link came from.
    ///
    /// - `POST` links send their body verbatim, or shallow-merged over the
    ///   previous JSON body when `merge` is set.
    /// - `GET` links keep their own query parameters and gain every `carried`
    ///   parameter whose key they do not already have, so filters survive a
    ///   bare `next` address.
    /// - Link headers replace the previous headers, or are merged over them
    ///   when `merge` is set.
    pub fn continuation(
        &self,
        previous: &Request<Bytes>,
        carried: &[(String, String)],
    ) -> Result<Request<Bytes>> {
        let mut url = self.url(Some(previous.url()))?;

        let mut headers: HashMap<String, String> = if self.headers.is_some() && !self.merge {
            HashMap::new()
        } else {
            previous.headers().clone()
        };
        headers.extend(self.header_pairs());
        if !headers.keys().any(|name| name.eq_ignore_ascii_case("accept")) {
            headers.insert("Accept".to_string(), ContentType::GeoJson.as_str().to_string());
        }

        match self.effective_method() {
            Method::Get => {
                headers.retain(|name, _| !name.eq_ignore_ascii_case("content-type"));
                merge_query_defaults(
                    &mut url,
                    carried.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                );
                Ok(Request::from_parts(Method::Get, url, headers, None))
            }
            Method::Post => {
                let mut body = if self.merge {
                    previous_body(previous)
                } else {
                    Map::new()
                };
                body.extend(self.body.clone().unwrap_or_default());
                headers.retain(|name, _| !name.eq_ignore_ascii_case("content-type"));
                headers.insert(
                    "Content-Type".to_string(),
                    ContentType::Json.as_str().to_string(),
                );
                Ok(Request::from_parts(
                    Method::Post,
                    url,
                    headers,
                    Some(crate::to_json(&body)?),
                ))
            }
        }
    }

    /// Follow this link through `client`.
    pub async fn execute<C: HttpClient>(
        &self,
        client: &C,
        base: Option<&url::Url>,
    ) -> Result<Response<Bytes>> {
        let request = self.to_request(base)?;
        client.execute(request).await
    }
}

fn previous_body(previous: &Request<Bytes>) -> Map<String, Value> {
    previous
        .body()
        .and_then(|bytes| serde_json::from_slice::<Map<String, Value>>(bytes).ok())
        .unwrap_or_default()
}

/// Decode a `links` array, skipping entries that are not usable links.
///
/// Documents often carry links the client never follows (HTML alternates
/// without `href`, vendor relations with odd fields). Those are dropped. A
/// malformed `next` link is an error since paging depends on it. Anything
/// other than an array yields no links.
pub fn parse_links(value: Value) -> Result<Vec<Link>> {
    let Value::Array(entries) = value else {
        debug!("links is not an array, ignoring it");
        return Ok(Vec::new());
    };

    let mut links = Vec::with_capacity(entries.len());
    for (index, raw) in entries.into_iter().enumerate() {
        let paging = raw.get("rel").and_then(Value::as_str) == Some("next");
        match crate::from_value::<Link>(raw) {
            Ok(link) => links.push(link),
            Err(err) if paging => return Err(err.within(&format!("links[{index}]"))),
            Err(err) => debug!(index, %err, "skipping malformed link"),
        }
    }
    Ok(links)
}

/// Serde adapter over [`parse_links`] for document types.
pub(crate) fn deserialize_links<'de, D>(deserializer: D) -> std::result::Result<Vec<Link>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_links(value).map_err(serde::de::Error::custom)
}

/// First link in `links` with relation `rel`.
#[must_use]
pub fn find_link<'a>(links: &'a [Link], rel: &str) -> Option<&'a Link> {
    links.iter().find(|link| link.is_rel(rel))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn search_url() -> url::Url {
        url::Url::parse("https://stac.example.com/api/search").expect("url")
    }

    #[test]
    fn deserialize_post_link() {
        let link: Link = serde_json::from_value(json!({
            "rel": "next",
            "href": "https://stac.example.com/api/search",
            "type": "application/geo+json",
            "method": "POST",
            "body": {"token": "next:abc"},
            "merge": true,
            "headers": {"X-Trace": ["a", "b"]}
        }))
        .expect("link");

        assert_eq!(link.effective_method(), Method::Post);
        assert!(link.merge);
        assert!(link.is_json());
        assert_eq!(
            link.header_pairs().collect::<Vec<_>>(),
            vec![("X-Trace".to_string(), "a, b".to_string())]
        );
    }

    #[test]
    fn relative_href_resolves_against_base() {
        let link = Link::new("data", "../collections");
        let url = link.url(Some(&search_url())).expect("url");
        assert_eq!(url.as_str(), "https://stac.example.com/collections");
    }

    #[test]
    fn to_request_post_sends_body() {
        let mut body = Map::new();
        body.insert("limit".to_string(), json!(5));
        let link = Link::new("search", search_url().as_str())
            .with_method(Method::Post)
            .with_body(body);

        let request = link.to_request(None).expect("request");
        assert_eq!(request.method(), Method::Post);
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(
            request.body().map(Bytes::as_ref),
            Some(br#"{"limit":5}"#.as_slice())
        );
    }

    #[test]
    fn get_continuation_carries_filters() {
        let previous = Request::builder(Method::Get, search_url())
            .query("collections", "naip")
            .query("limit", "2")
            .build();
        let link = Link::new("next", "https://stac.example.com/api/search?limit=2&token=xyz");

        let next = link
            .continuation(&previous, &previous.query_pairs())
            .expect("continuation");

        assert_eq!(next.method(), Method::Get);
        assert_eq!(
            next.url().as_str(),
            "https://stac.example.com/api/search?limit=2&token=xyz&collections=naip"
        );
    }

    #[test]
    fn post_continuation_replaces_body_without_merge() {
        let previous = Request::builder(Method::Post, search_url())
            .json(&json!({"collections": ["naip"], "limit": 2}))
            .expect("json")
            .build();
        let mut body = Map::new();
        body.insert("token".to_string(), json!("page2"));
        let link = Link::new("next", search_url().as_str())
            .with_method(Method::Post)
            .with_body(body);

        let next = link.continuation(&previous, &[]).expect("continuation");
        let sent: Value = serde_json::from_slice(next.body().expect("body")).expect("json");
        assert_eq!(sent, json!({"token": "page2"}));
    }

    #[test]
    fn post_continuation_merges_body() {
        let previous = Request::builder(Method::Post, search_url())
            .json(&json!({"collections": ["naip"], "limit": 2}))
            .expect("json")
            .build();
        let mut body = Map::new();
        body.insert("token".to_string(), json!("page2"));
        let mut link = Link::new("next", search_url().as_str())
            .with_method(Method::Post)
            .with_body(body);
        link.merge = true;

        let next = link.continuation(&previous, &[]).expect("continuation");
        let sent: Value = serde_json::from_slice(next.body().expect("body")).expect("json");
        assert_eq!(
            sent,
            json!({"collections": ["naip"], "limit": 2, "token": "page2"})
        );
    }

    #[test]
    fn parse_links_skips_unusable_entries() {
        let links = parse_links(json!([
            {"rel": "alternate", "type": "text/html"},
            {"rel": "self", "href": "https://stac.example.com/search"},
            {"rel": "next", "href": "https://stac.example.com/search?page=2", "method": "Get"},
            "not a link"
        ]))
        .expect("links");

        assert_eq!(links.len(), 2);
        let next = find_link(&links, "next").expect("next");
        assert_eq!(next.effective_method(), Method::Get);
        assert!(parse_links(Value::Null).expect("null").is_empty());
    }

    #[test]
    fn malformed_next_link_is_reported_with_its_path() {
        let err = parse_links(json!([
            {"rel": "self", "href": "https://stac.example.com/search"},
            {"rel": "next", "method": "POST"}
        ]))
        .expect_err("next without href");
        assert!(err.to_string().contains("links[1]"), "{err}");
        assert_eq!(err.kind(), crate::ErrorKind::ResponseShape);
    }

    #[test]
    fn find_link_by_rel() {
        let links = vec![Link::new("self", "a"), Link::new("next", "b")];
        assert_eq!(find_link(&links, "next").map(|l| l.href.as_str()), Some("b"));
        assert!(find_link(&links, "prev").is_none());
    }
}
