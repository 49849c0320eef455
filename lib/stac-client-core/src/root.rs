//! The landing page of a STAC API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::link::find_link;
use crate::{Conformance, Link, Method};

/// Link relation of the queryables endpoint.
pub const QUERYABLES_REL: &str = "http://www.opengis.net/def/rel/ogc/1.0/queryables";

/// Root catalog document: identity, conformance and entry-point links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootDescriptor {
    /// Catalog id.
    #[serde(default)]
    pub id: String,
    /// Title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Advertised conformance URIs; absent on some older servers.
    #[serde(rename = "conformsTo", default, skip_serializing_if = "Option::is_none")]
    pub conforms_to: Option<Vec<String>>,
    /// Links; malformed entries are dropped.
    #[serde(default, deserialize_with = "crate::link::deserialize_links")]
    pub links: Vec<Link>,
    /// The rest of the document.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl RootDescriptor {
    /// First link with relation `rel`.
    #[must_use]
    pub fn link(&self, rel: &str) -> Option<&Link> {
        find_link(&self.links, rel)
    }

    /// JSON `search` links.
    pub fn search_links(&self) -> impl Iterator<Item = &Link> {
        self.links
            .iter()
            .filter(|link| link.is_rel("search") && link.is_json())
    }

    /// Search link to use with `method`; any search link when none
    /// declares that method.
    #[must_use]
    pub fn search_link(&self, method: Method) -> Option<&Link> {
        self.search_links()
            .find(|link| link.effective_method() == method)
            .or_else(|| self.search_links().next())
    }

    /// Whether some search link accepts `POST`.
    #[must_use]
    pub fn post_search_advertised(&self) -> bool {
        self.search_links()
            .any(|link| link.effective_method() == Method::Post)
    }

    /// Capability registry for this server.
    ///
    /// `ignore` answers yes to everything. So does a root without a
    /// `conformsTo` array that still links a search endpoint.
    #[must_use]
    pub fn conformance(&self, ignore: bool) -> Conformance {
        match &self.conforms_to {
            _ if ignore => Conformance::ignored(),
            None if self.search_links().next().is_some() => Conformance::ignored(),
            None => Conformance::new(std::iter::empty::<String>()),
            Some(uris) => Conformance::new(uris.iter().cloned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use serde_json::json;

    use super::*;
    use crate::Capability;

    fn root(value: Value) -> RootDescriptor {
        serde_json::from_value(value).expect("root")
    }

    #[test]
    fn search_link_prefers_method() {
        let root = root(json!({
            "id": "api",
            "conformsTo": [],
            "links": [
                {"rel": "search", "href": "/search", "type": "application/geo+json", "method": "GET"},
                {"rel": "search", "href": "/search", "type": "application/geo+json", "method": "POST"},
                {"rel": "search", "href": "/search.html", "type": "text/html"}
            ]
        }));
        check!(root.post_search_advertised());
        check!(root.search_link(Method::Post).and_then(|l| l.method) == Some(Method::Post));
        check!(root.search_link(Method::Get).and_then(|l| l.method) == Some(Method::Get));
        check!(root.search_links().count() == 2);
    }

    #[test]
    fn get_only_search() {
        let root = root(json!({
            "id": "api",
            "links": [{"rel": "search", "href": "/search", "type": "application/json"}]
        }));
        check!(!root.post_search_advertised());
        check!(root.search_link(Method::Post).is_some());
    }

    #[test]
    fn odd_links_do_not_break_the_root() {
        let root = root(json!({
            "id": "api",
            "conformsTo": [],
            "links": [
                {"rel": "service-doc", "type": "text/html"},
                {"rel": "search", "href": "/search", "type": "application/geo+json", "method": "Post"}
            ]
        }));
        check!(root.links.len() == 1);
        check!(root.post_search_advertised());
    }

    #[test]
    fn conformance_rules() {
        let advertised = root(json!({
            "id": "api",
            "conformsTo": ["https://api.stacspec.org/v1.0.0/core"],
            "links": []
        }));
        check!(advertised.conformance(false).supports(Capability::Core));
        check!(!advertised.conformance(false).supports(Capability::ItemSearch));
        check!(advertised.conformance(true).supports(Capability::ItemSearch));

        let legacy = root(json!({
            "id": "api",
            "links": [{"rel": "search", "href": "/search"}]
        }));
        check!(legacy.conformance(false).is_ignored());

        let bare = root(json!({"id": "catalog", "links": []}));
        check!(!bare.conformance(false).supports(Capability::ItemSearch));
    }
}
