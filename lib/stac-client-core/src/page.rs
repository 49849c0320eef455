//! Result pages and the documents they carry.
//!
//! Only the fields the client acts on are typed; everything else in an item
//! or collection is kept verbatim in a flattened JSON map.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::link::{find_link, parse_links};
use crate::{Error, Link, Result};

/// A STAC item (GeoJSON feature).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Item id, unique within its collection.
    pub id: String,
    /// Owning collection id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// The rest of the document.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Item {
    /// The `properties` object.
    #[must_use]
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.rest.get("properties").and_then(Value::as_object)
    }

    /// One property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties().and_then(|properties| properties.get(name))
    }

    /// The `geometry` object; `None` for null geometries.
    #[must_use]
    pub fn geometry(&self) -> Option<&Map<String, Value>> {
        self.rest.get("geometry").and_then(Value::as_object)
    }
}

/// A STAC collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Collection id.
    pub id: String,
    /// Title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Links; malformed entries are dropped.
    #[serde(default, deserialize_with = "crate::link::deserialize_links")]
    pub links: Vec<Link>,
    /// The rest of the document.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Collection {
    /// First link with relation `rel`.
    #[must_use]
    pub fn link(&self, rel: &str) -> Option<&Link> {
        find_link(&self.links, rel)
    }
}

/// Items gathered into one GeoJSON `FeatureCollection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCollection {
    #[serde(rename = "type", default = "feature_collection")]
    kind: String,
    /// The items.
    pub features: Vec<Item>,
}

fn feature_collection() -> String {
    "FeatureCollection".to_string()
}

impl ItemCollection {
    /// Wrap `items`.
    #[must_use]
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            kind: feature_collection(),
            features: items,
        }
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// No items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Iterate over items.
    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.features.iter()
    }
}

impl Default for ItemCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl IntoIterator for ItemCollection {
    type Item = Item;
    type IntoIter = std::vec::IntoIter<Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

impl FromIterator<Item> for ItemCollection {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// One response's worth of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Results, in server order.
    pub items: Vec<T>,
    /// Total number of matches, when the server reports it.
    pub matched: Option<u64>,
    /// Continuation link.
    pub next: Option<Link>,
    /// Every link of the page.
    pub links: Vec<Link>,
}

impl<T: DeserializeOwned> Page<T> {
    /// Parse a page whose results live under `items_key` (`features` for
    /// item searches, `collections` for collection listings).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResponse`] when the results array is missing
    /// and a deserialization error when an entry does not decode.
    pub fn from_value(value: Value, items_key: &str) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(Error::invalid_response("page", "expected a JSON object"));
        };
        let Some(Value::Array(raw_items)) = object.remove(items_key) else {
            return Err(Error::invalid_response(
                "page",
                format!("missing {items_key:?} array"),
            ));
        };

        let items = raw_items
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                crate::from_value(raw).map_err(|e| e.within(&format!("{items_key}[{index}]")))
            })
            .collect::<Result<Vec<T>>>()?;

        let matched = matched_count(&object);
        let links = match object.remove("links") {
            Some(links) => parse_links(links)?,
            None => Vec::new(),
        };
        let next = find_link(&links, "next").cloned();

        Ok(Self {
            items,
            matched,
            next,
            links,
        })
    }
}

impl<T> Page<T> {
    /// Number of results on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// No results on this page.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// `numberMatched`, or the older `context.matched`.
#[must_use]
pub fn matched_count(document: &Map<String, Value>) -> Option<u64> {
    document
        .get("numberMatched")
        .and_then(Value::as_u64)
        .or_else(|| {
            document
                .get("context")
                .and_then(|context| context.get("matched"))
                .and_then(Value::as_u64)
        })
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_item_page() {
        let page: Page<Item> = Page::from_value(
            json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "id": "a", "collection": "naip",
                     "geometry": {"type": "Point", "coordinates": [0, 0]},
                     "properties": {"gsd": 1}},
                    {"type": "Feature", "id": "b", "geometry": null, "properties": {}}
                ],
                "numberMatched": 10,
                "links": [{"rel": "next", "href": "https://stac.example.com/search?token=2"}]
            }),
            "features",
        )
        .expect("page");

        check!(page.len() == 2);
        check!(page.matched == Some(10));
        let_assert!(Some(next) = &page.next);
        check!(next.href == "https://stac.example.com/search?token=2");

        let_assert!([first, second] = page.items.as_slice());
        check!(first.collection.as_deref() == Some("naip"));
        check!(first.property("gsd") == Some(&json!(1)));
        check!(first.geometry().is_some());
        check!(second.geometry().is_none());
        check!(second.rest.get("type") == Some(&json!("Feature")));
    }

    #[test]
    fn context_matched_fallback() {
        let page: Page<Item> = Page::from_value(
            json!({"features": [], "context": {"returned": 0, "limit": 1, "matched": 42}}),
            "features",
        )
        .expect("page");
        check!(page.matched == Some(42));
        check!(page.is_empty());
        check!(page.next.is_none());
    }

    #[test]
    fn missing_items_array_is_a_shape_error() {
        let_assert!(Err(err) = Page::<Item>::from_value(json!({"links": []}), "features"));
        check!(err.kind() == crate::ErrorKind::ResponseShape);
        check!(err.to_string().contains("\"features\""));
    }

    #[test]
    fn bad_entry_reports_its_index() {
        let_assert!(
            Err(err) = Page::<Item>::from_value(
                json!({"features": [{"id": "ok"}, {"id": 7}]}),
                "features"
            )
        );
        check!(err.to_string().contains("features[1]"));
    }

    #[test]
    fn unusable_links_do_not_fail_the_page() {
        let page: Page<Item> = Page::from_value(
            json!({
                "features": [{"id": "a"}],
                "links": [
                    {"rel": "alternate", "type": "text/html", "title": "HTML"},
                    {"rel": "next", "href": "https://stac.example.com/search", "method": "Post",
                     "body": {"token": "t2"}}
                ]
            }),
            "features",
        )
        .expect("page");
        check!(page.links.len() == 1);
        let_assert!(Some(next) = &page.next);
        check!(next.effective_method() == crate::Method::Post);
    }

    #[test]
    fn malformed_next_link_names_its_path() {
        let_assert!(
            Err(err) = Page::<Item>::from_value(
                json!({
                    "features": [{"id": "a"}],
                    "links": [{"rel": "self", "href": "x"}, {"rel": "next", "href": 3}]
                }),
                "features"
            )
        );
        check!(err.kind() == crate::ErrorKind::ResponseShape);
        check!(err.to_string().contains("links[1].href"));
    }

    #[test]
    fn collections_page() {
        let page: Page<Collection> = Page::from_value(
            json!({"collections": [{"id": "naip", "title": "NAIP", "extent": {},
                "links": [{"rel": "license"}, {"rel": "items", "href": "/collections/naip/items"}]}]}),
            "collections",
        )
        .expect("page");
        let_assert!([naip] = page.items.as_slice());
        check!(naip.title.as_deref() == Some("NAIP"));
        check!(naip.rest.contains_key("extent"));
        check!(naip.link("items").is_some());
        check!(naip.links.len() == 1);
    }

    #[test]
    fn item_collection_serializes_as_geojson() {
        let items = vec![Item {
            id: "a".to_string(),
            collection: None,
            rest: Map::new(),
        }];
        let collection: ItemCollection = items.into_iter().collect();
        check!(
            serde_json::to_value(&collection).expect("json")
                == json!({"type": "FeatureCollection", "features": [{"id": "a"}]})
        );
    }
}
