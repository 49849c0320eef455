//! Core types for the STAC API search client.
//!
//! This crate is transport-agnostic; it holds everything that can be decided
//! without a socket:
//! - [`Method`], [`Request`], [`Response`] - HTTP request/response types
//! - [`Error`], [`ErrorKind`] and [`Result`] - error handling
//! - [`HttpClient`] - the seam a transport plugs into
//! - [`Capability`] and [`Conformance`] - what a server says it can do
//! - [`SearchBuilder`] and [`SearchRequest`] - search normalization and encoding
//! - [`Link`], [`Page`] and [`pages`] - continuation links and lazy pagination
//! - [`RootDescriptor`], [`Item`], [`Collection`] - the documents the client reads

mod body;
mod client;
mod conformance;
mod datetime;
mod error;
mod link;
mod method;
mod page;
mod paginate;
mod params;
pub mod prelude;
mod request;
mod response;
mod root;
mod search;

pub use body::{ContentType, from_json, from_value, to_json};
pub use client::{HttpClient, HttpClientExt};
pub use conformance::{Capability, Conformance};
pub use datetime::{Datetime, DatetimeInput};
pub use error::{Error, ErrorKind, Result};
pub use link::{Link, find_link, parse_links};
pub use method::Method;
pub use page::{Collection, Item, ItemCollection, Page, matched_count};
pub use paginate::{PageOptions, collect_items, count_pages, items, pages};
pub use params::{
    Bbox, BboxInput, Direction, Fields, FieldsInput, Filter, FilterInput, FilterLang,
    GeoInterface, IntersectsInput, SortBy, SortInput, StringList, deep_merge,
    parse_query_shortcut, sortby_from_body, sortby_from_query, sortby_to_body, sortby_to_query,
};
pub use request::{Request, RequestBuilder, merge_query_defaults};
pub use response::Response;
pub use root::{QUERYABLES_REL, RootDescriptor};
pub use search::{SearchBuilder, SearchConfig, SearchRequest};

/// Trait for types that can be converted to query parameter pairs.
///
/// [`SearchRequest`] implements it to produce its `GET` encoding.
pub trait ToQueryPairs {
    /// Convert this type to a vector of key-value pairs for query parameters.
    fn to_query_pairs(&self) -> Vec<(String, String)>;
}
