//! Async client for STAC APIs.
//!
//! Open a catalog, let the client check what the server supports, then page
//! through search results as a lazy stream. Requests go through a pooled
//! hyper transport with retries and `GET` memoization.
//!
//! # Example
//!
//! ```ignore
//! use futures_util::TryStreamExt;
//! use stac_client::prelude::*;
//!
//! let client = Client::open("https://earth-search.aws.element84.com/v1").await?;
//! let search = client.search(
//!     SearchBuilder::new()
//!         .collections("sentinel-2-l2a")
//!         .bbox([-72.5, 40.5, -72.0, 41.0])
//!         .datetime("2023-06/2023-07")
//!         .sortby("-properties.eo:cloud_cover")
//!         .max_items(10),
//! )?;
//!
//! let items: Vec<Item> = search.items().try_collect().await?;
//! ```

mod client;
mod config;
mod connector;
mod item_search;
pub mod middleware;
pub mod prelude;
mod transport;

pub use client::{Client, ClientOptions};
pub use config::{TransportConfig, TransportConfigBuilder};
pub use item_search::ItemSearch;
pub use transport::{BoxedService, RequestModifier, ServiceFuture, Transport, TransportBuilder};

// Re-export tower for middleware composition
pub use tower;

pub use stac_client_core::{
    Bbox, BboxInput, Capability, Collection, Conformance, ContentType, Datetime, DatetimeInput,
    Direction, Error, ErrorKind, Fields, FieldsInput, Filter, FilterInput, FilterLang,
    GeoInterface, HttpClient, HttpClientExt, IntersectsInput, Item, ItemCollection, Link, Method,
    Page, PageOptions, QUERYABLES_REL, Request, RequestBuilder, Response, Result, RootDescriptor,
    SearchBuilder, SearchConfig, SearchRequest, SortBy, SortInput, StringList, ToQueryPairs,
    collect_items, count_pages, deep_merge, find_link, from_json, from_value, items,
    matched_count, merge_query_defaults, pages, parse_query_shortcut, sortby_from_body,
    sortby_from_query, sortby_to_body, sortby_to_query, to_json,
};
